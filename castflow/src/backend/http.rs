//! HTTP implementation of [`TaskBackend`] using reqwest.

use super::wire::{
    ApiEnvelope, CheckResponse, CreateTaskRequest, LinkParseRequest, PublishRequest,
    RewriteRequest, TaskView, TimbreSynthesisRequest, VideoSynthesisRequest,
};
use super::TaskBackend;
use crate::config::BackendConfig;
use crate::errors::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Tracing target for backend HTTP calls.
pub const TRACING_TARGET: &str = "castflow::backend";

/// Maximum number of body characters kept in a status error.
const ERROR_BODY_LIMIT: usize = 512;

struct HttpTaskBackendInner {
    http: Client,
    config: BackendConfig,
}

impl std::fmt::Debug for HttpTaskBackendInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTaskBackendInner")
            .field("base_url", &self.config.base_url)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Worker backend client over HTTP.
///
/// Cheap to clone; clones share one connection pool.
///
/// ```rust,ignore
/// let backend = HttpTaskBackend::new(BackendConfig::default())?;
/// let status = backend.check(42).await?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpTaskBackend {
    inner: Arc<HttpTaskBackendInner>,
}

impl HttpTaskBackend {
    /// Creates a client from configuration.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        tracing::debug!(
            target: TRACING_TARGET,
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            "Creating backend client"
        );

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpTaskBackendInner { http, config }),
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        route: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiEnvelope<T>, BackendError> {
        let started_at = Instant::now();
        let response = self.authorize(request).send().await.map_err(|err| {
            tracing::warn!(
                target: TRACING_TARGET,
                route,
                timeout = err.is_timeout(),
                connect = err.is_connect(),
                error = %err,
                "Backend request failed"
            );
            BackendError::from(err)
        })?;

        let status = response.status();
        let body = response.text().await?;
        let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::debug!(
            target: TRACING_TARGET,
            route,
            status = status.as_u16(),
            elapsed_ms,
            "Backend request completed"
        );

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        decode_envelope(&body)
    }

    async fn post_ack<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), BackendError> {
        let request = self.inner.http.post(self.url(path)).json(body);
        self.send::<serde_json::Value>(path, request)
            .await?
            .ensure_ok()
            .map(|_| ())
    }
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<ApiEnvelope<T>, BackendError> {
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskView, BackendError> {
        let mut builder = self.inner.http.post(self.url("/task/create")).json(request);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        self.send::<TaskView>("/task/create", builder)
            .await?
            .into_data("task.create")
    }

    async fn link_parse(&self, request: &LinkParseRequest) -> Result<(), BackendError> {
        self.post_ack("/task/linkParse", request).await
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<(), BackendError> {
        self.post_ack("/task/rewrite", request).await
    }

    async fn timbre_synthesis(
        &self,
        request: &TimbreSynthesisRequest,
    ) -> Result<(), BackendError> {
        self.post_ack("/task/timbreSynthesis", request).await
    }

    async fn video_synthesis(&self, request: &VideoSynthesisRequest) -> Result<(), BackendError> {
        self.post_ack("/task/videoSynthesis", request).await
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), BackendError> {
        self.post_ack("/task/publish", request).await
    }

    async fn check(&self, sub_task_id: i64) -> Result<CheckResponse, BackendError> {
        let request = self
            .inner
            .http
            .get(self.url("/task/check"))
            .query(&[("subTaskId", sub_task_id)]);
        self.send::<CheckResponse>("/task/check", request)
            .await?
            .into_data("task.check")
    }
}
