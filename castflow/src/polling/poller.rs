//! Drives one sub-task to a terminal status.

use super::{Clock, PollConfig, PollState};
use crate::backend::{RemoteStatus, TaskBackend};
use crate::cancellation::CancellationToken;
use crate::core::{StageOutcome, StageResult, SubTaskStatus};
use crate::errors::PollError;
use std::sync::Arc;
use tokio::sync::Notify;

/// Tracing target for polling.
pub const TRACING_TARGET: &str = "castflow::polling";

/// Control handle for one polling loop.
///
/// Clones share the same refresh signal and cancellation token.
#[derive(Debug, Clone, Default)]
pub struct PollHandle {
    refresh: Arc<Notify>,
    token: Arc<CancellationToken>,
}

impl PollHandle {
    /// Creates a handle for a new polling loop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces one immediate poll outside the schedule.
    ///
    /// A refresh requested while a poll is in flight is kept and served next.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Stops scheduling polls; the loop resolves to [`StageOutcome::Canceled`].
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns whether the loop has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn canceled_outcome(&self) -> StageOutcome {
        StageOutcome::Canceled {
            reason: self
                .token
                .reason()
                .unwrap_or_else(|| "canceled".to_string()),
        }
    }
}

/// Receives progress from a polling loop.
pub trait PollObserver: Send + Sync {
    /// A poll returned a non-terminal status.
    fn on_status(&self, _sub_task_id: i64, _status: SubTaskStatus, _state: &PollState) {}

    /// A poll request failed; polling continues.
    fn on_poll_error(&self, _error: &PollError, _state: &PollState) {}
}

/// Observer that ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPollObserver;

impl PollObserver for NoOpPollObserver {}

enum Wake {
    Scheduled,
    Refresh,
    Cancelled,
}

/// Polls sub-task status with tiered intervals and error backoff.
pub struct StatusPoller {
    backend: Arc<dyn TaskBackend>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StatusPoller {
    /// Creates a poller.
    #[must_use]
    pub fn new(backend: Arc<dyn TaskBackend>, clock: Arc<dyn Clock>, config: PollConfig) -> Self {
        Self {
            backend,
            clock,
            config,
        }
    }

    /// Returns the poll configuration.
    #[must_use]
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls until the sub-task is terminal, cancelled, or a configured
    /// ceiling is reached.
    ///
    /// Failed status requests widen the interval and are reported to the
    /// observer; they end the loop only through `max_consecutive_errors`.
    pub async fn poll_until_terminal(
        &self,
        sub_task_id: i64,
        handle: &PollHandle,
        observer: &dyn PollObserver,
    ) -> Result<StageOutcome, PollError> {
        let started = self.clock.now();
        let mut state = PollState::new(&self.config);

        loop {
            let wake = if handle.is_cancelled() {
                Wake::Cancelled
            } else {
                tokio::select! {
                    biased;
                    () = handle.token.cancelled() => Wake::Cancelled,
                    () = handle.refresh.notified() => Wake::Refresh,
                    () = self.clock.sleep(state.interval) => Wake::Scheduled,
                }
            };

            if matches!(wake, Wake::Cancelled) || handle.is_cancelled() {
                tracing::debug!(target: TRACING_TARGET, sub_task_id, "Polling cancelled");
                return Ok(handle.canceled_outcome());
            }
            let scheduled = matches!(wake, Wake::Scheduled);

            let response = self.backend.check(sub_task_id).await;
            if handle.is_cancelled() {
                tracing::debug!(
                    target: TRACING_TARGET,
                    sub_task_id,
                    "Discarding poll result after cancellation"
                );
                return Ok(handle.canceled_outcome());
            }
            let elapsed = self.clock.now().saturating_sub(started);

            match response {
                Ok(check) => match check.status {
                    RemoteStatus::Success => {
                        tracing::debug!(target: TRACING_TARGET, sub_task_id, "Sub-task succeeded");
                        return Ok(StageOutcome::Success(StageResult::from_raw(
                            check.raw_payload(),
                        )));
                    }
                    RemoteStatus::Failed => {
                        let message = check.failure_message();
                        tracing::debug!(target: TRACING_TARGET, sub_task_id, %message, "Sub-task failed");
                        return Ok(StageOutcome::Failed { message });
                    }
                    RemoteStatus::Canceled => {
                        return Ok(StageOutcome::Canceled {
                            reason: check
                                .message
                                .unwrap_or_else(|| "canceled by backend".to_string()),
                        });
                    }
                    status @ (RemoteStatus::None | RemoteStatus::Pending | RemoteStatus::Running) => {
                        if scheduled {
                            state.on_pending(&self.config, elapsed);
                        } else {
                            state.on_forced(false);
                        }
                        tracing::trace!(
                            target: TRACING_TARGET,
                            sub_task_id,
                            ?status,
                            attempt = state.attempt,
                            interval_ms = u64::try_from(state.interval.as_millis()).unwrap_or(u64::MAX),
                            "Sub-task not finished"
                        );
                        observer.on_status(sub_task_id, status.into(), &state);
                        if let Some(err) = state.exceeded(&self.config, sub_task_id, "") {
                            return Err(err);
                        }
                    }
                },
                Err(source) => {
                    if scheduled {
                        state.on_error(&self.config, elapsed);
                    } else {
                        state.on_forced(true);
                    }
                    let last_error = source.to_string();
                    tracing::warn!(
                        target: TRACING_TARGET,
                        sub_task_id,
                        error = %last_error,
                        consecutive_errors = state.consecutive_errors,
                        interval_ms = u64::try_from(state.interval.as_millis()).unwrap_or(u64::MAX),
                        "Status check failed, backing off"
                    );
                    observer.on_poll_error(
                        &PollError::Transient {
                            sub_task_id,
                            source,
                        },
                        &state,
                    );
                    if let Some(err) = state.exceeded(&self.config, sub_task_id, &last_error) {
                        return Err(err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CheckResponse, MockTaskBackend};
    use crate::errors::BackendError;
    use crate::testing::VirtualClock;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn scripted(responses: Vec<Result<CheckResponse, BackendError>>) -> Arc<dyn TaskBackend> {
        let queue = Mutex::new(VecDeque::from(responses));
        let mut mock = MockTaskBackend::new();
        mock.expect_check().returning(move |_| {
            queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(CheckResponse::status(RemoteStatus::Running)))
        });
        Arc::new(mock)
    }

    fn poller(backend: Arc<dyn TaskBackend>, clock: &Arc<VirtualClock>, config: PollConfig) -> StatusPoller {
        StatusPoller::new(backend, clock.clone(), config)
    }

    #[derive(Default)]
    struct RecordingObserver {
        errors: Mutex<Vec<String>>,
        statuses: Mutex<Vec<SubTaskStatus>>,
    }

    impl PollObserver for RecordingObserver {
        fn on_status(&self, _sub_task_id: i64, status: SubTaskStatus, _state: &PollState) {
            self.statuses.lock().push(status);
        }

        fn on_poll_error(&self, error: &PollError, _state: &PollState) {
            self.errors.lock().push(error.to_string());
        }
    }

    #[tokio::test]
    async fn test_success_after_pending() {
        let backend = scripted(vec![
            Ok(CheckResponse::status(RemoteStatus::Pending)),
            Ok(CheckResponse::status(RemoteStatus::Running)),
            Ok(CheckResponse::success("今天天气不错", None)),
        ]);
        let clock = Arc::new(VirtualClock::new());
        let observer = RecordingObserver::default();
        let outcome = poller(backend, &clock, PollConfig::default())
            .poll_until_terminal(7, &PollHandle::new(), &observer)
            .await
            .unwrap();

        let StageOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.raw_payload, "今天天气不错");
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(2000); 3]);
        assert_eq!(
            *observer.statuses.lock(),
            vec![SubTaskStatus::Pending, SubTaskStatus::Running]
        );
    }

    #[tokio::test]
    async fn test_failed_message_verbatim() {
        let backend = scripted(vec![Ok(CheckResponse::failed("资源不存在"))]);
        let clock = Arc::new(VirtualClock::new());
        let outcome = poller(backend, &clock, PollConfig::default())
            .poll_until_terminal(7, &PollHandle::new(), &NoOpPollObserver)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Failed {
                message: "资源不存在".into()
            }
        );
    }

    #[tokio::test]
    async fn test_errors_back_off_and_continue() {
        let backend = scripted(vec![
            Err(BackendError::Other("connection reset".into())),
            Err(BackendError::Other("connection reset".into())),
            Ok(CheckResponse::status(RemoteStatus::Running)),
            Ok(CheckResponse::success("/audio/a.wav", Some(42))),
        ]);
        let clock = Arc::new(VirtualClock::new());
        let observer = RecordingObserver::default();
        let outcome = poller(backend, &clock, PollConfig::default())
            .poll_until_terminal(3, &PollHandle::new(), &observer)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(observer.errors.lock().len(), 2);
        let sleeps: Vec<u128> = clock.sleeps().iter().map(Duration::as_millis).collect();
        assert_eq!(sleeps, vec![2000, 3000, 4500, 4500]);
    }

    #[tokio::test]
    async fn test_tiers_widen_interval() {
        let clock = Arc::new(VirtualClock::new());
        let backend = scripted(Vec::new());
        let config = PollConfig::default().with_max_wait_ms(90_000);
        let err = poller(backend, &clock, config)
            .poll_until_terminal(1, &PollHandle::new(), &NoOpPollObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Exhausted { .. }));

        let sleeps = clock.sleeps();
        assert!(sleeps.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(sleeps.first(), Some(&Duration::from_millis(2000)));
        assert_eq!(sleeps.last(), Some(&Duration::from_millis(5000)));
        assert!(sleeps.contains(&Duration::from_millis(3000)));
    }

    #[tokio::test]
    async fn test_too_many_errors() {
        let backend = scripted(
            (0..5)
                .map(|_| Err(BackendError::Other("down".into())))
                .collect(),
        );
        let clock = Arc::new(VirtualClock::new());
        let config = PollConfig::default().with_max_consecutive_errors(3);
        let err = poller(backend, &clock, config)
            .poll_until_terminal(1, &PollHandle::new(), &NoOpPollObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::TooManyErrors { errors: 3, .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_first_poll() {
        let mut mock = MockTaskBackend::new();
        mock.expect_check().never();
        let clock = Arc::new(VirtualClock::new());
        let handle = PollHandle::new();
        handle.cancel("user stop");

        let outcome = poller(Arc::new(mock), &clock, PollConfig::default())
            .poll_until_terminal(1, &handle, &NoOpPollObserver)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Canceled {
                reason: "user stop".into()
            }
        );
    }

    #[tokio::test]
    async fn test_in_flight_result_discarded_after_cancel() {
        let handle = PollHandle::new();
        let cancel_handle = handle.clone();
        let mut mock = MockTaskBackend::new();
        mock.expect_check().times(1).returning(move |_| {
            cancel_handle.cancel("late cancel");
            Ok(CheckResponse::success("done", None))
        });
        let clock = Arc::new(VirtualClock::new());

        let outcome = poller(Arc::new(mock), &clock, PollConfig::default())
            .poll_until_terminal(1, &handle, &NoOpPollObserver)
            .await
            .unwrap();
        assert!(matches!(outcome, StageOutcome::Canceled { .. }));
    }

    #[tokio::test]
    async fn test_remote_cancel() {
        let backend = scripted(vec![Ok(CheckResponse::status(RemoteStatus::Canceled))]);
        let clock = Arc::new(VirtualClock::new());
        let outcome = poller(backend, &clock, PollConfig::default())
            .poll_until_terminal(1, &PollHandle::new(), &NoOpPollObserver)
            .await
            .unwrap();
        assert!(matches!(outcome, StageOutcome::Canceled { .. }));
    }

    #[tokio::test]
    async fn test_refresh_polls_without_touching_backoff() {
        let backend = scripted(vec![
            Ok(CheckResponse::status(RemoteStatus::Running)),
            Ok(CheckResponse::success("ok", None)),
        ]);
        let clock = Arc::new(VirtualClock::new());
        let handle = PollHandle::new();
        handle.refresh();

        let outcome = poller(backend, &clock, PollConfig::default())
            .poll_until_terminal(1, &handle, &NoOpPollObserver)
            .await
            .unwrap();
        assert!(outcome.is_success());
        // The forced poll did not sleep; the scheduled one kept the initial interval.
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(2000)]);
    }

    #[tokio::test]
    async fn test_failed_refreshes_count_toward_error_ceiling() {
        let backend = scripted(vec![
            Err(BackendError::Other("down".into())),
            Err(BackendError::Other("down".into())),
        ]);
        let clock = Arc::new(VirtualClock::new());
        let handle = PollHandle::new();
        let observer = RecordingObserver::default();
        let config = PollConfig::default().with_max_consecutive_errors(2);
        let poller = poller(backend, &clock, config);

        let mut polling = tokio_test::task::spawn(poller.poll_until_terminal(1, &handle, &observer));
        handle.refresh();
        tokio_test::assert_pending!(polling.poll());
        handle.refresh();

        let err = tokio_test::assert_ready!(polling.poll()).unwrap_err();
        assert!(matches!(err, PollError::TooManyErrors { errors: 2, .. }));
        assert_eq!(observer.errors.lock().len(), 2);
        // Forced polls never widen the schedule.
        assert!(clock.sleeps().iter().all(|d| *d == Duration::from_millis(2000)));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_skips_the_check() {
        let mut mock = MockTaskBackend::new();
        mock.expect_check().never();
        let clock = Arc::new(VirtualClock::new());
        let poller = poller(Arc::new(mock), &clock, PollConfig::default());
        let handle = PollHandle::new();

        let mut polling =
            tokio_test::task::spawn(poller.poll_until_terminal(1, &handle, &NoOpPollObserver));
        tokio_test::assert_pending!(polling.poll());
        handle.cancel("user abort");

        let outcome = tokio_test::assert_ready!(polling.poll()).unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Canceled {
                reason: "user abort".to_string()
            }
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(2000)]);
    }
}
