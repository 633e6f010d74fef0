//! Publishing account authorization signal.
//!
//! The QR-code hand-off itself lives outside this crate; it reports
//! completion through [`AuthorizationState::mark_authorized`].

use tokio::sync::watch;

/// Source of the "account authorized" signal consulted before publishing.
pub trait AuthorizationSignal: Send + Sync {
    /// Returns true once the publishing account has been authorized.
    fn is_authorized(&self) -> bool;
}

/// Authorization flag with change notification.
#[derive(Debug)]
pub struct AuthorizationState {
    tx: watch::Sender<bool>,
}

impl AuthorizationState {
    /// Creates an unauthorized state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Creates an already-authorized state.
    #[must_use]
    pub fn authorized() -> Self {
        let state = Self::new();
        state.mark_authorized();
        state
    }

    /// Records that the account scan completed.
    pub fn mark_authorized(&self) {
        self.tx.send_replace(true);
        tracing::info!(target: "castflow::auth", "Publishing account authorized");
    }

    /// Revokes the authorization.
    pub fn revoke(&self) {
        self.tx.send_replace(false);
    }

    /// Subscribes to authorization changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Waits until the account is authorized.
    pub async fn wait_authorized(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|authorized| *authorized).await;
    }
}

impl Default for AuthorizationState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationSignal for AuthorizationState {
    fn is_authorized(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_default_unauthorized() {
        let state = AuthorizationState::new();
        assert!(!state.is_authorized());
        state.mark_authorized();
        assert!(state.is_authorized());
        state.revoke();
        assert!(!state.is_authorized());
    }

    #[tokio::test]
    async fn test_wait_authorized() {
        let state = Arc::new(AuthorizationState::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait_authorized().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        state.mark_authorized();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_sees_change() {
        let state = AuthorizationState::new();
        let mut rx = state.subscribe();
        state.mark_authorized();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
