//! Virtual clock for deterministic timing tests.

use crate::polling::Clock;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// A [`Clock`] whose sleeps complete at once and advance virtual time.
///
/// Each sleep is recorded and yields to the scheduler once, so other tasks
/// still interleave with the sleeper.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    /// Creates a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every requested sleep in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Returns the sum of all requested sleeps.
    #[must_use]
    pub fn slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }

    /// Moves virtual time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
