//! Fixed post-call delay for remote requests.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};

/// Serialises requests and sleeps a fixed interval after each one.
///
/// A single-permit [`Semaphore`] keeps calls one at a time; the permit is
/// held through the pause so the next call starts only after it.
#[derive(Debug, Clone)]
pub struct Throttle {
    gate: Arc<Semaphore>,
    delay: Duration,
}

impl Throttle {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(1)),
            delay,
        }
    }

    /// A throttle that never waits (tests, local fixtures).
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `call`, then pause before releasing the slot.
    pub async fn run<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        // The gate is never closed, so a failed acquire only means no
        // serialisation for this call.
        let _permit = self.gate.acquire().await.ok();
        let out = call.await;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_delay_follows_each_call() {
        let throttle = Throttle::new(Duration::from_millis(20));
        let start = Instant::now();
        for _ in 0..3 {
            throttle.run(async {}).await;
        }
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_none_returns_value() {
        let throttle = Throttle::none();
        assert_eq!(throttle.run(async { 7 }).await, 7);
        assert!(throttle.delay().is_zero());
    }
}
