//! Production environment: wall-clock time and OS randomness.

use std::time::Duration;

use parley_core::Environment;

/// Production environment using system time and the OS RNG.
///
/// Behaviour is non-deterministic; use the harness `SimEnv` for reproducible
/// runs.
///
/// # Panics
///
/// Panics if the OS RNG fails. Think and hold times cannot be drawn without
/// it, and the failure indicates an OS-level problem.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_duration_stays_in_range() {
        let env = SystemEnv::new();
        let (min, max) = (Duration::from_millis(5), Duration::from_millis(20));
        for _ in 0..100 {
            let d = env.random_duration(min, max);
            assert!(d >= min && d <= max, "{d:?} outside range");
        }
    }

    #[tokio::test]
    async fn sleep_waits() {
        let env = SystemEnv::new();
        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;
        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
