//! Environment abstraction for deterministic testing.
//!
//! Decouples drivers from system resources (time, randomness). The state
//! machines in this crate never call it; drivers use it for think time,
//! critical section hold time and anything else that must be reproducible
//! under simulation.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// Implementations MUST guarantee that `now()` never goes backwards, and that
/// a simulation environment seeded identically produces identical random
/// sequences.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`, simulation uses virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; protocol logic never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Uniformly random duration in `[min, max]`, at millisecond resolution.
    ///
    /// Returns `min` when the range is empty.
    fn random_duration(&self, min: Duration, max: Duration) -> Duration {
        let lo = min.as_millis() as u64;
        let hi = max.as_millis() as u64;
        if hi <= lo {
            return min;
        }
        let span = hi - lo + 1;
        Duration::from_millis(lo + self.random_u64() % span)
    }
}
