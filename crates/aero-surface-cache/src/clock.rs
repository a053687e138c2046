//! Host monotonic time used to age cast views.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait HostClock {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// [`HostClock`] backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct StdHostClock {
    origin: Instant,
}

impl StdHostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdHostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for StdHostClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same time, so a test can keep one handle while the cache owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeHostClock {
    nanos: Arc<AtomicU64>,
}

impl FakeHostClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn set(&self, now: Duration) {
        let nanos = u64::try_from(now.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Relaxed);
    }
}

impl HostClock for FakeHostClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_clones_share_time() {
        let clock = FakeHostClock::new();
        let observer = clock.clone();
        clock.advance(Duration::from_secs(3));
        assert_eq!(observer.now(), Duration::from_secs(3));
        observer.set(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(10));
    }
}
