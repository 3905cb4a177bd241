use std::{
    ops::Sub,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Wall-clock instant, expressed as a duration since the Unix epoch.
///
/// Kept as a plain duration (rather than [`std::time::Instant`]) so a test
/// clock can construct arbitrary values without waiting on real time.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(pub Duration);

impl Instant {
    pub fn from_millis(millis: u64) -> Self {
        Instant(Duration::from_millis(millis))
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Instant) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl std::fmt::Debug for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instant").field(&self.0.as_millis()).finish()
    }
}

/// Source of "now" for staleness checks.
///
/// The core never reads [`SystemTime::now`] directly; every place that needs
/// "now" goes through a `Clock` so tests can advance time deterministically
/// instead of racing real delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default clock, backed by the system wall clock.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch");
        Instant(duration)
    }
}

pub(crate) fn default_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// How long until `updated_at` becomes stale under `stale_time`, zero if it
/// already is.
pub fn time_until_stale(updated_at: Instant, stale_time: Duration, now: Instant) -> Duration {
    let elapsed = now - updated_at;
    stale_time.saturating_sub(elapsed)
}

/// A clock an integration test can move forward by hand, instead of
/// sleeping real time to cross a staleness window.
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    pub struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        pub fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Instant::from_millis(0))))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            now.0 += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }
}
