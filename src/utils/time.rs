use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for the engine.
///
/// Everything that stamps or compares timestamps goes through this trait so
/// tests can drive a fake clock deterministically.
pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("System time is before Unix epoch")
            .as_millis() as i64
    }
}

/// Manually advanced clock for tests.
pub struct FakeClock {
    now: AtomicI64,
}

impl FakeClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn elapsed_millis(start: i64, end: i64) -> i64 {
    end - start
}

/// True when `timestamp` is older than `max_age_millis` as of `current_time`.
pub fn is_older_than(timestamp: i64, max_age_millis: i64, current_time: i64) -> bool {
    elapsed_millis(timestamp, current_time) > max_age_millis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_reasonable() {
        let ts = SystemClock.now_millis();
        // After 2020-01-01, before 2100-01-01
        assert!(ts > 1_577_836_800_000);
        assert!(ts < 4_102_444_800_000);
    }

    #[test]
    fn test_fake_clock_advance() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);

        clock.set(10_000);
        assert_eq!(clock.now_millis(), 10_000);
    }

    #[test]
    fn test_is_older_than() {
        let current = 100_000;

        // Recent timestamp, not expired
        assert!(!is_older_than(99_500, 1_000, current));

        // Old timestamp, expired
        assert!(is_older_than(90_000, 1_000, current));

        // Edge case: exactly at the boundary
        assert!(!is_older_than(99_000, 1_000, current));

        // Edge case: just over the boundary
        assert!(is_older_than(98_999, 1_000, current));
    }
}
