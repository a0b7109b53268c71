//! Injectable time source.
//!
//! Every component that reasons about deadlines takes an `Arc<dyn Clock>`
//! instead of reading the system clock directly, so tests can drive expiry
//! and grace-window logic with a `ManualClock` without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds-since-epoch time source.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u128;
}

/// Clock backed by the OS wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u128 {
        now_ms()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Convert whole minutes to milliseconds.
pub const fn minutes_to_ms(minutes: u32) -> u128 {
    minutes as u128 * 60_000
}

/// Manually advanced clock for tests and simulations.
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given millisecond timestamp.
    pub fn new(start_ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(start_ms),
        }
    }

    /// Jump to an absolute millisecond timestamp.
    pub fn set_ms(&self, ms: u64) {
        self.ms.store(ms, Ordering::Release);
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.ms.fetch_add(millis, Ordering::AcqRel);
    }

    /// Advance the clock by whole minutes.
    pub fn advance_minutes(&self, minutes: u32) {
        self.advance(Duration::from_secs(u64::from(minutes) * 60));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u128 {
        u128::from(self.ms.load(Ordering::Acquire))
    }
}
