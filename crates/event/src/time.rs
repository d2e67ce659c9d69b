//! Monotonic clock source for timer math.

use std::time::Duration;

use rustix::time::{ClockId, clock_gettime};

/// Nanoseconds on the monotonic clock. Immune to wall-clock steps.
pub fn now_ns() -> u64 {
	let ts = clock_gettime(ClockId::Monotonic);
	ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Saturating conversion of a [`Duration`] to whole nanoseconds.
pub fn duration_ns(d: Duration) -> u64 {
	u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
