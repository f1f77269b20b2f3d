//! Epoch timestamp helpers for publish stamping.

use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
fn clock_realtime() -> (u64, u64) {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs(), d.subsec_nanos() as u64)
}

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    let (sec, nsec) = clock_realtime();
    sec * 1_000_000 + nsec / 1_000
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    let (sec, nsec) = clock_realtime();
    sec * 1_000 + nsec / 1_000_000
}
