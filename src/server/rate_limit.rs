//! Request admission control.
//!
//! A single process-wide GCRA limiter admits requests at a sustained
//! per-second rate with a configurable burst allowance. The limiter is
//! untyped by client identity; this gateway throttles the process as a
//! whole, not per caller.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Process-wide GCRA limiter.
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Build the limiter from the configured rate and burst.
///
/// A rate of zero disables throttling entirely. Burst is floored at one;
/// GCRA needs at least one cell of capacity.
pub fn build_limiter(rate: u32, burst: u32) -> Option<Arc<GlobalRateLimiter>> {
    let rate = NonZeroU32::new(rate)?;
    let burst = NonZeroU32::new(burst.max(1))?;
    let quota = Quota::per_second(rate).allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Check admission. On rejection returns the wait until the next cell
/// would be admitted, for the Retry-After header.
pub fn check(limiter: &GlobalRateLimiter) -> Result<(), Duration> {
    limiter
        .check()
        .map_err(|denied| denied.wait_time_from(DefaultClock::default().now()))
}

// =============================================================================
// Tests
// =============================================================================
