//! Status producers
//!
//! - **chrony**: polled once per tick through `chronyc`
//! - **gpsd**: consumed as a long-lived JSON stream

mod chrony;
mod gpsd;

use std::time::Duration;

pub use chrony::{parse_chrony_output, parse_source, parse_tracking, ChronySource, DEFAULT_CHRONYC};
pub use gpsd::{handle_report, GpsdHandle, GpsdSource, DEFAULT_GPSD_HOST, DEFAULT_GPSD_PORT};

/// Calculate exponential backoff delay for reconnect attempts
///
/// # Arguments
/// * `attempt` - Current retry attempt number (0-indexed)
/// * `base` - Delay of the first attempt
/// * `max` - Maximum delay cap
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    // Exponential: base * 2^attempt, capped at max
    let factor = 2_u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(max)
}
