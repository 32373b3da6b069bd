//! Shared trait abstractions

use std::time::{Duration, Instant};

/// Retry bookkeeping for anything that reconnects or refetches after a failure.
pub trait RetryLogic {
    fn should_retry(
        &self,
        now: Instant,
        max_retries: u32,
        retry_delay_ms: u64,
        exponential_backoff: bool,
    ) -> bool;
    fn get_retry_count(&self) -> u32;
    fn get_last_retry_time(&self) -> Option<Instant>;
}

/// Delay before attempt number `retry_count + 1`.
pub fn retry_delay(retry_count: u32, retry_delay_ms: u64, exponential_backoff: bool) -> Duration {
    let delay_multiplier = if exponential_backoff {
        2_u64.saturating_pow(retry_count)
    } else {
        1
    };
    Duration::from_millis(retry_delay_ms.saturating_mul(delay_multiplier))
}

/// Standard retry logic implementation
pub fn should_retry_with_backoff(
    retry_count: u32,
    last_retry_time: Option<Instant>,
    now: Instant,
    max_retries: u32,
    retry_delay_ms: u64,
    exponential_backoff: bool,
) -> bool {
    if retry_count >= max_retries {
        return false;
    }

    if let Some(last_retry) = last_retry_time {
        let required_delay = retry_delay(retry_count, retry_delay_ms, exponential_backoff);
        now.saturating_duration_since(last_retry) >= required_delay
    } else {
        true
    }
}
