use rand::Rng;
use std::time::Duration;

/// Exponential backoff: `initial * 2^attempt`, capped at `max`
///
/// `attempt` is the 0-based retry number.
pub(crate) fn retry_delay(attempt: usize, initial: Duration, max: Duration) -> Duration {
    let initial_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let factor = u32::try_from(attempt)
        .ok()
        .and_then(|exp| 2u64.checked_pow(exp))
        .unwrap_or(u64::MAX);
    Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
}

/// [`retry_delay`] with equal jitter, uniform in `[d/2, d]`
pub(crate) fn jittered_delay(attempt: usize, initial: Duration, max: Duration) -> Duration {
    let ceiling = retry_delay(attempt, initial, max);
    let floor = ceiling / 2;
    let spread = u64::try_from((ceiling - floor).as_micros()).unwrap_or(u64::MAX);
    floor + Duration::from_micros(rand::thread_rng().gen_range(0..=spread))
}
