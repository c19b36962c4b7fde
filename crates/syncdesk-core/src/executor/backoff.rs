use std::time::Duration;

/// Delay before retry number `attempt` (0-based).
///
/// Exponential from `base`, capped at `max`, then spread by up to ±25%.
pub(crate) fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = base.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = raw.min(max.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

/// Delay for a retry, honoring a server-provided minimum wait.
pub(crate) fn retry_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let computed = backoff_delay(attempt, base, max);
    retry_after.map_or(computed, |floor| computed.max(floor))
}
