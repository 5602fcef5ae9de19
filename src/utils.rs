use chrono::DateTime;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if attempt >= config.max_attempts {
            warn!(
                max_attempts = config.max_attempts,
                error = %error,
                "Retry failed after exhausting all attempts"
            );
            return Err(error);
        }

        debug!(
            attempt,
            max_attempts = config.max_attempts,
            delay_ms,
            error = %error,
            "Attempt failed, backing off"
        );

        let jitter = rand::random_range(-0.1..=0.1);
        let jittered_delay = (delay_ms as f64 * (1.0 + jitter)) as u64;

        sleep(Duration::from_millis(jittered_delay)).await;

        delay_ms = delay_ms
            .saturating_mul(config.backoff_multiplier)
            .min(config.max_delay_ms);
    }
}

/// Renders an RFC 3339 timestamp as `Jan 02, 2006 at 3:04 PM`, keeping the
/// offset it was published with. Unparsable input is returned unchanged.
pub fn format_friendly_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.format("%b %d, %Y at %-I:%M %p").to_string(),
        Err(_) => raw.to_string(),
    }
}
