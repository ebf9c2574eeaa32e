//! Round-boundary price capture
//!
//! Start and end prices must come from a fresh read. Stale readings and
//! feed outages are retried with capped exponential backoff.

use crate::config::CaptureConfig;
use crate::feed::{PriceFeed, PricePoint};
use crate::telemetry::{increment_counter, CounterMetric};
use std::time::Duration;
use thiserror::Error;

/// Capture failure after bounded retries
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Price capture failed after {attempts} attempts: {last_error}")]
    PriceCaptureFailed { attempts: u32, last_error: String },
}

/// Retry policy for boundary captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl From<&CaptureConfig> for CapturePolicy {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Read a fresh price for a boundary capture.
///
/// Never returns a stale reading.
pub async fn capture_price(
    feed: &dyn PriceFeed,
    policy: &CapturePolicy,
) -> Result<PricePoint, CaptureError> {
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_backoff;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match feed.get_price().await {
            Ok(point) if !point.stale => return Ok(point),
            Ok(point) => {
                last_error = format!("stale price {} from {}", point.price, point.source);
            }
            Err(e) => {
                last_error = e.to_string();
            }
        }

        if attempt == attempts {
            break;
        }

        increment_counter(CounterMetric::CaptureRetry);
        tracing::warn!(
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            reason = %last_error,
            "Boundary capture rejected, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(policy.max_backoff);
    }

    Err(CaptureError::PriceCaptureFailed {
        attempts,
        last_error,
    })
}
