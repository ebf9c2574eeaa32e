//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A price reading from the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Spot price of the tracked pair
    pub price: Decimal,
    /// When the price was obtained from its upstream source
    pub timestamp: DateTime<Utc>,
    /// Name of the upstream source that produced the price
    pub source: String,
    /// Last-known-good reading substituted after every source failed
    pub stale: bool,
}

impl PricePoint {
    /// A fresh reading taken now
    pub fn fresh(price: Decimal, source: impl Into<String>) -> Self {
        Self {
            price,
            timestamp: Utc::now(),
            source: source.into(),
            stale: false,
        }
    }

    /// The same reading, flagged as not freshly obtained
    pub fn into_stale(self) -> Self {
        Self {
            stale: true,
            ..self
        }
    }
}

/// Failure of a single upstream source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure or timeout
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status code
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body did not contain a usable price
    #[error("Malformed response: {0}")]
    Parse(String),
    /// Zero or negative price
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),
}

/// Adapter-level failure
#[derive(Debug, Error)]
pub enum FeedError {
    /// Every configured source failed and no last-known-good price exists
    #[error("Price feed unavailable: all {sources} sources failed")]
    FeedUnavailable { sources: usize },
}
