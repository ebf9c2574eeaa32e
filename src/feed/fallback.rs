//! Ordered-fallback price adapter

use super::{FeedError, PriceFeed, PricePoint, PriceSource};
use crate::telemetry::{increment_counter, set_gauge, CounterMetric, GaugeMetric};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;

/// Tries each source in order and falls back to the last-known-good
/// reading (flagged stale) when all of them fail.
pub struct FallbackFeed {
    sources: Vec<Box<dyn PriceSource>>,
    last_good: Mutex<Option<PricePoint>>,
}

impl FallbackFeed {
    /// Create an adapter over sources in priority order
    pub fn new(sources: Vec<Box<dyn PriceSource>>) -> Self {
        Self {
            sources,
            last_good: Mutex::new(None),
        }
    }

    /// Names of the configured sources, in priority order
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Last fresh reading, if any source has ever answered
    pub fn last_good(&self) -> Option<PricePoint> {
        self.last_good.lock().clone()
    }
}

#[async_trait]
impl PriceFeed for FallbackFeed {
    async fn get_price(&self) -> Result<PricePoint, FeedError> {
        for source in &self.sources {
            match source.fetch().await {
                Ok(price) if price.is_sign_positive() && !price.is_zero() => {
                    let point = PricePoint::fresh(price, source.name());
                    *self.last_good.lock() = Some(point.clone());
                    if let Some(p) = price.to_f64() {
                        set_gauge(GaugeMetric::LastPrice, p);
                    }
                    return Ok(point);
                }
                Ok(price) => {
                    increment_counter(CounterMetric::FeedSourceError(source.name().to_string()));
                    tracing::warn!(
                        source = source.name(),
                        %price,
                        "Source returned non-positive price, trying next"
                    );
                }
                Err(e) => {
                    increment_counter(CounterMetric::FeedSourceError(source.name().to_string()));
                    tracing::warn!(
                        source = source.name(),
                        error = %e,
                        "Price source failed, trying next"
                    );
                }
            }
        }

        match self.last_good() {
            Some(point) => {
                tracing::warn!(
                    price = %point.price,
                    source = %point.source,
                    "All price sources failed, serving last-known-good as stale"
                );
                Ok(point.into_stale())
            }
            None => Err(FeedError::FeedUnavailable {
                sources: self.sources.len(),
            }),
        }
    }
}
