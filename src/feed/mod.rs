//! Price feed module
//!
//! Normalizes spot quotes from several upstream HTTP sources into one
//! authoritative price stream with ordered fallback.

mod binance;
mod coingecko;
mod fallback;
mod poller;
mod types;

pub use binance::{BinanceSource, BINANCE_API_URL};
pub use coingecko::{CoinGeckoSource, COINGECKO_API_URL};
pub use fallback::FallbackFeed;
pub use poller::spawn_poller;
pub use types::{FeedError, PricePoint, SourceError};

use crate::config::FeedConfig;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

/// A single upstream market-data source
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short name used in logs and on price points
    fn name(&self) -> &str;
    /// Fetch the current spot price
    async fn fetch(&self) -> Result<Decimal, SourceError>;
}

/// The authoritative price stream consumed by the round lifecycle
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current price; stale only when every source failed
    async fn get_price(&self) -> Result<PricePoint, FeedError>;
}

/// Build the fallback adapter from configuration, sources in listed order
pub fn build_feed(config: &FeedConfig) -> Result<FallbackFeed, SourceError> {
    let timeout = Duration::from_millis(config.request_timeout_ms);
    let mut sources: Vec<Box<dyn PriceSource>> = Vec::with_capacity(config.sources.len());

    for name in &config.sources {
        match name.as_str() {
            "binance" => sources.push(Box::new(BinanceSource::new(
                &config.binance_url,
                &config.symbol,
                timeout,
            )?)),
            "coingecko" => sources.push(Box::new(CoinGeckoSource::new(
                &config.coingecko_url,
                &config.coingecko_id,
                timeout,
            )?)),
            other => tracing::warn!(source = other, "Ignoring unknown price source"),
        }
    }

    Ok(FallbackFeed::new(sources))
}
