//! Binance REST ticker source

use super::{PriceSource, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Binance REST base URL
pub const BINANCE_API_URL: &str = "https://api.binance.com";

/// Binance `/api/v3/ticker/price` response
#[derive(Debug, Deserialize)]
struct BinanceTicker {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// Spot price from the Binance ticker endpoint
pub struct BinanceSource {
    base_url: String,
    symbol: String,
    client: Client,
}

impl BinanceSource {
    /// Create a source for `symbol` (e.g. "XRPUSDT")
    pub fn new(
        base_url: impl Into<String>,
        symbol: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol: symbol.into().to_uppercase(),
            client,
        })
    }

    fn ticker_url(&self) -> String {
        format!("{}/api/v3/ticker/price", self.base_url)
    }

    /// Parse a ticker body into a price
    fn parse_ticker(body: &str) -> Result<Decimal, SourceError> {
        let ticker: BinanceTicker =
            serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;
        Decimal::from_str(&ticker.price)
            .map_err(|e| SourceError::Parse(format!("price {:?}: {}", ticker.price, e)))
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch(&self) -> Result<Decimal, SourceError> {
        let response = self
            .client
            .get(self.ticker_url())
            .query(&[("symbol", self.symbol.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        let body = response.text().await?;
        Self::parse_ticker(&body)
    }
}
