//! CoinGecko simple-price source

use super::{PriceSource, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// CoinGecko REST base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com";

/// Body shape: `{"ripple": {"usd": 0.625}}`
type SimplePriceResponse = HashMap<String, HashMap<String, serde_json::Number>>;

/// Spot USD price from the CoinGecko simple-price endpoint
pub struct CoinGeckoSource {
    base_url: String,
    coin_id: String,
    client: Client,
}

impl CoinGeckoSource {
    /// Create a source for a CoinGecko coin id (e.g. "ripple")
    pub fn new(
        base_url: impl Into<String>,
        coin_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            coin_id: coin_id.into().to_lowercase(),
            client,
        })
    }

    fn price_url(&self) -> String {
        format!("{}/api/v3/simple/price", self.base_url)
    }

    fn parse_price(coin_id: &str, body: &str) -> Result<Decimal, SourceError> {
        let response: SimplePriceResponse =
            serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;

        let usd = response
            .get(coin_id)
            .and_then(|quotes| quotes.get("usd"))
            .ok_or_else(|| SourceError::Parse(format!("no usd quote for {}", coin_id)))?;

        Decimal::from_str(&usd.to_string())
            .or_else(|_| Decimal::from_scientific(&usd.to_string()))
            .map_err(|e| SourceError::Parse(format!("price {}: {}", usd, e)))
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch(&self) -> Result<Decimal, SourceError> {
        let response = self
            .client
            .get(self.price_url())
            .query(&[
                ("ids", self.coin_id.as_str()),
                ("vs_currencies", "usd"),
                ("precision", "full"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        let body = response.text().await?;
        Self::parse_price(&self.coin_id, &body)
    }
}
