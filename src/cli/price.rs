//! Price command implementation

use crate::config::Config;
use crate::feed::{build_feed, spawn_poller, PriceFeed, PricePoint};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct PriceArgs {
    /// Number of readings to show; more than one follows the poller
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u32,
}

fn print_point(symbol: &str, point: &PricePoint) {
    println!(
        "{} {} from {} at {}{}",
        symbol,
        point.price,
        point.source,
        point.timestamp.to_rfc3339(),
        if point.stale { " (stale)" } else { "" }
    );
}

impl PriceArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let feed = build_feed(&config.feed)?;

        // first read is direct so an unreachable feed fails instead of waiting
        let point = feed.get_price().await?;
        print_point(&config.feed.symbol, &point);
        if self.count <= 1 {
            return Ok(());
        }

        let feed: Arc<dyn PriceFeed> = Arc::new(feed);
        let mut prices = spawn_poller(feed, Duration::from_millis(config.feed.poll_interval_ms));
        let mut shown = 1;
        while shown < self.count {
            prices.changed().await?;
            if let Some(point) = prices.borrow_and_update().clone() {
                print_point(&config.feed.symbol, &point);
                shown += 1;
            }
        }
        Ok(())
    }
}
