//! Periodic price polling

use super::{PriceFeed, PricePoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Poll `feed` every `interval` and publish the latest reading.
///
/// The receiver holds `None` until the first successful read. The task stops
/// once every receiver is dropped.
pub fn spawn_poller(
    feed: Arc<dyn PriceFeed>,
    interval: Duration,
) -> watch::Receiver<Option<PricePoint>> {
    let (tx, rx) = watch::channel(None);

    tokio::spawn(async move {
        run_poll_loop(feed, interval, tx).await;
    });

    rx
}

async fn run_poll_loop(
    feed: Arc<dyn PriceFeed>,
    interval: Duration,
    tx: watch::Sender<Option<PricePoint>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            tracing::debug!("Price receivers dropped, stopping poller");
            break;
        }

        match feed.get_price().await {
            Ok(point) => {
                if tx.send(Some(point)).is_err() {
                    tracing::debug!("Price receivers dropped, stopping poller");
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Price poll failed"),
        }
    }
}
