//! Run command implementation

use super::context::Services;
use crate::config::Config;
use crate::feed::spawn_poller;
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip the background price poller
    #[arg(long)]
    pub no_poller: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let services = Services::build(config)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if !self.no_poller {
            let mut prices = spawn_poller(
                services.feed.clone(),
                Duration::from_millis(config.feed.poll_interval_ms),
            );
            tokio::spawn(async move {
                while prices.changed().await.is_ok() {
                    let Some(point) = prices.borrow_and_update().clone() else {
                        continue;
                    };
                    tracing::debug!(
                        price = %point.price,
                        source = %point.source,
                        stale = point.stale,
                        "Price update"
                    );
                }
            });
        }

        tracing::info!(
            anchor = %config.schedule.epoch_anchor,
            round_duration_secs = config.schedule.round_duration_secs,
            backend = ?config.store.backend,
            "Starting round service"
        );

        let tick_interval = Duration::from_millis(config.schedule.tick_interval_ms);
        let scheduler = tokio::spawn(async move {
            services.scheduler.run(tick_interval, shutdown_rx).await;
        });

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");
        if shutdown_tx.send(true).is_err() {
            tracing::debug!("Scheduler already stopped before shutdown signal");
        }
        scheduler.await?;

        Ok(())
    }
}
