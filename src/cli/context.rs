//! Service wiring shared by the subcommands

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StoreBackend};
use crate::feed::{build_feed, PriceFeed};
use crate::ledger::BetLedger;
use crate::query::RoundQueries;
use crate::round::{CapturePolicy, RoundSchedule, RoundScheduler};
use crate::settlement::SettlementEngine;
use crate::store::{open_store, RoundStore};
use anyhow::{bail, Context};
use std::sync::Arc;

/// Every component of the round lifecycle, built from one configuration
pub struct Services {
    pub store: Arc<dyn RoundStore>,
    pub feed: Arc<dyn PriceFeed>,
    pub clock: Arc<dyn Clock>,
    pub schedule: RoundSchedule,
    pub engine: Arc<SettlementEngine>,
    pub ledger: BetLedger,
    pub queries: RoundQueries,
    pub scheduler: RoundScheduler,
}

impl Services {
    /// Services for a command that reads or writes rounds driven by a
    /// separate `run` process.
    ///
    /// A memory store would start empty here, so only a shared backend is
    /// accepted.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        if config.store.backend == StoreBackend::Memory {
            bail!(
                "store.backend = \"memory\" is private to one process; \
                 set store.backend = \"sqlite\" and store.path to share rounds with `run`"
            );
        }
        Self::build(config)
    }

    pub fn build(config: &Config) -> anyhow::Result<Self> {
        let schedule = config
            .schedule
            .round_schedule()
            .context("round duration must be positive")?;
        let store = open_store(&config.store).context("Failed to open round store")?;
        let feed: Arc<dyn PriceFeed> =
            Arc::new(build_feed(&config.feed).context("Failed to build price feed")?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let capture = CapturePolicy::from(&config.capture);

        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            feed.clone(),
            clock.clone(),
            capture,
            config.store.max_retries,
        ));
        let ledger = BetLedger::new(store.clone(), clock.clone(), config.store.max_retries);
        let queries = RoundQueries::new(store.clone(), clock.clone(), schedule);
        let scheduler = RoundScheduler::new(
            store.clone(),
            feed.clone(),
            engine.clone(),
            clock.clone(),
            schedule,
            capture,
        )
        .with_lookahead(config.schedule.lookahead_rounds)
        .with_retention(config.store.retain_settled);

        Ok(Self {
            store,
            feed,
            clock,
            schedule,
            engine,
            ledger,
            queries,
            scheduler,
        })
    }
}
