//! Round scheduler
//!
//! A periodic tick re-derives the current round from the clock and
//! reconciles the store against it: expired rounds are settled in order,
//! the current round is opened and the lookahead window is pre-created.
//! Every step is a guarded store operation, so several schedulers may tick
//! against the same store.

use super::capture::{capture_price, CaptureError, CapturePolicy};
use super::schedule::RoundSchedule;
use super::types::{Direction, RoundNumber, RoundStatus, Token};
use crate::clock::Clock;
use crate::feed::PriceFeed;
use crate::settlement::{SettlementEngine, SettlementError};
use crate::store::{RoundStore, StoreError};
use crate::telemetry::{
    increment_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Default number of future rounds kept in Scheduled state
pub const DEFAULT_LOOKAHEAD: u64 = 6;

/// Default number of Settled rounds retained for history
pub const DEFAULT_RETAIN_SETTLED: usize = 100;

/// Failure of one reconcile pass. The next tick retries.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to open round {round_number}: {source}")]
    Open {
        round_number: RoundNumber,
        #[source]
        source: CaptureError,
    },
    #[error("Failed to settle round {round_number}: {source}")]
    Settle {
        round_number: RoundNumber,
        #[source]
        source: SettlementError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a tick changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Round containing the tick's timestamp, `None` before the epoch anchor
    pub current_round: Option<RoundNumber>,
    pub created: Vec<RoundNumber>,
    pub opened: Vec<RoundNumber>,
    /// Rounds this tick settled, in the order it settled them
    pub settled: Vec<RoundNumber>,
    pub pruned: usize,
}

impl TickReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.opened.is_empty()
            && self.settled.is_empty()
            && self.pruned == 0
    }
}

/// Drives rounds through `Scheduled -> Live -> Settled`
pub struct RoundScheduler {
    store: Arc<dyn RoundStore>,
    feed: Arc<dyn PriceFeed>,
    engine: Arc<SettlementEngine>,
    clock: Arc<dyn Clock>,
    schedule: RoundSchedule,
    capture: CapturePolicy,
    lookahead: u64,
    retain_settled: usize,
}

impl RoundScheduler {
    pub fn new(
        store: Arc<dyn RoundStore>,
        feed: Arc<dyn PriceFeed>,
        engine: Arc<SettlementEngine>,
        clock: Arc<dyn Clock>,
        schedule: RoundSchedule,
        capture: CapturePolicy,
    ) -> Self {
        Self {
            store,
            feed,
            engine,
            clock,
            schedule,
            capture,
            lookahead: DEFAULT_LOOKAHEAD,
            retain_settled: DEFAULT_RETAIN_SETTLED,
        }
    }

    /// Number of future rounds to pre-create
    pub fn with_lookahead(mut self, lookahead: u64) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Number of Settled rounds kept before pruning
    pub fn with_retention(mut self, retain_settled: usize) -> Self {
        self.retain_settled = retain_settled;
        self
    }

    pub fn schedule(&self) -> &RoundSchedule {
        &self.schedule
    }

    /// One reconcile pass.
    ///
    /// Expired rounds are settled oldest first. The pass stops at the first
    /// round that cannot be settled so that no later round settles before it.
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        let started = Instant::now();
        let now = self.clock.now_ms();
        let mut report = TickReport::default();

        let Some(current) = self.schedule.round_at(now) else {
            tracing::debug!(now, "Clock is before the epoch anchor, nothing to schedule");
            return Ok(report);
        };
        report.current_round = Some(current);

        for round in self.store.unsettled_before(current).await? {
            let n = round.round_number;
            if round.status == RoundStatus::Scheduled {
                tracing::info!(round = n, "Opening missed round before settling it");
                self.open(n, &mut report).await?;
            }

            match self.engine.settle_round(n).await {
                Ok(outcome) if outcome.is_already_settled() => {}
                Ok(_) => report.settled.push(n),
                Err(source) => {
                    return Err(SchedulerError::Settle {
                        round_number: n,
                        source,
                    })
                }
            }
        }

        self.ensure_rounds(current, current + self.lookahead, &mut report)
            .await?;

        if let Some(round) = self.store.get_round(current).await? {
            if round.status == RoundStatus::Scheduled {
                self.open(current, &mut report).await?;
            }
        }

        report.pruned = self.store.prune_settled(self.retain_settled).await?;
        if report.pruned > 0 {
            tracing::debug!(pruned = report.pruned, "Pruned settled rounds");
        }

        self.update_gauges(current).await?;
        record_latency(LatencyMetric::SchedulerTick, started.elapsed());

        Ok(report)
    }

    /// Tick every `interval` until `shutdown` flips or its sender is dropped.
    ///
    /// A failed tick is logged and retried on the next one.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            lookahead = self.lookahead,
            "Round scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if !report.is_noop() => {
                            tracing::debug!(?report, "Scheduler tick");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Scheduler tick failed, retrying next tick");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Round scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Insert every missing round in `from..=to`
    async fn ensure_rounds(
        &self,
        from: RoundNumber,
        to: RoundNumber,
        report: &mut TickReport,
    ) -> Result<(), SchedulerError> {
        let existing: HashSet<RoundNumber> = self
            .store
            .rounds_in_range(from, to + 1)
            .await?
            .into_iter()
            .map(|r| r.round_number)
            .collect();

        for n in (from..=to).filter(|n| !existing.contains(n)) {
            if self.store.insert_round(&self.schedule.scheduled_round(n)).await? {
                tracing::debug!(
                    round = n,
                    start_time = self.schedule.start_time(n),
                    "Round scheduled"
                );
                report.created.push(n);
            }
        }
        Ok(())
    }

    /// Capture the start price and move the round to Live
    async fn open(
        &self,
        round_number: RoundNumber,
        report: &mut TickReport,
    ) -> Result<(), SchedulerError> {
        let point = capture_price(self.feed.as_ref(), &self.capture)
            .await
            .map_err(|source| SchedulerError::Open {
                round_number,
                source,
            })?;

        match self.store.open_round(round_number, point.price).await {
            Ok(_) => {
                increment_counter(CounterMetric::RoundOpened);
                tracing::info!(
                    round = round_number,
                    start_price = %point.price,
                    source = %point.source,
                    "Round live"
                );
                report.opened.push(round_number);
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => {
                tracing::debug!(round = round_number, "Round already opened elsewhere");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_gauges(&self, current: RoundNumber) -> Result<(), SchedulerError> {
        set_gauge(GaugeMetric::LiveRound, current as f64);

        if let Some(round) = self.store.get_round(current).await? {
            for token in Token::ALL {
                let pool = round.pool(token);
                for side in [Direction::Up, Direction::Down] {
                    let value = pool.side(side).to_f64().unwrap_or_default();
                    set_gauge(GaugeMetric::LivePool(token, side), value);
                }
            }
        }
        Ok(())
    }
}
