//! Settlement engine
//!
//! Captures the end price, computes payouts and writes everything in one
//! guarded store operation. Safe to race: only one caller settles a round,
//! every other caller gets the stored result back.

use super::payout::{compute_payouts, settled_payouts, summarize};
use super::types::{SettleOutcome, SettlementError, SettlementResult};
use crate::clock::Clock;
use crate::feed::PriceFeed;
use crate::ledger::Bet;
use crate::round::{capture_price, CapturePolicy, Round, RoundNumber, RoundResult, RoundStatus};
use crate::store::{RoundStore, SettlementWrite, StoreError};
use crate::telemetry::{increment_counter, record_latency, CounterMetric, LatencyMetric};
use std::sync::Arc;
use std::time::Instant;

/// Settles rounds once their window has closed
pub struct SettlementEngine {
    store: Arc<dyn RoundStore>,
    feed: Arc<dyn PriceFeed>,
    clock: Arc<dyn Clock>,
    capture: CapturePolicy,
    max_retries: u32,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn RoundStore>,
        feed: Arc<dyn PriceFeed>,
        clock: Arc<dyn Clock>,
        capture: CapturePolicy,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            feed,
            clock,
            capture,
            max_retries,
        }
    }

    /// Settle a round.
    ///
    /// Re-invoking on a Settled round returns `AlreadySettled` with the
    /// stored result and writes nothing.
    pub async fn settle_round(
        &self,
        round_number: RoundNumber,
    ) -> Result<SettleOutcome, SettlementError> {
        let started = Instant::now();

        let round = self.load_round(round_number).await?;
        if round.status == RoundStatus::Settled {
            return self.stored_result(&round).await.map(SettleOutcome::AlreadySettled);
        }
        if round.status != RoundStatus::Live || self.clock.now_ms() < round.end_time {
            return Err(SettlementError::NotReadyToSettle(round_number));
        }
        let start_price = round
            .start_price
            .ok_or(SettlementError::NotReadyToSettle(round_number))?;

        let point = capture_price(self.feed.as_ref(), &self.capture).await?;
        let end_price = point.price;
        let result = RoundResult::from_prices(start_price, end_price);

        let mut round = round;
        let mut attempt = 0;
        loop {
            let bets = self
                .store
                .bets_for_round(round_number)
                .await
                .map_err(SettlementError::StoreUnavailable)?;
            let payouts = compute_payouts(result, &bets);

            let write = SettlementWrite {
                round_number,
                expected_revision: round.revision,
                end_price,
                result,
                payouts: payouts.iter().map(|p| (p.bet_id, p.payout)).collect(),
            };

            match self.store.settle_round(&write).await {
                Ok(_) => {
                    let tokens = summarize(result, &payouts);
                    let settled = SettlementResult {
                        round_number,
                        start_price,
                        end_price,
                        result,
                        payouts,
                        tokens,
                    };

                    increment_counter(CounterMetric::RoundSettled(result));
                    record_latency(LatencyMetric::Settlement, started.elapsed());
                    tracing::info!(
                        round = round_number,
                        %start_price,
                        %end_price,
                        result = result.as_str(),
                        source = %point.source,
                        bets = settled.payouts.len(),
                        paid_out = %settled.total_paid(),
                        "Round settled"
                    );
                    for token in &settled.tokens {
                        if !token.dust.is_zero() {
                            tracing::debug!(
                                round = round_number,
                                token = token.token.as_str(),
                                dust = %token.dust,
                                "Undistributed remainder"
                            );
                        }
                    }

                    return Ok(SettleOutcome::Settled(settled));
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        round = round_number,
                        attempt,
                        error = %e,
                        "Settlement write conflicted, re-reading round"
                    );

                    round = self.load_round(round_number).await?;
                    match round.status {
                        RoundStatus::Settled => {
                            return self
                                .stored_result(&round)
                                .await
                                .map(SettleOutcome::AlreadySettled);
                        }
                        RoundStatus::Live => continue,
                        RoundStatus::Scheduled => {
                            return Err(SettlementError::NotReadyToSettle(round_number))
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(round = round_number, error = %e, "Settlement write failed");
                    return Err(SettlementError::StoreUnavailable(e));
                }
            }
        }
    }

    async fn load_round(&self, round_number: RoundNumber) -> Result<Round, SettlementError> {
        self.store
            .get_round(round_number)
            .await
            .map_err(SettlementError::StoreUnavailable)?
            .ok_or(SettlementError::RoundNotFound(round_number))
    }

    /// Result of a round that is already Settled, read back from the store
    async fn stored_result(&self, round: &Round) -> Result<SettlementResult, SettlementError> {
        let bets: Vec<Bet> = self
            .store
            .bets_for_round(round.round_number)
            .await
            .map_err(SettlementError::StoreUnavailable)?;

        let (start_price, end_price, result) =
            match (round.start_price, round.end_price, round.result) {
                (Some(s), Some(e), Some(r)) => (s, e, r),
                _ => {
                    return Err(SettlementError::StoreUnavailable(StoreError::Backend(
                        format!("settled round {} is missing prices", round.round_number),
                    )))
                }
            };

        let payouts = settled_payouts(result, &bets);
        let tokens = summarize(result, &payouts);
        tracing::debug!(round = round.round_number, "Round already settled");

        Ok(SettlementResult {
            round_number: round.round_number,
            start_price,
            end_price,
            result,
            payouts,
            tokens,
        })
    }
}
