//! Bet placement

use super::types::{Bet, BetError};
use crate::clock::Clock;
use crate::round::{Direction, RoundNumber, Token};
use crate::store::{RoundStore, StoreError};
use crate::telemetry::{increment_counter, CounterMetric};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Accepts stakes against Live rounds.
///
/// Never touches the price feed; placement is bounded by store latency only.
pub struct BetLedger {
    store: Arc<dyn RoundStore>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl BetLedger {
    pub fn new(store: Arc<dyn RoundStore>, clock: Arc<dyn Clock>, max_retries: u32) -> Self {
        Self {
            store,
            clock,
            max_retries,
        }
    }

    /// Place a bet.
    ///
    /// The bet and its pool increment are committed as one store operation.
    pub async fn place_bet(
        &self,
        round_number: RoundNumber,
        user_id: &str,
        direction: Direction,
        stake: Decimal,
        token: Token,
    ) -> Result<Bet, BetError> {
        let result = self
            .try_place(round_number, user_id, direction, stake, token)
            .await;

        match &result {
            Ok(bet) => {
                increment_counter(CounterMetric::BetAccepted);
                tracing::info!(
                    round = round_number,
                    user = user_id,
                    direction = direction.as_str(),
                    token = token.as_str(),
                    %stake,
                    bet_id = %bet.id,
                    "Bet accepted"
                );
            }
            Err(e) => {
                increment_counter(CounterMetric::BetRejected(e.reason()));
                tracing::info!(
                    round = round_number,
                    user = user_id,
                    reason = e.reason(),
                    error = %e,
                    "Bet rejected"
                );
            }
        }

        result
    }

    async fn try_place(
        &self,
        round_number: RoundNumber,
        user_id: &str,
        direction: Direction,
        stake: Decimal,
        token: Token,
    ) -> Result<Bet, BetError> {
        if stake <= Decimal::ZERO {
            return Err(BetError::InvalidStake(stake));
        }

        let mut attempt = 0;
        loop {
            let now = self.clock.now_ms();
            let round = self
                .store
                .get_round(round_number)
                .await
                .map_err(BetError::StoreUnavailable)?
                .ok_or(BetError::RoundNotLive(round_number))?;
            if !round.accepts_bets_at(now) {
                return Err(BetError::RoundNotLive(round_number));
            }

            if self
                .store
                .get_bet(round_number, user_id)
                .await
                .map_err(BetError::StoreUnavailable)?
                .is_some()
            {
                return Err(BetError::DuplicateBet {
                    round_number,
                    user_id: user_id.to_string(),
                });
            }

            let bet = Bet::new(round_number, user_id, direction, stake, token, now);
            match self.store.commit_bet(&bet).await {
                Ok(_) => return Ok(bet),
                Err(StoreError::DuplicateBet {
                    round_number,
                    user_id,
                }) => {
                    return Err(BetError::DuplicateBet {
                        round_number,
                        user_id,
                    })
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        round = round_number,
                        attempt,
                        error = %e,
                        "Bet commit conflicted, retrying"
                    );
                }
                Err(StoreError::RoundNotFound(_)) => {
                    return Err(BetError::RoundNotLive(round_number))
                }
                Err(e) => return Err(BetError::StoreUnavailable(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::round::Round;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    async fn setup(now: i64) -> (Arc<MemoryStore>, Arc<ManualClock>, BetLedger) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_round(&Round::scheduled(1, 1_000, 2_000))
            .await
            .unwrap();
        store.open_round(1, dec!(0.6250)).await.unwrap();
        store
            .insert_round(&Round::scheduled(2, 2_000, 3_000))
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(now));
        let ledger = BetLedger::new(store.clone(), clock.clone(), 3);
        (store, clock, ledger)
    }

    #[tokio::test]
    async fn test_place_bet_updates_pool() {
        let (store, _, ledger) = setup(1_500).await;

        let bet = ledger
            .place_bet(1, "alice", Direction::Up, dec!(10), Token::Xrp)
            .await
            .unwrap();
        assert_eq!(bet.placed_at, 1_500);

        let round = store.get_round(1).await.unwrap().unwrap();
        assert_eq!(round.pool(Token::Xrp).up, dec!(10));
        assert_eq!(round.total_pool(Token::Xrp), dec!(10));
    }

    #[tokio::test]
    async fn test_rejects_invalid_stake() {
        let (_, _, ledger) = setup(1_500).await;
        for stake in [dec!(0), dec!(-5)] {
            let err = ledger
                .place_bet(1, "alice", Direction::Up, stake, Token::Xrp)
                .await
                .unwrap_err();
            assert!(matches!(err, BetError::InvalidStake(_)));
        }
    }

    #[tokio::test]
    async fn test_rejects_duplicate_without_touching_pool() {
        let (store, _, ledger) = setup(1_500).await;
        ledger
            .place_bet(1, "alice", Direction::Up, dec!(10), Token::Xrp)
            .await
            .unwrap();

        let err = ledger
            .place_bet(1, "alice", Direction::Down, dec!(4), Token::Brett)
            .await
            .unwrap_err();
        assert!(matches!(err, BetError::DuplicateBet { round_number: 1, .. }));

        let round = store.get_round(1).await.unwrap().unwrap();
        assert_eq!(round.pool(Token::Xrp).up, dec!(10));
        assert_eq!(round.total_pool(Token::Brett), dec!(0));
    }

    #[tokio::test]
    async fn test_rejects_outside_live_window() {
        let (_, clock, ledger) = setup(999).await;
        assert!(matches!(
            ledger
                .place_bet(1, "a", Direction::Up, dec!(1), Token::Xrp)
                .await,
            Err(BetError::RoundNotLive(1))
        ));

        clock.set(2_000);
        assert!(matches!(
            ledger
                .place_bet(1, "a", Direction::Up, dec!(1), Token::Xrp)
                .await,
            Err(BetError::RoundNotLive(1))
        ));
    }

    #[tokio::test]
    async fn test_rejects_scheduled_and_missing_rounds() {
        let (_, _, ledger) = setup(2_500).await;
        assert!(matches!(
            ledger
                .place_bet(2, "a", Direction::Down, dec!(1), Token::Xrp)
                .await,
            Err(BetError::RoundNotLive(2))
        ));
        assert!(matches!(
            ledger
                .place_bet(9, "a", Direction::Down, dec!(1), Token::Xrp)
                .await,
            Err(BetError::RoundNotLive(9))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_commit_once() {
        let (store, _, ledger) = setup(1_500).await;
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .place_bet(1, "racer", Direction::Up, dec!(2), Token::Xrp)
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        let round = store.get_round(1).await.unwrap().unwrap();
        assert_eq!(round.pool(Token::Xrp).up, dec!(2));
    }
}
