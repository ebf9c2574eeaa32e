//! In-process round store

use super::{RoundStore, SettlementWrite, StoreError};
use crate::ledger::{Bet, UserId};
use crate::round::{Round, RoundNumber, RoundStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    rounds: BTreeMap<RoundNumber, Round>,
    /// Bets keyed by the composite `(round, user)` identity
    bets: BTreeMap<(RoundNumber, UserId), Bet>,
}

impl Inner {
    fn round_mut(&mut self, round_number: RoundNumber) -> Result<&mut Round, StoreError> {
        self.rounds
            .get_mut(&round_number)
            .ok_or(StoreError::RoundNotFound(round_number))
    }

    fn bets_of(&self, round_number: RoundNumber) -> impl Iterator<Item = &Bet> {
        self.bets
            .range((round_number, String::new())..)
            .take_while(move |((n, _), _)| *n == round_number)
            .map(|(_, bet)| bet)
    }
}

/// Store held in memory behind a single lock; each call is one transaction
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoundStore for MemoryStore {
    async fn insert_round(&self, round: &Round) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.rounds.contains_key(&round.round_number) {
            return Ok(false);
        }
        inner.rounds.insert(round.round_number, round.clone());
        Ok(true)
    }

    async fn get_round(&self, round_number: RoundNumber) -> Result<Option<Round>, StoreError> {
        Ok(self.inner.lock().rounds.get(&round_number).cloned())
    }

    async fn rounds_in_range(
        &self,
        from: RoundNumber,
        to: RoundNumber,
    ) -> Result<Vec<Round>, StoreError> {
        if from >= to {
            return Ok(vec![]);
        }
        Ok(self
            .inner
            .lock()
            .rounds
            .range(from..to)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn unsettled_before(&self, before: RoundNumber) -> Result<Vec<Round>, StoreError> {
        Ok(self
            .inner
            .lock()
            .rounds
            .range(..before)
            .map(|(_, r)| r)
            .filter(|r| r.status != RoundStatus::Settled)
            .cloned()
            .collect())
    }

    async fn recent_settled(&self, limit: usize) -> Result<Vec<Round>, StoreError> {
        Ok(self
            .inner
            .lock()
            .rounds
            .values()
            .rev()
            .filter(|r| r.status == RoundStatus::Settled)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_round_number(&self) -> Result<Option<RoundNumber>, StoreError> {
        Ok(self.inner.lock().rounds.keys().next_back().copied())
    }

    async fn open_round(
        &self,
        round_number: RoundNumber,
        start_price: Decimal,
    ) -> Result<Round, StoreError> {
        let mut inner = self.inner.lock();
        let round = inner.round_mut(round_number)?;

        if round.status != RoundStatus::Scheduled || round.start_price.is_some() {
            return Err(StoreError::Conflict {
                round_number,
                reason: format!("cannot open a {} round", round.status.as_str()),
            });
        }

        round.status = RoundStatus::Live;
        round.start_price = Some(start_price);
        round.revision += 1;
        Ok(round.clone())
    }

    async fn commit_bet(&self, bet: &Bet) -> Result<Round, StoreError> {
        let mut inner = self.inner.lock();
        let key = (bet.round_number, bet.user_id.clone());

        {
            let round = inner.round_mut(bet.round_number)?;
            if !round.accepts_bets_at(bet.placed_at) {
                return Err(StoreError::Conflict {
                    round_number: bet.round_number,
                    reason: "round is not accepting bets".to_string(),
                });
            }
        }

        if inner.bets.contains_key(&key) {
            return Err(StoreError::DuplicateBet {
                round_number: bet.round_number,
                user_id: bet.user_id.clone(),
            });
        }

        inner.bets.insert(key, bet.clone());
        let round = inner.round_mut(bet.round_number)?;
        round
            .pools
            .entry(bet.token)
            .or_default()
            .add(bet.direction, bet.stake);
        round.revision += 1;
        Ok(round.clone())
    }

    async fn get_bet(
        &self,
        round_number: RoundNumber,
        user_id: &str,
    ) -> Result<Option<Bet>, StoreError> {
        Ok(self
            .inner
            .lock()
            .bets
            .get(&(round_number, user_id.to_string()))
            .cloned())
    }

    async fn bets_for_round(&self, round_number: RoundNumber) -> Result<Vec<Bet>, StoreError> {
        let inner = self.inner.lock();
        let mut bets: Vec<Bet> = inner.bets_of(round_number).cloned().collect();
        bets.sort_by_key(|b| b.placed_at);
        Ok(bets)
    }

    async fn bets_for_user(&self, user_id: &str) -> Result<Vec<Bet>, StoreError> {
        let inner = self.inner.lock();
        let mut bets: Vec<Bet> = inner
            .bets
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.round_number.cmp(&a.round_number));
        Ok(bets)
    }

    async fn settle_round(&self, write: &SettlementWrite) -> Result<Round, StoreError> {
        let mut inner = self.inner.lock();
        let round_number = write.round_number;

        {
            let round = inner.round_mut(round_number)?;
            if round.status != RoundStatus::Live {
                return Err(StoreError::Conflict {
                    round_number,
                    reason: format!("cannot settle a {} round", round.status.as_str()),
                });
            }
            if round.revision != write.expected_revision {
                return Err(StoreError::Conflict {
                    round_number,
                    reason: format!(
                        "revision moved from {} to {}",
                        write.expected_revision, round.revision
                    ),
                });
            }
        }

        let payouts: HashMap<_, _> = write.payouts.iter().copied().collect();
        let bet_count = inner.bets_of(round_number).count();
        let covered = inner
            .bets_of(round_number)
            .filter(|b| payouts.contains_key(&b.id))
            .count();
        if bet_count != payouts.len() || covered != bet_count {
            return Err(StoreError::Conflict {
                round_number,
                reason: format!(
                    "payouts cover {} of {} bets",
                    covered.min(payouts.len()),
                    bet_count
                ),
            });
        }

        for ((n, _), bet) in inner.bets.range_mut((round_number, String::new())..) {
            if *n != round_number {
                break;
            }
            bet.settled = true;
            bet.payout = payouts.get(&bet.id).copied();
        }

        let round = inner.round_mut(round_number)?;
        round.status = RoundStatus::Settled;
        round.end_price = Some(write.end_price);
        round.result = Some(write.result);
        round.revision += 1;
        Ok(round.clone())
    }

    async fn prune_settled(&self, keep: usize) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let doomed: Vec<RoundNumber> = inner
            .rounds
            .values()
            .rev()
            .filter(|r| r.status == RoundStatus::Settled)
            .skip(keep)
            .map(|r| r.round_number)
            .collect();

        for n in &doomed {
            inner.rounds.remove(n);
            inner.bets.retain(|(round_number, _), _| round_number != n);
        }

        Ok(doomed.len())
    }
}
