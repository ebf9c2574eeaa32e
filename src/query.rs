//! Read-only projections for the display layer
//!
//! Everything here is computed from the store on demand; callers poll.

use crate::clock::Clock;
use crate::ledger::Bet;
use crate::round::{Pool, Round, RoundNumber, RoundResult, RoundSchedule, RoundStatus, Token};
use crate::store::{RoundStore, StoreError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The round currently accepting bets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveRoundView {
    pub round_number: RoundNumber,
    pub start_time: i64,
    pub end_time: i64,
    pub start_price: Option<Decimal>,
    pub pools: BTreeMap<Token, Pool>,
    /// `max(0, end_time - now)`
    pub time_left_ms: i64,
    /// False once the window closed but settlement has not run yet
    pub accepting_bets: bool,
}

/// A pre-created round that has not started
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingRoundView {
    pub round_number: RoundNumber,
    pub start_time: i64,
    pub end_time: i64,
    /// Milliseconds until the round starts
    pub starts_in_ms: i64,
}

/// A settled round for the history list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettledRoundView {
    pub round_number: RoundNumber,
    pub start_time: i64,
    pub end_time: i64,
    pub start_price: Option<Decimal>,
    pub end_price: Option<Decimal>,
    pub result: Option<RoundResult>,
    /// `(end - start) / start * 100`
    pub percentage_change: Option<Decimal>,
    pub pools: BTreeMap<Token, Pool>,
}

impl From<&Round> for SettledRoundView {
    fn from(round: &Round) -> Self {
        Self {
            round_number: round.round_number,
            start_time: round.start_time,
            end_time: round.end_time,
            start_price: round.start_price,
            end_price: round.end_price,
            result: round.result,
            percentage_change: round.percentage_change(),
            pools: round.pools.clone(),
        }
    }
}

/// Settled-bet statistics for one user and one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub token: Token,
    pub predictions: u64,
    pub wins: u64,
    pub losses: u64,
    /// Bets paid back exactly their stake
    pub refunds: u64,
    /// Percentage of predictions won, two decimal places
    pub win_rate: Decimal,
    pub total_wagered: Decimal,
    pub total_winnings: Decimal,
    pub net_profit: Decimal,
}

impl UserStats {
    fn for_token(token: Token) -> Self {
        Self {
            token,
            predictions: 0,
            wins: 0,
            losses: 0,
            refunds: 0,
            win_rate: Decimal::ZERO,
            total_wagered: Decimal::ZERO,
            total_winnings: Decimal::ZERO,
            net_profit: Decimal::ZERO,
        }
    }

    fn record(&mut self, bet: &Bet) {
        let Some(payout) = bet.payout.filter(|_| bet.settled) else {
            return;
        };

        self.predictions += 1;
        if payout > bet.stake {
            self.wins += 1;
        } else if payout.is_zero() {
            self.losses += 1;
        } else {
            self.refunds += 1;
        }
        self.total_wagered += bet.stake;
        self.total_winnings += payout;
    }

    fn finish(mut self) -> Self {
        self.net_profit = self.total_winnings - self.total_wagered;
        if self.predictions > 0 {
            self.win_rate = (Decimal::from(self.wins) / Decimal::from(self.predictions)
                * dec!(100))
            .round_dp(2);
        }
        self
    }
}

/// Query functions backing the display layer
pub struct RoundQueries {
    store: Arc<dyn RoundStore>,
    clock: Arc<dyn Clock>,
    schedule: RoundSchedule,
}

impl RoundQueries {
    pub fn new(store: Arc<dyn RoundStore>, clock: Arc<dyn Clock>, schedule: RoundSchedule) -> Self {
        Self {
            store,
            clock,
            schedule,
        }
    }

    /// Newest Live round.
    ///
    /// While settlement is delayed this may be a round whose window already
    /// closed; `accepting_bets` is false in that case.
    pub async fn live_round(&self) -> Result<Option<LiveRoundView>, StoreError> {
        let now = self.clock.now_ms();
        let Some(current) = self.schedule.round_at(now) else {
            return Ok(None);
        };

        let live = self
            .store
            .unsettled_before(current + 1)
            .await?
            .into_iter()
            .rev()
            .find(|r| r.status == RoundStatus::Live);

        Ok(live.map(|round| LiveRoundView {
            round_number: round.round_number,
            start_time: round.start_time,
            end_time: round.end_time,
            start_price: round.start_price,
            time_left_ms: round.time_left_ms(now),
            accepting_bets: round.accepts_bets_at(now),
            pools: round.pools,
        }))
    }

    /// Scheduled rounds after the current one, soonest first
    pub async fn upcoming(&self, limit: usize) -> Result<Vec<UpcomingRoundView>, StoreError> {
        let now = self.clock.now_ms();
        let from = self.schedule.round_at(now).map_or(0, |n| n + 1);

        let rounds = self
            .store
            .rounds_in_range(from, from + limit as RoundNumber)
            .await?;

        Ok(rounds
            .into_iter()
            .filter(|r| r.status == RoundStatus::Scheduled)
            .map(|r| UpcomingRoundView {
                round_number: r.round_number,
                start_time: r.start_time,
                end_time: r.end_time,
                starts_in_ms: (r.start_time - now).max(0),
            })
            .collect())
    }

    /// Most recent Settled rounds, newest first
    pub async fn recent_settled(&self, limit: usize) -> Result<Vec<SettledRoundView>, StoreError> {
        let rounds = self.store.recent_settled(limit).await?;
        Ok(rounds.iter().map(SettledRoundView::from).collect())
    }

    /// The user's bet in the live round, if any
    pub async fn user_live_bet(&self, user_id: &str) -> Result<Option<Bet>, StoreError> {
        match self.live_round().await? {
            Some(live) => self.store.get_bet(live.round_number, user_id).await,
            None => Ok(None),
        }
    }

    /// Statistics over the user's settled bets, one entry per token
    pub async fn user_stats(&self, user_id: &str) -> Result<Vec<UserStats>, StoreError> {
        let bets = self.store.bets_for_user(user_id).await?;

        let mut stats: BTreeMap<Token, UserStats> = Token::ALL
            .iter()
            .map(|t| (*t, UserStats::for_token(*t)))
            .collect();
        for bet in &bets {
            stats
                .entry(bet.token)
                .or_insert_with(|| UserStats::for_token(bet.token))
                .record(bet);
        }

        Ok(stats.into_values().map(UserStats::finish).collect())
    }
}
