//! Round store module
//!
//! Durable persistence of rounds and bets. Every mutating operation is a
//! single atomic unit guarded by a state check, so concurrent schedulers and
//! bettors can share one store.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::ledger::{Bet, BetId, UserId};
use crate::round::{Round, RoundNumber, RoundResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No round with this number
    #[error("Round {0} not found")]
    RoundNotFound(RoundNumber),
    /// A bet already exists for the `(round, user)` pair
    #[error("Bet already exists for user {user_id} in round {round_number}")]
    DuplicateBet {
        round_number: RoundNumber,
        user_id: UserId,
    },
    /// A guarded write found the round in an unexpected state
    #[error("Round {round_number} changed concurrently: {reason}")]
    Conflict {
        round_number: RoundNumber,
        reason: String,
    },
    /// Backend is locked by another writer
    #[error("Store busy")]
    Busy,
    /// Backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the caller should retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Busy)
    }
}

/// Everything settlement writes for one round, applied atomically
#[derive(Debug, Clone)]
pub struct SettlementWrite {
    pub round_number: RoundNumber,
    /// Revision the payouts were computed against
    pub expected_revision: u64,
    pub end_price: Decimal,
    pub result: RoundResult,
    /// Payout for every bet of the round
    pub payouts: Vec<(BetId, Decimal)>,
}

/// Persistence for rounds and bets
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Insert a Scheduled round. Returns false if the round already exists.
    async fn insert_round(&self, round: &Round) -> Result<bool, StoreError>;

    async fn get_round(&self, round_number: RoundNumber) -> Result<Option<Round>, StoreError>;

    /// Rounds with `from <= number < to`, ascending
    async fn rounds_in_range(
        &self,
        from: RoundNumber,
        to: RoundNumber,
    ) -> Result<Vec<Round>, StoreError>;

    /// Rounds numbered below `before` that are not Settled, ascending
    async fn unsettled_before(&self, before: RoundNumber) -> Result<Vec<Round>, StoreError>;

    /// Settled rounds, newest first
    async fn recent_settled(&self, limit: usize) -> Result<Vec<Round>, StoreError>;

    /// Highest round number ever stored
    async fn latest_round_number(&self) -> Result<Option<RoundNumber>, StoreError>;

    /// Scheduled -> Live with the captured start price.
    ///
    /// `Conflict` if the round is not Scheduled.
    async fn open_round(
        &self,
        round_number: RoundNumber,
        start_price: Decimal,
    ) -> Result<Round, StoreError>;

    /// Insert the bet and add its stake to the round's pool in one unit.
    ///
    /// `Conflict` if the round is not Live or the bet is outside its window,
    /// `DuplicateBet` if the user already has a bet in the round.
    async fn commit_bet(&self, bet: &Bet) -> Result<Round, StoreError>;

    async fn get_bet(
        &self,
        round_number: RoundNumber,
        user_id: &str,
    ) -> Result<Option<Bet>, StoreError>;

    /// Bets of one round, in placement order
    async fn bets_for_round(&self, round_number: RoundNumber) -> Result<Vec<Bet>, StoreError>;

    /// All bets of one user, newest round first
    async fn bets_for_user(&self, user_id: &str) -> Result<Vec<Bet>, StoreError>;

    /// Live -> Settled: end price, result and every payout in one unit.
    ///
    /// `Conflict` unless the round is Live at `expected_revision` and the
    /// write covers exactly the round's bets.
    async fn settle_round(&self, write: &SettlementWrite) -> Result<Round, StoreError>;

    /// Delete Settled rounds beyond the newest `keep`, with their bets
    async fn prune_settled(&self, keep: usize) -> Result<usize, StoreError>;
}

/// Open the configured store backend
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn RoundStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| StoreError::Backend("sqlite backend requires a path".into()))?;
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}
