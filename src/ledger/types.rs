//! Bet ledger types

use crate::round::{Direction, RoundNumber, Token};
use crate::store::StoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Bet identifier
pub type BetId = Uuid;

/// Opaque, stable user identifier supplied by the identity provider
pub type UserId = String;

/// A stake on one side of a round.
///
/// At most one bet exists per `(round_number, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub round_number: RoundNumber,
    pub user_id: UserId,
    pub direction: Direction,
    /// Always positive
    pub stake: Decimal,
    pub token: Token,
    /// Epoch milliseconds, inside the round's live window
    pub placed_at: i64,
    /// Set exactly once by settlement
    pub settled: bool,
    /// Populated exactly once by settlement
    pub payout: Option<Decimal>,
}

impl Bet {
    /// A new unsettled bet
    pub fn new(
        round_number: RoundNumber,
        user_id: impl Into<UserId>,
        direction: Direction,
        stake: Decimal,
        token: Token,
        placed_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            round_number,
            user_id: user_id.into(),
            direction,
            stake,
            token,
            placed_at,
            settled: false,
            payout: None,
        }
    }
}

/// User-facing bet placement rejections
#[derive(Debug, Error)]
pub enum BetError {
    /// Round is not Live, or the clock is outside its window
    #[error("Round {0} is not accepting bets")]
    RoundNotLive(RoundNumber),
    /// The user already has a bet in this round
    #[error("User {user_id} already has a bet in round {round_number}")]
    DuplicateBet {
        round_number: RoundNumber,
        user_id: UserId,
    },
    /// Stake is zero or negative
    #[error("Invalid stake: {0}")]
    InvalidStake(Decimal),
    /// Store kept conflicting or failing after bounded retries
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl BetError {
    /// Label used for the rejection metric
    pub fn reason(&self) -> &'static str {
        match self {
            BetError::RoundNotLive(_) => "round_not_live",
            BetError::DuplicateBet { .. } => "duplicate_bet",
            BetError::InvalidStake(_) => "invalid_stake",
            BetError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}
