//! Settlement types

use crate::ledger::{Bet, BetId, UserId};
use crate::round::{Direction, Pool, RoundNumber, RoundResult, Token};
use crate::round::CaptureError;
use crate::store::StoreError;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// How a bet ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Won,
    Lost,
    Refunded,
}

impl BetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetOutcome::Won => "won",
            BetOutcome::Lost => "lost",
            BetOutcome::Refunded => "refunded",
        }
    }
}

/// Payout of a single bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BetPayout {
    pub bet_id: BetId,
    pub user_id: UserId,
    pub token: Token,
    pub direction: Direction,
    pub stake: Decimal,
    pub payout: Decimal,
    pub outcome: BetOutcome,
}

impl BetPayout {
    pub fn new(bet: &Bet, payout: Decimal, outcome: BetOutcome) -> Self {
        Self {
            bet_id: bet.id,
            user_id: bet.user_id.clone(),
            token: bet.token,
            direction: bet.direction,
            stake: bet.stake,
            payout,
            outcome,
        }
    }
}

/// Totals for one token of a settled round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSettlement {
    pub token: Token,
    pub pool: Pool,
    /// Zero when the token was refunded
    pub winning_pool: Decimal,
    pub losing_pool: Decimal,
    pub paid_out: Decimal,
    /// Pool left undistributed by truncation
    pub dust: Decimal,
    pub refunded: bool,
}

/// Outcome of settling one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
    pub round_number: RoundNumber,
    pub start_price: Decimal,
    pub end_price: Decimal,
    pub result: RoundResult,
    pub payouts: Vec<BetPayout>,
    pub tokens: Vec<TokenSettlement>,
}

impl SettlementResult {
    /// Total paid out across all tokens
    pub fn total_paid(&self) -> Decimal {
        self.tokens.iter().map(|t| t.paid_out).sum()
    }

    /// No token paid out more than was staked in it
    pub fn conserves_pools(&self) -> bool {
        self.tokens
            .iter()
            .all(|t| t.paid_out <= t.pool.total() && !t.dust.is_sign_negative())
    }

    /// Payout for one user, if they had a bet
    pub fn payout_for(&self, user_id: &str) -> Option<&BetPayout> {
        self.payouts.iter().find(|p| p.user_id == user_id)
    }
}

/// Successful `settle_round` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// This call settled the round
    Settled(SettlementResult),
    /// The round was already settled; the stored result is returned unchanged
    AlreadySettled(SettlementResult),
}

impl SettleOutcome {
    pub fn result(&self) -> &SettlementResult {
        match self {
            SettleOutcome::Settled(r) | SettleOutcome::AlreadySettled(r) => r,
        }
    }

    pub fn into_result(self) -> SettlementResult {
        match self {
            SettleOutcome::Settled(r) | SettleOutcome::AlreadySettled(r) => r,
        }
    }

    pub fn is_already_settled(&self) -> bool {
        matches!(self, SettleOutcome::AlreadySettled(_))
    }
}

/// Settlement errors
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Round {0} not found")]
    RoundNotFound(RoundNumber),
    /// Round is not Live, or its window has not closed yet
    #[error("Round {0} is not ready to settle")]
    NotReadyToSettle(RoundNumber),
    /// End price could not be captured; the round stays Live
    #[error(transparent)]
    PriceCaptureFailed(#[from] CaptureError),
    /// Store kept conflicting or failing after bounded retries
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}
