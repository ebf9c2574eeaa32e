//! Settlement module
//!
//! Pari-mutuel payout math and the exactly-once settlement engine.

mod engine;
mod payout;
mod types;

pub use engine::SettlementEngine;
pub use payout::{compute_payouts, pools_from_bets, settled_payouts, summarize, PAYOUT_SCALE};
pub use types::{
    BetOutcome, BetPayout, SettleOutcome, SettlementError, SettlementResult, TokenSettlement,
};
