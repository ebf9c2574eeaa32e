//! Bet ledger module
//!
//! One bet per user per round, committed atomically with its pool increment.

mod placement;
mod types;

pub use placement::BetLedger;
pub use types::{Bet, BetError, BetId, UserId};
