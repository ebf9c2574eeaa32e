//! Pari-mutuel payout computation
//!
//! Pure functions over a round's bets. Winners get their stake back plus a
//! share of the losing pool proportional to their stake in the winning pool.
//! A flat result, or a token with nobody on the winning side, refunds every
//! stake of that token.

use super::types::{BetOutcome, BetPayout, TokenSettlement};
use crate::ledger::Bet;
use crate::round::{Direction, Pool, RoundResult, Token};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

/// Decimal places payouts are truncated to
pub const PAYOUT_SCALE: u32 = 8;

/// Pools per token, summed from the bets themselves
pub fn pools_from_bets(bets: &[Bet]) -> BTreeMap<Token, Pool> {
    let mut pools: BTreeMap<Token, Pool> = BTreeMap::new();
    for bet in bets {
        pools.entry(bet.token).or_default().add(bet.direction, bet.stake);
    }
    pools
}

/// Winning side of a token pool, `None` when every stake is refunded
fn winning_side(result: RoundResult, pool: &Pool) -> Option<Direction> {
    let winning = result.winning_direction()?;
    if pool.side(winning).is_zero() {
        None
    } else {
        Some(winning)
    }
}

fn opposite(direction: Direction) -> Direction {
    match direction {
        Direction::Up => Direction::Down,
        Direction::Down => Direction::Up,
    }
}

/// `stake / winning_pool * losing_pool`, truncated toward zero
fn winner_share(stake: Decimal, winning_pool: Decimal, losing_pool: Decimal) -> Decimal {
    stake
        .checked_mul(losing_pool)
        .and_then(|n| n.checked_div(winning_pool))
        .or_else(|| {
            stake
                .checked_div(winning_pool)
                .and_then(|ratio| ratio.checked_mul(losing_pool))
        })
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(PAYOUT_SCALE, RoundingStrategy::ToZero)
}

/// Compute the payout of every bet for a given result.
///
/// Output order follows `bets`.
pub fn compute_payouts(result: RoundResult, bets: &[Bet]) -> Vec<BetPayout> {
    let pools = pools_from_bets(bets);

    bets.iter()
        .map(|bet| {
            let pool = pools.get(&bet.token).copied().unwrap_or_default();
            let (payout, outcome) = match winning_side(result, &pool) {
                None => (bet.stake, BetOutcome::Refunded),
                Some(winning) if bet.direction == winning => {
                    let share = winner_share(
                        bet.stake,
                        pool.side(winning),
                        pool.side(opposite(winning)),
                    );
                    (bet.stake + share, BetOutcome::Won)
                }
                Some(_) => (Decimal::ZERO, BetOutcome::Lost),
            };
            BetPayout::new(bet, payout, outcome)
        })
        .collect()
}

/// Rebuild payout records from bets that were already settled.
///
/// Stored payouts are reported as-is; only the outcome label is derived.
pub fn settled_payouts(result: RoundResult, bets: &[Bet]) -> Vec<BetPayout> {
    let pools = pools_from_bets(bets);

    bets.iter()
        .map(|bet| {
            let pool = pools.get(&bet.token).copied().unwrap_or_default();
            let outcome = match winning_side(result, &pool) {
                None => BetOutcome::Refunded,
                Some(winning) if bet.direction == winning => BetOutcome::Won,
                Some(_) => BetOutcome::Lost,
            };
            BetPayout::new(bet, bet.payout.unwrap_or_default(), outcome)
        })
        .collect()
}

/// Per-token totals for a set of payouts
pub fn summarize(result: RoundResult, payouts: &[BetPayout]) -> Vec<TokenSettlement> {
    let mut pools: BTreeMap<Token, (Pool, Decimal)> = BTreeMap::new();
    for p in payouts {
        let entry = pools.entry(p.token).or_default();
        entry.0.add(p.direction, p.stake);
        entry.1 += p.payout;
    }

    pools
        .into_iter()
        .map(|(token, (pool, paid_out))| match winning_side(result, &pool) {
            None => TokenSettlement {
                token,
                pool,
                winning_pool: Decimal::ZERO,
                losing_pool: Decimal::ZERO,
                paid_out,
                dust: pool.total() - paid_out,
                refunded: true,
            },
            Some(winning) => TokenSettlement {
                token,
                pool,
                winning_pool: pool.side(winning),
                losing_pool: pool.side(opposite(winning)),
                paid_out,
                dust: pool.total() - paid_out,
                refunded: false,
            },
        })
        .collect()
}
