//! Round types

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Round identifier, derived from the schedule
pub type RoundNumber = u64;

/// Lifecycle state of a round
///
/// `Scheduled -> Live -> Settled` is the only legal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    /// Pre-created, not yet accepting bets
    Scheduled,
    /// Start price captured, accepting bets
    Live,
    /// End price captured and payouts written
    Settled,
}

impl RoundStatus {
    /// Stable lowercase name used for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Scheduled => "scheduled",
            RoundStatus::Live => "live",
            RoundStatus::Settled => "settled",
        }
    }
}

impl FromStr for RoundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RoundStatus::Scheduled),
            "live" => Ok(RoundStatus::Live),
            "settled" => Ok(RoundStatus::Settled),
            other => Err(format!("unknown round status: {}", other)),
        }
    }
}

/// Price outcome of a settled round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundResult {
    Up,
    Down,
    Flat,
}

impl RoundResult {
    /// Compare the captured end price against the start price
    pub fn from_prices(start_price: Decimal, end_price: Decimal) -> Self {
        match end_price.cmp(&start_price) {
            std::cmp::Ordering::Greater => RoundResult::Up,
            std::cmp::Ordering::Less => RoundResult::Down,
            std::cmp::Ordering::Equal => RoundResult::Flat,
        }
    }

    /// The winning bet direction, if any
    pub fn winning_direction(&self) -> Option<Direction> {
        match self {
            RoundResult::Up => Some(Direction::Up),
            RoundResult::Down => Some(Direction::Down),
            RoundResult::Flat => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundResult::Up => "up",
            RoundResult::Down => "down",
            RoundResult::Flat => "flat",
        }
    }
}

impl FromStr for RoundResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(RoundResult::Up),
            "down" => Ok(RoundResult::Down),
            "flat" => Ok(RoundResult::Flat),
            other => Err(format!("unknown round result: {}", other)),
        }
    }
}

/// Bet direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Price ends above the start price
    Up,
    /// Price ends below the start price
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" | "bull" => Ok(Direction::Up),
            "down" | "bear" => Ok(Direction::Down),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stake denomination. Pools never commingle tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    Xrp,
    Brett,
}

impl Token {
    pub const ALL: [Token; 2] = [Token::Xrp, Token::Brett];

    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Xrp => "xrp",
            Token::Brett => "brett",
        }
    }
}

impl FromStr for Token {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xrp" => Ok(Token::Xrp),
            "brett" => Ok(Token::Brett),
            other => Err(format!("unknown token: {}", other)),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stakes accumulated on each side for one token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub up: Decimal,
    pub down: Decimal,
}

impl Pool {
    /// Up plus down; the total is never stored separately
    pub fn total(&self) -> Decimal {
        self.up + self.down
    }

    /// Stake on one side
    pub fn side(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }

    /// Add a stake to one side
    pub fn add(&mut self, direction: Direction, stake: Decimal) {
        match direction {
            Direction::Up => self.up += stake,
            Direction::Down => self.down += stake,
        }
    }
}

/// A fixed-duration betting window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_number: RoundNumber,
    pub status: RoundStatus,
    /// Window start, epoch milliseconds
    pub start_time: i64,
    /// Window end (exclusive), epoch milliseconds
    pub end_time: i64,
    /// Write-once, set on Scheduled -> Live
    pub start_price: Option<Decimal>,
    /// Write-once, set on Live -> Settled
    pub end_price: Option<Decimal>,
    /// Defined iff status is Settled
    pub result: Option<RoundResult>,
    /// Pools per token, frozen once the round leaves Live
    pub pools: BTreeMap<Token, Pool>,
    /// Bumped by the store on every mutation
    pub revision: u64,
}

impl Round {
    /// Create a round in Scheduled state
    pub fn scheduled(round_number: RoundNumber, start_time: i64, end_time: i64) -> Self {
        Self {
            round_number,
            status: RoundStatus::Scheduled,
            start_time,
            end_time,
            start_price: None,
            end_price: None,
            result: None,
            pools: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Pool for a token (empty if nobody staked it)
    pub fn pool(&self, token: Token) -> Pool {
        self.pools.get(&token).copied().unwrap_or_default()
    }

    /// Total staked in a token across both sides
    pub fn total_pool(&self, token: Token) -> Decimal {
        self.pool(token).total()
    }

    /// Whether a bet at `now_ms` falls inside the live window
    pub fn accepts_bets_at(&self, now_ms: i64) -> bool {
        self.status == RoundStatus::Live && now_ms >= self.start_time && now_ms < self.end_time
    }

    /// Milliseconds until the window closes, floored at zero
    pub fn time_left_ms(&self, now_ms: i64) -> i64 {
        (self.end_time - now_ms).max(0)
    }

    /// `(end - start) / start * 100`, once both prices are captured
    pub fn percentage_change(&self) -> Option<Decimal> {
        match (self.start_price, self.end_price) {
            (Some(start), Some(end)) => percentage_change(start, end),
            _ => None,
        }
    }

    pub fn start_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start_time).single()
    }

    pub fn end_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.end_time).single()
    }
}

/// Percentage move from `start` to `end`; undefined for a zero start price
pub fn percentage_change(start: Decimal, end: Decimal) -> Option<Decimal> {
    if start.is_zero() {
        return None;
    }
    Some((end - start) / start * dec!(100))
}
