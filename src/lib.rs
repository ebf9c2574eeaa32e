//! updown-rounds: round lifecycle and settlement for up/down price prediction games
//!
//! This library provides the core components for:
//! - An authoritative price feed with ordered fallback across upstream sources
//! - Deterministic round scheduling from an epoch anchor
//! - Stale-rejecting price capture at round boundaries
//! - A bet ledger with one bet per user per round
//! - Exactly-once pari-mutuel settlement
//! - In-memory and SQLite round stores
//! - Read-only projections for display clients
//! - Logging and Prometheus metrics

pub mod cli;
pub mod clock;
pub mod config;
pub mod feed;
pub mod ledger;
pub mod query;
pub mod round;
pub mod settlement;
pub mod store;
pub mod telemetry;
