//! Deterministic round boundaries
//!
//! Round identity is a pure function of wall-clock time, the epoch anchor and
//! the round duration. Any process with the same configuration derives the
//! same round numbers and the same boundaries without coordination.

use super::{Round, RoundNumber};
use chrono::{DateTime, Utc};

/// Fixed round grid anchored at an epoch timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSchedule {
    epoch_anchor_ms: i64,
    round_duration_ms: i64,
}

impl RoundSchedule {
    /// Create a schedule. Returns `None` for a non-positive duration.
    pub fn new(epoch_anchor_ms: i64, round_duration_ms: i64) -> Option<Self> {
        if round_duration_ms <= 0 {
            return None;
        }
        Some(Self {
            epoch_anchor_ms,
            round_duration_ms,
        })
    }

    /// Create a schedule from a chrono anchor and a duration in seconds
    pub fn from_anchor(anchor: DateTime<Utc>, round_duration_secs: u64) -> Option<Self> {
        let duration_ms = i64::try_from(round_duration_secs).ok()?.checked_mul(1_000)?;
        Self::new(anchor.timestamp_millis(), duration_ms)
    }

    pub fn epoch_anchor_ms(&self) -> i64 {
        self.epoch_anchor_ms
    }

    pub fn round_duration_ms(&self) -> i64 {
        self.round_duration_ms
    }

    /// `epochAnchor + roundNumber * roundDuration`
    pub fn start_time(&self, round_number: RoundNumber) -> i64 {
        self.epoch_anchor_ms + round_number as i64 * self.round_duration_ms
    }

    /// `startTime + roundDuration`
    pub fn end_time(&self, round_number: RoundNumber) -> i64 {
        self.start_time(round_number) + self.round_duration_ms
    }

    /// Round whose window contains `now_ms`, `None` before the anchor
    pub fn round_at(&self, now_ms: i64) -> Option<RoundNumber> {
        let elapsed = now_ms.checked_sub(self.epoch_anchor_ms)?;
        if elapsed < 0 {
            return None;
        }
        Some((elapsed / self.round_duration_ms) as RoundNumber)
    }

    /// A fresh Scheduled round with boundaries taken from the grid
    pub fn scheduled_round(&self, round_number: RoundNumber) -> Round {
        Round::scheduled(
            round_number,
            self.start_time(round_number),
            self.end_time(round_number),
        )
    }
}
