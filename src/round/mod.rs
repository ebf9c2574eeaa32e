//! Round lifecycle module
//!
//! Deterministic scheduling, boundary price capture and the scheduler that
//! drives rounds from Scheduled through Live to Settled.

mod capture;
mod schedule;
mod scheduler;
mod types;

pub use capture::{capture_price, CaptureError, CapturePolicy};
pub use schedule::RoundSchedule;
pub use scheduler::{
    RoundScheduler, SchedulerError, TickReport, DEFAULT_LOOKAHEAD, DEFAULT_RETAIN_SETTLED,
};
pub use types::{
    percentage_change, Direction, Pool, Round, RoundNumber, RoundResult, RoundStatus, Token,
};
