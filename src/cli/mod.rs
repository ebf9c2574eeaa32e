//! CLI interface for updown-rounds
//!
//! Provides subcommands for:
//! - `run`: Drive the round lifecycle until Ctrl-C
//! - `status`: Show the live round and upcoming rounds
//! - `history`: Show recently settled rounds and user statistics
//! - `bet`: Place a bet
//! - `price`: Read the price feed
//! - `config`: Show the effective configuration

mod bet;
mod context;
mod history;
mod price;
mod run;
mod status;

pub use bet::BetArgs;
pub use context::Services;
pub use history::HistoryArgs;
pub use price::PriceArgs;
pub use run::RunArgs;
pub use status::StatusArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "updown-rounds")]
#[command(about = "Round lifecycle and settlement service for up/down price prediction games")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler and price poller
    Run(RunArgs),
    /// Show the live round and upcoming rounds
    Status(StatusArgs),
    /// Show recently settled rounds
    History(HistoryArgs),
    /// Place a bet in the live round
    Bet(BetArgs),
    /// Read the current price
    Price(PriceArgs),
    /// Show configuration
    Config,
}
