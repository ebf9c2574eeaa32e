//! Bet command implementation

use super::context::Services;
use crate::config::Config;
use crate::round::{Direction, RoundNumber, Token};
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct BetArgs {
    /// User placing the bet
    #[arg(short, long)]
    pub user: String,

    /// up/down (bull/bear also accepted)
    #[arg(short, long)]
    pub direction: Direction,

    /// Stake amount
    #[arg(short, long)]
    pub stake: Decimal,

    /// Stake denomination
    #[arg(short, long, default_value = "xrp")]
    pub token: Token,

    /// Round to bet on; defaults to the round live right now
    #[arg(short, long)]
    pub round: Option<RoundNumber>,
}

impl BetArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let services = Services::connect(config)?;
        let round_number = match self.round {
            Some(n) => n,
            None => services
                .schedule
                .round_at(services.clock.now_ms())
                .context("no round is live before the epoch anchor")?,
        };

        let bet = services
            .ledger
            .place_bet(round_number, &self.user, self.direction, self.stake, self.token)
            .await?;

        println!(
            "Bet {} placed: round #{} {} {} {}",
            bet.id, bet.round_number, bet.direction, bet.stake, bet.token
        );
        Ok(())
    }
}
