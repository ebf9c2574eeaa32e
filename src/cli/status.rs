//! Status command implementation

use super::context::Services;
use crate::config::Config;
use chrono::{TimeZone, Utc};
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also show this user's bet in the live round
    #[arg(short, long)]
    pub user: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

fn format_ms(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let services = Services::connect(config)?;
        let live = services.queries.live_round().await?;
        let upcoming = services
            .queries
            .upcoming(config.display.upcoming_rounds)
            .await?;
        let user_bet = match &self.user {
            Some(user) => services.queries.user_live_bet(user).await?,
            None => None,
        };

        if self.json {
            let out = serde_json::json!({
                "live": live,
                "upcoming": upcoming,
                "user_bet": user_bet,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        match &live {
            Some(round) => {
                println!("Live round #{}", round.round_number);
                println!(
                    "  Window: {} - {}",
                    format_ms(round.start_time),
                    format_ms(round.end_time)
                );
                if let Some(price) = round.start_price {
                    println!("  Start price: {}", price);
                }
                println!("  Time left: {}s", round.time_left_ms / 1_000);
                if !round.accepting_bets {
                    println!("  Betting closed, awaiting settlement");
                }
                for (token, pool) in &round.pools {
                    println!(
                        "  Pool {}: up={} down={} total={}",
                        token,
                        pool.up,
                        pool.down,
                        pool.total()
                    );
                }
            }
            None => println!("No live round"),
        }

        if !upcoming.is_empty() {
            println!("Upcoming:");
            for round in &upcoming {
                println!(
                    "  #{} starts {} (in {}s)",
                    round.round_number,
                    format_ms(round.start_time),
                    round.starts_in_ms / 1_000
                );
            }
        }

        if let Some(user) = &self.user {
            match user_bet {
                Some(bet) => println!(
                    "Bet for {}: {} {} {}",
                    user, bet.direction, bet.stake, bet.token
                ),
                None => println!("No bet for {} in the live round", user),
            }
        }

        Ok(())
    }
}
