//! History command implementation

use super::context::Services;
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Number of settled rounds to show
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Show statistics for this user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl HistoryArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let services = Services::connect(config)?;
        let limit = self.limit.unwrap_or(config.display.recent_rounds);
        let rounds = services.queries.recent_settled(limit).await?;
        let stats = match &self.user {
            Some(user) => Some(services.queries.user_stats(user).await?),
            None => None,
        };

        if self.json {
            let out = serde_json::json!({ "rounds": rounds, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        if rounds.is_empty() {
            println!("No settled rounds");
        }
        for round in &rounds {
            let result = round.result.map(|r| r.as_str()).unwrap_or("-");
            let change = round
                .percentage_change
                .map(|c| format!("{:.4}%", c))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "#{:<10} {:<5} {} -> {} ({})",
                round.round_number,
                result,
                round.start_price.map(|p| p.to_string()).unwrap_or_default(),
                round.end_price.map(|p| p.to_string()).unwrap_or_default(),
                change
            );
        }

        if let (Some(user), Some(stats)) = (&self.user, stats) {
            println!("Stats for {}:", user);
            for s in stats.iter().filter(|s| s.predictions > 0) {
                println!(
                    "  {}: {} predictions, {} won, {} lost, {} refunded, win rate {}%",
                    s.token, s.predictions, s.wins, s.losses, s.refunds, s.win_rate
                );
                println!(
                    "  {}: wagered {}, won {}, net {}",
                    s.token, s.total_wagered, s.total_winnings, s.net_profit
                );
            }
        }

        Ok(())
    }
}
