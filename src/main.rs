use clap::Parser;
use updown_rounds::cli::{Cli, Commands};
use updown_rounds::config::{Config, BUNDLED_CONFIG};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) if e.is_missing_file() => {
            eprintln!("Warning: {} not found, using bundled default configuration", cli.config);
            Config::from_toml(BUNDLED_CONFIG)?
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("Invalid config {}", cli.config)))
        }
    };

    // Initialize telemetry
    let _telemetry = updown_rounds::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting round service");
            args.execute(&config).await?;
        }
        Commands::Status(args) => args.execute(&config).await?,
        Commands::History(args) => args.execute(&config).await?,
        Commands::Bet(args) => args.execute(&config).await?,
        Commands::Price(args) => args.execute(&config).await?,
        Commands::Config => {
            println!("# Effective configuration");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
