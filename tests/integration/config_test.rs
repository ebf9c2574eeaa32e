//! Configuration loaded from disk wires a working service graph

use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};
use updown_rounds::cli::Services;
use updown_rounds::config::{Config, ConfigError, StoreBackend, BUNDLED_CONFIG};
use updown_rounds::round::{Direction, RoundStatus, Token};

#[tokio::test]
async fn test_sqlite_config_builds_services() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("rounds.db");
    let file = dir.path().join("config.toml");
    let content = format!(
        r#"
[feed]
sources = ["coingecko"]

[schedule]
round_duration_secs = 30
lookahead_rounds = 2

[store]
backend = "sqlite"
path = "{}"
"#,
        db.display()
    );
    std::fs::write(&file, content).unwrap();

    let config = assert_ok!(Config::load(&file));
    assert_eq!(config.store.backend, StoreBackend::Sqlite);
    assert_eq!(config.feed.sources, vec!["coingecko".to_string()]);

    let services = assert_ok!(Services::build(&config));
    assert_eq!(services.schedule.round_duration_ms(), 30_000);

    let round = services.schedule.scheduled_round(7);
    assert!(services.store.insert_round(&round).await.unwrap());
    let stored = services.store.get_round(7).await.unwrap().unwrap();
    assert_eq!(stored.status, RoundStatus::Scheduled);
    assert_eq!(stored.end_time - stored.start_time, 30_000);
    assert!(db.exists());
}

#[test]
fn test_sqlite_backend_requires_path() {
    let result = Config::from_toml("[store]\nbackend = \"sqlite\"\n");
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = assert_err!(Config::load(dir.path().join("absent.toml")));
    assert!(matches!(err, ConfigError::Io(_)));
}

#[tokio::test]
async fn test_bundled_config_shares_rounds_between_processes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = assert_ok!(Config::from_toml(BUNDLED_CONFIG));
    config.store.path = Some(dir.path().join("rounds.db"));

    // one process drives rounds, another places bets and reads status
    let runner = assert_ok!(Services::build(&config));
    let client = assert_ok!(Services::connect(&config));

    let current = runner.schedule.round_at(runner.clock.now_ms()).unwrap();
    runner
        .store
        .insert_round(&runner.schedule.scheduled_round(current))
        .await
        .unwrap();
    runner.store.open_round(current, dec!(0.6250)).await.unwrap();

    let bet = assert_ok!(
        client
            .ledger
            .place_bet(current, "client-user", Direction::Up, dec!(5), Token::Xrp)
            .await
    );
    assert_eq!(bet.round_number, current);

    let live = client.queries.live_round().await.unwrap().unwrap();
    assert_eq!(live.round_number, current);
    assert_eq!(live.start_price, Some(dec!(0.6250)));

    let seen = runner.store.get_round(current).await.unwrap().unwrap();
    assert_eq!(seen.status, RoundStatus::Live);
    assert_eq!(seen.total_pool(Token::Xrp), dec!(5));
}

#[test]
fn test_client_commands_reject_memory_store() {
    let config = Config::default();
    assert_eq!(config.store.backend, StoreBackend::Memory);

    let err = assert_err!(Services::connect(&config).map(|_| ()));
    assert!(err.to_string().contains("sqlite"));
    assert_ok!(Services::build(&config).map(|_| ()));
}
