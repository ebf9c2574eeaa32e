//! Configuration types for updown-rounds

use crate::feed::{BINANCE_API_URL, COINGECKO_API_URL};
use crate::round::RoundSchedule;
use crate::telemetry::LogFormat;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration used when no config file exists
pub const BUNDLED_CONFIG: &str = include_str!("../config.toml.example");

/// Source names understood by the feed builder
pub const KNOWN_SOURCES: [&str; 2] = ["binance", "coingecko"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// The config file does not exist; any other failure means it exists but is unusable
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ConfigError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Price feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Binance ticker symbol
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// CoinGecko coin id
    #[serde(default = "default_coingecko_id")]
    pub coingecko_id: String,

    /// Sources in priority order
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    #[serde(default = "default_binance_url")]
    pub binance_url: String,

    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,

    /// Per-request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Background poll interval (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_symbol() -> String {
    "XRPUSDT".to_string()
}
fn default_coingecko_id() -> String {
    "ripple".to_string()
}
fn default_sources() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}
fn default_binance_url() -> String {
    BINANCE_API_URL.to_string()
}
fn default_coingecko_url() -> String {
    COINGECKO_API_URL.to_string()
}
fn default_request_timeout_ms() -> u64 {
    3_000
}
fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            coingecko_id: default_coingecko_id(),
            sources: default_sources(),
            binance_url: default_binance_url(),
            coingecko_url: default_coingecko_url(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Round grid configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Reference timestamp round 0 starts at (RFC 3339)
    #[serde(default = "default_epoch_anchor")]
    pub epoch_anchor: DateTime<Utc>,

    #[serde(default = "default_round_duration_secs")]
    pub round_duration_secs: u64,

    /// Future rounds kept pre-created in Scheduled state
    #[serde(default = "default_lookahead_rounds")]
    pub lookahead_rounds: u64,

    /// Scheduler tick interval (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_epoch_anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}
fn default_round_duration_secs() -> u64 {
    60
}
fn default_lookahead_rounds() -> u64 {
    6
}
fn default_tick_interval_ms() -> u64 {
    1_000
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            epoch_anchor: default_epoch_anchor(),
            round_duration_secs: default_round_duration_secs(),
            lookahead_rounds: default_lookahead_rounds(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl ScheduleConfig {
    /// The round grid, `None` for a zero duration
    pub fn round_schedule(&self) -> Option<RoundSchedule> {
        RoundSchedule::from_anchor(self.epoch_anchor, self.round_duration_secs)
    }
}

/// Boundary price capture retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds), doubled per attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    4_000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Store backend
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Round store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Optimistic-concurrency retries before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Settled rounds kept for history
    #[serde(default = "default_retain_settled")]
    pub retain_settled: usize,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retain_settled() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            max_retries: default_max_retries(),
            retain_settled: default_retain_settled(),
        }
    }
}

/// Display projection bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_recent_rounds")]
    pub recent_rounds: usize,

    #[serde(default = "default_upcoming_rounds")]
    pub upcoming_rounds: usize,
}

fn default_recent_rounds() -> usize {
    10
}
fn default_upcoming_rounds() -> usize {
    6
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            recent_rounds: default_recent_rounds(),
            upcoming_rounds: default_upcoming_rounds(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.schedule.round_duration_secs == 0 {
            return invalid("schedule.round_duration_secs must be positive");
        }
        if self.schedule.lookahead_rounds == 0 {
            return invalid("schedule.lookahead_rounds must be positive");
        }
        if self.schedule.tick_interval_ms == 0 {
            return invalid("schedule.tick_interval_ms must be positive");
        }
        if self.capture.max_attempts == 0 {
            return invalid("capture.max_attempts must be positive");
        }
        if self.feed.poll_interval_ms == 0 || self.feed.poll_interval_ms >= 5_000 {
            return invalid("feed.poll_interval_ms must be between 1 and 4999");
        }
        if self.feed.sources.is_empty() {
            return invalid("feed.sources must list at least one source");
        }
        if let Some(unknown) = self
            .feed
            .sources
            .iter()
            .find(|s| !KNOWN_SOURCES.contains(&s.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "unknown price source {:?}, expected one of {:?}",
                unknown, KNOWN_SOURCES
            )));
        }
        if self.store.retain_settled == 0 {
            return invalid("store.retain_settled must be positive");
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return invalid("store.path is required for the sqlite backend");
        }
        Ok(())
    }
}
