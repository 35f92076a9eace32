//! Configuration types for scoreline
//!
//! Every section has defaults so a config file only needs `[[events]]` plus
//! whatever it wants to override. `Config::load` parses and validates; an
//! invalid file never reaches the first tick.

use crate::error::{Error, Result};
use crate::position::Side;
use crate::telemetry::LogFormat;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub hold_to_settlement: HoldToSettlementConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// Tick loop and fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,

    /// Maximum number of events synchronized concurrently
    #[serde(default = "default_max_parallel_syncs")]
    pub max_parallel_syncs: usize,

    /// Global minimum spacing between outbound feed requests
    #[serde(default = "default_min_request_spacing_ms")]
    pub min_request_spacing_ms: u64,

    /// Base backoff after a rate-limited answer without Retry-After
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_seconds: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,

    /// Start polling an event this many minutes before its start time
    #[serde(default = "default_pre_game_poll_minutes")]
    pub pre_game_poll_minutes: i64,

    /// Optional hard stop for the session
    #[serde(default)]
    pub max_session_minutes: Option<u64>,

    /// Upper bound on shutdown work (force-close + flush)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

fn default_tick_interval() -> u64 {
    60
}
fn default_max_parallel_syncs() -> usize {
    8
}
fn default_min_request_spacing_ms() -> u64 {
    250
}
fn default_rate_limit_backoff() -> u64 {
    30
}
fn default_max_backoff() -> u64 {
    300
}
fn default_pre_game_poll_minutes() -> i64 {
    10
}
fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
            max_parallel_syncs: default_max_parallel_syncs(),
            min_request_spacing_ms: default_min_request_spacing_ms(),
            rate_limit_backoff_seconds: default_rate_limit_backoff(),
            max_backoff_seconds: default_max_backoff(),
            pre_game_poll_minutes: default_pre_game_poll_minutes(),
            max_session_minutes: None,
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

/// Entry decision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Minimum classifier probability to open
    #[serde(default = "default_entry_threshold")]
    pub entry_threshold: f64,

    /// Contracts per position
    #[serde(default = "default_position_size")]
    pub position_size_contracts: u32,

    /// Open positions allowed per event
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_positions_per_event: usize,

    /// Contract side bought on entry
    #[serde(default)]
    pub side: Side,
}

fn default_entry_threshold() -> f64 {
    0.60
}
fn default_position_size() -> u32 {
    100
}
fn default_max_concurrent() -> usize {
    1
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            entry_threshold: default_entry_threshold(),
            position_size_contracts: default_position_size(),
            max_concurrent_positions_per_event: default_max_concurrent(),
            side: Side::default(),
        }
    }
}

/// Exchange fee schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Taker rate applied to every simulated fill
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Maker rate, informational only
    #[serde(default = "default_maker_fee_rate")]
    pub maker_fee_rate: Decimal,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(7, 2) // 0.07
}
fn default_maker_fee_rate() -> Decimal {
    Decimal::new(175, 4) // 0.0175
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            maker_fee_rate: default_maker_fee_rate(),
        }
    }
}

/// Feature window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Samples older than this are evicted
    #[serde(default = "default_horizon_minutes")]
    pub horizon_minutes: i64,

    /// History required before a feature vector is emitted
    #[serde(default = "default_min_window_minutes")]
    pub min_feature_window_minutes: i64,

    /// Window for the return volatility estimate
    #[serde(default = "default_volatility_minutes")]
    pub volatility_minutes: i64,

    /// Window for the mean-reversion momentum indicator
    #[serde(default = "default_momentum_minutes")]
    pub momentum_minutes: i64,

    /// Window for score-differential and scoring rates
    #[serde(default = "default_score_rate_minutes")]
    pub score_rate_minutes: i64,

    /// Game minutes remaining that count as late game
    #[serde(default = "default_late_game_minutes")]
    pub late_game_minutes: f64,

    /// Absolute score differential that counts as large
    #[serde(default = "default_large_score_diff")]
    pub large_score_diff: u32,

    /// Absolute score differential that counts as close
    #[serde(default = "default_close_game_diff")]
    pub close_game_diff: u32,

    /// Prices at or below this are extreme
    #[serde(default = "default_extreme_low")]
    pub extreme_price_low: f64,

    /// Prices at or above this are extreme
    #[serde(default = "default_extreme_high")]
    pub extreme_price_high: f64,
}

fn default_horizon_minutes() -> i64 {
    30
}
fn default_min_window_minutes() -> i64 {
    15
}
fn default_volatility_minutes() -> i64 {
    10
}
fn default_momentum_minutes() -> i64 {
    5
}
fn default_score_rate_minutes() -> i64 {
    3
}
fn default_late_game_minutes() -> f64 {
    5.0
}
fn default_large_score_diff() -> u32 {
    15
}
fn default_close_game_diff() -> u32 {
    5
}
fn default_extreme_low() -> f64 {
    0.10
}
fn default_extreme_high() -> f64 {
    0.90
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizon_minutes: default_horizon_minutes(),
            min_feature_window_minutes: default_min_window_minutes(),
            volatility_minutes: default_volatility_minutes(),
            momentum_minutes: default_momentum_minutes(),
            score_rate_minutes: default_score_rate_minutes(),
            late_game_minutes: default_late_game_minutes(),
            large_score_diff: default_large_score_diff(),
            close_game_diff: default_close_game_diff(),
            extreme_price_low: default_extreme_low(),
            extreme_price_high: default_extreme_high(),
        }
    }
}

/// Hold-to-settlement override thresholds
///
/// These were picked from a small number of observed games. Treat them as
/// tunables rather than policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldToSettlementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Held-contract price required to keep holding
    #[serde(default = "default_hold_min_probability")]
    pub min_probability: Decimal,

    /// Absolute score differential required
    #[serde(default = "default_hold_min_score_diff")]
    pub min_score_diff: u32,

    /// Final-period clock must be below this
    #[serde(default = "default_hold_cutoff")]
    pub time_remaining_cutoff_minutes: f64,
}

fn default_true() -> bool {
    true
}
fn default_hold_min_probability() -> Decimal {
    Decimal::new(95, 2) // 0.95
}
fn default_hold_min_score_diff() -> u32 {
    11
}
fn default_hold_cutoff() -> f64 {
    5.0
}

impl Default for HoldToSettlementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_probability: default_hold_min_probability(),
            min_score_diff: default_hold_min_score_diff(),
            time_remaining_cutoff_minutes: default_hold_cutoff(),
        }
    }
}

/// Game clock structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_period_minutes")]
    pub period_minutes: f64,
    #[serde(default = "default_regulation_periods")]
    pub regulation_periods: u32,
    #[serde(default = "default_overtime_minutes")]
    pub overtime_minutes: f64,
}

fn default_period_minutes() -> f64 {
    12.0
}
fn default_regulation_periods() -> u32 {
    4
}
fn default_overtime_minutes() -> f64 {
    5.0
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            period_minutes: default_period_minutes(),
            regulation_periods: default_regulation_periods(),
            overtime_minutes: default_overtime_minutes(),
        }
    }
}

/// Live feed endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_market_url")]
    pub market_base_url: String,
    #[serde(default = "default_event_url")]
    pub event_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_market_url() -> String {
    "http://127.0.0.1:8081".to_string()
}
fn default_event_url() -> String {
    "http://127.0.0.1:8082".to_string()
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            market_base_url: default_market_url(),
            event_base_url: default_event_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Which classifier backend to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Local logistic model with weights from a JSON file
    #[default]
    Logistic,
    /// Remote inference service
    Http,
}

/// Classifier and hold estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub kind: ModelKind,

    /// Weights file for the logistic model
    #[serde(default)]
    pub weights_path: Option<PathBuf>,

    /// Base URL of the inference service
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Hold duration used by the fixed estimator
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: u32,

    #[serde(default = "default_model_timeout")]
    pub request_timeout_secs: u64,
}

fn default_hold_minutes() -> u32 {
    8
}
fn default_model_timeout() -> u64 {
    5
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            weights_path: None,
            endpoint: None,
            hold_minutes: default_hold_minutes(),
            request_timeout_secs: default_model_timeout(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_true")]
    pub capture_enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Records buffered per kind before a flush
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Bound on records queued for the writer task
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_buffer_size() -> usize {
    500
}
fn default_flush_interval() -> u64 {
    60
}
fn default_channel_capacity() -> usize {
    10_000
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            output_dir: default_output_dir(),
            buffer_size: default_buffer_size(),
            flush_interval_secs: default_flush_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

/// One monitored event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub id: String,
    pub home: String,
    pub away: String,
    /// Market identifier for the "home team wins" contract
    pub market_ticker: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.validate_engine()?;
        self.validate_model()?;
        self.validate_events()
    }

    /// Checks for everything the scheduler consumes directly
    pub fn validate_engine(&self) -> Result<()> {
        if self.engine.tick_interval_seconds == 0 {
            return Err(Error::config("engine.tick_interval_seconds must be > 0"));
        }
        if self.engine.max_parallel_syncs == 0 {
            return Err(Error::config("engine.max_parallel_syncs must be > 0"));
        }
        check_unit("decision.entry_threshold", self.decision.entry_threshold)?;
        if self.decision.position_size_contracts == 0 {
            return Err(Error::config(
                "decision.position_size_contracts must be a positive integer",
            ));
        }
        if self.decision.max_concurrent_positions_per_event == 0 {
            return Err(Error::config(
                "decision.max_concurrent_positions_per_event must be a positive integer",
            ));
        }
        check_unit_decimal("fees.fee_rate", self.fees.fee_rate)?;
        check_unit_decimal("fees.maker_fee_rate", self.fees.maker_fee_rate)?;

        let w = &self.window;
        if w.min_feature_window_minutes <= 0 {
            return Err(Error::config(
                "window.min_feature_window_minutes must be > 0",
            ));
        }
        if w.horizon_minutes < w.min_feature_window_minutes {
            return Err(Error::config(format!(
                "window.horizon_minutes ({}) must cover min_feature_window_minutes ({})",
                w.horizon_minutes, w.min_feature_window_minutes
            )));
        }
        for (name, value) in [
            ("window.volatility_minutes", w.volatility_minutes),
            ("window.momentum_minutes", w.momentum_minutes),
            ("window.score_rate_minutes", w.score_rate_minutes),
        ] {
            if value <= 0 {
                return Err(Error::config(format!("{} must be > 0", name)));
            }
        }
        check_unit("window.extreme_price_low", w.extreme_price_low)?;
        check_unit("window.extreme_price_high", w.extreme_price_high)?;
        if w.extreme_price_low >= w.extreme_price_high {
            return Err(Error::config(
                "window.extreme_price_low must be below extreme_price_high",
            ));
        }

        let h = &self.hold_to_settlement;
        check_unit_decimal("hold_to_settlement.min_probability", h.min_probability)?;
        if h.time_remaining_cutoff_minutes.is_nan() || h.time_remaining_cutoff_minutes <= 0.0 {
            return Err(Error::config(
                "hold_to_settlement.time_remaining_cutoff_minutes must be > 0",
            ));
        }

        if self.game.period_minutes.is_nan()
            || self.game.period_minutes <= 0.0
            || self.game.regulation_periods == 0
        {
            return Err(Error::config("game clock must have positive periods"));
        }
        Ok(())
    }

    fn validate_model(&self) -> Result<()> {
        if self.model.hold_minutes == 0 {
            return Err(Error::config("model.hold_minutes must be > 0"));
        }
        match self.model.kind {
            ModelKind::Logistic if self.model.weights_path.is_none() => {
                return Err(Error::config(
                    "model.weights_path is required for the logistic model",
                ));
            }
            ModelKind::Http if self.model.endpoint.is_none() => {
                return Err(Error::config("model.endpoint is required for the http model"));
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_events(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for event in &self.events {
            if event.id.is_empty() || event.market_ticker.is_empty() {
                return Err(Error::config("events need an id and a market_ticker"));
            }
            if !seen.insert(event.id.as_str()) {
                return Err(Error::config(format!("duplicate event id {}", event.id)));
            }
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn check_unit_decimal(name: &str, value: Decimal) -> Result<()> {
    if value >= Decimal::ZERO && value <= Decimal::ONE {
        Ok(())
    } else {
        Err(Error::config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}
