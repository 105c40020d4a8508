use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub venue_a: VenueConfig,
    #[serde(default = "VenueConfig::default_venue_b")]
    pub venue_b: VenueConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Optional — the service runs on the in-memory store when absent.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Must mirror the per-field serde defaults above.
        Self {
            server: ServerConfig::default(),
            scheduler: SchedulerConfig::default(),
            engine: EngineConfig::default(),
            venue_a: VenueConfig::default(),
            venue_b: VenueConfig::default_venue_b(),
            settlement: SettlementConfig::default(),
            database: None,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent in-flight executions
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum admissions per rolling window (excess submissions wait)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Rolling admission window in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// First retry delay in milliseconds; doubles per attempt
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Completed/failed job records retained for observability
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Hard ceiling on attempts per order, above the engine's own retry
    /// budget. Stops a store outage from re-queueing an order forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_rate_limit() -> usize {
    100
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_history_limit() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
            retry_base_ms: default_retry_base_ms(),
            history_limit: default_history_limit(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl SchedulerConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Exponential backoff: 1s, 2s, 4s... measured from the failure time
    /// of the previous attempt.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_ms << exponent)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Per-venue quote timeout in milliseconds
    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    /// Simulated transaction-construction delay in milliseconds
    #[serde(default = "default_build_delay_ms")]
    pub build_delay_ms: u64,
    /// Attempts before an order fails terminally
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_quote_timeout_ms() -> u64 {
    5000
}

fn default_build_delay_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_timeout_ms: default_quote_timeout_ms(),
            build_delay_ms: default_build_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl EngineConfig {
    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }

    pub fn build_delay(&self) -> Duration {
        Duration::from_millis(self.build_delay_ms)
    }
}

/// Mock venue envelopes. Price offsets are drawn from
/// [variance_min, variance_max] around the shared reference price, with
/// random sign; liquidity from [liquidity_min, liquidity_max].
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Fee as a fraction (0.003 = 0.3%)
    pub fee: Decimal,
    pub variance_min: f64,
    pub variance_max: f64,
    pub liquidity_min: f64,
    pub liquidity_max: f64,
    /// Simulated quote latency in milliseconds
    #[serde(default = "default_venue_latency_ms")]
    pub latency_ms: u64,
}

fn default_venue_latency_ms() -> u64 {
    200
}

impl Default for VenueConfig {
    fn default() -> Self {
        // Venue A profile
        Self {
            fee: dec!(0.003),
            variance_min: 0.02,
            variance_max: 0.04,
            liquidity_min: 1_000_000.0,
            liquidity_max: 10_000_000.0,
            latency_ms: default_venue_latency_ms(),
        }
    }
}

impl VenueConfig {
    pub fn default_venue_b() -> Self {
        Self {
            fee: dec!(0.002),
            variance_min: 0.03,
            variance_max: 0.05,
            liquidity_min: 500_000.0,
            liquidity_max: 8_000_000.0,
            latency_ms: default_venue_latency_ms(),
        }
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Probability that a settlement attempt fails transiently
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

fn default_failure_rate() -> f64 {
    0.05
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            failure_rate: default_failure_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SWAPR_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SWAPR_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("SWAPR")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.scheduler.max_concurrent == 0 {
            errors.push("scheduler.max_concurrent must be at least 1".to_string());
        }
        if self.scheduler.rate_limit == 0 {
            errors.push("scheduler.rate_limit must be at least 1".to_string());
        }
        if self.scheduler.rate_window_secs == 0 {
            errors.push("scheduler.rate_window_secs must be positive".to_string());
        }
        if self.scheduler.max_attempts == 0 {
            errors.push("scheduler.max_attempts must be at least 1".to_string());
        }
        if self.engine.max_retries == 0 {
            errors.push("engine.max_retries must be at least 1".to_string());
        }

        for (name, venue) in [("venue_a", &self.venue_a), ("venue_b", &self.venue_b)] {
            if venue.fee < Decimal::ZERO || venue.fee >= Decimal::ONE {
                errors.push(format!("{name}.fee must be in [0, 1)"));
            }
            if venue.variance_min < 0.0 || venue.variance_max < venue.variance_min {
                errors.push(format!("{name}.variance envelope is inverted"));
            }
            if venue.liquidity_min <= 0.0 || venue.liquidity_max < venue.liquidity_min {
                errors.push(format!("{name}.liquidity envelope is inverted"));
            }
        }

        if !(0.0..=1.0).contains(&self.settlement.failure_rate) {
            errors.push("settlement.failure_rate must be in [0, 1]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
