//! Configuration loading and validation.
//!
//! Bots are declared in a TOML file (`[[bots]]` tables); venue
//! credentials come from the environment and never live in the file.
//! Invalid bot parameters are rejected at load time and again on every
//! hot reload, keeping the previous values in force.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use arb_exchange::VenueCredentials;

use crate::execution::EntryConfig;

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Configuration for a single bot (one symbol across two venues).
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Stable identifier; generated when the file omits it.
    pub id: String,
    pub symbol: String,
    pub exchange_a: String,
    pub exchange_b: String,
    /// Spread threshold at which the validator may arm, percent.
    pub entry_start_pct: Decimal,
    /// Spread at which fire intensity saturates, percent.
    pub entry_full_pct: Decimal,
    /// Base-asset quantity to accumulate.
    pub target_amount: Decimal,
    /// Per-leg walk-the-book slippage cap, percent.
    pub max_slippage_pct: Decimal,
    /// Minimum gap between consecutive fires.
    pub refill_delay_ms: i64,
    /// Anti-fakeout dwell time.
    pub min_validity_ms: i64,
    /// Polling cadence.
    pub poll_interval_ms: u64,
    /// Prefer the venues' push feeds; falls back to polling on failure.
    pub use_push_feed: bool,
    /// Never submit orders; log and count instead.
    pub dry_run: bool,
    /// Combined round-trip fees in basis points.
    pub fee_bps: Decimal,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            symbol: "ETH-USD".into(),
            exchange_a: "paradex".into(),
            exchange_b: "extended".into(),
            entry_start_pct: Decimal::new(5, 1),   // 0.5%
            entry_full_pct: Decimal::ONE,          // 1.0%
            target_amount: Decimal::new(15, 0),
            max_slippage_pct: Decimal::new(5, 2),  // 0.05%
            refill_delay_ms: 500,
            min_validity_ms: 100,
            poll_interval_ms: 50,
            use_push_feed: false,
            dry_run: true,
            fee_bps: Decimal::new(5, 0),
        }
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(invalid("symbol must not be empty"));
        }
        if self.exchange_a.is_empty() || self.exchange_b.is_empty() {
            return Err(invalid("both exchanges must be set"));
        }
        if self.exchange_a == self.exchange_b {
            return Err(invalid("exchange_a and exchange_b must differ"));
        }
        if self.entry_start_pct <= Decimal::ZERO {
            return Err(invalid("entry_start_pct must be positive"));
        }
        if self.entry_full_pct < self.entry_start_pct {
            return Err(invalid("entry_full_pct must be >= entry_start_pct"));
        }
        if self.target_amount <= Decimal::ZERO {
            return Err(invalid("target_amount must be positive"));
        }
        if self.max_slippage_pct <= Decimal::ZERO {
            return Err(invalid("max_slippage_pct must be positive"));
        }
        if self.refill_delay_ms < 0 || self.min_validity_ms < 0 {
            return Err(invalid("millisecond fields must be non-negative"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be positive"));
        }
        if self.fee_bps < Decimal::ZERO {
            return Err(invalid("fee_bps must be non-negative"));
        }
        Ok(())
    }

    /// Entry parameters for the execution manager.
    pub fn entry_config(&self) -> EntryConfig {
        EntryConfig {
            entry_start_pct: self.entry_start_pct,
            entry_full_pct: self.entry_full_pct,
            target_amount: self.target_amount,
            max_slippage_pct: self.max_slippage_pct,
            refill_delay_ms: self.refill_delay_ms,
            min_validity_ms: self.min_validity_ms,
        }
    }

    /// Books older than this are treated as no-opportunity.
    pub fn stale_book_ms(&self) -> i64 {
        (self.poll_interval_ms as i64) * 5
    }
}

/// Per-venue credential block.
#[derive(Debug, Clone, Default)]
pub struct VenuesConfig {
    pub paradex: VenueCredentials,
    pub extended: VenueCredentials,
}

impl VenuesConfig {
    pub fn for_venue(&self, exchange_id: &str) -> VenueCredentials {
        match exchange_id {
            "paradex" => self.paradex.clone(),
            "extended" => self.extended.clone(),
            _ => VenueCredentials::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub venues: VenuesConfig,
    pub bots: Vec<BotConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            venues: VenuesConfig::default(),
            bots: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlConfig = toml::from_str(content)?;
        Ok(Self::from(file))
    }

    /// Pull venue credentials from the environment. Values in the
    /// environment always win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PARADEX_API_KEY") {
            self.venues.paradex.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("PARADEX_API_SECRET") {
            self.venues.paradex.api_secret = Some(secret);
        }
        if let Ok(key) = std::env::var("EXTENDED_API_KEY") {
            self.venues.extended.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("EXTENDED_API_SECRET") {
            self.venues.extended.api_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bots.is_empty() {
            return Err(invalid("at least one bot must be configured"));
        }
        for bot in &self.bots {
            bot.validate()?;
        }
        let mut ids: Vec<&str> = self.bots.iter().map(|b| b.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.bots.len() {
            return Err(invalid("bot ids must be unique"));
        }
        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    bots: Vec<BotToml>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BotToml {
    id: Option<String>,
    symbol: String,
    exchange_a: String,
    exchange_b: String,
    entry_start_pct: f64,
    entry_full_pct: f64,
    target_amount: f64,
    max_slippage_pct: f64,
    refill_delay_ms: i64,
    min_validity_ms: i64,
    poll_interval_ms: u64,
    use_push_feed: bool,
    dry_run: bool,
    fee_bps: f64,
}

impl Default for BotToml {
    fn default() -> Self {
        Self {
            id: None,
            symbol: "ETH-USD".into(),
            exchange_a: "paradex".into(),
            exchange_b: "extended".into(),
            entry_start_pct: 0.5,
            entry_full_pct: 1.0,
            target_amount: 15.0,
            max_slippage_pct: 0.05,
            refill_delay_ms: 500,
            min_validity_ms: 100,
            poll_interval_ms: 50,
            use_push_feed: false,
            dry_run: true,
            fee_bps: 5.0,
        }
    }
}

/// Convert an f64 config value to Decimal, clamping unparseable input
/// to zero so validation rejects it with a clear message.
fn f64_to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO)
}

impl From<TomlConfig> for AppConfig {
    fn from(toml: TomlConfig) -> Self {
        let bots = toml
            .bots
            .into_iter()
            .map(|b| BotConfig {
                id: b
                    .id
                    .unwrap_or_else(|| format!("{}-{}-{}", b.symbol, b.exchange_a, b.exchange_b)),
                symbol: b.symbol,
                exchange_a: b.exchange_a,
                exchange_b: b.exchange_b,
                entry_start_pct: f64_to_decimal(b.entry_start_pct),
                entry_full_pct: f64_to_decimal(b.entry_full_pct),
                target_amount: f64_to_decimal(b.target_amount),
                max_slippage_pct: f64_to_decimal(b.max_slippage_pct),
                refill_delay_ms: b.refill_delay_ms,
                min_validity_ms: b.min_validity_ms,
                poll_interval_ms: b.poll_interval_ms,
                use_push_feed: b.use_push_feed,
                dry_run: b.dry_run,
                fee_bps: f64_to_decimal(b.fee_bps),
            })
            .collect();

        Self {
            log_level: toml.general.log_level,
            venues: VenuesConfig::default(),
            bots,
        }
    }
}
