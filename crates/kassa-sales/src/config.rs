//! # Sales Configuration
//!
//! Configuration management for the sale engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASSA_DB_PATH=/var/lib/kassa/kassa.db                              │
//! │     KASSA_DEFAULT_TAX_RATE=18                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kassa/kassa.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.kassa.kassa/kassa.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     18% default tax, CASH payments, local receipts directory           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # kassa.toml
//! [database]
//! path = "kassa.db"
//! max_connections = 5
//!
//! [tax]
//! default_rate_percent = "18"
//! zero_rate = "fallback"  # fallback | exempt
//!
//! [sales]
//! default_payment_method = "CASH"
//! max_cart_lines = 100
//!
//! [receipts]
//! storage_dir = "receipts"
//! base_url = "https://files.example.com/"  # optional
//! poll_interval_secs = 30
//! batch_size = 50
//! max_attempts = 5
//! channel_capacity = 256
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use kassa_core::{PaymentMethod, TaxPolicy, TaxRate, ZeroRatePolicy, MAX_CART_LINES};
use kassa_db::DbConfig;

use crate::error::{ConfigError, ConfigResult};
use crate::orchestrator::SalePolicy;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, created on first start.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("kassa.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Tax Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSettings {
    /// Rate (percent) used when a business has no usable tax configuration.
    ///
    /// Kept as a string so the file never goes through a float.
    #[serde(default = "default_rate_percent")]
    pub default_rate_percent: String,

    /// Meaning of an enabled 0% configuration.
    #[serde(default)]
    pub zero_rate: ZeroRatePolicy,
}

fn default_rate_percent() -> String {
    "18".to_string()
}

impl Default for TaxSettings {
    fn default() -> Self {
        TaxSettings {
            default_rate_percent: default_rate_percent(),
            zero_rate: ZeroRatePolicy::default(),
        }
    }
}

// =============================================================================
// Sales Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    /// Method recorded when the request does not name one.
    #[serde(default)]
    pub default_payment_method: PaymentMethod,

    #[serde(default = "default_max_cart_lines")]
    pub max_cart_lines: usize,
}

fn default_max_cart_lines() -> usize {
    MAX_CART_LINES
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            default_payment_method: PaymentMethod::default(),
            max_cart_lines: default_max_cart_lines(),
        }
    }
}

// =============================================================================
// Receipt Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSettings {
    /// Directory receipts are written to.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Public prefix of stored receipts. `file://` URLs when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Failed attempts after which a job is left alone.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sale ids buffered between the orchestrator and the worker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("receipts")
}
fn default_poll_interval() -> u64 {
    30
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> u32 {
    5
}
fn default_channel_capacity() -> usize {
    256
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        ReceiptSettings {
            storage_dir: default_storage_dir(),
            base_url: None,
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ReceiptSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// =============================================================================
// Main Sales Configuration
// =============================================================================

/// Complete sale engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub tax: TaxSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub receipts: ReceiptSettings,
}

impl SalesConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kassa.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sales config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sales config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sales config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.tax_policy()?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.sales.max_cart_lines == 0 || self.sales.max_cart_lines > MAX_CART_LINES {
            return Err(ConfigError::Invalid(format!(
                "sales.max_cart_lines must be between 1 and {}",
                MAX_CART_LINES
            )));
        }

        if let Some(ref url) = self.receipts.base_url {
            if !url.starts_with("http://")
                && !url.starts_with("https://")
                && !url.starts_with("file://")
            {
                return Err(ConfigError::Invalid(format!(
                    "receipts.base_url must start with http://, https:// or file://, got: {}",
                    url
                )));
            }
        }

        if self.receipts.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "receipts.batch_size must be greater than 0".into(),
            ));
        }
        if self.receipts.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "receipts.max_attempts must be greater than 0".into(),
            ));
        }
        if self.receipts.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "receipts.channel_capacity must be greater than 0".into(),
            ));
        }
        if self.receipts.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "receipts.poll_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("KASSA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(rate) = var("KASSA_DEFAULT_TAX_RATE") {
            debug!(rate = %rate, "Overriding default tax rate from environment");
            self.tax.default_rate_percent = rate;
        }

        if let Some(policy) = var("KASSA_ZERO_RATE_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.tax.zero_rate = parsed,
                Err(_) => warn!(policy = %policy, "Unknown zero-rate policy in environment"),
            }
        }

        if let Some(dir) = var("KASSA_RECEIPT_DIR") {
            self.receipts.storage_dir = PathBuf::from(dir);
        }

        if let Some(url) = var("KASSA_RECEIPT_BASE_URL") {
            debug!(url = %url, "Overriding receipt base URL from environment");
            self.receipts.base_url = Some(url);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kassa", "kassa")
            .map(|dirs| dirs.config_dir().join("kassa.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Parses the tax section.
    pub fn tax_policy(&self) -> ConfigResult<TaxPolicy> {
        let raw = self.tax.default_rate_percent.trim();
        let pct = Decimal::from_str(raw).map_err(|e| {
            ConfigError::Invalid(format!("tax.default_rate_percent '{}': {}", raw, e))
        })?;

        if pct.is_sign_negative() || pct > Decimal::ONE_HUNDRED {
            return Err(ConfigError::Invalid(format!(
                "tax.default_rate_percent must be between 0 and 100, got {}",
                pct
            )));
        }

        Ok(TaxPolicy {
            default_rate: TaxRate::from_percentage(pct),
            zero_rate: self.tax.zero_rate,
        })
    }

    /// Sale-time settings handed to the orchestrator.
    pub fn sale_policy(&self) -> ConfigResult<SalePolicy> {
        Ok(SalePolicy {
            tax: self.tax_policy()?,
            default_payment_method: self.sales.default_payment_method,
            max_cart_lines: self.sales.max_cart_lines,
        })
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}
