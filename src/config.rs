//! Configuration module
//!
//! TOML-based persistent configuration with auto-creation and defaults.
//! The embedding firmware loads this at boot and hands the relevant
//! sections to the charge-point components.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root charge-point configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargePointConfig {
    /// Station hardware layout
    #[serde(default)]
    pub station: StationConfig,

    /// Transaction delivery policy
    #[serde(default)]
    pub transaction: TransactionConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Station hardware layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Number of physical connectors (connector 0 is implicit)
    #[serde(default = "default_connector_count")]
    pub connector_count: u32,
}

/// Transaction delivery policy, mirroring the standard OCPP 1.6
/// configuration keys TransactionMessageAttempts and
/// TransactionMessageRetryInterval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Retries granted to the head of the transaction queue before it
    /// is dropped (on top of the initial failed attempt)
    #[serde(default = "default_message_attempts")]
    pub message_attempts: u32,

    /// Flat delay between retries, in seconds
    #[serde(default = "default_message_retry_interval")]
    pub message_retry_interval: u64,

    /// Whether a station-wide reservation (connector 0) may be consumed
    /// by a transaction started on any connector
    #[serde(default)]
    pub reserve_connector_zero: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default value helpers ──────────────────────────────────────

fn default_connector_count() -> u32 {
    1
}
fn default_message_attempts() -> u32 {
    3
}
fn default_message_retry_interval() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}

// ── Trait implementations ──────────────────────────────────────

impl Default for ChargePointConfig {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            transaction: TransactionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            connector_count: default_connector_count(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            message_attempts: default_message_attempts(),
            message_retry_interval: default_message_retry_interval(),
            reserve_connector_zero: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── File I/O ───────────────────────────────────────────────────

impl ChargePointConfig {
    /// Load configuration from a TOML file.
    /// If the file doesn't exist, creates one with defaults.
    /// Environment variables override TOML values (highest priority).
    pub fn load(path: &Path) -> Result<Self, String> {
        let mut cfg = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            toml::from_str(&content)
                .map_err(|e| format!("Invalid TOML in {}: {}", path.display(), e))?
        } else {
            let cfg = ChargePointConfig::default();
            cfg.save(path)?;
            cfg
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - `VOLTGRID_LOG_LEVEL` → `[logging].level`
    /// - `VOLTGRID_TX_ATTEMPTS` → `[transaction].message_attempts`
    /// - `VOLTGRID_TX_RETRY_INTERVAL` → `[transaction].message_retry_interval`
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VOLTGRID_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("VOLTGRID_TX_ATTEMPTS") {
            if let Ok(attempts) = v.parse::<u32>() {
                self.transaction.message_attempts = attempts;
            }
        }
        if let Ok(v) = std::env::var("VOLTGRID_TX_RETRY_INTERVAL") {
            if let Ok(interval) = v.parse::<u64>() {
                self.transaction.message_retry_interval = interval;
            }
        }
    }

    /// Validate the configuration for common mistakes.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.station.connector_count < 1 {
            errors.push("Connector count must be at least 1".to_string());
        }

        if self.transaction.message_attempts < 1 {
            errors.push("Transaction message attempts must be at least 1".to_string());
        }

        if self.transaction.message_retry_interval < 1 {
            errors.push(format!(
                "Transaction retry interval ({}) must be at least 1 second",
                self.transaction.message_retry_interval
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log level '{}'. Valid: {:?}",
                self.logging.level, valid_levels
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Configuration validation failed:\n  • {}",
                errors.join("\n  • ")
            ))
        }
    }

    /// Persist current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create dirs {}: {}", parent.display(), e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Serialization error: {}", e))?;

        let header = "# Voltgrid charge point configuration\n\
                      # Changes take effect after a restart.\n\n";

        std::fs::write(path, format!("{}{}", header, content))
            .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────
