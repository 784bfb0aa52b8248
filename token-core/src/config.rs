//! Configuration for the token market

use crate::types::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Market configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Token metadata and starting indices
    pub market: MarketConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "token-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            market: MarketConfig::default(),
            actor: ActorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Token metadata and starting indices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Borrow index of a fresh debt token
    pub initial_borrow_index: Amount,

    /// Liquidity index of a fresh receipt token
    pub initial_liquidity_index: Amount,

    /// Base asset name
    pub base_name: String,

    /// Base asset symbol
    pub base_symbol: String,

    /// Receipt token name
    pub receipt_name: String,

    /// Receipt token symbol
    pub receipt_symbol: String,

    /// Debt token name
    pub debt_name: String,

    /// Debt token symbol
    pub debt_symbol: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_borrow_index: Decimal::ONE,
            initial_liquidity_index: Decimal::ONE,
            base_name: crate::rebasing::DEFAULT_NAME.to_string(),
            base_symbol: crate::rebasing::DEFAULT_SYMBOL.to_string(),
            receipt_name: crate::receipt::DEFAULT_NAME.to_string(),
            receipt_symbol: crate::receipt::DEFAULT_SYMBOL.to_string(),
            debt_name: crate::debt::DEFAULT_NAME.to_string(),
            debt_symbol: crate::debt::DEFAULT_SYMBOL.to_string(),
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Log every market operation at `info` instead of `debug`
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML document
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(level) = std::env::var("TOKEN_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(verbose) = std::env::var("TOKEN_VERBOSE") {
            config.logging.verbose = matches!(verbose.as_str(), "1" | "true" | "yes");
        }

        if let Ok(capacity) = std::env::var("TOKEN_MAILBOX_CAPACITY") {
            config.actor.mailbox_capacity = capacity.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid TOKEN_MAILBOX_CAPACITY: {}", e))
            })?;
        }

        if let Ok(index) = std::env::var("TOKEN_BORROW_INDEX") {
            config.market.initial_borrow_index = parse_amount("TOKEN_BORROW_INDEX", &index)?;
        }

        if let Ok(index) = std::env::var("TOKEN_LIQUIDITY_INDEX") {
            config.market.initial_liquidity_index = parse_amount("TOKEN_LIQUIDITY_INDEX", &index)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engines cannot start from
    pub fn validate(&self) -> crate::Result<()> {
        if self.market.initial_borrow_index.is_sign_negative()
            && !self.market.initial_borrow_index.is_zero()
        {
            return Err(crate::Error::Config(format!(
                "initial_borrow_index must be non-negative, got {}",
                self.market.initial_borrow_index
            )));
        }
        if self.market.initial_liquidity_index <= Decimal::ZERO {
            return Err(crate::Error::Config(format!(
                "initial_liquidity_index must be positive, got {}",
                self.market.initial_liquidity_index
            )));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_amount(name: &str, value: &str) -> crate::Result<Amount> {
    Decimal::from_str(value)
        .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", name, e)))
}
