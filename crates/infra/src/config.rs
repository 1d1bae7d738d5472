//! Invoicing configuration.
//!
//! Loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use portbill_invoicing::Level1InvalidationPolicy;
use portbill_observability::{LogFormat, LogSettings};

pub const DEFAULT_INVOICE_PREFIX: &str = "FAC-";

pub const ENV_LOG: &str = "PORTBILL_LOG";
pub const ENV_LOG_FORMAT: &str = "PORTBILL_LOG_FORMAT";
pub const ENV_INVOICE_PREFIX: &str = "PORTBILL_INVOICE_PREFIX";
pub const ENV_LEVEL1_INVALIDATION: &str = "PORTBILL_LEVEL1_INVALIDATION";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

impl ConfigError {
    fn invalid(key: &str, value: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicingConfig {
    pub log: LogSettings,
    /// Prefix of allocated invoice numbers.
    pub invoice_prefix: String,
    /// What invalidating level 1 does while level 2 is set.
    pub level1_invalidation: Level1InvalidationPolicy,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            level1_invalidation: Level1InvalidationPolicy::default(),
        }
    }
}

impl InvoicingConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(filter) = lookup(ENV_LOG) {
            if filter.trim().is_empty() {
                return Err(ConfigError::invalid(ENV_LOG, filter));
            }
            config.log.filter = filter;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.log.format =
                LogFormat::parse(&format).ok_or_else(|| ConfigError::invalid(ENV_LOG_FORMAT, format))?;
        }

        if let Some(prefix) = lookup(ENV_INVOICE_PREFIX) {
            if prefix.trim().is_empty() {
                return Err(ConfigError::invalid(ENV_INVOICE_PREFIX, prefix));
            }
            config.invoice_prefix = prefix;
        }

        if let Some(policy) = lookup(ENV_LEVEL1_INVALIDATION) {
            config.level1_invalidation = match policy.trim().to_ascii_lowercase().as_str() {
                "cascade" => Level1InvalidationPolicy::Cascade,
                "strict" => Level1InvalidationPolicy::Strict,
                _ => return Err(ConfigError::invalid(ENV_LEVEL1_INVALIDATION, policy)),
            };
        }

        Ok(config)
    }
}
