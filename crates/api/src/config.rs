//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::ReviewType;
use fulfillment::{FulfillmentConfig, ModerationConfig};
use resilience::{DependencyPolicy, IntegrityPolicy};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
}

/// Endpoint and credentials of an HTTP collaborator. Absent means the
/// in-process stand-in is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementEndpoint {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorEndpoint {
    pub url: String,
    pub token: String,
    pub shop_id: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for plain text
/// - `DATABASE_URL`: Postgres connection string; absent uses the in-memory store
/// - `MODERATION_ENABLED`, `MODERATION_REVIEW_TYPE`
/// - `ENHANCEMENT_URL`, `ENHANCEMENT_API_KEY`
/// - `VENDOR_API_URL`, `VENDOR_API_TOKEN`, `VENDOR_SHOP_ID`
/// - `{ENHANCEMENT,VENDOR,STORAGE}_BREAKER_THRESHOLD`, `_BREAKER_COOLDOWN_SECS`,
///   `_CALL_TIMEOUT_SECS`, `_MAX_CONCURRENT`, `_QUEUE_TIMEOUT_SECS`
/// - `INTEGRITY_MIN_RATIO`, `INTEGRITY_MAX_RATIO`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub json_logs: bool,
    pub database_url: Option<String>,
    pub enhancement: Option<EnhancementEndpoint>,
    pub vendor: Option<VendorEndpoint>,
    pub fulfillment: FulfillmentConfig,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = FulfillmentConfig::default();

        let moderation = ModerationConfig {
            enabled: env.parse("MODERATION_ENABLED")?.unwrap_or(false),
            review_type: match env.get("MODERATION_REVIEW_TYPE") {
                Some(value) => ReviewType::from_str(&value).map_err(|_| ConfigError {
                    var: "MODERATION_REVIEW_TYPE".to_string(),
                    value,
                })?,
                None => defaults.moderation.review_type,
            },
        };

        let integrity = IntegrityPolicy {
            min_size_ratio: env
                .parse("INTEGRITY_MIN_RATIO")?
                .unwrap_or(defaults.integrity.min_size_ratio),
            max_size_ratio: env
                .parse("INTEGRITY_MAX_RATIO")?
                .unwrap_or(defaults.integrity.max_size_ratio),
            ..defaults.integrity
        };

        let fulfillment = FulfillmentConfig {
            moderation,
            enhancement: env.policy("ENHANCEMENT", defaults.enhancement)?,
            vendor: env.policy("VENDOR", defaults.vendor)?,
            storage: env.policy("STORAGE", defaults.storage)?,
            integrity,
            ..defaults
        };

        let enhancement = env.get("ENHANCEMENT_URL").map(|url| EnhancementEndpoint {
            url,
            api_key: env.get("ENHANCEMENT_API_KEY").unwrap_or_default(),
        });
        let vendor = env.get("VENDOR_API_URL").map(|url| VendorEndpoint {
            url,
            token: env.get("VENDOR_API_TOKEN").unwrap_or_default(),
            shop_id: env.get("VENDOR_SHOP_ID").unwrap_or_default(),
        });

        Ok(Self {
            host: env.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env.parse("PORT")?.unwrap_or(3000),
            log_level: env.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            json_logs: env
                .get("LOG_FORMAT")
                .is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: env.get("DATABASE_URL"),
            enhancement,
            vendor,
            fulfillment,
        })
    }

    /// Pipeline settings for the configured collaborators. Without an
    /// enhancement endpoint there is nothing to enhance with, so originals
    /// are sent as they are.
    pub fn pipeline(&self) -> FulfillmentConfig {
        let fulfillment = self.fulfillment.clone();
        if self.enhancement.is_none() {
            return fulfillment.without_enhancement();
        }
        fulfillment
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            json_logs: false,
            database_url: None,
            enhancement: None,
            vendor: None,
            fulfillment: FulfillmentConfig::default(),
        }
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|_| ConfigError {
                    var: key.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }

    fn policy(&self, prefix: &str, default: DependencyPolicy) -> Result<DependencyPolicy, ConfigError> {
        let mut policy = default;
        if let Some(threshold) = self.parse::<u32>(&format!("{prefix}_BREAKER_THRESHOLD"))? {
            policy.breaker.failure_threshold = threshold.max(1);
        }
        if let Some(cooldown) = self.secs(&format!("{prefix}_BREAKER_COOLDOWN_SECS"))? {
            policy.breaker.cooldown = cooldown;
        }
        if let Some(timeout) = self.secs(&format!("{prefix}_CALL_TIMEOUT_SECS"))? {
            policy = policy.with_call_timeout(timeout);
        }
        if let Some(max) = self.parse::<usize>(&format!("{prefix}_MAX_CONCURRENT"))? {
            policy = policy.with_max_concurrent(max);
        }
        if let Some(timeout) = self.secs(&format!("{prefix}_QUEUE_TIMEOUT_SECS"))? {
            policy = policy.with_queue_timeout(timeout);
        }
        Ok(policy)
    }
}
