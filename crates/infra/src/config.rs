//! Configuration loading and representation.
//!
//! Values come from the process environment (see [`ServiceConfig::from_env`]);
//! every field has a default so an empty environment yields a working
//! in-memory service.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Configuration error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// How the first row of a feed is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPolicy {
    /// Skip the first row only when it reads `name,price`.
    #[default]
    Auto,
    /// The first row is always a header.
    Present,
    /// The first row is always data.
    Absent,
}

impl HeaderPolicy {
    /// Whether the first row, already split into fields, should be skipped.
    pub fn skips(&self, first_row: &[String]) -> bool {
        match self {
            HeaderPolicy::Present => true,
            HeaderPolicy::Absent => false,
            HeaderPolicy::Auto => matches!(
                first_row,
                [name, price]
                    if name.trim().eq_ignore_ascii_case("name")
                        && price.trim().eq_ignore_ascii_case("price")
            ),
        }
    }
}

impl FromStr for HeaderPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(HeaderPolicy::Auto),
            "present" | "yes" | "true" => Ok(HeaderPolicy::Present),
            "absent" | "no" | "false" => Ok(HeaderPolicy::Absent),
            other => Err(ConfigError::Invalid {
                key: "PRICEFEED_HEADER",
                reason: format!("expected auto, present or absent, got '{other}'"),
            }),
        }
    }
}

impl fmt::Display for HeaderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeaderPolicy::Auto => "auto",
            HeaderPolicy::Present => "present",
            HeaderPolicy::Absent => "absent",
        })
    }
}

/// Ingest pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of classifier workers.
    pub workers: usize,
    /// Capacity of every inter-stage queue.
    pub queue_capacity: usize,
    pub header: HeaderPolicy,
    /// Compare-and-swap attempts per price change before giving up.
    pub max_price_swaps: u32,
    pub request_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 1,
            header: HeaderPolicy::Auto,
            max_price_swaps: 3,
            request_timeout_secs: 30,
        }
    }
}

impl IngestConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_header(mut self, header: HeaderPolicy) -> Self {
        self.header = header;
        self
    }

    pub fn with_max_price_swaps(mut self, swaps: u32) -> Self {
        self.max_price_swaps = swaps;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if self.max_price_swaps == 0 {
            return Err(ConfigError::Zero("max_price_swaps"));
        }
        Ok(())
    }
}

/// Whole-service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    /// Postgres URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub ingest: IngestConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            ingest: IngestConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = IngestConfig::default();

        let config = Self {
            bind_addr: get("PRICEFEED_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: get("DATABASE_URL"),
            ingest: IngestConfig {
                workers: parse_or("PRICEFEED_WORKERS", get("PRICEFEED_WORKERS"), defaults.workers)?,
                queue_capacity: parse_or(
                    "PRICEFEED_QUEUE_CAPACITY",
                    get("PRICEFEED_QUEUE_CAPACITY"),
                    defaults.queue_capacity,
                )?,
                header: match get("PRICEFEED_HEADER") {
                    Some(raw) => raw.parse()?,
                    None => defaults.header,
                },
                max_price_swaps: parse_or(
                    "PRICEFEED_MAX_PRICE_SWAPS",
                    get("PRICEFEED_MAX_PRICE_SWAPS"),
                    defaults.max_price_swaps,
                )?,
                request_timeout_secs: parse_or(
                    "PRICEFEED_REQUEST_TIMEOUT_SECS",
                    get("PRICEFEED_REQUEST_TIMEOUT_SECS"),
                    defaults.request_timeout_secs,
                )?,
            },
        };
        config.ingest.validate()?;
        Ok(config)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}
