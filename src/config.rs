use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_AGGREGATION_TIME, DEFAULT_COMPUTE_TIMEOUT_SECS, DEFAULT_DB_MAX_CONN,
    DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_PERSIST_TIMEOUT_SECS,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    pub enabled: bool,
    /// Daily trigger time as `HH:MM`, evaluated in the scheduler's time zone.
    pub time: String,
    pub compute_workers: usize,
    pub persist_workers: usize,
    pub compute_timeout_secs: u64,
    pub persist_timeout_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl AggregationConfig {
    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_secs)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout_secs)
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: DEFAULT_AGGREGATION_TIME.to_string(),
            compute_workers: available_parallelism(),
            persist_workers: DEFAULT_DB_MAX_CONN,
            compute_timeout_secs: DEFAULT_COMPUTE_TIMEOUT_SECS,
            persist_timeout_secs: DEFAULT_PERSIST_TIMEOUT_SECS,
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/aggregator.sled"),
            aggregation: AggregationConfig {
                enabled: env_or_bool("AGGREGATION_ENABLED", true),
                time: env_or("AGGREGATION_TIME", DEFAULT_AGGREGATION_TIME),
                compute_workers: env_or_parse(
                    "AGGREGATION_COMPUTE_WORKERS",
                    available_parallelism(),
                )
                .max(1),
                persist_workers: env_or_parse("DB_MAX_CONN", DEFAULT_DB_MAX_CONN).max(1),
                compute_timeout_secs: env_or_parse(
                    "AGGREGATION_COMPUTE_TIMEOUT_SECS",
                    DEFAULT_COMPUTE_TIMEOUT_SECS,
                ),
                persist_timeout_secs: env_or_parse(
                    "AGGREGATION_PERSIST_TIMEOUT_SECS",
                    DEFAULT_PERSIST_TIMEOUT_SECS,
                ),
                heartbeat_timeout_secs: env_or_parse(
                    "HEARTBEAT_TIMEOUT_SECS",
                    DEFAULT_HEARTBEAT_TIMEOUT_SECS,
                ),
            },
        }
    }
}

/// Number of processing cores, used to size the CPU-bound compute stage.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
