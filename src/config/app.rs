// src/config/app.rs
//! Process-level knobs read from the environment (after `.env` is loaded).

use std::time::Duration;

use crate::feeds::refresh::DEFAULT_REFRESH_CONCURRENCY;
use crate::pipeline::DEFAULT_GENERATION_TIMEOUT;

pub const ENV_GENERATION_TIMEOUT_SECS: &str = "GENERATION_TIMEOUT_SECS";
pub const ENV_REFRESH_CONCURRENCY: &str = "REFRESH_CONCURRENCY";
pub const ENV_HISTORY_CAPACITY: &str = "HISTORY_CAPACITY";

pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    pub generation_timeout: Duration,
    pub refresh_concurrency: usize,
    pub history_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Unset, unparsable or zero values keep their defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            generation_timeout: parse_positive(std::env::var(ENV_GENERATION_TIMEOUT_SECS).ok())
                .map(Duration::from_secs)
                .unwrap_or(d.generation_timeout),
            refresh_concurrency: parse_positive(std::env::var(ENV_REFRESH_CONCURRENCY).ok())
                .map(|v| v as usize)
                .unwrap_or(d.refresh_concurrency),
            history_capacity: parse_positive(std::env::var(ENV_HISTORY_CAPACITY).ok())
                .map(|v| v as usize)
                .unwrap_or(d.history_capacity),
        }
    }
}

fn parse_positive(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|v| *v > 0)
}
