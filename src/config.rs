use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::guard::DepartmentBaseline;

/// Application configuration, layered from `registrar.toml` (optional) and
/// `REGISTRAR_`-prefixed environment variables, environment winning.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root URL of the portal, e.g. `https://portal.example.edu/aisis/`.
    /// Must end with a trailing slash so relative paths join correctly.
    pub base_url: String,

    /// Portal account the pipeline authenticates as.
    pub principal: Option<String>,
    pub secret: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: u64,

    /// Concurrency ceiling for crawl batches.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    /// Pacing delay between term-discovery probes.
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,

    /// Fractional per-department drop that counts as a regression.
    #[serde(default = "default_drop_threshold")]
    pub drop_threshold: f64,

    /// Where baseline snapshots are persisted. No drift comparison across
    /// runs when unset.
    #[serde(default)]
    pub baseline_path: Option<PathBuf>,

    /// Declared per-department sanity baselines.
    #[serde(default)]
    pub baselines: HashMap<String, DepartmentBaseline>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_http_timeout_secs() -> u64 {
    45
}

fn default_session_ttl_minutes() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    8
}

fn default_inter_batch_delay_ms() -> u64 {
    1000
}

fn default_probe_delay_ms() -> u64 {
    1500
}

fn default_drop_threshold() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("registrar.toml"))
            .merge(Env::prefixed("REGISTRAR_"))
            .extract()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_minutes * 60)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }
}
