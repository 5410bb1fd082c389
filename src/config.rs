//! Configuration file handling.
//!
//! This module handles loading `.dexquery.toml` and merging it with
//! command-line overrides.

use crate::query::Query;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = ".dexquery.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Outbound pacing.
    #[serde(default)]
    pub rate: RateConfig,

    /// Scan settings.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Queries run by the `catalog` command.
    #[serde(default = "crate::query::default_catalog")]
    pub catalog: Vec<Query>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            api: ApiConfig::default(),
            fetch: FetchConfig::default(),
            rate: RateConfig::default(),
            scan: ScanConfig::default(),
            catalog: crate::query::default_catalog(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Write the report here instead of stdout.
    #[serde(default)]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Versioned API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://pokeapi.co/api/v2/".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("dexquery/{}", env!("CARGO_PKG_VERSION"))
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Attempts per resource, including the first. Clamped to 1..=10.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on every retry, up to 5s.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

/// Outbound pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Milliseconds between permits. 0 disables pacing.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Permits that may be granted back to back.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            burst: default_burst(),
        }
    }
}

fn default_interval_ms() -> u64 {
    100
}

fn default_burst() -> u32 {
    1
}

/// Scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Items probed at once within one scan.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deepest evolution chain accepted.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Per-query deadline in seconds; none when unset.
    #[serde(default)]
    pub deadline_seconds: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_chain_depth: default_max_chain_depth(),
            deadline_seconds: None,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_max_chain_depth() -> usize {
    crate::analysis::evolution::DEFAULT_MAX_DEPTH
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref base_url) = args.base_url {
            self.api.base_url = base_url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }
        if let Some(max_attempts) = args.max_attempts {
            self.fetch.max_attempts = max_attempts;
        }
        if let Some(interval) = args.rate_interval_ms {
            self.rate.interval_ms = interval;
        }
        if let Some(concurrency) = args.concurrency {
            self.scan.concurrency = concurrency;
        }
        if let Some(deadline) = args.deadline {
            self.scan.deadline_seconds = Some(deadline);
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
