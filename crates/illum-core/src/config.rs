//! Configuration system for Illuminate.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $ILLUM_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/illuminate/config.toml
//!   3. ~/.config/illuminate/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IllumConfig {
    pub server: ServerConfig,
    pub sessions: SessionSettings,
    pub budget: BudgetSettings,
    pub compute: ComputeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Live session ceiling. Creation beyond this is rejected.
    pub max_sessions: usize,
    /// Sessions untouched for longer than this are evicted.
    pub idle_timeout_secs: u64,
    /// How often the idle sweep runs.
    pub sweep_interval_secs: u64,
    /// If false, credential checks are skipped (development mode).
    pub require_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Unit-budget ceiling per session.
    pub max_budget_units: u64,
    pub cost_per_grid_point: u64,
    pub cost_per_lamp: u64,
    /// Per reflective grid point, per pass.
    pub cost_per_reflectance_point: u64,
    /// Passes assumed when the model does not set one.
    pub default_reflectance_passes: u32,
    /// Fraction of the execution timeout allowed as predicted time.
    pub time_ceiling_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    /// Max concurrent calculations. 0 = available parallelism.
    pub max_concurrent: usize,
    /// How long a request waits for a free slot.
    pub queue_timeout_secs: u64,
    /// Hard ceiling on a single calculation.
    pub execution_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 500,
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
            require_token: true,
        }
    }
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            max_budget_units: 50_000_000,
            cost_per_grid_point: 10,
            cost_per_lamp: 50_000,
            cost_per_reflectance_point: 1,
            default_reflectance_passes: 5,
            time_ceiling_fraction: 0.8,
        }
    }
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            queue_timeout_secs: 30,
            execution_timeout_secs: 300,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ComputeSettings {
    /// Resolved slot ceiling. Never zero.
    pub fn slots(&self) -> usize {
        if self.max_concurrent == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.max_concurrent
        }
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("illuminate")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl IllumConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path(), |key| std::env::var(key).ok())
    }

    fn load_from(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            IllumConfig::default()
        };
        config.apply_env_overrides(lookup);
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ILLUM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&IllumConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply ILLUM_* overrides. `lookup` is `std::env::var` in production.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ILLUM_SERVER__BIND") {
            self.server.bind = v;
        }
        parse_into(&lookup, "ILLUM_SERVER__PORT", &mut self.server.port);
        parse_into(&lookup, "ILLUM_SESSIONS__MAX_SESSIONS", &mut self.sessions.max_sessions);
        parse_into(
            &lookup,
            "ILLUM_SESSIONS__IDLE_TIMEOUT_SECS",
            &mut self.sessions.idle_timeout_secs,
        );
        parse_into(
            &lookup,
            "ILLUM_SESSIONS__SWEEP_INTERVAL_SECS",
            &mut self.sessions.sweep_interval_secs,
        );
        if let Some(v) = lookup("ILLUM_SESSIONS__REQUIRE_TOKEN") {
            self.sessions.require_token = v == "true" || v == "1";
        }
        parse_into(
            &lookup,
            "ILLUM_BUDGET__MAX_BUDGET_UNITS",
            &mut self.budget.max_budget_units,
        );
        parse_into(&lookup, "ILLUM_COMPUTE__MAX_CONCURRENT", &mut self.compute.max_concurrent);
        parse_into(
            &lookup,
            "ILLUM_COMPUTE__QUEUE_TIMEOUT_SECS",
            &mut self.compute.queue_timeout_secs,
        );
        parse_into(
            &lookup,
            "ILLUM_COMPUTE__EXECUTION_TIMEOUT_SECS",
            &mut self.compute.execution_timeout_secs,
        );
    }
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(parsed) = lookup(key).and_then(|v| v.parse().ok()) {
        *slot = parsed;
    }
}
