// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Layering, lowest to highest precedence: built-in defaults, the TOML file
//! (`slotbook.toml` unless a path is given), then `SLOTBOOK_*` environment
//! variables with `__` separating nested keys (`SLOTBOOK_RATE_LIMIT__MAX_REQUESTS`).
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "slotbook.toml";

const ENV_PREFIX: &str = "SLOTBOOK_";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which storage backend the server runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    File,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory for the flat-file store
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    /// Per-expert event backlog before a viewer lags
    pub broadcast_capacity: usize,
    /// Allowed CORS origin; `*` allows any
    pub client_origin: String,
    /// Write the demo directory into an empty store at startup
    pub seed_demo_data: bool,
    /// Days of availability generated per demo expert
    pub seed_days: u32,
    pub rate_limit: RateLimitSettings,
}

/// Fixed-window rate limit for `/api`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
    /// Tracked clients above which expired windows are swept on the next new client
    pub max_tracked_clients: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            data_dir: PathBuf::from("data"),
            storage: StorageKind::File,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            broadcast_capacity: 64,
            client_origin: "http://localhost:5173".to_string(),
            seed_demo_data: true,
            seed_days: 7,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
            max_tracked_clients: 10_000,
        }
    }
}

impl Settings {
    /// Load from `slotbook.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific TOML file (missing file is not an error) and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level must be one of {LOG_LEVELS:?}, got {}",
                self.log_level
            )));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid("broadcast_capacity must be greater than 0".to_string()));
        }
        if self.rate_limit.window_secs == 0
            || self.rate_limit.max_requests == 0
            || self.rate_limit.max_tracked_clients == 0
        {
            return Err(ConfigError::Invalid(
                "rate_limit.window_secs, rate_limit.max_requests and rate_limit.max_tracked_clients must be greater than 0"
                    .to_string(),
            ));
        }
        if self.client_origin.trim().is_empty() {
            return Err(ConfigError::Invalid("client_origin must not be empty".to_string()));
        }
        Ok(())
    }
}
