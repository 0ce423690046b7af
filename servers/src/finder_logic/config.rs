use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use lib_finder::discovery::DiscoveryConfig;
use lib_finder::listing::games_api::DEFAULT_BASE_URL;
use lib_finder::listing::GamesApiOptions;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_CONFIG_FILE: &str = "server_finder.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Public server finder: cached, shuffled listing of busy public servers", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "FINDER_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "API_KEY", hide_env_values = true, help = "Shared key required on guarded routes. Falls back to KEY.")]
    pub api_key: Option<String>,

    #[clap(long, env = "FINDER_UNIVERSE_ID", help = "Universe whose public servers are listed.")]
    pub universe_id: Option<String>,

    #[clap(long, env = "FINDER_UPSTREAM_BASE_URL", help = "Base URL of the games API.")]
    pub upstream_base_url: Option<String>,

    #[clap(long, env = "FINDER_MIN_PLAYERS", help = "Minimum occupant count for a server to be listed.")]
    pub min_players: Option<u32>,

    #[clap(long, env = "FINDER_PAGE_SIZE", help = "Entries requested per upstream page.")]
    pub page_size: Option<u32>,

    #[clap(long, env = "FINDER_LONG_COOLDOWN_SECS", help = "Cooldown after a full sweep or a throttle response.")]
    pub long_cooldown_secs: Option<u64>,

    #[clap(long, env = "FINDER_SHORT_COOLDOWN_SECS", help = "Cooldown after a failed or empty sweep.")]
    pub short_cooldown_secs: Option<u64>,

    #[clap(long, env = "FINDER_FIRST_CALL_WAIT_SECS", help = "How long the first caller may wait for the initial fill.")]
    pub first_call_wait_secs: Option<u64>,

    #[clap(long, env = "FINDER_PAGE_TIMEOUT_SECS", help = "Network timeout per upstream page.")]
    pub page_timeout_secs: Option<u64>,

    #[clap(long, env = "FINDER_PAGE_DELAY_MIN_MS", help = "Lower bound of the pause between pages.")]
    pub page_delay_min_ms: Option<u64>,

    #[clap(long, env = "FINDER_PAGE_DELAY_MAX_MS", help = "Upper bound of the pause between pages.")]
    pub page_delay_max_ms: Option<u64>,

    #[clap(long, env = "FINDER_MAX_RETRIES", help = "Transient-failure retries per page.")]
    pub max_retries: Option<u32>,

    #[clap(long, env = "FINDER_PREWARM", help = "Refresh on a timer instead of only on demand (true/false).")]
    pub prewarm: Option<bool>,

    #[clap(long, env = "FINDER_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FINDER_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            api_key: other.api_key.or(self.api_key),
            universe_id: other.universe_id.or(self.universe_id),
            upstream_base_url: other.upstream_base_url.or(self.upstream_base_url),
            min_players: other.min_players.or(self.min_players),
            page_size: other.page_size.or(self.page_size),
            long_cooldown_secs: other.long_cooldown_secs.or(self.long_cooldown_secs),
            short_cooldown_secs: other.short_cooldown_secs.or(self.short_cooldown_secs),
            first_call_wait_secs: other.first_call_wait_secs.or(self.first_call_wait_secs),
            page_timeout_secs: other.page_timeout_secs.or(self.page_timeout_secs),
            page_delay_min_ms: other.page_delay_min_ms.or(self.page_delay_min_ms),
            page_delay_max_ms: other.page_delay_max_ms.or(self.page_delay_max_ms),
            max_retries: other.max_retries.or(self.max_retries),
            prewarm: other.prewarm.or(self.prewarm),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// Built-in defaults, the bottom layer of every resolved config.
    pub fn defaults() -> Config {
        let engine = DiscoveryConfig::default();
        let upstream = GamesApiOptions::default();
        Config {
            port: Some(DEFAULT_PORT),
            universe_id: Some(upstream.universe_id),
            upstream_base_url: Some(DEFAULT_BASE_URL.to_string()),
            min_players: Some(engine.min_players),
            page_size: Some(engine.page_size),
            long_cooldown_secs: Some(engine.long_cooldown.as_secs()),
            short_cooldown_secs: Some(engine.short_cooldown.as_secs()),
            first_call_wait_secs: Some(engine.first_call_wait.as_secs()),
            page_timeout_secs: Some(upstream.page_timeout.as_secs()),
            page_delay_min_ms: Some(engine.page_delay_min.as_millis() as u64),
            page_delay_max_ms: Some(engine.page_delay_max.as_millis() as u64),
            max_retries: Some(upstream.max_retries),
            prewarm: Some(false),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// The configured key, `None` when the service runs open.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn prewarm(&self) -> bool {
        self.prewarm.unwrap_or(false)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.universe_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid("universe id must not be empty".into()));
        }
        if self.page_size == Some(0) {
            return Err(ConfigError::Invalid("page size must be at least 1".into()));
        }
        if let (Some(min), Some(max)) = (self.page_delay_min_ms, self.page_delay_max_ms) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "page delay min ({min} ms) exceeds max ({max} ms)"
                )));
            }
        }
        if self.long_cooldown_secs == Some(0) {
            return Err(ConfigError::Invalid("long cooldown must be at least 1 second".into()));
        }
        Ok(())
    }

    /// Engine knobs, falling back to the library defaults for unset values.
    pub fn discovery_config(&self) -> DiscoveryConfig {
        let defaults = DiscoveryConfig::default();
        DiscoveryConfig {
            min_players: self.min_players.unwrap_or(defaults.min_players),
            page_size: self.page_size.unwrap_or(defaults.page_size),
            long_cooldown: self
                .long_cooldown_secs
                .map_or(defaults.long_cooldown, Duration::from_secs),
            short_cooldown: self
                .short_cooldown_secs
                .map_or(defaults.short_cooldown, Duration::from_secs),
            page_delay_min: self
                .page_delay_min_ms
                .map_or(defaults.page_delay_min, Duration::from_millis),
            page_delay_max: self
                .page_delay_max_ms
                .map_or(defaults.page_delay_max, Duration::from_millis),
            first_call_wait: self
                .first_call_wait_secs
                .map_or(defaults.first_call_wait, Duration::from_secs),
        }
    }

    /// Upstream connection settings.
    pub fn games_api_options(&self) -> GamesApiOptions {
        let defaults = GamesApiOptions::default();
        GamesApiOptions {
            base_url: self.upstream_base_url.clone().unwrap_or(defaults.base_url),
            universe_id: self.universe_id.clone().unwrap_or(defaults.universe_id),
            page_timeout: self
                .page_timeout_secs
                .map_or(defaults.page_timeout, Duration::from_secs),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
        }
    }
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str::<Config>(&config_str).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Layers defaults, the optional config file and the parsed CLI/env values.
///
/// A missing file at the default location is not an error; a missing file
/// named explicitly is.
pub fn resolve_config(cli: Config, legacy_key: Option<String>) -> Result<Config, ConfigError> {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file if present
    let explicit = cli.config_path.is_some();
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if explicit || config_file_path.exists() {
        current_config = current_config.merge(read_config_file(&config_file_path)?);
    }

    // 3. Override with environment variables and CLI arguments
    current_config = current_config.merge(cli);

    // 4. Older deployments pass the key as KEY
    if current_config.api_key.is_none() {
        current_config.api_key = legacy_key;
    }

    current_config.validate()?;
    Ok(current_config)
}

pub fn load_config() -> Result<Config, ConfigError> {
    resolve_config(Config::parse(), std::env::var("KEY").ok())
}
