//! Configuration management for chat_media_fetcher
//!
//! This module loads the optional TOML configuration file, fills unspecified
//! values with defaults and converts each section into the runtime
//! configuration of the component it drives. Command-line flags override
//! whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{ClientConfig, OrchestratorConfig};
use crate::constants::{chunks, config as paths, files, http, limits, scheduler};
use crate::errors::{AppError, ConfigError, ConfigResult, Result};

/// Log levels accepted in `[logging] level`
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Download scheduler settings
    pub scheduler: SchedulerConfigToml,
    /// Where finished files go
    pub output: OutputConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    pub tcp_nodelay: bool,
    pub pool_idle_timeout_secs: u64,
    pub pool_max_per_host: usize,
    /// Timeout for one ranged request, body included
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub rate_limit_rps: u32,
    /// Raw `Cookie` header for the media host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            pool_idle_timeout_secs: http::POOL_IDLE_TIMEOUT.as_secs(),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            cookie: None,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime configuration
    pub fn to_runtime_config(&self) -> ClientConfig {
        let config = ClientConfig {
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: Some(Duration::from_secs(self.pool_idle_timeout_secs)),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..Default::default()
        }
        .with_rate_limit(self.rate_limit_rps);

        match &self.cookie {
            Some(cookie) => config.with_cookie(cookie.as_str()),
            None => config,
        }
    }
}

/// TOML-friendly scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfigToml {
    /// Bytes per ranged request
    pub chunk_size: u64,
    /// Concurrent downloads; absent means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    pub broadcast_capacity: usize,
}

impl Default for SchedulerConfigToml {
    fn default() -> Self {
        Self {
            chunk_size: chunks::DEFAULT_CHUNK_SIZE,
            max_concurrency: None,
            broadcast_capacity: scheduler::BROADCAST_CAPACITY,
        }
    }
}

impl SchedulerConfigToml {
    /// Convert to runtime configuration
    pub fn to_runtime_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            chunk_size: self.chunk_size,
            max_concurrency: self.max_concurrency,
            broadcast_capacity: self.broadcast_capacity,
        }
    }
}

/// TOML-friendly output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfigToml {
    pub output_dir: PathBuf,
}

impl Default for OutputConfigToml {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(files::DEFAULT_OUTPUT_DIR),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> (ClientConfig, OrchestratorConfig) {
        (
            self.client.to_runtime_config(),
            self.scheduler.to_runtime_config(),
        )
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the first file found among
    /// `./chat-media-fetcher.toml` and the user config directory is used;
    /// with none found the defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing, a file cannot be read
    /// or parsed, or a value is out of range
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Check values that would only fail later, at runtime
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.chunk_size < chunks::MIN_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.chunk_size".to_string(),
                value: self.scheduler.chunk_size.to_string(),
                reason: format!("Chunk size must be at least {} bytes", chunks::MIN_CHUNK_SIZE),
            });
        }

        if self.scheduler.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.max_concurrency".to_string(),
                value: "0".to_string(),
                reason: "Remove the setting for unlimited concurrency".to_string(),
            });
        }

        if self.scheduler.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.broadcast_capacity".to_string(),
                value: "0".to_string(),
                reason: "Capacity must be at least 1".to_string(),
            });
        }

        if self.client.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "Rate limit must be non-zero".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: format!("Expected one of {}", LOG_LEVELS.join(", ")),
            });
        }

        Ok(())
    }

    /// Write a commented default configuration file
    ///
    /// Writes to `path`, or to the user config directory when `None`.
    ///
    /// # Errors
    ///
    /// Refuses to overwrite an existing file unless `force` is set
    pub async fn initialize(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
        let config_path = match path {
            Some(path) => path,
            None => Self::get_default_config_path()?,
        };

        if config_path.exists() && !force {
            return Err(AppError::generic(format!(
                "Config file already exists: {} (use --force to overwrite)",
                config_path.display()
            )));
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::generic(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        tokio::fs::write(&config_path, Self::generate_default_config_content())
            .await
            .map_err(|e| {
                AppError::generic(format!(
                    "Failed to write config file {}: {}",
                    config_path.display(),
                    e
                ))
            })?;

        info!("Wrote default configuration to {}", config_path.display());
        Ok(config_path)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AppError::generic(format!("Failed to render configuration: {}", e)))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(".").join(paths::LOCAL_FILE)];
        if let Ok(user_path) = Self::get_default_config_path() {
            search_paths.push(user_path);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        match &found {
            Some(path) => debug!("Found config file: {}", path.display()),
            None => debug!("No config file found in standard locations"),
        }
        found
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::generic("Could not determine user config directory"))?;

        Ok(config_dir.join(paths::APP_DIR).join(paths::FILE_NAME))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::generic(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::InvalidFormat)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# chat-media-fetcher configuration
# Every setting is optional; command-line flags take precedence.

[client]
tcp_nodelay = true
pool_idle_timeout_secs = {idle}
pool_max_per_host = {per_host}
# Timeout for one ranged request, body included
request_timeout_secs = {request}
connect_timeout_secs = {connect}
# Requests per second across all downloads
rate_limit_rps = {rps}
# Cookie header sent with every request, if the media host needs a session
# cookie = "stel_ssid=..."

[scheduler]
# Bytes per ranged request ({chunk_mib} MiB)
chunk_size = {chunk}
# Concurrent downloads; leave unset for unlimited
# max_concurrency = 3
broadcast_capacity = {capacity}

[output]
output_dir = "{output}"

[logging]
level = "warn"  # error, warn, info, debug, trace
"#,
            idle = http::POOL_IDLE_TIMEOUT.as_secs(),
            per_host = http::POOL_MAX_PER_HOST,
            request = http::DEFAULT_TIMEOUT.as_secs(),
            connect = http::CONNECT_TIMEOUT.as_secs(),
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            chunk_mib = chunks::DEFAULT_CHUNK_SIZE / (1024 * 1024),
            chunk = chunks::DEFAULT_CHUNK_SIZE,
            capacity = scheduler::BROADCAST_CAPACITY,
            output = files::DEFAULT_OUTPUT_DIR,
        )
    }
}
