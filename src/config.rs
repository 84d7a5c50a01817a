//! Configuration management for remote-cache
//!
//! Settings are layered: built-in defaults, then a TOML config file, then
//! environment variables, then command-line flags. A commented default file
//! can be written on first run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::worker::WorkerConfig;
use crate::constants::{cache, env, files, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Cache settings
    pub cache: CacheConfigToml,
    /// Transfer worker settings
    pub worker: WorkerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Cache directory; empty means the platform cache directory
    pub directory: String,
    /// Size limit in megabytes (0 = no limit)
    pub limit_mb: u64,
    /// Free buffer in megabytes
    pub free_buffer_mb: u64,
    /// Delete cached copies before fetching again
    pub force_redownload: bool,
    /// Deepest directory level visited when walking the cache
    pub max_scan_depth: usize,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            directory: String::new(),
            limit_mb: cache::DEFAULT_LIMIT_MB,
            free_buffer_mb: cache::DEFAULT_FREE_BUFFER_MB,
            force_redownload: false,
            max_scan_depth: cache::MAX_SCAN_DEPTH,
        }
    }
}

impl CacheConfigToml {
    /// Convert to runtime CacheConfig, resolving an empty directory to the platform default
    pub fn to_runtime_config(&self) -> CacheConfig {
        let directory = if self.directory.is_empty() {
            default_cache_directory()
                .map(|dir| dir.to_string_lossy().to_string())
                .unwrap_or_default()
        } else {
            self.directory.clone()
        };

        CacheConfig {
            remote_cache_directory: directory,
            remote_cache_limit_mb: self.limit_mb,
            remote_cache_free_buffer_mb: self.free_buffer_mb,
            enable_force_redownload: self.force_redownload,
            max_scan_depth: self.max_scan_depth,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// `<platform cache dir>/remote-cache`
pub fn default_cache_directory() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(cache::DEFAULT_DIR_NAME))
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> (CacheConfig, WorkerConfig) {
        (self.cache.to_runtime_config(), self.worker.clone())
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    /// 3. Environment variables
    ///
    /// Command-line overrides are applied by the caller afterwards.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        let config_path = match config_file_override {
            Some(ref path) => Some(path.clone()),
            None => Self::find_config_file(),
        };

        if let Some(path) = config_path {
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                config = Self::load_from_file(&path).await?;
            } else if config_file_override.is_some() {
                return Err(ConfigError::NotFound { path });
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.worker.validate().map_err(|e| ConfigError::InvalidValue {
            field: "worker".to_string(),
            value: format!("{:?}", config.worker),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(env::CACHE_DIR).filter(|d| !d.is_empty()) {
            debug!("Cache directory overridden by {}", env::CACHE_DIR);
            self.cache.directory = dir;
        }
        if let Some(level) = lookup(env::LOG_LEVEL).filter(|l| !l.is_empty()) {
            debug!("Log level overridden by {}", env::LOG_LEVEL);
            self.logging.level = level;
        }
    }

    /// Apply command-line overrides
    pub fn apply_cli_overrides(&mut self, cache_dir: Option<&Path>) {
        if let Some(dir) = cache_dir {
            self.cache.directory = dir.to_string_lossy().to_string();
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Initialize configuration on first run
    ///
    /// Creates a default config file if none exists and returns its path
    pub async fn initialize_first_run() -> ConfigResult<PathBuf> {
        let config_path = Self::get_default_config_path()?;
        Self::write_default_config(&config_path).await?;
        Ok(config_path)
    }

    /// Write the commented default configuration unless `path` already exists.
    ///
    /// Returns whether a file was written.
    pub async fn write_default_config(path: &Path) -> ConfigResult<bool> {
        if path.exists() {
            return Ok(false);
        }

        info!("Creating default configuration file...");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, Self::generate_default_config_content()).await?;
        info!("Created default configuration file: {}", path.display());
        Ok(true)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(format!("./{}", files::LOCAL_CONFIG_FILE))];
        if let Ok(user_config) = Self::get_default_config_path() {
            search_paths.push(user_config);
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        debug!("No config file found in standard locations");
        None
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDirectory)?;
        Ok(config_dir
            .join(cache::DEFAULT_DIR_NAME)
            .join(files::USER_CONFIG_FILE))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        let default_cache_path = default_cache_directory()
            .unwrap_or_else(|| PathBuf::from(format!("./{}", cache::DEFAULT_DIR_NAME)));

        format!(
            r#"# remote-cache configuration
# This file was automatically generated on first run.

[cache]
# Cache directory (leave empty to use {})
directory = ""

# Size limit in megabytes (0 = no limit)
limit_mb = {}

# Space in megabytes that must stay free below the limit
free_buffer_mb = {}

# Delete cached copies before fetching them again
force_redownload = false

# Deepest directory level visited when walking the cache
max_scan_depth = {}

[worker]
max_concurrent_transfers = {}
transfer_timeout = "10m"
max_retries = {}
retry_base_delay = "500ms"
progress_buffer_size = {}
copy_chunk_size = {}
asynchronous = true

[logging]
level = "warn"  # error, warn, info, debug, trace
"#,
            default_cache_path.display(),
            cache::DEFAULT_LIMIT_MB,
            cache::DEFAULT_FREE_BUFFER_MB,
            cache::MAX_SCAN_DEPTH,
            workers::DEFAULT_CONCURRENT_TRANSFERS,
            workers::MAX_RETRIES,
            workers::PROGRESS_BUFFER_SIZE,
            workers::COPY_CHUNK_SIZE,
        )
    }
}
