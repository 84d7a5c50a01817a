//! Cache configuration types and defaults

use serde::{Deserialize, Serialize};

use crate::constants::cache;

/// Configuration for the cache management system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory of the cache; empty disables the cache
    pub remote_cache_directory: String,
    /// Size threshold in megabytes (0 = no limit enforced)
    pub remote_cache_limit_mb: u64,
    /// Space in megabytes that must stay free below the limit
    pub remote_cache_free_buffer_mb: u64,
    /// Treat cache hits as misses and delete the cached copy before fetching
    pub enable_force_redownload: bool,
    /// Deepest directory level visited when walking the cache
    pub max_scan_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_cache_directory: String::new(),
            remote_cache_limit_mb: cache::DEFAULT_LIMIT_MB,
            remote_cache_free_buffer_mb: cache::DEFAULT_FREE_BUFFER_MB,
            enable_force_redownload: false,
            max_scan_depth: cache::MAX_SCAN_DEPTH,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `directory`
    pub fn with_cache_root(directory: impl Into<String>) -> Self {
        Self {
            remote_cache_directory: directory.into(),
            ..Default::default()
        }
    }

    /// Set the size limit in megabytes
    pub fn with_limit_mb(mut self, limit_mb: u64) -> Self {
        self.remote_cache_limit_mb = limit_mb;
        self
    }

    /// Set the free buffer in megabytes
    pub fn with_free_buffer_mb(mut self, buffer_mb: u64) -> Self {
        self.remote_cache_free_buffer_mb = buffer_mb;
        self
    }

    /// Enable or disable forced re-download
    pub fn with_force_redownload(mut self, enabled: bool) -> Self {
        self.enable_force_redownload = enabled;
        self
    }

    /// Set the walker depth bound
    pub fn with_max_scan_depth(mut self, depth: usize) -> Self {
        self.max_scan_depth = depth;
        self
    }

    /// Whether a cache directory is configured
    pub fn is_enabled(&self) -> bool {
        !self.remote_cache_directory.is_empty()
    }
}
