//! Cache statistics
//!
//! A point-in-time snapshot of cache usage against the configured limit and
//! free buffer, plus human-readable formatting for display.

use std::path::PathBuf;

use serde::Serialize;

use crate::constants::cache::BYTES_PER_MB;

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Cache root directory
    pub cache_root: PathBuf,
    /// Number of files in the cached file list
    pub cached_files_count: usize,
    /// Current cache size in megabytes (-1 when unavailable)
    pub current_size_mb: f64,
    /// Configured size limit in megabytes (0 = unset)
    pub limit_mb: u64,
    /// Configured free buffer in megabytes
    pub free_buffer_mb: u64,
    /// `limit - current - buffer`, may be negative
    pub free_space_remaining_mb: f64,
}

impl CacheStats {
    /// Create new cache statistics
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            cache_root,
            cached_files_count: 0,
            current_size_mb: 0.0,
            limit_mb: 0,
            free_buffer_mb: 0,
            free_space_remaining_mb: 0.0,
        }
    }

    /// Update size accounting
    pub fn set_usage(&mut self, cached_files_count: usize, current_size_mb: f64) {
        self.cached_files_count = cached_files_count;
        self.current_size_mb = current_size_mb;
    }

    /// Update threshold settings and derived free space
    pub fn set_limits(&mut self, limit_mb: u64, free_buffer_mb: u64, remaining_mb: f64) {
        self.limit_mb = limit_mb;
        self.free_buffer_mb = free_buffer_mb;
        self.free_space_remaining_mb = remaining_mb;
    }

    /// Whether the cache is larger than its limit
    pub fn is_over_limit(&self) -> bool {
        self.limit_mb > 0 && self.current_size_mb > self.limit_mb as f64
    }

    /// Cache usage as a percentage of the limit
    pub fn usage_percentage(&self) -> f64 {
        if self.limit_mb == 0 || self.current_size_mb <= 0.0 {
            return 0.0;
        }
        (self.current_size_mb / self.limit_mb as f64) * 100.0
    }

    /// Current size in bytes, or `None` when the size is unavailable
    pub fn current_size_bytes(&self) -> Option<u64> {
        if self.current_size_mb < 0.0 {
            return None;
        }
        Some((self.current_size_mb * BYTES_PER_MB).round() as u64)
    }

    /// Format cache size in human-readable format
    pub fn format_cache_size(&self) -> String {
        if self.current_size_mb < 0.0 {
            return "unavailable".to_string();
        }
        format_bytes((self.current_size_mb * BYTES_PER_MB) as u64)
    }

    /// Format the limit in human-readable format
    pub fn format_limit(&self) -> String {
        if self.limit_mb == 0 {
            return "unlimited".to_string();
        }
        format_bytes(self.limit_mb * BYTES_PER_MB as u64)
    }
}

/// Format bytes in decimal units, matching the cache's megabyte accounting
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1000;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_creation() {
        let stats = CacheStats::new(PathBuf::from("/cache"));
        assert_eq!(stats.cache_root, PathBuf::from("/cache"));
        assert_eq!(stats.cached_files_count, 0);
        assert_eq!(stats.current_size_mb, 0.0);
        assert!(!stats.is_over_limit());
    }

    #[test]
    fn test_over_limit_and_usage() {
        let mut stats = CacheStats::new(PathBuf::from("/cache"));
        stats.set_usage(3, 11.0);
        stats.set_limits(10, 2, -3.0);
        assert!(stats.is_over_limit());
        assert!((stats.usage_percentage() - 110.0).abs() < 1e-9);

        stats.set_limits(0, 2, -13.0);
        assert!(!stats.is_over_limit());
        assert_eq!(stats.usage_percentage(), 0.0);
    }

    #[test]
    fn test_current_size_bytes() {
        let mut stats = CacheStats::new(PathBuf::from("/cache"));
        stats.set_usage(2, 1.5);
        assert_eq!(stats.current_size_bytes(), Some(1_500_000));

        stats.set_usage(0, -1.0);
        assert_eq!(stats.current_size_bytes(), None);
        assert_eq!(stats.format_cache_size(), "unavailable");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1000), "1.00 KB");
        assert_eq!(format_bytes(1500), "1.50 KB");
        assert_eq!(format_bytes(1_000_000), "1.00 MB");
        assert_eq!(format_bytes(2_500_000_000), "2.50 GB");
    }

    #[test]
    fn test_formatting_helpers() {
        let mut stats = CacheStats::new(PathBuf::from("/cache"));
        stats.set_usage(1, 9.0);
        assert_eq!(stats.format_cache_size(), "9.00 MB");
        assert_eq!(stats.format_limit(), "unlimited");

        stats.set_limits(200, 10, 181.0);
        assert_eq!(stats.format_limit(), "200.00 MB");

        stats.set_usage(0, -1.0);
        assert_eq!(stats.format_cache_size(), "unavailable");
    }
}
