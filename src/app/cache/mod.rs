//! Local cache for remotely stored data
//!
//! The cache is a plain directory tree. No index is persisted: the list of
//! cached files and the cache size are always rebuilt by walking the tree.
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types and defaults
//! - [`index`] - Recursive walks of the cache directory
//! - [`events`] - Notifications for observers
//! - [`stats`] - Usage snapshot and formatting
//! - [`manager`] - The cache manager itself
//!
//! # Examples
//!
//! ```rust,no_run
//! use remote_cache::app::cache::{CacheConfig, CacheManager};
//! use remote_cache::app::scene::MemoryScene;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::with_cache_root("/tmp/remote-cache").with_limit_mb(10);
//! let mut cache = CacheManager::new(config)?;
//! let mut scene = MemoryScene::new();
//!
//! let path = cache.get_filename_from_uri(Some("http://host/data/brain.nrrd"));
//! if cache.cached_file_exists(&path.to_string_lossy()) {
//!     // Flags every node backed by the file, then removes it
//!     cache.delete_from_cache(&mut scene, "brain.nrrd");
//! }
//!
//! if cache.cache_size_check() {
//!     println!("cache is over its limit");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod index;
pub mod manager;
pub mod stats;

#[cfg(test)]
mod tests;

// Re-export main public API
pub use config::CacheConfig;
pub use events::{drain_events, CacheEvent};
pub use index::DirectoryScanner;
pub use manager::{CacheManager, DeleteOutcome};
pub use stats::{format_bytes, CacheStats};
