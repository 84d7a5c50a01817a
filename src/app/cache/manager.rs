//! Core cache manager
//!
//! This module contains the [`CacheManager`], the single authority over one
//! cache directory. It resolves URIs to cache paths, answers cache-hit
//! queries, deletes cached data, and reports size thresholds to observers.
//!
//! Deletion always flags every scene node whose storage resolves to a file
//! about to be removed as modified since read, before any byte leaves the
//! disk.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::scene::{NodeClass, Scene, StorageNode};
use crate::app::uri;
use crate::constants::cache::{BYTES_PER_MB, SIZE_UNAVAILABLE_MB};
use crate::constants::uri::NULL_SENTINEL;
use crate::errors::{CacheError, CacheResult};

use super::config::CacheConfig;
use super::events::{create_event_channel, CacheEvent};
use super::index::DirectoryScanner;
use super::stats::CacheStats;

/// Result of [`CacheManager::delete_from_cache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The target was removed from disk
    Deleted { path: PathBuf, nodes_marked: usize },
    /// Nothing matching the target exists in the cache
    NotFound,
    /// Nodes were marked but the target could not be removed
    RemovalFailed {
        path: PathBuf,
        nodes_marked: usize,
        reason: String,
    },
}

impl DeleteOutcome {
    /// Whether the target is gone from disk
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }

    /// Number of scene nodes flagged before the removal attempt
    pub fn nodes_marked(&self) -> usize {
        match self {
            DeleteOutcome::Deleted { nodes_marked, .. }
            | DeleteOutcome::RemovalFailed { nodes_marked, .. } => *nodes_marked,
            DeleteOutcome::NotFound => 0,
        }
    }
}

/// Main cache management system
#[derive(Debug)]
pub struct CacheManager {
    /// Configuration
    config: CacheConfig,
    /// Directory walker honoring the configured depth bound
    scanner: DirectoryScanner,
    /// Size recorded by the last recomputation
    current_cache_size_mb: f64,
    /// Snapshot of cached file names
    cached_files: Vec<String>,
    /// Observer channel
    events: broadcast::Sender<CacheEvent>,
    /// Bumped on every generic modification
    modified_count: u64,
}

/// Remove a single trailing `/`, keeping a bare root intact
fn strip_trailing_separator(dir: &str) -> String {
    match dir.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => dir.to_string(),
    }
}

impl CacheManager {
    /// Create a new cache manager
    ///
    /// When a cache directory is configured it is created if missing and
    /// indexed right away.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache directory cannot be created
    pub fn new(mut config: CacheConfig) -> CacheResult<Self> {
        config.remote_cache_directory = strip_trailing_separator(&config.remote_cache_directory);

        let mut manager = Self {
            scanner: DirectoryScanner::new(config.max_scan_depth),
            config,
            current_cache_size_mb: 0.0,
            cached_files: Vec::new(),
            events: create_event_channel(),
            modified_count: 0,
        };

        if manager.config.is_enabled() {
            let root = manager.cache_root().to_path_buf();
            Self::ensure_directory_exists(&root)?;
            if let Err(e) = manager.update_cache_information() {
                warn!("Initial cache scan failed: {}", e);
            }
            info!("Initialized cache manager with root: {}", root.display());
        } else {
            warn!("Cache manager created without a cache directory; caching is disabled");
        }

        Ok(manager)
    }

    /// Ensure a directory exists, creating it if necessary
    fn ensure_directory_exists(path: &Path) -> CacheResult<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: path.to_path_buf(),
                }
            })?;
            debug!("Created cache directory: {}", path.display());
        }
        Ok(())
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        debug!("Cache event: {}", event.name());
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn modified(&mut self) {
        self.modified_count += 1;
        self.emit(CacheEvent::Modified);
    }

    /// Number of generic modifications so far
    pub fn modified_count(&self) -> u64 {
        self.modified_count
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache root as a path (empty when caching is disabled)
    pub fn cache_root(&self) -> &Path {
        Path::new(&self.config.remote_cache_directory)
    }

    pub fn remote_cache_directory(&self) -> &str {
        &self.config.remote_cache_directory
    }

    /// Change the cache directory; a single trailing `/` is dropped.
    ///
    /// An empty directory is accepted and disables the cache.
    pub fn set_remote_cache_directory(&mut self, dir: &str) {
        if dir.is_empty() {
            warn!("Cache directory set to an empty path; caching is disabled");
        }
        let dir = strip_trailing_separator(dir);
        if dir == self.config.remote_cache_directory {
            return;
        }
        debug!("Cache directory changed to {}", dir);
        self.config.remote_cache_directory = dir;
        self.emit(CacheEvent::SettingsUpdate);
    }

    pub fn remote_cache_limit_mb(&self) -> u64 {
        self.config.remote_cache_limit_mb
    }

    pub fn set_remote_cache_limit(&mut self, limit_mb: u64) {
        if limit_mb == self.config.remote_cache_limit_mb {
            return;
        }
        self.config.remote_cache_limit_mb = limit_mb;
        self.emit(CacheEvent::SettingsUpdate);
    }

    pub fn remote_cache_free_buffer_mb(&self) -> u64 {
        self.config.remote_cache_free_buffer_mb
    }

    pub fn set_remote_cache_free_buffer_size(&mut self, buffer_mb: u64) {
        if buffer_mb == self.config.remote_cache_free_buffer_mb {
            return;
        }
        self.config.remote_cache_free_buffer_mb = buffer_mb;
        self.emit(CacheEvent::SettingsUpdate);
    }

    pub fn enable_force_redownload(&self) -> bool {
        self.config.enable_force_redownload
    }

    pub fn set_enable_force_redownload(&mut self, enabled: bool) {
        if enabled == self.config.enable_force_redownload {
            return;
        }
        self.config.enable_force_redownload = enabled;
        self.emit(CacheEvent::SettingsUpdate);
    }

    /// Size recorded by the last recomputation, in megabytes
    pub fn current_cache_size_mb(&self) -> f64 {
        self.current_cache_size_mb
    }

    /// Snapshot of cached file names from the last index rebuild
    pub fn cached_files(&self) -> &[String] {
        &self.cached_files
    }

    /// Map a URI to the path its data occupies in the cache.
    ///
    /// Percent-escapes are decoded and only the last path component is kept.
    /// An unset cache directory is logged and yields a path rooted at `/`.
    pub fn get_filename_from_uri(&self, uri: Option<&str>) -> PathBuf {
        let Some(uri) = uri else {
            error!("Cannot map a missing URI to a cache file name");
            return PathBuf::from(NULL_SENTINEL);
        };

        if !self.config.is_enabled() {
            error!("Cache directory is not set, cannot place {} in the cache", uri);
        }

        let decoded = uri::decode_uri(uri);
        let file_name = uri::bare_file_name(&decoded);
        PathBuf::from(format!(
            "{}/{}",
            self.config.remote_cache_directory, file_name
        ))
    }

    /// Prefix a bare filename with the cache directory
    pub fn add_cache_path_to_filename(&self, filename: &str) -> Option<PathBuf> {
        if !self.config.is_enabled() {
            debug!("No cache directory configured for {}", filename);
            return None;
        }
        Some(PathBuf::from(format!(
            "{}/{}",
            self.config.remote_cache_directory, filename
        )))
    }

    /// True if `filename` exists as given or inside the cache directory
    pub fn cached_file_exists(&self, filename: &str) -> bool {
        if Path::new(filename).exists() {
            return true;
        }
        self.add_cache_path_to_filename(filename)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Locate `target` anywhere under `dir`
    pub fn find_cached_file(&self, target: &str, dir: &Path) -> Option<PathBuf> {
        self.scanner.find_file(target, dir)
    }

    /// Recompute the cache size from disk
    pub fn compute_cache_size(&mut self) -> f64 {
        if !self.config.is_enabled() {
            warn!("Cache directory is not set, cache size unavailable");
            self.current_cache_size_mb = SIZE_UNAVAILABLE_MB;
        } else {
            self.current_cache_size_mb = self.scanner.compute_total_size_mb(self.cache_root());
        }
        self.current_cache_size_mb
    }

    /// Rebuild the cached file list and the size snapshot
    pub fn update_cache_information(&mut self) -> CacheResult<()> {
        if !self.config.is_enabled() {
            return Err(CacheError::DirectoryNotSet);
        }

        self.cached_files = self.scanner.rebuild_file_list(self.cache_root())?;
        self.compute_cache_size();
        debug!(
            "Cache holds {} files, {:.3} MB",
            self.cached_files.len(),
            self.current_cache_size_mb
        );
        Ok(())
    }

    /// Drop one entry named like `target` from the cached file list.
    ///
    /// Files with the same name in other directories keep their entries.
    /// Returns whether anything was removed.
    pub fn delete_from_cached_file_list(&mut self, target: &str) -> bool {
        let name = uri::bare_file_name(target);
        match self.cached_files.iter().position(|f| f == name) {
            Some(index) => {
                self.cached_files.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether `storage` reads from `path`, either through its file name or
    /// through the cache file its URI is downloaded to
    fn storage_references(&self, storage: &StorageNode, root: Option<&Path>, path: &Path) -> bool {
        if storage.full_name_from_file_name(root) == path {
            return true;
        }
        match storage.uri.as_deref() {
            Some(uri) if self.config.is_enabled() => {
                self.get_filename_from_uri(Some(uri)) == path
            }
            _ => false,
        }
    }

    /// Flag every storable node that has a storage node resolving to `path`
    pub fn mark_node(&self, scene: &mut dyn Scene, path: &Path) -> usize {
        let root = scene.root_directory().map(Path::to_path_buf);
        let mut marked = 0;

        for node in scene.nodes_by_class_mut(NodeClass::Storable) {
            let references_path = node
                .storage_nodes()
                .iter()
                .any(|storage| self.storage_references(storage, root.as_deref(), path));

            if references_path {
                debug!(
                    "Marking node {} modified since read: {} is leaving the cache",
                    node.id(),
                    path.display()
                );
                node.set_modified_since_read(true);
                marked += 1;
            }
        }
        marked
    }

    /// Mark nodes for every file about to disappear with `target`
    pub fn mark_nodes_before_deleting_data_from_cache(
        &self,
        scene: &mut dyn Scene,
        target: &Path,
    ) -> usize {
        if target.is_dir() {
            let mut marked = 0;
            for file in self.scanner.collect_files(target) {
                marked += self.mark_node(scene, &file);
            }
            marked
        } else {
            self.mark_node(scene, target)
        }
    }

    /// Delete a cached file or directory.
    ///
    /// Referencing nodes are marked first. The name leaves the cached file
    /// list whether or not the removal succeeds: through the index rebuild
    /// when it does, by dropping the entry when it does not.
    pub fn delete_from_cache(&mut self, scene: &mut dyn Scene, target: &str) -> DeleteOutcome {
        let Some(path) = self.find_cached_file(target, self.cache_root()) else {
            error!("Cannot delete {}: not found in cache", target);
            return DeleteOutcome::NotFound;
        };

        let nodes_marked = self.mark_nodes_before_deleting_data_from_cache(scene, &path);

        let removal = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match removal {
            Ok(()) => {
                info!("Deleted {} from cache", path.display());
                if let Err(e) = self.update_cache_information() {
                    warn!("Failed to refresh cache index after delete: {}", e);
                    self.delete_from_cached_file_list(target);
                }
                self.emit(CacheEvent::CacheDelete {
                    target: path.clone(),
                });
                DeleteOutcome::Deleted { path, nodes_marked }
            }
            Err(e) => {
                warn!("Failed to delete {} from cache: {}", path.display(), e);
                self.delete_from_cached_file_list(target);
                DeleteOutcome::RemovalFailed {
                    path,
                    nodes_marked,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Remove everything in the cache and recreate an empty cache directory
    pub fn clear_cache(&mut self, scene: &mut dyn Scene) -> CacheResult<()> {
        if !self.config.is_enabled() {
            warn!("Cannot clear cache: cache directory is not set");
            return Err(CacheError::DirectoryNotSet);
        }

        let root = self.cache_root().to_path_buf();
        let marked = self.mark_nodes_before_deleting_data_from_cache(scene, &root);
        debug!("Marked {} nodes before clearing the cache", marked);

        if root.exists() {
            if let Err(e) = fs::remove_dir_all(&root) {
                warn!("Failed to remove cache directory {}: {}", root.display(), e);
                let leftovers = fs::read_dir(&root)
                    .map(|mut entries| entries.next().is_some())
                    .unwrap_or(false);
                if leftovers {
                    return Err(CacheError::RemovalFailed {
                        path: root,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = fs::create_dir_all(&root) {
            warn!("Failed to recreate cache directory {}: {}", root.display(), e);
            return Err(CacheError::RecreationFailed { path: root });
        }

        if let Err(e) = self.update_cache_information() {
            warn!("Failed to refresh cache index after clear: {}", e);
        }
        info!("Cleared cache at {}", root.display());
        self.emit(CacheEvent::CacheClear);
        self.modified();
        Ok(())
    }

    /// Recompute the size and signal when it exceeds the limit.
    ///
    /// Advisory only: nothing is evicted. Returns whether the limit is exceeded.
    pub fn cache_size_check(&mut self) -> bool {
        let current = self.compute_cache_size();
        let limit = self.config.remote_cache_limit_mb;

        if limit > 0 && current > limit as f64 {
            warn!("Cache size {:.3} MB exceeds limit of {} MB", current, limit);
            self.emit(CacheEvent::CacheLimitExceeded {
                current_mb: current,
                limit_mb: limit,
            });
            return true;
        }
        false
    }

    /// `limit - current - buffer` in megabytes; negative once the buffer is violated
    pub fn free_cache_space_remaining(&self) -> f64 {
        self.config.remote_cache_limit_mb as f64
            - self.current_cache_size_mb
            - self.config.remote_cache_free_buffer_mb as f64
    }

    /// Recompute the size and signal when less than the free buffer remains.
    ///
    /// Skipped while no limit is set. Returns whether the buffer is violated.
    pub fn free_cache_buffer_check(&mut self) -> bool {
        if self.config.remote_cache_limit_mb == 0 {
            return false;
        }

        self.compute_cache_size();
        let remaining = self.free_cache_space_remaining();
        let buffer = self.config.remote_cache_free_buffer_mb;

        if remaining * BYTES_PER_MB < buffer as f64 * BYTES_PER_MB {
            warn!(
                "Only {:.3} MB free below the cache limit, buffer is {} MB",
                remaining, buffer
            );
            self.emit(CacheEvent::InsufficientFreeBuffer {
                remaining_mb: remaining,
                buffer_mb: buffer,
            });
            return true;
        }
        false
    }

    /// Get cache statistics from the last index rebuild
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::new(self.cache_root().to_path_buf());
        stats.set_usage(self.cached_files.len(), self.current_cache_size_mb);
        stats.set_limits(
            self.config.remote_cache_limit_mb,
            self.config.remote_cache_free_buffer_mb,
            self.free_cache_space_remaining(),
        );
        stats
    }
}
