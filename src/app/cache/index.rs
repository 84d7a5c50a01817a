//! Cache directory walking
//!
//! The cache keeps no manifest on disk. Everything it knows about its content
//! comes from walking the cache root: the flat list of cached file names, the
//! location of a named file, and the aggregate size of the tree.
//!
//! Walks follow symlinked directories but never enter the same canonical
//! directory twice, and stop descending past a configurable depth.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::cache::{BYTES_PER_MB, MAX_SCAN_DEPTH, SIZE_UNAVAILABLE_MB};
use crate::errors::{CacheError, CacheResult};

/// Recursive directory scanner for the cache root
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    max_depth: usize,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new(MAX_SCAN_DEPTH)
    }
}

/// Per-walk bookkeeping for the cycle and depth guards
struct WalkGuard {
    visited: HashSet<PathBuf>,
    max_depth: usize,
}

impl WalkGuard {
    fn new(max_depth: usize) -> Self {
        Self {
            visited: HashSet::new(),
            max_depth,
        }
    }

    /// Returns false when `dir` must not be entered
    fn enter(&mut self, dir: &Path, depth: usize) -> bool {
        if depth > self.max_depth {
            warn!(
                "Maximum scan depth {} reached at {}, not descending",
                self.max_depth,
                dir.display()
            );
            return false;
        }

        let canonical = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        if !self.visited.insert(canonical) {
            warn!("Directory cycle detected at {}, skipping", dir.display());
            return false;
        }
        true
    }
}

impl DirectoryScanner {
    /// Create a scanner that descends at most `max_depth` levels below the root
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Entries of `dir` sorted by name, so walks are deterministic
    fn sorted_entries(dir: &Path) -> Vec<fs::DirEntry> {
        match fs::read_dir(dir) {
            Ok(entries) => {
                let mut entries: Vec<_> = entries.flatten().collect();
                entries.sort_by_key(|e| e.file_name());
                entries
            }
            Err(e) => {
                warn!("Failed to read directory {}: {}", dir.display(), e);
                Vec::new()
            }
        }
    }

    /// Build the flat list of bare file names found anywhere under `root`
    pub fn rebuild_file_list(&self, root: &Path) -> CacheResult<Vec<String>> {
        if !root.is_dir() {
            warn!("Cannot index {}: not a directory", root.display());
            return Err(CacheError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        let mut guard = WalkGuard::new(self.max_depth);
        Self::collect_names(root, 0, &mut guard, &mut files);

        debug!("Indexed {} cached files under {}", files.len(), root.display());
        Ok(files)
    }

    fn collect_names(dir: &Path, depth: usize, guard: &mut WalkGuard, files: &mut Vec<String>) {
        if !guard.enter(dir, depth) {
            return;
        }

        for entry in Self::sorted_entries(dir) {
            let path = entry.path();
            if path.is_dir() {
                Self::collect_names(&path, depth + 1, guard, files);
            } else {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }

    /// Full paths of every file under `dir`
    pub fn collect_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut guard = WalkGuard::new(self.max_depth);
        Self::collect_paths(dir, 0, &mut guard, &mut files);
        files
    }

    fn collect_paths(dir: &Path, depth: usize, guard: &mut WalkGuard, files: &mut Vec<PathBuf>) {
        if !guard.enter(dir, depth) {
            return;
        }

        for entry in Self::sorted_entries(dir) {
            let path = entry.path();
            if path.is_dir() {
                Self::collect_paths(&path, depth + 1, guard, files);
            } else {
                files.push(path);
            }
        }
    }

    /// Locate `target` under `search_dir`.
    ///
    /// An entry matches when its bare name equals `target` or when its full
    /// path does, so callers may pass either form. Entries of a directory are
    /// checked before any of its subdirectories are searched.
    pub fn find_file(&self, target: &str, search_dir: &Path) -> Option<PathBuf> {
        if !search_dir.is_dir() {
            debug!("Cannot search {}: not a directory", search_dir.display());
            return None;
        }

        let mut guard = WalkGuard::new(self.max_depth);
        Self::find_recursive(Path::new(target), search_dir, 0, &mut guard)
    }

    fn find_recursive(
        target: &Path,
        dir: &Path,
        depth: usize,
        guard: &mut WalkGuard,
    ) -> Option<PathBuf> {
        if !guard.enter(dir, depth) {
            return None;
        }

        let entries = Self::sorted_entries(dir);
        for entry in &entries {
            let path = entry.path();
            if Path::new(&entry.file_name()) == target || path == target {
                return Some(path);
            }
        }

        entries
            .iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .find_map(|path| Self::find_recursive(target, &path, depth + 1, guard))
    }

    /// Total size in bytes of everything under `root`.
    ///
    /// Each subdirectory contributes its own on-disk entry size once, on top
    /// of the files it contains.
    pub fn compute_total_size_bytes(&self, root: &Path) -> CacheResult<u64> {
        if !root.is_dir() {
            return Err(CacheError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let mut guard = WalkGuard::new(self.max_depth);
        Ok(Self::size_recursive(root, 0, &mut guard))
    }

    fn size_recursive(dir: &Path, depth: usize, guard: &mut WalkGuard) -> u64 {
        if !guard.enter(dir, depth) {
            return 0;
        }

        let mut total = 0u64;
        for entry in Self::sorted_entries(dir) {
            let path = entry.path();
            let len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            total += len;
            if path.is_dir() {
                total += Self::size_recursive(&path, depth + 1, guard);
            }
        }
        total
    }

    /// Total size of `root` in decimal megabytes, or -1 when it is not a directory
    pub fn compute_total_size_mb(&self, root: &Path) -> f64 {
        match self.compute_total_size_bytes(root) {
            Ok(bytes) => bytes as f64 / BYTES_PER_MB,
            Err(e) => {
                warn!("Cannot compute cache size: {}", e);
                SIZE_UNAVAILABLE_MB
            }
        }
    }
}
