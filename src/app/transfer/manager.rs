//! Data I/O manager
//!
//! The [`DataIoManager`] is the front door for reading a node's data from its
//! storage location or writing it back. It owns the [`CacheManager`] and the
//! registry of transfers. It does not move any bytes itself: transfers are
//! handed out as [`TransferJob`]s and their outcome comes back as
//! [`TransferUpdate`]s applied on the caller's thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::cache::CacheManager;
use crate::app::scene::{Scene, StorageNode};
use crate::constants::workers::EVENT_CHANNEL_CAPACITY;
use crate::errors::{SceneError, TransferError, TransferResult};

use super::types::{
    DataTransfer, IoEvent, TransferId, TransferJob, TransferStatus, TransferType, TransferUpdate,
};

/// Transfer counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    /// `CompletedWithErrors` and `TimedOut`
    pub failed: usize,
    /// `CancelPending` and `Cancelled`
    pub cancelled: usize,
}

impl TransferStats {
    fn record(&mut self, status: TransferStatus) {
        self.total += 1;
        match status {
            TransferStatus::Pending => self.pending += 1,
            TransferStatus::Running => self.running += 1,
            TransferStatus::Completed => self.completed += 1,
            TransferStatus::CompletedWithErrors | TransferStatus::TimedOut => self.failed += 1,
            TransferStatus::CancelPending | TransferStatus::Cancelled => self.cancelled += 1,
            _ => {}
        }
    }

    /// Percentage of finished transfers that completed cleanly
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed + self.cancelled;
        if finished == 0 {
            0.0
        } else {
            (self.completed as f64 / finished as f64) * 100.0
        }
    }
}

/// What a queued read or write needs from the node
struct StorageReference {
    uri: Option<String>,
    full_path: PathBuf,
}

/// Registry of transfers plus the cache they feed
#[derive(Debug)]
pub struct DataIoManager {
    cache: CacheManager,
    /// Insertion-ordered registry
    transfers: Vec<DataTransfer>,
    asynchronous: bool,
    events: broadcast::Sender<IoEvent>,
    modified_count: u64,
}

impl DataIoManager {
    /// Create a manager in asynchronous mode
    pub fn new(cache: CacheManager) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            cache,
            transfers: Vec::new(),
            asynchronous: true,
            events,
            modified_count: 0,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CacheManager {
        &mut self.cache
    }

    /// Subscribe to registry and transfer notifications
    pub fn subscribe(&self) -> broadcast::Receiver<IoEvent> {
        self.events.subscribe()
    }

    pub fn modified_count(&self) -> u64 {
        self.modified_count
    }

    fn modified(&mut self) {
        self.modified_count += 1;
        let _ = self.events.send(IoEvent::Modified);
    }

    /// Select synchronous or asynchronous execution for transfers dispatched from now on
    pub fn configure(&mut self, asynchronous: bool) {
        if self.asynchronous == asynchronous {
            return;
        }
        debug!(
            "Data I/O manager switched to {} mode",
            if asynchronous { "asynchronous" } else { "synchronous" }
        );
        self.asynchronous = asynchronous;
        self.modified();
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    /// Smallest positive id not held by any registered transfer
    pub fn get_unique_transfer_id(&self) -> TransferId {
        let taken: HashSet<TransferId> = self.transfers.iter().map(|t| t.transfer_id()).collect();
        let mut id = 1;
        while taken.contains(&id) {
            id += 1;
        }
        id
    }

    /// Register a transfer and route its notifications through this manager
    pub fn add_data_transfer(&mut self, mut transfer: DataTransfer) -> TransferId {
        let id = transfer.transfer_id();
        transfer.attach_observer(self.events.clone());
        debug!(
            "Registered transfer {} ({})",
            id,
            transfer.transfer_type_string()
        );
        self.transfers.push(transfer);
        self.modified();
        id
    }

    /// Remove a transfer by id, handing it back to the caller
    pub fn remove_data_transfer(&mut self, transfer_id: TransferId) -> Option<DataTransfer> {
        let index = self
            .transfers
            .iter()
            .position(|t| t.transfer_id() == transfer_id)?;
        let transfer = self.transfers.remove(index);
        self.modified();
        Some(transfer)
    }

    pub fn get_data_transfer(&self, transfer_id: TransferId) -> Option<&DataTransfer> {
        self.transfers.iter().find(|t| t.transfer_id() == transfer_id)
    }

    pub fn get_data_transfer_mut(&mut self, transfer_id: TransferId) -> Option<&mut DataTransfer> {
        self.transfers
            .iter_mut()
            .find(|t| t.transfer_id() == transfer_id)
    }

    /// Drop every transfer from the registry
    pub fn clear_data_transfers(&mut self) {
        let count = self.transfers.len();
        self.transfers.clear();
        debug!("Cleared {} transfers", count);
        self.modified();
    }

    /// All registered transfers in insertion order
    pub fn transfers(&self) -> &[DataTransfer] {
        &self.transfers
    }

    pub fn transfers_for_node(&self, node_id: &str) -> Vec<&DataTransfer> {
        self.transfers
            .iter()
            .filter(|t| t.owner_node_id() == Some(node_id))
            .collect()
    }

    pub fn transfers_with_status(&self, status: TransferStatus) -> Vec<&DataTransfer> {
        self.transfers
            .iter()
            .filter(|t| t.status() == status)
            .collect()
    }

    pub fn stats(&self) -> TransferStats {
        let mut stats = TransferStats::default();
        for transfer in &self.transfers {
            stats.record(transfer.status());
        }
        stats
    }

    fn storage_reference(scene: &dyn Scene, node_id: &str) -> TransferResult<StorageReference> {
        let node = scene.node(node_id).ok_or_else(|| SceneError::NodeNotFound {
            node_id: node_id.to_string(),
        })?;
        let storage: &StorageNode =
            node.storage_nodes()
                .first()
                .ok_or_else(|| SceneError::NoStorageReference {
                    node_id: node_id.to_string(),
                })?;

        Ok(StorageReference {
            uri: storage.uri.clone(),
            full_path: storage.full_name_from_file_name(scene.root_directory()),
        })
    }

    fn register(
        &mut self,
        transfer_type: TransferType,
        source: String,
        destination: String,
        node_id: &str,
    ) -> TransferId {
        let mut transfer = DataTransfer::new();
        transfer.set_transfer_id(self.get_unique_transfer_id());
        transfer.set_transfer_type(transfer_type);
        transfer.set_source_uri(Some(source));
        transfer.set_destination_uri(Some(destination));
        transfer.set_owner_node_id(Some(node_id.to_string()));
        transfer.set_transfer_status_no_modify(TransferStatus::Pending);
        self.add_data_transfer(transfer)
    }

    /// Queue a read of the node's data into the cache.
    ///
    /// A node whose storage carries a URI is read from that URI into the
    /// cache file it maps to; a node with a plain file name is loaded in
    /// place. With force redownload enabled, an existing cached copy is
    /// deleted first, marking every node that references it.
    ///
    /// # Errors
    ///
    /// Fails without queueing anything when the node is unknown or has no
    /// storage reference.
    pub fn queue_read(&mut self, scene: &mut dyn Scene, node_id: &str) -> TransferResult<TransferId> {
        let reference = Self::storage_reference(scene, node_id).map_err(|e| {
            warn!("Cannot queue read for node {}: {}", node_id, e);
            e
        })?;

        let full_path = reference.full_path.to_string_lossy().to_string();
        let (source, destination) = match reference.uri {
            Some(uri) => {
                let cached = self.cache.get_filename_from_uri(Some(&uri));
                (uri, cached.to_string_lossy().to_string())
            }
            None => (full_path.clone(), full_path),
        };

        let transfer_type = if source == destination {
            TransferType::LocalLoad
        } else {
            TransferType::RemoteDownload
        };

        if transfer_type == TransferType::RemoteDownload
            && self.cache.enable_force_redownload()
            && Path::new(&destination).exists()
        {
            info!("Force redownload: dropping cached copy {}", destination);
            self.cache.delete_from_cache(scene, &destination);
        }

        let id = self.register(transfer_type, source, destination, node_id);
        info!("Queued read {} for node {} ({})", id, node_id, transfer_type);
        Ok(id)
    }

    /// Queue a write of the node's data to its storage location.
    ///
    /// # Errors
    ///
    /// Fails without queueing anything when the node is unknown or has no
    /// storage reference.
    pub fn queue_write(&mut self, scene: &dyn Scene, node_id: &str) -> TransferResult<TransferId> {
        let reference = Self::storage_reference(scene, node_id).map_err(|e| {
            warn!("Cannot queue write for node {}: {}", node_id, e);
            e
        })?;

        let source = reference.full_path.to_string_lossy().to_string();
        let destination = reference.uri.unwrap_or_else(|| source.clone());
        let transfer_type = if source == destination {
            TransferType::LocalSave
        } else {
            TransferType::RemoteUpload
        };

        let id = self.register(transfer_type, source, destination, node_id);
        info!("Queued write {} for node {} ({})", id, node_id, transfer_type);
        Ok(id)
    }

    /// Snapshot every pending transfer as a job for the worker
    pub fn pending_jobs(&self) -> Vec<TransferJob> {
        self.transfers
            .iter()
            .filter(|t| t.status() == TransferStatus::Pending)
            .map(DataTransfer::to_job)
            .collect()
    }

    /// Apply a worker report to the registry.
    ///
    /// A completed download refreshes the cache index and runs both
    /// threshold checks.
    pub fn apply_update(&mut self, update: TransferUpdate) -> TransferResult<()> {
        let transfer_id = update.transfer_id();
        let transfer = self
            .get_data_transfer_mut(transfer_id)
            .ok_or(TransferError::NotFound { transfer_id })?;

        match update {
            TransferUpdate::Progress { percent, .. } => {
                transfer.set_progress_percent(percent);
            }
            TransferUpdate::Status { status, error, .. } => {
                if let Some(message) = &error {
                    warn!("Transfer {} reported: {}", transfer_id, message);
                }
                if error.is_some() {
                    transfer.set_error_message(error);
                }
                if status == TransferStatus::Completed {
                    transfer.set_progress_percent(100);
                }
                transfer.set_transfer_status(status, true);

                let downloaded = status == TransferStatus::Completed
                    && transfer.transfer_type() == TransferType::RemoteDownload;
                if downloaded {
                    self.after_download();
                }
            }
        }
        Ok(())
    }

    fn after_download(&mut self) {
        if !self.cache.config().is_enabled() {
            return;
        }
        if let Err(e) = self.cache.update_cache_information() {
            warn!("Failed to refresh cache index after download: {}", e);
        }
        self.cache.cache_size_check();
        self.cache.free_cache_buffer_check();
    }

    /// Request cancellation of a transfer.
    ///
    /// A pending transfer is cancelled on the spot; a running one moves to
    /// `CancelPending` until the worker notices the flag.
    pub fn cancel_transfer(&mut self, transfer_id: TransferId) -> TransferResult<TransferStatus> {
        let transfer = self
            .get_data_transfer_mut(transfer_id)
            .ok_or(TransferError::NotFound { transfer_id })?;

        transfer.set_cancel_requested(true);
        match transfer.status() {
            TransferStatus::Pending | TransferStatus::Idle | TransferStatus::Ready => {
                transfer.set_transfer_status(TransferStatus::Cancelled, true);
            }
            TransferStatus::Running => {
                transfer.set_transfer_status(TransferStatus::CancelPending, true);
            }
            _ => {}
        }
        Ok(transfer.status())
    }

    /// Drop every finished transfer; returns how many were removed
    pub fn remove_completed(&mut self) -> usize {
        let before = self.transfers.len();
        self.transfers.retain(|t| !t.status().is_finished());
        let removed = before - self.transfers.len();
        if removed > 0 {
            debug!("Removed {} finished transfers", removed);
            self.modified();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::{drain_events, CacheConfig, CacheEvent};
    use crate::app::scene::{MemoryScene, NodeClass, SceneNode};
    use std::fs;
    use tempfile::TempDir;

    fn create_manager(temp_dir: &TempDir) -> DataIoManager {
        let root = temp_dir.path().join("cache");
        let config = CacheConfig::with_cache_root(root.to_string_lossy().to_string());
        DataIoManager::new(CacheManager::new(config).unwrap())
    }

    fn remote_scene() -> MemoryScene {
        let mut scene = MemoryScene::new();
        scene.add_node(
            SceneNode::new("volume", NodeClass::Volume).with_storage(StorageNode::with_uri(
                "http://host/data/brain.nrrd",
                "brain.nrrd",
            )),
        );
        scene.add_node(
            SceneNode::new("model", NodeClass::Model)
                .with_storage(StorageNode::with_file("/data/skull.vtk")),
        );
        scene.add_node(SceneNode::new("bare", NodeClass::Transform));
        scene
    }

    #[test]
    fn test_unique_ids_fill_gaps() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        assert_eq!(io.get_unique_transfer_id(), 1);

        for id in [1, 2, 4] {
            let mut transfer = DataTransfer::new();
            transfer.set_transfer_id(id);
            io.add_data_transfer(transfer);
        }
        assert_eq!(io.get_unique_transfer_id(), 3);

        io.remove_data_transfer(1).unwrap();
        assert_eq!(io.get_unique_transfer_id(), 1);
    }

    #[test]
    fn test_queue_read_remote_node() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut scene = remote_scene();

        let id = io.queue_read(&mut scene, "volume").unwrap();
        let transfer = io.get_data_transfer(id).unwrap();
        assert_eq!(transfer.transfer_type(), TransferType::RemoteDownload);
        assert_eq!(transfer.status(), TransferStatus::Pending);
        assert_eq!(transfer.source_uri(), Some("http://host/data/brain.nrrd"));
        let expected = temp_dir.path().join("cache/brain.nrrd");
        assert_eq!(
            transfer.destination_uri(),
            Some(expected.to_string_lossy().as_ref())
        );
        assert_eq!(transfer.owner_node_id(), Some("volume"));
    }

    #[test]
    fn test_queue_read_local_node_loads_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut scene = remote_scene();

        let id = io.queue_read(&mut scene, "model").unwrap();
        let transfer = io.get_data_transfer(id).unwrap();
        assert_eq!(transfer.transfer_type(), TransferType::LocalLoad);
        assert_eq!(transfer.source_uri(), transfer.destination_uri());
    }

    #[test]
    fn test_queue_read_rejects_missing_storage() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut scene = remote_scene();

        assert!(matches!(
            io.queue_read(&mut scene, "bare"),
            Err(TransferError::Scene(SceneError::NoStorageReference { .. }))
        ));
        assert!(matches!(
            io.queue_read(&mut scene, "ghost"),
            Err(TransferError::Scene(SceneError::NodeNotFound { .. }))
        ));
        assert!(io.transfers().is_empty());
        assert_eq!(io.modified_count(), 0);
    }

    #[test]
    fn test_repeated_reads_are_not_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut scene = remote_scene();

        let first = io.queue_read(&mut scene, "volume").unwrap();
        let second = io.queue_read(&mut scene, "volume").unwrap();
        assert_ne!(first, second);
        assert_eq!(io.transfers_for_node("volume").len(), 2);
    }

    #[test]
    fn test_force_redownload_deletes_cached_copy() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let cached = temp_dir.path().join("cache/brain.nrrd");
        fs::write(&cached, b"stale").unwrap();
        io.cache_mut().set_enable_force_redownload(true);
        let mut rx = io.cache().subscribe();

        let mut scene = MemoryScene::new();
        scene.add_node(
            SceneNode::new("volume", NodeClass::Volume).with_storage(StorageNode::with_uri(
                "http://host/data/brain.nrrd",
                cached.clone(),
            )),
        );

        io.queue_read(&mut scene, "volume").unwrap();
        assert!(!cached.exists());
        assert_eq!(scene.modified_node_ids(), vec!["volume"]);
        assert_eq!(
            drain_events(&mut rx),
            vec![CacheEvent::CacheDelete { target: cached }]
        );
    }

    #[test]
    fn test_queue_write_directions() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let scene = remote_scene();

        let upload = io.queue_write(&scene, "volume").unwrap();
        let save = io.queue_write(&scene, "model").unwrap();
        assert_eq!(
            io.get_data_transfer(upload).unwrap().transfer_type(),
            TransferType::RemoteUpload
        );
        assert_eq!(
            io.get_data_transfer(upload).unwrap().destination_uri(),
            Some("http://host/data/brain.nrrd")
        );
        assert_eq!(
            io.get_data_transfer(save).unwrap().transfer_type(),
            TransferType::LocalSave
        );
    }

    #[test]
    fn test_registry_mutations_are_observed() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut rx = io.subscribe();

        let mut transfer = DataTransfer::new();
        transfer.set_transfer_id(1);
        io.add_data_transfer(transfer);
        io.clear_data_transfers();
        io.configure(false);
        io.configure(false);

        assert_eq!(io.modified_count(), 3);
        assert_eq!(rx.try_recv().unwrap(), IoEvent::Modified);
        assert!(!io.is_asynchronous());
    }

    #[test]
    fn test_apply_updates_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut scene = remote_scene();
        let id = io.queue_read(&mut scene, "volume").unwrap();
        let other = io.queue_read(&mut scene, "model").unwrap();
        let mut rx = io.subscribe();

        io.apply_update(TransferUpdate::Progress {
            transfer_id: id,
            percent: 40,
        })
        .unwrap();
        io.apply_update(TransferUpdate::Status {
            transfer_id: other,
            status: TransferStatus::CompletedWithErrors,
            error: Some("missing".to_string()),
        })
        .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            IoEvent::TransferProgress {
                transfer_id: id,
                percent: 40
            }
        );
        assert_eq!(io.get_data_transfer(other).unwrap().error_message(), Some("missing"));

        let stats = io.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);

        assert!(matches!(
            io.apply_update(TransferUpdate::Progress {
                transfer_id: 99,
                percent: 1
            }),
            Err(TransferError::NotFound { transfer_id: 99 })
        ));
    }

    #[test]
    fn test_completed_download_runs_cache_checks() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        io.cache_mut().set_remote_cache_limit(1);
        let mut scene = remote_scene();
        let id = io.queue_read(&mut scene, "volume").unwrap();
        fs::write(
            temp_dir.path().join("cache/brain.nrrd"),
            vec![0u8; 2_000_000],
        )
        .unwrap();
        let mut rx = io.cache().subscribe();

        io.apply_update(TransferUpdate::Status {
            transfer_id: id,
            status: TransferStatus::Completed,
            error: None,
        })
        .unwrap();

        let events = drain_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, CacheEvent::CacheLimitExceeded { limit_mb: 1, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, CacheEvent::InsufficientFreeBuffer { .. })));
        assert_eq!(io.cache().cached_files(), &["brain.nrrd".to_string()]);
        assert_eq!(io.get_data_transfer(id).unwrap().progress_percent(), 100);
    }

    #[test]
    fn test_cancel_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let mut io = create_manager(&temp_dir);
        let mut scene = remote_scene();
        let pending = io.queue_read(&mut scene, "volume").unwrap();
        let running = io.queue_read(&mut scene, "model").unwrap();
        io.apply_update(TransferUpdate::Status {
            transfer_id: running,
            status: TransferStatus::Running,
            error: None,
        })
        .unwrap();

        assert_eq!(io.cancel_transfer(pending).unwrap(), TransferStatus::Cancelled);
        assert_eq!(
            io.cancel_transfer(running).unwrap(),
            TransferStatus::CancelPending
        );
        assert!(io.get_data_transfer(running).unwrap().cancel_requested());
        assert!(io.cancel_transfer(42).is_err());

        assert_eq!(io.remove_completed(), 1);
        assert_eq!(io.transfers().len(), 1);
        assert!(io.pending_jobs().is_empty());
    }
}
