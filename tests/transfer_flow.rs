//! Integration tests for the read path
//!
//! These tests queue reads on the data I/O manager for `file://` URIs, drive
//! them through the transfer worker and check the cache and the registry
//! afterwards.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::broadcast;

use remote_cache::app::cache::{drain_events, CacheConfig, CacheEvent, CacheManager, DeleteOutcome};
use remote_cache::app::scene::{MemoryScene, NodeClass, SceneNode, StorageNode};
use remote_cache::app::transfer::{DataIoManager, IoEvent, TransferStatus, TransferType};
use remote_cache::app::worker::{drive_pending_transfers, TransferWorker, WorkerConfig};

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn io_manager(cache_root: &Path, limit_mb: u64, buffer_mb: u64) -> DataIoManager {
    let config = CacheConfig::with_cache_root(cache_root.to_string_lossy().to_string())
        .with_limit_mb(limit_mb)
        .with_free_buffer_mb(buffer_mb);
    DataIoManager::new(CacheManager::new(config).unwrap())
}

fn remote_node(id: &str, uri: &str) -> SceneNode {
    SceneNode::new(id, NodeClass::Volume).with_storage(StorageNode::with_uri(uri, "unused.nrrd"))
}

fn worker() -> Arc<TransferWorker> {
    Arc::new(TransferWorker::new(WorkerConfig::testing()).unwrap())
}

fn collect_io_events(rx: &mut broadcast::Receiver<IoEvent>) -> Vec<IoEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_remote_reads_land_in_cache() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    fs::write(sources.path().join("brain.nrrd"), vec![1u8; 10_000]).unwrap();
    fs::write(sources.path().join("tract.vtk"), vec![2u8; 20_000]).unwrap();

    let mut io = io_manager(cache_dir.path(), 0, 0);
    let mut scene = MemoryScene::new();
    scene.add_node(remote_node(
        "volume",
        &file_uri(&sources.path().join("brain.nrrd")),
    ));
    scene.add_node(remote_node(
        "fibers",
        &file_uri(&sources.path().join("tract.vtk")),
    ));

    let first = io.queue_read(&mut scene, "volume").unwrap();
    let second = io.queue_read(&mut scene, "fibers").unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(
        io.get_data_transfer(first).unwrap().transfer_type(),
        TransferType::RemoteDownload
    );

    let executed = drive_pending_transfers(&mut io, &worker()).await;
    assert_eq!(executed, 2);

    for id in [first, second] {
        let transfer = io.get_data_transfer(id).unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(transfer.progress_percent(), 100);
    }

    assert_eq!(
        fs::read(cache_dir.path().join("brain.nrrd")).unwrap(),
        vec![1u8; 10_000]
    );
    let cached = io.cache().cached_files();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().any(|f| f.ends_with("tract.vtk")));
    assert!(io.cache().current_cache_size_mb() >= 0.03);
}

#[tokio::test]
async fn test_events_follow_transfer_lifecycle() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    fs::write(sources.path().join("seg.nrrd"), vec![3u8; 4096]).unwrap();

    let mut io = io_manager(cache_dir.path(), 0, 0);
    let mut events = io.subscribe();
    let mut scene = MemoryScene::new();
    scene.add_node(remote_node(
        "seg",
        &file_uri(&sources.path().join("seg.nrrd")),
    ));

    let id = io.queue_read(&mut scene, "seg").unwrap();
    drive_pending_transfers(&mut io, &worker()).await;

    let statuses: Vec<TransferStatus> = collect_io_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            IoEvent::TransferModified {
                transfer_id,
                status,
            } if transfer_id == id => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![TransferStatus::Running, TransferStatus::Completed]
    );
}

#[tokio::test]
async fn test_download_past_limit_signals_thresholds() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    fs::write(sources.path().join("big.nrrd"), vec![0u8; 2_000_000]).unwrap();

    let mut io = io_manager(cache_dir.path(), 1, 1);
    let mut cache_events = io.cache().subscribe();
    let mut scene = MemoryScene::new();
    scene.add_node(remote_node(
        "big",
        &file_uri(&sources.path().join("big.nrrd")),
    ));

    io.queue_read(&mut scene, "big").unwrap();
    drive_pending_transfers(&mut io, &worker()).await;

    let events = drain_events(&mut cache_events);
    assert!(events
        .iter()
        .any(|e| matches!(e, CacheEvent::CacheLimitExceeded { limit_mb: 1, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, CacheEvent::InsufficientFreeBuffer { buffer_mb: 1, .. })));
    // Advisory only: nothing is evicted
    assert!(cache_dir.path().join("big.nrrd").exists());
}

#[tokio::test]
async fn test_missing_source_completes_with_errors() {
    let cache_dir = TempDir::new().unwrap();
    let mut io = io_manager(cache_dir.path(), 0, 0);
    let mut scene = MemoryScene::new();
    scene.add_node(remote_node("ghost", "file:///no/such/dir/ghost.vtk"));

    let id = io.queue_read(&mut scene, "ghost").unwrap();
    drive_pending_transfers(&mut io, &worker()).await;

    let transfer = io.get_data_transfer(id).unwrap();
    assert_eq!(transfer.status(), TransferStatus::CompletedWithErrors);
    assert!(transfer.error_message().is_some());
    assert!(io.cache().cached_files().is_empty());
    assert_eq!(io.stats().failed, 1);
}

#[tokio::test]
async fn test_force_redownload_replaces_cached_copy() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let source = sources.path().join("scan.nrrd");
    fs::write(&source, b"fresh").unwrap();
    fs::write(cache_dir.path().join("scan.nrrd"), b"stale").unwrap();

    let mut io = io_manager(cache_dir.path(), 0, 0);
    io.cache_mut().set_enable_force_redownload(true);

    let mut scene = MemoryScene::new();
    scene.add_node(remote_node("scan", &file_uri(&source)));
    scene.add_node(
        SceneNode::new("other", NodeClass::Model).with_storage(StorageNode::with_file(
            cache_dir.path().join("scan.nrrd"),
        )),
    );

    io.queue_read(&mut scene, "scan").unwrap();
    // The stale copy is gone before anything runs, and its readers know it
    assert!(!cache_dir.path().join("scan.nrrd").exists());
    assert_eq!(
        scene.modified_node_ids(),
        vec!["scan".to_string(), "other".to_string()]
    );

    drive_pending_transfers(&mut io, &worker()).await;
    assert_eq!(fs::read(cache_dir.path().join("scan.nrrd")).unwrap(), b"fresh");
}

#[tokio::test]
async fn test_synchronous_mode_runs_in_order() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let mut io = io_manager(cache_dir.path(), 0, 0);
    io.configure(false);

    let mut scene = MemoryScene::new();
    for name in ["a.vtk", "b.vtk", "c.vtk"] {
        fs::write(sources.path().join(name), name.as_bytes()).unwrap();
        scene.add_node(remote_node(name, &file_uri(&sources.path().join(name))));
    }
    for name in ["a.vtk", "b.vtk", "c.vtk"] {
        io.queue_read(&mut scene, name).unwrap();
    }

    let mut events = io.subscribe();
    drive_pending_transfers(&mut io, &worker()).await;

    let order: Vec<u32> = collect_io_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            IoEvent::TransferModified {
                transfer_id,
                status: TransferStatus::Running,
            } => Some(transfer_id),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(io.stats().completed, 3);
}

#[tokio::test]
async fn test_cancelled_transfer_is_not_run() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    fs::write(sources.path().join("skip.nrrd"), b"data").unwrap();

    let mut io = io_manager(cache_dir.path(), 0, 0);
    let mut scene = MemoryScene::new();
    scene.add_node(remote_node(
        "skip",
        &file_uri(&sources.path().join("skip.nrrd")),
    ));

    let id = io.queue_read(&mut scene, "skip").unwrap();
    assert_eq!(io.cancel_transfer(id).unwrap(), TransferStatus::Cancelled);
    assert_eq!(drive_pending_transfers(&mut io, &worker()).await, 0);
    assert!(!cache_dir.path().join("skip.nrrd").exists());

    assert_eq!(io.remove_completed(), 1);
    assert!(io.transfers().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_reads_of_one_node_both_complete() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let payload: Vec<u8> = (0..2_000_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(sources.path().join("brain.nrrd"), &payload).unwrap();

    let mut io = io_manager(cache_dir.path(), 0, 0);
    let mut scene = MemoryScene::new();
    scene.add_node(remote_node(
        "volume",
        &file_uri(&sources.path().join("brain.nrrd")),
    ));
    let first = io.queue_read(&mut scene, "volume").unwrap();
    let second = io.queue_read(&mut scene, "volume").unwrap();
    assert_ne!(first, second);

    let worker = Arc::new(
        TransferWorker::new(WorkerConfig::testing().with_copy_chunk_size(1024)).unwrap(),
    );
    assert_eq!(drive_pending_transfers(&mut io, &worker).await, 2);

    for id in [first, second] {
        let transfer = io.get_data_transfer(id).unwrap();
        assert_eq!(
            transfer.status(),
            TransferStatus::Completed,
            "transfer {} failed: {:?}",
            id,
            transfer.error_message()
        );
    }
    assert_eq!(fs::read(cache_dir.path().join("brain.nrrd")).unwrap(), payload);
    // Neither transfer leaves its staging file behind
    assert_eq!(fs::read_dir(cache_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_deleting_download_marks_its_node() {
    let sources = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    fs::write(sources.path().join("brain.nrrd"), b"volume data").unwrap();

    let mut io = io_manager(cache_dir.path(), 0, 0);
    let mut scene = MemoryScene::new();
    scene.add_node(
        SceneNode::new("volume", NodeClass::Volume).with_storage(StorageNode::with_uri(
            file_uri(&sources.path().join("brain.nrrd")),
            "brain.nrrd",
        )),
    );
    scene.add_node(remote_node("unrelated", "https://host/data/other.nrrd"));

    let id = io.queue_read(&mut scene, "volume").unwrap();
    drive_pending_transfers(&mut io, &worker()).await;
    assert_eq!(
        io.get_data_transfer(id).unwrap().status(),
        TransferStatus::Completed
    );

    let outcome = io.cache_mut().delete_from_cache(&mut scene, "brain.nrrd");
    assert_eq!(
        outcome,
        DeleteOutcome::Deleted {
            path: cache_dir.path().join("brain.nrrd"),
            nodes_marked: 1,
        }
    );
    assert_eq!(scene.modified_node_ids(), vec!["volume".to_string()]);
}
