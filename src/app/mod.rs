//! Core application logic for remote-cache
//!
//! This module contains the cache manager, the transfer registry, the
//! asynchronous worker and the small collaborator contracts they share.
//!
//! # Examples
//!
//! ```rust,no_run
//! use remote_cache::app::{CacheConfig, CacheManager, DataIoManager, MemoryScene};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheManager::new(CacheConfig::with_cache_root("/tmp/remote-cache"))?;
//! let mut io = DataIoManager::new(cache);
//! let mut scene = MemoryScene::from_json_file("scene.json".as_ref())?;
//!
//! let transfer_id = io.queue_read(&mut scene, "volume")?;
//! println!("queued transfer {}", transfer_id);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod scene;
pub mod transfer;
pub mod uri;
pub mod worker;

// Re-export main public API
pub use cache::{CacheConfig, CacheEvent, CacheManager, CacheStats, DeleteOutcome};
pub use scene::{MemoryScene, NodeClass, Scene, SceneNode, StorableNode, StorageNode};
pub use transfer::{
    DataIoManager, DataTransfer, IoEvent, TransferId, TransferStats, TransferStatus, TransferType,
};
pub use worker::{drive_pending_transfers, TransferWorker, UriHandler, WorkerConfig};
