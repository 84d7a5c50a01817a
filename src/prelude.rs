//! Prelude module for the remote-cache library
//!
//! Re-exports the items most integrations need, so that a single
//! `use remote_cache::prelude::*;` is enough for typical usage.
//!
//! # Usage
//!
//! ```rust,no_run
//! use remote_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cache = CacheManager::new(CacheConfig::with_cache_root("/tmp/remote-cache"))?;
//!     let mut io = DataIoManager::new(cache);
//!     let worker = Arc::new(TransferWorker::new(WorkerConfig::default())?);
//!
//!     let mut scene = MemoryScene::new();
//!     scene.add_node(
//!         SceneNode::new("volume", NodeClass::Volume)
//!             .with_storage(StorageNode::with_uri("https://example.org/brain.nrrd", "brain.nrrd")),
//!     );
//!     io.queue_read(&mut scene, "volume")?;
//!     drive_pending_transfers(&mut io, &worker).await;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components
pub use crate::app::{
    drive_pending_transfers, CacheConfig, CacheEvent, CacheManager, CacheStats, DataIoManager,
    DataTransfer, DeleteOutcome, IoEvent, MemoryScene, NodeClass, Scene, SceneNode, StorableNode,
    StorageNode, TransferId, TransferStats, TransferStatus, TransferType, TransferWorker,
    UriHandler, WorkerConfig,
};

// Configuration
pub use crate::config::AppConfig;

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        let _config = CacheConfig::default();
        let _worker_config = WorkerConfig::default();
        let _app_config = AppConfig::default();
        assert_eq!(TransferStatus::Pending.as_str(), "Pending");
    }

    #[tokio::test]
    async fn test_prelude_integration_pattern() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let cache =
            CacheManager::new(CacheConfig::with_cache_root(temp_dir.path().to_string_lossy()))
                .unwrap();
        let io = DataIoManager::new(cache);
        let worker = Arc::new(TransferWorker::new(WorkerConfig::testing()).unwrap());

        assert_eq!(io.stats().total, 0);
        assert_eq!(worker.config().max_concurrent_transfers, 2);
    }
}
