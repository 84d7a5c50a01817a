//! Asynchronous transfer worker
//!
//! The worker executes the transfers the data I/O manager has queued. It is
//! the only asynchronous part of the crate: the cache manager and the
//! registry stay synchronous and are only ever mutated by the controller
//! loop in [`drive_pending_transfers`].
//!
//! # Module Organization
//!
//! - [`config`] - Worker configuration with validation
//! - [`handler`] - The [`UriHandler`] trait, progress reporting and the file handler
//! - [`http`] - HTTP(S) handler built on reqwest
//! - [`core`] - Job execution with retries and timeouts, plus the controller loop
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remote_cache::app::cache::{CacheConfig, CacheManager};
//! use remote_cache::app::scene::MemoryScene;
//! use remote_cache::app::transfer::DataIoManager;
//! use remote_cache::app::worker::{drive_pending_transfers, TransferWorker, WorkerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheManager::new(CacheConfig::with_cache_root("/tmp/remote-cache"))?;
//! let mut io = DataIoManager::new(cache);
//! let mut scene = MemoryScene::from_json_file("scene.json".as_ref())?;
//!
//! io.queue_read(&mut scene, "volume")?;
//!
//! let worker = Arc::new(TransferWorker::new(WorkerConfig::default())?);
//! drive_pending_transfers(&mut io, &worker).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod handler;
pub mod http;

pub use config::WorkerConfig;
pub use self::core::{drive_pending_transfers, TransferWorker};
pub use handler::{percent_of, FileUriHandler, ProgressReporter, UriHandler};
pub use http::HttpUriHandler;
