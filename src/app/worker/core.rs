//! Transfer execution
//!
//! [`TransferWorker`] runs one [`TransferJob`] at a time per call, picking a
//! [`UriHandler`] by scheme, retrying recoverable failures and enforcing the
//! per-transfer timeout. Records are never touched from here: every outcome
//! goes back over an mpsc channel as a [`TransferUpdate`].
//!
//! [`drive_pending_transfers`] is the controller side. It owns the
//! [`DataIoManager`] for the duration of a batch and is the only place
//! updates are applied, so the registry keeps a single writer.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app::transfer::{
    DataIoManager, TransferJob, TransferStatus, TransferType, TransferUpdate,
};
use crate::constants::uri::NULL_SENTINEL;
use crate::errors::{TransferError, TransferResult};

use super::config::WorkerConfig;
use super::handler::{FileUriHandler, ProgressReporter, UriHandler};
use super::http::HttpUriHandler;

/// Executes transfer jobs through registered URI handlers
#[derive(Debug)]
pub struct TransferWorker {
    config: WorkerConfig,
    handlers: Vec<Arc<dyn UriHandler>>,
    semaphore: Arc<Semaphore>,
}

impl TransferWorker {
    /// Create a worker with the file and HTTP handlers registered
    pub fn new(config: WorkerConfig) -> TransferResult<Self> {
        let file: Arc<dyn UriHandler> = Arc::new(FileUriHandler::new(config.copy_chunk_size));
        let http: Arc<dyn UriHandler> = Arc::new(HttpUriHandler::new()?);
        Self::with_handlers(config, vec![file, http])
    }

    /// Create a worker with an explicit handler list, first match wins
    pub fn with_handlers(
        config: WorkerConfig,
        handlers: Vec<Arc<dyn UriHandler>>,
    ) -> TransferResult<Self> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_transfers)),
            config,
            handlers,
        })
    }

    pub fn register_handler(&mut self, handler: Arc<dyn UriHandler>) {
        self.handlers.push(handler);
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// First registered handler that accepts `uri`
    pub fn handler_for(&self, uri: &str) -> Option<Arc<dyn UriHandler>> {
        self.handlers.iter().find(|h| h.can_handle(uri)).cloned()
    }

    /// Run one job to a final status, reporting over `updates`
    pub async fn execute(
        &self,
        job: TransferJob,
        updates: mpsc::Sender<TransferUpdate>,
    ) -> TransferStatus {
        let transfer_id = job.transfer_id;

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return Self::finish(&updates, transfer_id, TransferStatus::Cancelled, None).await;
            }
        };

        if job.cancel.is_set() {
            debug!("Transfer {} cancelled before start", transfer_id);
            return Self::finish(&updates, transfer_id, TransferStatus::Cancelled, None).await;
        }

        let _ = updates
            .send(TransferUpdate::Status {
                transfer_id,
                status: TransferStatus::Running,
                error: None,
            })
            .await;

        let mut progress = ProgressReporter::new(transfer_id, updates.clone());
        let outcome =
            tokio::time::timeout(self.config.transfer_timeout, self.run_with_retries(&job, &mut progress))
                .await;

        let (status, error) = match outcome {
            Ok(Ok(bytes)) => {
                info!("Transfer {} completed ({} bytes)", transfer_id, bytes);
                (TransferStatus::Completed, None)
            }
            Ok(Err(TransferError::Cancelled)) => {
                info!("Transfer {} cancelled", transfer_id);
                (TransferStatus::Cancelled, None)
            }
            Ok(Err(e)) => {
                warn!("Transfer {} failed: {}", transfer_id, e);
                (TransferStatus::CompletedWithErrors, Some(e.to_string()))
            }
            Err(_) => {
                let e = TransferError::Timeout {
                    seconds: self.config.transfer_timeout.as_secs(),
                };
                warn!("Transfer {} timed out", transfer_id);
                (TransferStatus::TimedOut, Some(e.to_string()))
            }
        };

        Self::finish(&updates, transfer_id, status, error).await
    }

    async fn finish(
        updates: &mpsc::Sender<TransferUpdate>,
        transfer_id: u32,
        status: TransferStatus,
        error: Option<String>,
    ) -> TransferStatus {
        if updates
            .send(TransferUpdate::Status {
                transfer_id,
                status,
                error,
            })
            .await
            .is_err()
        {
            debug!("Controller gone before transfer {} reported", transfer_id);
        }
        status
    }

    async fn run_with_retries(
        &self,
        job: &TransferJob,
        progress: &mut ProgressReporter,
    ) -> TransferResult<u64> {
        let mut retry_count = 0;
        let mut retry_delay = self.config.retry_base_delay;

        loop {
            match self.attempt(job, progress).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retry_count < self.config.max_retries => {
                    retry_count += 1;
                    warn!(
                        "Transfer {} failed (attempt {}/{}): {}. Retrying in {}ms",
                        job.transfer_id,
                        retry_count,
                        self.config.max_retries,
                        e,
                        retry_delay.as_millis()
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                    if job.cancel.is_set() {
                        return Err(TransferError::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, job: &TransferJob, progress: &mut ProgressReporter) -> TransferResult<u64> {
        let source = required(job.source_uri.as_deref(), "source")?;
        let destination = required(job.destination_uri.as_deref(), "destination")?;

        match job.transfer_type {
            TransferType::RemoteDownload => {
                let handler = self.handler_for(source).ok_or_else(|| TransferError::NoHandler {
                    uri: source.to_string(),
                })?;
                debug!(
                    "Transfer {} reading {} via {} handler",
                    job.transfer_id,
                    source,
                    handler.name()
                );
                handler
                    .stage_file_read(source, Path::new(destination), progress, &job.cancel)
                    .await
            }
            TransferType::RemoteUpload => {
                let handler =
                    self.handler_for(destination)
                        .ok_or_else(|| TransferError::NoHandler {
                            uri: destination.to_string(),
                        })?;
                debug!(
                    "Transfer {} writing {} via {} handler",
                    job.transfer_id,
                    destination,
                    handler.name()
                );
                handler
                    .stage_file_write(
                        &FileUriHandler::local_path(source),
                        destination,
                        progress,
                        &job.cancel,
                    )
                    .await
            }
            TransferType::LocalLoad => {
                let path = FileUriHandler::local_path(source);
                let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
                    TransferError::SourceNotFound {
                        source_uri: source.to_string(),
                    }
                })?;
                progress.report(metadata.len(), Some(metadata.len()));
                Ok(metadata.len())
            }
            // The storage collaborator writes the bytes in place
            TransferType::LocalSave => {
                progress.report(0, Some(0));
                Ok(0)
            }
            TransferType::Unspecified => Err(TransferError::Unsupported {
                handler: "worker",
                operation: "unspecified transfer type",
            }),
        }
    }
}

fn required<'a>(uri: Option<&'a str>, which: &str) -> TransferResult<&'a str> {
    match uri {
        Some(uri) if !uri.is_empty() => Ok(uri),
        _ => Err(TransferError::InvalidUri {
            uri: NULL_SENTINEL.to_string(),
            error: format!("missing {} URI", which),
        }),
    }
}

/// Run every pending transfer of `io` and apply the results.
///
/// Jobs run concurrently, bounded by the worker's semaphore, unless either
/// the manager or the worker is configured synchronous, in which case they
/// run one after another in registry order. Returns the number of jobs run.
pub async fn drive_pending_transfers(io: &mut DataIoManager, worker: &Arc<TransferWorker>) -> usize {
    let jobs = io.pending_jobs();
    if jobs.is_empty() {
        return 0;
    }
    let count = jobs.len();
    info!("Dispatching {} pending transfers", count);

    if io.is_asynchronous() && worker.config().asynchronous {
        run_batch(io, worker, jobs).await;
    } else {
        for job in jobs {
            run_batch(io, worker, vec![job]).await;
        }
    }
    count
}

async fn run_batch(io: &mut DataIoManager, worker: &Arc<TransferWorker>, jobs: Vec<TransferJob>) {
    let (tx, mut rx) = mpsc::channel(worker.config().progress_buffer_size);
    let mut tasks = JoinSet::new();

    for job in jobs {
        let worker = Arc::clone(worker);
        let tx = tx.clone();
        tasks.spawn(async move { worker.execute(job, tx).await });
    }
    drop(tx);

    while let Some(update) = rx.recv().await {
        if let Err(e) = io.apply_update(update) {
            warn!("Dropping transfer update: {}", e);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Transfer task failed to complete: {}", e);
        }
    }
}
