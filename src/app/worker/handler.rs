//! URI handlers
//!
//! A [`UriHandler`] moves bytes between a URI and a local path. Handlers
//! report progress as `(bytes_done, bytes_total)` through a
//! [`ProgressReporter`] and poll the transfer's [`CancelFlag`] between
//! chunks. Staged files are written to a temporary sibling and renamed
//! into place, so a destination never holds a partial transfer.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::app::transfer::{CancelFlag, TransferId, TransferUpdate};
use crate::app::uri;
use crate::constants::{files, uri::FILE_SCHEME};
use crate::errors::{TransferError, TransferResult};

/// Converts byte counts into percentage updates for one transfer
#[derive(Debug)]
pub struct ProgressReporter {
    transfer_id: TransferId,
    tx: mpsc::Sender<TransferUpdate>,
    last_percent: Option<u8>,
}

impl ProgressReporter {
    pub fn new(transfer_id: TransferId, tx: mpsc::Sender<TransferUpdate>) -> Self {
        Self {
            transfer_id,
            tx,
            last_percent: None,
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        self.transfer_id
    }

    /// Report bytes transferred so far; only percentage changes are forwarded
    pub fn report(&mut self, bytes_done: u64, bytes_total: Option<u64>) {
        let Some(total) = bytes_total else {
            return;
        };
        let percent = percent_of(bytes_done, total);
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);

        let update = TransferUpdate::Progress {
            transfer_id: self.transfer_id,
            percent,
        };
        // Progress is lossy; status updates are not
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(update) {
            debug!(
                "Progress channel full, skipping update for transfer {}",
                self.transfer_id
            );
        }
    }
}

/// Percentage of `total` covered by `done`, clamped to 0..=100
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

/// Temporary sibling used while transfer `transfer_id` stages `destination`.
///
/// Two transfers staging the same destination never share a temp file.
pub fn temp_path_for(destination: &Path, transfer_id: TransferId) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!(".{}{}", transfer_id, files::TEMP_FILE_SUFFIX));
    destination.with_file_name(name)
}

/// Move a finished temp file into place, cleaning up on failure
pub async fn commit_temp_file(temp_path: &Path, destination: &Path) -> TransferResult<()> {
    if let Err(e) = tokio::fs::rename(temp_path, destination).await {
        debug!("Rename of {} failed: {}", temp_path.display(), e);
        let _ = tokio::fs::remove_file(temp_path).await;
        return Err(TransferError::AtomicOperationFailed {
            temp_path: temp_path.to_path_buf(),
            final_path: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Something that can fetch a URI to a local path and push a local path to a URI
#[async_trait]
pub trait UriHandler: Send + Sync + fmt::Debug {
    /// Short name for logs and errors
    fn name(&self) -> &'static str;

    /// Whether this handler understands the URI's scheme
    fn can_handle(&self, uri: &str) -> bool;

    /// Fetch `source_uri` into `destination`, returning the byte count
    async fn stage_file_read(
        &self,
        source_uri: &str,
        destination: &Path,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64>;

    /// Push `source` to `destination_uri`, returning the byte count
    async fn stage_file_write(
        &self,
        source: &Path,
        destination_uri: &str,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64>;
}

/// Handler for `file://` URIs and plain paths
#[derive(Debug, Clone)]
pub struct FileUriHandler {
    chunk_size: usize,
}

impl FileUriHandler {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Local path a `file://` URI or bare path points to
    pub fn local_path(uri: &str) -> PathBuf {
        PathBuf::from(uri::decode_uri(uri::strip_scheme(uri)))
    }

    async fn copy(
        &self,
        source: &Path,
        destination: &Path,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let metadata = tokio::fs::metadata(source)
            .await
            .map_err(|_| TransferError::SourceNotFound {
                source_uri: source.display().to_string(),
            })?;
        let total = metadata.len();

        if source == destination {
            progress.report(total, Some(total));
            return Ok(total);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(destination, progress.transfer_id());
        let result = self
            .copy_chunks(source, &temp_path, total, progress, cancel)
            .await;
        match result {
            Ok(copied) => {
                commit_temp_file(&temp_path, destination).await?;
                debug!(
                    "Copied {} bytes from {} to {}",
                    copied,
                    source.display(),
                    destination.display()
                );
                Ok(copied)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn copy_chunks(
        &self,
        source: &Path,
        temp_path: &Path,
        total: u64,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let mut reader = File::open(source).await?;
        let mut writer = File::create(temp_path).await?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut copied = 0u64;

        progress.report(0, Some(total));
        loop {
            if cancel.is_set() {
                return Err(TransferError::Cancelled);
            }
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            copied += read as u64;
            progress.report(copied, Some(total));
        }
        writer.flush().await?;
        Ok(copied)
    }
}

impl Default for FileUriHandler {
    fn default() -> Self {
        Self::new(crate::constants::workers::COPY_CHUNK_SIZE)
    }
}

#[async_trait]
impl UriHandler for FileUriHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn can_handle(&self, uri: &str) -> bool {
        match uri::scheme(uri) {
            Some(scheme) => scheme == FILE_SCHEME,
            None => true,
        }
    }

    async fn stage_file_read(
        &self,
        source_uri: &str,
        destination: &Path,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let source = Self::local_path(source_uri);
        self.copy(&source, destination, progress, cancel).await
    }

    async fn stage_file_write(
        &self,
        source: &Path,
        destination_uri: &str,
        progress: &mut ProgressReporter,
        cancel: &CancelFlag,
    ) -> TransferResult<u64> {
        let destination = Self::local_path(destination_uri);
        self.copy(source, &destination, progress, cancel).await
    }
}
