//! Transfer records and the messages exchanged with the transfer worker
//!
//! A [`DataTransfer`] is an inert record of one read or write: direction,
//! endpoints, status, progress and a cooperative cancellation flag. The
//! worker never touches a record directly. It receives a [`TransferJob`]
//! snapshot and reports back with [`TransferUpdate`]s that the owning
//! manager applies.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Identifier of a registered transfer (never 0)
pub type TransferId = u32;

/// Direction and locality of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    RemoteDownload,
    RemoteUpload,
    LocalLoad,
    LocalSave,
    Unspecified,
}

impl TransferType {
    /// Human-readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::RemoteDownload => "RemoteDownload",
            TransferType::RemoteUpload => "RemoteUpload",
            TransferType::LocalLoad => "LocalLoad",
            TransferType::LocalSave => "LocalSave",
            TransferType::Unspecified => "Unspecified",
        }
    }

    /// Whether the transfer crosses the network
    pub fn is_remote(&self) -> bool {
        matches!(self, TransferType::RemoteDownload | TransferType::RemoteUpload)
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Idle,
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    CancelPending,
    Cancelled,
    Ready,
    Deleted,
    TimedOut,
}

impl TransferStatus {
    /// Human-readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Idle => "Idle",
            TransferStatus::Pending => "Pending",
            TransferStatus::Running => "Running",
            TransferStatus::Completed => "Completed",
            TransferStatus::CompletedWithErrors => "CompletedWithErrors",
            TransferStatus::CancelPending => "CancelPending",
            TransferStatus::Cancelled => "Cancelled",
            TransferStatus::Ready => "Ready",
            TransferStatus::Deleted => "Deleted",
            TransferStatus::TimedOut => "TimedOut",
        }
    }

    /// Whether the transfer has reached an end state
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed
                | TransferStatus::CompletedWithErrors
                | TransferStatus::Cancelled
                | TransferStatus::Deleted
                | TransferStatus::TimedOut
        )
    }

    /// Whether the transfer is queued or in flight
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TransferStatus::Pending | TransferStatus::Running | TransferStatus::CancelPending
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label for a raw status code, `"Unknown"` for values outside the taxonomy
pub fn transfer_status_label(code: i32) -> &'static str {
    const STATUSES: [TransferStatus; 10] = [
        TransferStatus::Idle,
        TransferStatus::Pending,
        TransferStatus::Running,
        TransferStatus::Completed,
        TransferStatus::CompletedWithErrors,
        TransferStatus::CancelPending,
        TransferStatus::Cancelled,
        TransferStatus::Ready,
        TransferStatus::Deleted,
        TransferStatus::TimedOut,
    ];
    usize::try_from(code)
        .ok()
        .and_then(|i| STATUSES.get(i))
        .map(TransferStatus::as_str)
        .unwrap_or("Unknown")
}

/// Label for a raw type code, `"Unknown"` for values outside the taxonomy
pub fn transfer_type_label(code: i32) -> &'static str {
    const TYPES: [TransferType; 5] = [
        TransferType::RemoteDownload,
        TransferType::RemoteUpload,
        TransferType::LocalLoad,
        TransferType::LocalSave,
        TransferType::Unspecified,
    ];
    usize::try_from(code)
        .ok()
        .and_then(|i| TYPES.get(i))
        .map(TransferType::as_str)
        .unwrap_or("Unknown")
}

/// Cancellation request shared between a record and the job executing it
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, requested: bool) {
        self.0.store(requested, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Notification emitted by the data I/O manager and its transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    /// The registry or manager settings changed
    Modified,
    /// A transfer changed status
    TransferModified {
        transfer_id: TransferId,
        status: TransferStatus,
    },
    /// A transfer reported progress
    TransferProgress {
        transfer_id: TransferId,
        percent: u8,
    },
}

/// One queued or finished read/write
#[derive(Debug, Clone, Serialize)]
pub struct DataTransfer {
    transfer_id: TransferId,
    transfer_type: TransferType,
    status: TransferStatus,
    source_uri: Option<String>,
    destination_uri: Option<String>,
    owner_node_id: Option<String>,
    progress_percent: u8,
    /// Last error reported by the worker
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    cancel: CancelFlag,
    #[serde(skip)]
    observer: Option<broadcast::Sender<IoEvent>>,
    #[serde(skip)]
    modified_count: u64,
}

impl Default for DataTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTransfer {
    /// Create an idle record with no id
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            transfer_id: 0,
            transfer_type: TransferType::Unspecified,
            status: TransferStatus::Idle,
            source_uri: None,
            destination_uri: None,
            owner_node_id: None,
            progress_percent: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            cancel: CancelFlag::new(),
            observer: None,
            modified_count: 0,
        }
    }

    /// Route this record's notifications to `observer`
    pub fn attach_observer(&mut self, observer: broadcast::Sender<IoEvent>) {
        self.observer = Some(observer);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn notify(&mut self, event: IoEvent) {
        self.modified_count += 1;
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        self.transfer_id
    }

    pub fn set_transfer_id(&mut self, id: TransferId) {
        self.transfer_id = id;
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn set_transfer_type(&mut self, transfer_type: TransferType) {
        self.transfer_type = transfer_type;
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Change status; observers hear about it only when it changed and `notify` is set
    pub fn set_transfer_status(&mut self, status: TransferStatus, notify: bool) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.touch();
        if notify {
            self.notify(IoEvent::TransferModified {
                transfer_id: self.transfer_id,
                status,
            });
        }
    }

    /// Change status without any notification
    pub fn set_transfer_status_no_modify(&mut self, status: TransferStatus) {
        self.set_transfer_status(status, false);
    }

    pub fn transfer_status_string(&self) -> &'static str {
        self.status.as_str()
    }

    pub fn transfer_type_string(&self) -> &'static str {
        self.transfer_type.as_str()
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    pub fn set_source_uri(&mut self, uri: Option<String>) {
        self.source_uri = uri;
    }

    pub fn destination_uri(&self) -> Option<&str> {
        self.destination_uri.as_deref()
    }

    pub fn set_destination_uri(&mut self, uri: Option<String>) {
        self.destination_uri = uri;
    }

    pub fn owner_node_id(&self) -> Option<&str> {
        self.owner_node_id.as_deref()
    }

    pub fn set_owner_node_id(&mut self, id: Option<String>) {
        self.owner_node_id = id;
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    /// Record progress, clamped to 100
    pub fn set_progress_percent(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.progress_percent == percent {
            return;
        }
        self.progress_percent = percent;
        self.touch();
        self.notify(IoEvent::TransferProgress {
            transfer_id: self.transfer_id,
            percent,
        });
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: Option<String>) {
        self.error_message = message;
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_set()
    }

    /// Ask the worker to stop; advisory only
    pub fn set_cancel_requested(&mut self, requested: bool) {
        self.cancel.set(requested);
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Number of notifications this record has produced
    pub fn modified_count(&self) -> u64 {
        self.modified_count
    }

    /// Snapshot handed to the worker
    pub fn to_job(&self) -> TransferJob {
        TransferJob {
            transfer_id: self.transfer_id,
            transfer_type: self.transfer_type,
            source_uri: self.source_uri.clone(),
            destination_uri: self.destination_uri.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Work item for the transfer worker
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub transfer_id: TransferId,
    pub transfer_type: TransferType,
    pub source_uri: Option<String>,
    pub destination_uri: Option<String>,
    pub cancel: CancelFlag,
}

/// Report from the worker about one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    Status {
        transfer_id: TransferId,
        status: TransferStatus,
        error: Option<String>,
    },
    Progress {
        transfer_id: TransferId,
        percent: u8,
    },
}

impl TransferUpdate {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            TransferUpdate::Status { transfer_id, .. }
            | TransferUpdate::Progress { transfer_id, .. } => *transfer_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transfer_defaults() {
        let transfer = DataTransfer::new();
        assert_eq!(transfer.transfer_id(), 0);
        assert_eq!(transfer.status(), TransferStatus::Idle);
        assert_eq!(transfer.transfer_type(), TransferType::Unspecified);
        assert_eq!(transfer.progress_percent(), 0);
        assert!(!transfer.cancel_requested());
        assert!(transfer.source_uri().is_none());
    }

    #[test]
    fn test_status_change_notifies_once() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut transfer = DataTransfer::new();
        transfer.set_transfer_id(7);
        transfer.attach_observer(tx);

        transfer.set_transfer_status(TransferStatus::Pending, true);
        transfer.set_transfer_status(TransferStatus::Pending, true);
        assert_eq!(transfer.modified_count(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            IoEvent::TransferModified {
                transfer_id: 7,
                status: TransferStatus::Pending
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_silent_status_change() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut transfer = DataTransfer::new();
        transfer.attach_observer(tx);

        transfer.set_transfer_status_no_modify(TransferStatus::Running);
        transfer.set_transfer_status(TransferStatus::Completed, false);
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(transfer.modified_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut transfer = DataTransfer::new();
        transfer.set_progress_percent(250);
        assert_eq!(transfer.progress_percent(), 100);
    }

    #[test]
    fn test_labels() {
        let mut transfer = DataTransfer::new();
        transfer.set_transfer_type(TransferType::RemoteDownload);
        transfer.set_transfer_status_no_modify(TransferStatus::CompletedWithErrors);
        assert_eq!(transfer.transfer_type_string(), "RemoteDownload");
        assert_eq!(transfer.transfer_status_string(), "CompletedWithErrors");

        assert_eq!(transfer_status_label(9), "TimedOut");
        assert_eq!(transfer_status_label(10), "Unknown");
        assert_eq!(transfer_status_label(-1), "Unknown");
        assert_eq!(transfer_type_label(2), "LocalLoad");
        assert_eq!(transfer_type_label(42), "Unknown");
    }

    #[test]
    fn test_cancel_flag_is_shared_with_jobs() {
        let mut transfer = DataTransfer::new();
        let job = transfer.to_job();
        assert!(!job.cancel.is_set());

        transfer.set_cancel_requested(true);
        assert!(job.cancel.is_set());
    }

    #[test]
    fn test_status_predicates() {
        assert!(TransferStatus::Pending.is_active());
        assert!(!TransferStatus::Pending.is_finished());
        assert!(TransferStatus::TimedOut.is_finished());
        assert!(TransferType::RemoteUpload.is_remote());
        assert!(!TransferType::LocalSave.is_remote());
    }
}
