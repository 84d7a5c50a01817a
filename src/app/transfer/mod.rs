//! Transfer bookkeeping
//!
//! - [`types`] - Transfer records, status taxonomy and worker messages
//! - [`manager`] - The data I/O manager and its registry

pub mod manager;
pub mod types;

pub use manager::{DataIoManager, TransferStats};
pub use types::{
    transfer_status_label, transfer_type_label, CancelFlag, DataTransfer, IoEvent, TransferId,
    TransferJob, TransferStatus, TransferType, TransferUpdate,
};
