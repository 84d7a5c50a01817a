//! Error types for the remote cache
//!
//! Each subsystem has its own error enum; [`AppError`] wraps them for callers
//! that work across subsystems. Most cache operations are "soft" failures that
//! get logged and reported through a return value, so these errors mainly
//! surface from configuration, transfers and the command line.

use std::path::PathBuf;
use thiserror::Error;

/// Cache management errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// No cache directory is configured
    #[error("Cache directory is not set")]
    DirectoryNotSet,

    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Path is expected to be a directory but is not
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The cache directory was removed but could not be created again
    #[error("Failed to recreate cache directory: {path}")]
    RecreationFailed { path: PathBuf },

    /// Removing a cached file or directory failed
    #[error("Failed to remove {path}: {reason}")]
    RemovalFailed { path: PathBuf, reason: String },

    /// I/O error during cache operations
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),
}

/// Errors raised while resolving scene nodes
#[derive(Error, Debug)]
pub enum SceneError {
    /// No node with the given id exists in the scene
    #[error("Node not found in scene: {node_id}")]
    NodeNotFound { node_id: String },

    /// The node has no storage node attached
    #[error("Node {node_id} has no storage reference")]
    NoStorageReference { node_id: String },

    /// Scene document could not be parsed
    #[error("Invalid scene document")]
    InvalidDocument(#[from] serde_json::Error),

    /// Scene document could not be read
    #[error("Failed to read scene document")]
    Io(#[from] std::io::Error),
}

/// Transfer bookkeeping and execution errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Node lookup failed while queueing a transfer
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// No transfer with the given id is registered
    #[error("Transfer not found: {transfer_id}")]
    NotFound { transfer_id: u32 },

    /// No URI handler accepts the reference
    #[error("No handler available for URI: {uri}")]
    NoHandler { uri: String },

    /// The handler does not support this direction
    #[error("{handler} does not support {operation}")]
    Unsupported {
        handler: &'static str,
        operation: &'static str,
    },

    /// Invalid URI
    #[error("Invalid URI: {uri} - {error}")]
    InvalidUri { uri: String, error: String },

    /// Source of a transfer does not exist
    #[error("Source not found: {source_uri}")]
    SourceNotFound { source_uri: String },

    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// I/O error during transfer
    #[error("Transfer I/O error")]
    Io(#[from] std::io::Error),

    /// Transfer exceeded its time budget
    #[error("Transfer timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Transfer was cancelled by request
    #[error("Transfer cancelled")]
    Cancelled,

    /// Atomic rename of the staged file failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Worker configuration is invalid
    #[error("Invalid worker configuration: {0}")]
    Configuration(String),
}

impl TransferError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Http(_) => true,
            TransferError::ServerError { status } => *status >= 500 || *status == 429,
            TransferError::Io(_) => true,
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// No user configuration directory could be determined
    #[error("Could not determine user config directory")]
    NoConfigDirectory,

    /// I/O error reading or writing configuration
    #[error("Configuration I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Scene error
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Transfer error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transfer(e) => e.is_retryable() || matches!(e, TransferError::Timeout { .. }),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Cache(_) => "cache",
            AppError::Scene(_) => "scene",
            AppError::Transfer(_) => "transfer",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Scene result type alias
pub type SceneResult<T> = std::result::Result<T, SceneError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::from(CacheError::DirectoryNotSet);
        assert_eq!(err.category(), "cache");

        let err = AppError::from(TransferError::NotFound { transfer_id: 3 });
        assert_eq!(err.category(), "transfer");
        assert_eq!(err.to_string(), "Transfer not found: 3");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(AppError::from(TransferError::Timeout { seconds: 5 }).is_recoverable());
        assert!(AppError::from(TransferError::ServerError { status: 503 }).is_recoverable());
        assert!(!AppError::from(TransferError::ServerError { status: 404 }).is_recoverable());
        assert!(!AppError::from(TransferError::Cancelled).is_recoverable());
        assert!(!AppError::generic("boom").is_recoverable());
    }

    #[test]
    fn test_scene_error_converts_into_transfer_error() {
        let err: TransferError = SceneError::NodeNotFound {
            node_id: "vtkMRMLScalarVolumeNode1".to_string(),
        }
        .into();
        assert!(matches!(err, TransferError::Scene(_)));
        assert!(!err.is_retryable());
    }
}
