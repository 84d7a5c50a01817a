//! Transfer worker configuration
//!
//! Durations are (de)serialized in human-readable form (`"10m"`, `"500ms"`)
//! so the same struct can sit directly in the TOML configuration file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{TransferError, TransferResult};

/// Configuration for the transfer worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of transfers executed at the same time
    pub max_concurrent_transfers: usize,
    /// Timeout for one transfer, retries included
    #[serde(with = "humantime_serde")]
    pub transfer_timeout: Duration,
    /// Maximum retry attempts for a recoverable failure
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every further attempt
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// Channel buffer size for transfer updates
    pub progress_buffer_size: usize,
    /// Chunk size for local copies
    pub copy_chunk_size: usize,
    /// Run transfers concurrently; `false` executes them one at a time
    pub asynchronous: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: workers::DEFAULT_CONCURRENT_TRANSFERS,
            transfer_timeout: workers::DEFAULT_TRANSFER_TIMEOUT,
            max_retries: workers::MAX_RETRIES,
            retry_base_delay: workers::RETRY_BASE_DELAY,
            progress_buffer_size: workers::PROGRESS_BUFFER_SIZE,
            copy_chunk_size: workers::COPY_CHUNK_SIZE,
            asynchronous: true,
        }
    }
}

impl WorkerConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> TransferResult<()> {
        if self.max_concurrent_transfers == 0 {
            return Err(TransferError::Configuration(
                "Concurrent transfer count cannot be zero".to_string(),
            ));
        }

        if self.max_concurrent_transfers > workers::MAX_CONCURRENT_TRANSFERS {
            return Err(TransferError::Configuration(format!(
                "Concurrent transfer count ({}) exceeds maximum ({})",
                self.max_concurrent_transfers,
                workers::MAX_CONCURRENT_TRANSFERS
            )));
        }

        if self.transfer_timeout.is_zero() {
            return Err(TransferError::Configuration(
                "Transfer timeout must be greater than zero".to_string(),
            ));
        }

        if self.progress_buffer_size == 0 {
            return Err(TransferError::Configuration(
                "Progress buffer size must be greater than zero".to_string(),
            ));
        }

        if self.copy_chunk_size == 0 {
            return Err(TransferError::Configuration(
                "Copy chunk size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_max_concurrent_transfers(mut self, count: usize) -> Self {
        self.max_concurrent_transfers = count;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size;
        self
    }

    pub fn with_asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Fast settings for tests: short timeout, tiny retry delay
    pub fn testing() -> Self {
        Self {
            max_concurrent_transfers: 2,
            transfer_timeout: Duration::from_secs(5),
            max_retries: 1,
            retry_base_delay: Duration::from_millis(10),
            progress_buffer_size: 16,
            copy_chunk_size: 1024,
            asynchronous: true,
        }
    }
}
