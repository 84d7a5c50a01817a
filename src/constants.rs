//! Application constants for the remote cache
//!
//! This module centralizes the constants used throughout the crate,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Overrides the configured cache directory
    pub const CACHE_DIR: &str = "REMOTE_CACHE_DIR";

    /// Overrides the configured log level
    pub const LOG_LEVEL: &str = "REMOTE_CACHE_LOG";
}

/// URI handling constants
pub mod uri {
    /// Separator between a scheme and the rest of a URI
    pub const SCHEME_SEPARATOR: &str = "://";

    /// Marker for the bracket-prefixed scheme variant (`[label]:scheme://...`)
    pub const BRACKET_SCHEME_MARKER: &str = "]:";

    /// Scheme that identifies local storage
    pub const FILE_SCHEME: &str = "file";

    /// Returned in place of a missing URI
    pub const NULL_SENTINEL: &str = "(null)";

    /// Percent-encoding table, applied top to bottom when encoding and
    /// bottom to top when decoding. `%` has to stay first.
    pub const ENCODING_TABLE: &[(&str, &str)] = &[
        ("%", "%25"),
        (" ", "%20"),
        ("'", "%27"),
        (">", "%3E"),
        ("<", "%3C"),
        ("\"", "%22"),
    ];
}

/// Cache configuration defaults and accounting constants
pub mod cache {
    /// Default cache size limit in megabytes
    pub const DEFAULT_LIMIT_MB: u64 = 200;

    /// Default free buffer in megabytes
    pub const DEFAULT_FREE_BUFFER_MB: u64 = 10;

    /// Bytes per megabyte (decimal)
    pub const BYTES_PER_MB: f64 = 1_000_000.0;

    /// Maximum directory depth visited by the recursive walkers
    pub const MAX_SCAN_DEPTH: usize = 64;

    /// Capacity of the cache event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    /// Name of the cache directory under the OS cache location
    pub const DEFAULT_DIR_NAME: &str = "remote-cache";

    /// Sentinel size returned when the cache root is not a directory
    pub const SIZE_UNAVAILABLE_MB: f64 = -1.0;
}

/// File handling constants
pub mod files {
    /// Suffix appended to partially transferred files
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "remote-cache.toml";

    /// Configuration file name inside the user config directory
    pub const USER_CONFIG_FILE: &str = "config.toml";
}

/// Transfer worker configuration constants
pub mod workers {
    use super::Duration;

    /// Default number of transfers executed concurrently
    pub const DEFAULT_CONCURRENT_TRANSFERS: usize = 4;

    /// Upper bound for concurrent transfers
    pub const MAX_CONCURRENT_TRANSFERS: usize = 64;

    /// Default timeout for a single transfer
    pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

    /// Maximum retry attempts for a recoverable transfer failure
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay before the first retry; doubled for every further attempt
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Buffer size of the transfer update channel
    pub const PROGRESS_BUFFER_SIZE: usize = 100;

    /// Chunk size used when copying local files
    pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

    /// Capacity of the I/O manager event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// User agent sent with every request
    pub const USER_AGENT: &str = "remote-cache/0.1.0";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

// Re-export commonly used constants at module level for convenience
pub use cache::{DEFAULT_FREE_BUFFER_MB, DEFAULT_LIMIT_MB};
pub use http::USER_AGENT;
pub use workers::DEFAULT_CONCURRENT_TRANSFERS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_encoded_first() {
        assert_eq!(uri::ENCODING_TABLE[0], ("%", "%25"));
    }

    #[test]
    fn test_worker_defaults_are_sane() {
        assert!(workers::DEFAULT_CONCURRENT_TRANSFERS <= workers::MAX_CONCURRENT_TRANSFERS);
        assert!(workers::RETRY_BASE_DELAY < workers::DEFAULT_TRANSFER_TIMEOUT);
    }
}
