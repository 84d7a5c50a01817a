//! remote-cache library
//!
//! Local caching of remotely stored scene data, with bookkeeping for the
//! reads and writes that move that data and an asynchronous worker that
//! performs them.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(env::CACHE_DIR, "REMOTE_CACHE_DIR");
        assert_eq!(uri::NULL_SENTINEL, "(null)");
        assert!(http::USER_AGENT.starts_with("remote-cache"));
    }

    #[test]
    fn test_error_types() {
        let app_error = AppError::from(errors::CacheError::DirectoryNotSet);

        assert_eq!(app_error.category(), "cache");
        assert!(!app_error.is_recoverable());
    }
}
