//! Cache notifications
//!
//! Observers (a GUI, a logger, the command line) subscribe to a broadcast
//! channel and react to settings changes, deletions and threshold crossings.

use std::path::PathBuf;

use tokio::sync::broadcast;

use crate::constants::cache::EVENT_CHANNEL_CAPACITY;

/// Notification emitted by the cache manager
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A configuration value actually changed
    SettingsUpdate,
    /// A cached file or directory was removed from disk
    CacheDelete { target: PathBuf },
    /// The whole cache was removed and recreated empty
    CacheClear,
    /// The cache grew past its size limit
    CacheLimitExceeded { current_mb: f64, limit_mb: u64 },
    /// Less than the free buffer remains below the limit
    InsufficientFreeBuffer { remaining_mb: f64, buffer_mb: u64 },
    /// Generic change notification
    Modified,
}

impl CacheEvent {
    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::SettingsUpdate => "settings-update",
            CacheEvent::CacheDelete { .. } => "cache-delete",
            CacheEvent::CacheClear => "cache-clear",
            CacheEvent::CacheLimitExceeded { .. } => "cache-limit-exceeded",
            CacheEvent::InsufficientFreeBuffer { .. } => "insufficient-free-buffer",
            CacheEvent::Modified => "modified",
        }
    }
}

/// Create the broadcast channel used for cache events
pub fn create_event_channel() -> broadcast::Sender<CacheEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Drain every event currently queued on `rx` without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<CacheEvent>) -> Vec<CacheEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!("Cache event receiver lagged, {} events dropped", skipped);
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_receivers_is_harmless() {
        let tx = create_event_channel();
        assert!(tx.send(CacheEvent::Modified).is_err());
    }

    #[test]
    fn test_drain_collects_in_order() {
        let tx = create_event_channel();
        let mut rx = tx.subscribe();
        tx.send(CacheEvent::SettingsUpdate).unwrap();
        tx.send(CacheEvent::CacheClear).unwrap();

        let events = drain_events(&mut rx);
        assert_eq!(events, vec![CacheEvent::SettingsUpdate, CacheEvent::CacheClear]);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn test_event_names() {
        let event = CacheEvent::CacheLimitExceeded {
            current_mb: 11.0,
            limit_mb: 10,
        };
        assert_eq!(event.name(), "cache-limit-exceeded");
    }
}
