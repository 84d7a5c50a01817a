//! Per-transfer progress bars
//!
//! A background task listens to the data I/O manager's event channel and
//! keeps one `indicatif` bar per transfer. Bars are hidden in quiet mode and
//! when stderr is not a terminal.

use std::collections::HashMap;
use std::io::IsTerminal;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::transfer::{IoEvent, TransferId, TransferStatus};
use crate::errors::{AppError, Result};

/// Template for a single transfer bar
const BAR_TEMPLATE: &str = "{prefix:>4} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}";

/// Progress display configuration
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Draw bars at all
    pub enable_progress_bars: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: std::io::stderr().is_terminal(),
        }
    }
}

/// Bars keyed by transfer id
struct TransferBars {
    multi: MultiProgress,
    style: ProgressStyle,
    labels: HashMap<TransferId, String>,
    bars: HashMap<TransferId, ProgressBar>,
}

impl TransferBars {
    fn bar(&mut self, transfer_id: TransferId) -> &ProgressBar {
        let Self {
            multi,
            style,
            labels,
            bars,
        } = self;
        bars.entry(transfer_id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_prefix(format!("#{}", transfer_id));
            let label = labels
                .get(&transfer_id)
                .cloned()
                .unwrap_or_else(|| format!("transfer {}", transfer_id));
            bar.set_message(label);
            bar
        })
    }

    fn handle(&mut self, event: &IoEvent) {
        match event {
            IoEvent::TransferProgress {
                transfer_id,
                percent,
            } => {
                self.bar(*transfer_id).set_position(u64::from(*percent));
            }
            IoEvent::TransferModified {
                transfer_id,
                status,
            } => {
                let label = self
                    .labels
                    .get(transfer_id)
                    .cloned()
                    .unwrap_or_else(|| format!("transfer {}", transfer_id));
                let bar = self.bar(*transfer_id);
                if *status == TransferStatus::Completed {
                    bar.set_position(100);
                }
                if status.is_finished() {
                    bar.finish_with_message(format!("{} ({})", label, status));
                } else {
                    bar.set_message(format!("{} ({})", label, status));
                }
            }
            IoEvent::Modified => {}
        }
    }

    fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

/// Running progress display; call [`ProgressDisplay::finish`] when done
pub struct ProgressDisplay {
    shutdown_tx: Option<oneshot::Sender<()>>,
    update_task: Option<JoinHandle<()>>,
}

impl ProgressDisplay {
    /// Start listening on `events`, labelling bars from `labels`
    pub fn start(
        config: &ProgressConfig,
        mut events: broadcast::Receiver<IoEvent>,
        labels: HashMap<TransferId, String>,
    ) -> Result<Self> {
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .map_err(|e| AppError::generic(format!("Progress bar template error: {}", e)))?
            .progress_chars("##-");

        let multi = if config.enable_progress_bars {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut bars = TransferBars {
            multi,
            style,
            labels,
            bars: HashMap::new(),
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let update_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => bars.handle(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Progress display lagged, skipped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Transfer event channel closed");
                            break;
                        }
                    },
                    _ = &mut shutdown_rx => {
                        // Events already queued still describe the final state
                        while let Ok(event) = events.try_recv() {
                            bars.handle(&event);
                        }
                        debug!("Progress display received shutdown signal");
                        break;
                    }
                }
            }
            bars.finish();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            update_task: Some(update_task),
        })
    }

    /// Stop the listener and leave the bars in their final state
    pub async fn finish(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.update_task.take() {
            if let Err(e) = task.await {
                debug!("Progress task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden_bars(labels: HashMap<TransferId, String>) -> TransferBars {
        TransferBars {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            style: ProgressStyle::default_bar().template(BAR_TEMPLATE).unwrap(),
            labels,
            bars: HashMap::new(),
        }
    }

    #[test]
    fn test_events_drive_bars() {
        let mut bars = hidden_bars(HashMap::from([(1, "brain.nrrd".to_string())]));

        bars.handle(&IoEvent::TransferProgress {
            transfer_id: 1,
            percent: 40,
        });
        assert_eq!(bars.bars[&1].position(), 40);
        assert_eq!(bars.bars[&1].message(), "brain.nrrd");

        bars.handle(&IoEvent::TransferModified {
            transfer_id: 1,
            status: TransferStatus::Completed,
        });
        assert_eq!(bars.bars[&1].position(), 100);
        assert!(bars.bars[&1].is_finished());
        assert_eq!(bars.bars[&1].message(), "brain.nrrd (Completed)");

        bars.handle(&IoEvent::Modified);
        assert_eq!(bars.bars.len(), 1);
    }

    #[test]
    fn test_unknown_transfer_gets_generic_label() {
        let mut bars = hidden_bars(HashMap::new());
        bars.handle(&IoEvent::TransferModified {
            transfer_id: 7,
            status: TransferStatus::Running,
        });
        assert!(!bars.bars[&7].is_finished());
        assert_eq!(bars.bars[&7].message(), "transfer 7 (Running)");
    }

    #[tokio::test]
    async fn test_display_drains_events_on_finish() {
        let (tx, rx) = broadcast::channel(16);
        let config = ProgressConfig {
            enable_progress_bars: false,
        };
        let display = ProgressDisplay::start(&config, rx, HashMap::new()).unwrap();

        tx.send(IoEvent::TransferProgress {
            transfer_id: 1,
            percent: 10,
        })
        .unwrap();
        display.finish().await;
    }
}
