//! Report publisher - writes report snapshots to the HID gadget
//!
//! Two-state machine, driven by [`run_publisher_loop`]:
//!
//! ```text
//! Waiting ──(report changed)──► Publishing(snapshot) ──(7 bytes written)──► Waiting
//! ```
//!
//! Waiting blocks on the watch channel rather than spinning. Mutations that land while
//! a write is in flight are picked up by the next wait and coalesce into one write of
//! the latest state. The shutdown token is checked first at every suspension point, so
//! nothing is written once shutdown has been observed.

use super::GamepadReport;
use statum::{machine, state};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// Publisher errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to write report to {sink}: {source}")]
    Write {
        sink: String,
        #[source]
        source: io::Error,
    },
}

#[state]
#[derive(Debug, Clone)]
pub enum PublishState {
    Waiting,
    Publishing(GamepadReport),
}

#[machine]
pub struct ReportPublisher<S: PublishState> {
    // Change notifications and the report itself
    updates: watch::Receiver<GamepadReport>,

    // Output device, normally /dev/hidg0
    sink: Box<dyn AsyncWrite + Unpin + Send>,

    sink_label: String,

    // Number of reports written so far
    published: u64,
}

impl<S: PublishState> ReportPublisher<S> {
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn sink_label(&self) -> &str {
        &self.sink_label
    }
}

impl ReportPublisher<Waiting> {
    pub fn create(
        updates: watch::Receiver<GamepadReport>,
        sink: Box<dyn AsyncWrite + Unpin + Send>,
        sink_label: impl Into<String>,
    ) -> Self {
        let sink_label = sink_label.into();
        debug!("Creating report publisher for {}", sink_label);
        Self::new(updates, sink, sink_label, 0)
    }

    /// Waits until the report changes and takes a snapshot of it.
    ///
    /// Returns `None` on shutdown, or when the aggregator is gone.
    pub async fn wait_for_change(
        mut self,
        shutdown: &CancellationToken,
    ) -> Option<ReportPublisher<Publishing>> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Publisher observed shutdown while waiting");
                return None;
            }
            changed = self.updates.changed() => {
                if changed.is_err() {
                    debug!("Report aggregator dropped, publisher stopping");
                    return None;
                }
            }
        }

        // Marks the current version as seen; this is where the dirty flag clears.
        let snapshot = *self.updates.borrow_and_update();
        Some(self.transition_with(snapshot))
    }
}

impl ReportPublisher<Publishing> {
    pub fn snapshot(&self) -> Option<GamepadReport> {
        self.get_state_data().copied()
    }

    /// Writes the snapshot as one 7-byte report.
    pub async fn publish(mut self) -> Result<ReportPublisher<Waiting>, PublishError> {
        if let Some(report) = self.get_state_data().copied() {
            let bytes = report.encode();
            let written = self.sink.write_all(&bytes).await;
            let flushed = match written {
                Ok(()) => self.sink.flush().await,
                Err(e) => Err(e),
            };
            if let Err(source) = flushed {
                return Err(PublishError::Write {
                    sink: self.sink_label.clone(),
                    source,
                });
            }

            self.published += 1;
            debug!("Published report #{}: {:02X?}", self.published, bytes);
        }
        Ok(self.transition())
    }
}

/// Runs the publisher until shutdown. Returns the number of reports written.
pub async fn run_publisher_loop(
    mut publisher: ReportPublisher<Waiting>,
    shutdown: CancellationToken,
) -> Result<u64, PublishError> {
    info!("Publishing reports to {}", publisher.sink_label());

    loop {
        let published = publisher.published();
        let Some(publishing) = publisher.wait_for_change(&shutdown).await else {
            debug!("Report publisher stopped after {} reports", published);
            return Ok(published);
        };

        publisher = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Shutdown while a report was pending, dropping it");
                return Ok(published);
            }
            result = publishing.publish() => result?,
        };
    }
}
