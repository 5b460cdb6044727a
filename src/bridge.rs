//! Bridge handle - wires sources, aggregator and publisher together
//!
//! ```text
//! buttons ──[EventCollector]──┐
//!                             ├──► ReportAggregator ──watch──► ReportPublisher ──► gadget
//! stick   ──[EventCollector]──┘
//! ```
//!
//! All three run as tasks in one `JoinSet` and share one shutdown token. Any task error
//! is fatal: the token is cancelled, the remaining tasks unwind, and the first error is
//! returned from [`BridgeHandle::wait`].

use crate::config::BridgeConfig;
use crate::controller::{CollectorSettings, DeviceFile, DeviceSource, EventCollector};
use crate::controller::{EventSource, SourceError};
use crate::report::{run_publisher_loop, GamepadReport, PublishError, ReportAggregator};
use crate::report::ReportPublisher;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Errors that stop the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Device missing, grab refused, read failure, malformed record or end of stream
    #[error("Event source error: {0}")]
    Source(#[from] SourceError),

    /// Write to the HID gadget failed
    #[error("Publisher error: {0}")]
    Publish(#[from] PublishError),

    #[error("Failed to open HID gadget {path}: {source}")]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A bridge task panicked or was aborted
    #[error("Bridge task failed: {0}")]
    Task(#[from] JoinError),
}

/// Handle for the running bridge
pub struct BridgeHandle {
    aggregator: Arc<ReportAggregator>,
    tasks: JoinSet<Result<(), BridgeError>>,
    shutdown: CancellationToken,
}

impl BridgeHandle {
    /// Opens the gadget and both input devices, then starts the bridge.
    ///
    /// Every device is acquired before any task starts, so a missing device fails here.
    /// Must be called from within the tokio runtime.
    pub fn open(config: &BridgeConfig, shutdown: CancellationToken) -> Result<Self, BridgeError> {
        info!("Opening HID gadget {}", config.gadget.display());
        let sink = DeviceFile::open_write(&config.gadget).map_err(|source| {
            BridgeError::SinkOpen {
                path: config.gadget.clone(),
                source,
            }
        })?;

        info!("Opening button source {:?}", config.buttons.locator);
        let buttons = DeviceSource::open(&config.buttons)?;
        info!("Opening stick source {:?}", config.stick.locator);
        let stick = DeviceSource::open(&config.stick)?;

        Ok(Self::spawn(
            buttons,
            stick,
            Box::new(sink),
            config.gadget.display().to_string(),
            None,
            shutdown,
        ))
    }

    /// Starts collectors for both sources and the publisher.
    pub fn spawn<B, K>(
        buttons: B,
        stick: K,
        sink: Box<dyn AsyncWrite + Unpin + Send>,
        sink_label: String,
        settings: Option<CollectorSettings>,
        shutdown: CancellationToken,
    ) -> Self
    where
        B: EventSource + 'static,
        K: EventSource + 'static,
    {
        let aggregator = Arc::new(ReportAggregator::new());

        // Subscribe before any collector runs so no change can be missed.
        let publisher = ReportPublisher::create(aggregator.subscribe(), sink, sink_label);

        let mut tasks = JoinSet::new();
        spawn_collector(&mut tasks, buttons, &aggregator, &settings, &shutdown);
        spawn_collector(&mut tasks, stick, &aggregator, &settings, &shutdown);

        let publisher_shutdown = shutdown.clone();
        tasks.spawn(async move {
            let published = run_publisher_loop(publisher, publisher_shutdown).await?;
            debug!("Publisher task finished, {} reports written", published);
            Ok(())
        });

        info!("Bridge running");
        Self {
            aggregator,
            tasks,
            shutdown,
        }
    }

    /// Current report contents
    pub fn snapshot(&self) -> GamepadReport {
        self.aggregator.snapshot()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Waits for every task to finish. Returns the first fatal error, if any.
    pub async fn wait(mut self) -> Result<(), BridgeError> {
        let mut outcome = Ok(());

        while let Some(joined) = self.tasks.join_next().await {
            let result = joined.map_err(BridgeError::from).and_then(|result| result);
            let Err(e) = result else {
                continue;
            };

            if outcome.is_ok() {
                error!("{}", e);
                self.shutdown.cancel();
                outcome = Err(e);
            } else {
                debug!("Additional error during teardown: {}", e);
            }
        }

        debug!("All bridge tasks finished");
        outcome
    }
}

fn spawn_collector<S: EventSource + 'static>(
    tasks: &mut JoinSet<Result<(), BridgeError>>,
    source: S,
    aggregator: &Arc<ReportAggregator>,
    settings: &Option<CollectorSettings>,
    shutdown: &CancellationToken,
) {
    let collector = EventCollector::new(
        source,
        Arc::clone(aggregator),
        settings.clone(),
        shutdown.clone(),
    );
    tasks.spawn(async move {
        collector.run_collection_loop().await?;
        Ok(())
    });
}
