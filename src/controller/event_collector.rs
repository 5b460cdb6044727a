use crate::controller::event_source::{EventSource, SourceError};
use crate::report::ReportAggregator;
use chrono::Local;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub stats_interval_secs: i64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            stats_interval_secs: 10,
        }
    }
}

/// Feeds one event source into the shared report.
///
/// Each physical stream gets its own collector running in its own task. Events from one
/// source are applied strictly in arrival order.
pub struct EventCollector<S> {
    source: S,
    aggregator: Arc<ReportAggregator>,
    settings: CollectorSettings,
    shutdown: CancellationToken,
}

impl<S: EventSource> EventCollector<S> {
    pub fn new(
        source: S,
        aggregator: Arc<ReportAggregator>,
        settings: Option<CollectorSettings>,
        shutdown: CancellationToken,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        debug!(
            "Creating Event Collector for {} with settings: {:?}",
            source.label(),
            settings
        );
        Self {
            source,
            aggregator,
            settings,
            shutdown,
        }
    }

    pub fn label(&self) -> &str {
        self.source.label()
    }

    /// Reads and applies one event. Returns `Ok(None)` once shutdown is observed,
    /// otherwise whether the report changed.
    pub async fn collect_next_event(&mut self) -> Result<Option<bool>, SourceError> {
        let event = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(None),
            event = self.source.next_event() => event?,
        };

        debug!("{}: {}", self.source.label(), event);
        Ok(Some(self.aggregator.apply(&event)))
    }

    /// Runs until shutdown or the first source error.
    pub async fn run_collection_loop(mut self) -> Result<(), SourceError> {
        info!("Starting Event Collector loop for {}", self.label());

        // For performance monitoring
        let mut event_count: u64 = 0;
        let mut change_count: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(self.settings.stats_interval_secs);

        loop {
            match self.collect_next_event().await? {
                None => {
                    debug!("Event Collector for {} observed shutdown", self.label());
                    return Ok(());
                }
                Some(changed) => {
                    event_count += 1;
                    if changed {
                        change_count += 1;
                    }
                }
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                debug!(
                    "{}: {} events, {} report changes in last {} seconds",
                    self.label(),
                    event_count,
                    change_count,
                    log_interval.num_seconds()
                );
                event_count = 0;
                change_count = 0;
                last_log_time = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::event_source::tests::ChannelSource;
    use crate::controller::input_event::{InputEvent, ABS_X, BTN_SOUTH, BTN_WEST};
    use crate::report::Button;

    #[tokio::test]
    async fn applies_events_in_arrival_order() {
        let aggregator = Arc::new(ReportAggregator::new());
        let (tx, source) = ChannelSource::new("buttons");
        let mut collector =
            EventCollector::new(source, aggregator.clone(), None, CancellationToken::new());

        tx.send(InputEvent::key(BTN_WEST, 1)).unwrap();
        tx.send(InputEvent::key(BTN_WEST, 0)).unwrap();
        tx.send(InputEvent::key(BTN_SOUTH, 1)).unwrap();

        assert_eq!(collector.collect_next_event().await.unwrap(), Some(true));
        assert!(aggregator.snapshot().is_pressed(Button::West));
        assert_eq!(collector.collect_next_event().await.unwrap(), Some(true));
        assert_eq!(collector.collect_next_event().await.unwrap(), Some(true));
        assert_eq!(aggregator.snapshot().buttons, Button::South.mask());
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_pending_read() {
        let aggregator = Arc::new(ReportAggregator::new());
        let (_tx, source) = ChannelSource::new("stick");
        let shutdown = CancellationToken::new();
        let collector = EventCollector::new(source, aggregator, None, shutdown.clone());

        let task = tokio::spawn(collector.run_collection_loop());
        tokio::task::yield_now().await;
        shutdown.cancel();

        let joined = tokio::time::timeout(std::time::Duration::from_secs(1), task).await;
        assert!(joined.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn closed_stream_ends_the_loop_with_an_error() {
        let aggregator = Arc::new(ReportAggregator::new());
        let (tx, source) = ChannelSource::new("stick");
        let collector =
            EventCollector::new(source, aggregator.clone(), None, CancellationToken::new());

        tx.send(InputEvent::absolute(ABS_X, 42)).unwrap();
        drop(tx);

        let err = collector.run_collection_loop().await.unwrap_err();
        assert!(matches!(err, SourceError::Closed { .. }));
        assert_eq!(aggregator.snapshot().x, 42);
    }
}
