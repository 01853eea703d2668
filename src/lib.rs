pub mod config;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod segmenter;
pub mod store;
pub mod tracker;
mod utils;

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use config::{BackgroundConfig, ConfigStore, RetryPolicy};
pub use error::{Error, StoreInitError, StoreOpenError};
pub use gate::{DirStoreOpener, ReadinessGate, StoreOpener};
pub use orchestrator::{
    BackgroundEvent, CalendarProvider, EventEnvelope, EventOutcome, ExtensionMessage, Orchestrator,
    OutcomeData,
};
pub use segmenter::{compute_up_next, normalize_segments, UpNext};
pub use store::{StoreBundle, StoreKind};
pub use tracker::{parse_page_key, track_visit};

const EVENT_QUEUE_DEPTH: usize = 64;

/// Installs the process-wide logger (reads RUST_LOG). Safe to call more
/// than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Running background process: an event inlet plus shutdown control.
pub struct BackgroundHandle {
    events: mpsc::Sender<EventEnvelope>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    /// Submits one host event and waits for its acknowledgement.
    pub async fn submit(&self, event: BackgroundEvent) -> Result<EventOutcome, Error> {
        let (envelope, rx) = EventEnvelope::new(event);
        self.events
            .send(envelope)
            .await
            .map_err(|_| Error::Other(anyhow!("background event loop is gone")))?;
        rx.await
            .map_err(|_| Error::Other(anyhow!("background event loop dropped the reply")))
    }

    /// A sender the host can hand to its own listener plumbing.
    pub fn event_sender(&self) -> mpsc::Sender<EventEnvelope> {
        self.events.clone()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Wires the gate and orchestrator together and spawns the event loop.
/// Stores are not opened here; the first event through the gate does that.
pub fn spawn_background(
    config: &BackgroundConfig,
    calendar: Arc<dyn CalendarProvider>,
) -> BackgroundHandle {
    let opener = Arc::new(DirStoreOpener::new(config.data_dir.clone()));
    let gate = ReadinessGate::new(config.retry.clone(), opener);
    let orchestrator = Orchestrator::new(gate, calendar);

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let task = tokio::spawn(async move { orchestrator.run(event_rx, loop_cancel).await });

    BackgroundHandle {
        events: event_tx,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::store::models::TimeSegment;
    use tempfile::TempDir;

    struct EmptyCalendar;

    #[async_trait]
    impl CalendarProvider for EmptyCalendar {
        async fn fetch_segments(&self) -> anyhow::Result<Vec<TimeSegment>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn spawned_background_acknowledges_every_event() {
        let dir = TempDir::new().expect("temp dir");
        let config = BackgroundConfig::new(dir.path().to_path_buf());
        let handle = spawn_background(&config, Arc::new(EmptyCalendar));

        let outcome = handle
            .submit(BackgroundEvent::TabNavigated {
                url: "https://example.com/".into(),
                title: "Example".into(),
                tab_id: 1,
            })
            .await
            .expect("event acknowledged");
        assert!(outcome.success);

        let outcome = handle
            .submit(BackgroundEvent::AlarmTick)
            .await
            .expect("event acknowledged");
        assert!(outcome.success);
        match outcome.data {
            Some(OutcomeData::Schedule { segment_count, .. }) => assert_eq!(segment_count, 0),
            other => panic!("unexpected outcome: {other:?}"),
        }

        handle.shutdown().await;
    }
}
