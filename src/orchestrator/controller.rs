use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::gate::ReadinessGate;
use crate::segmenter::{compute_up_next, normalize_segments};
use crate::store::models::{MetadataCapture, TimeSegment};
use crate::tracker;

use super::events::{BackgroundEvent, EventEnvelope, EventOutcome, ExtensionMessage, OutcomeData};

// Set to false to silence per-event logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Supplies already-normalized segments from the external calendar client.
/// Fetching and provider-specific parsing live outside the core.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn fetch_segments(&self) -> anyhow::Result<Vec<TimeSegment>>;
}

/// Stateless dispatcher for host events. Every event goes through the
/// readiness gate and comes back as exactly one outcome; store references
/// never outlive a single dispatch.
#[derive(Clone)]
pub struct Orchestrator {
    gate: ReadinessGate,
    calendar: Arc<dyn CalendarProvider>,
}

impl Orchestrator {
    pub fn new(gate: ReadinessGate, calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { gate, calendar }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Drains host events until cancellation. A closed channel also ends
    /// the loop.
    pub async fn run(&self, mut events: mpsc::Receiver<EventEnvelope>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                maybe_envelope = events.recv() => {
                    let Some(envelope) = maybe_envelope else {
                        log_info!("event channel closed, orchestrator stopping");
                        break;
                    };

                    let EventEnvelope { event_id, event, reply } = envelope;
                    let outcome = self.handle_event(event).await;
                    if !outcome.success {
                        log_warn!(
                            "event {event_id} failed: {}",
                            outcome.error.as_deref().unwrap_or("unknown")
                        );
                    }
                    if reply.send(outcome).is_err() {
                        log_error!("caller dropped before outcome for event {event_id}");
                    }
                }
                _ = cancel.cancelled() => {
                    log_info!("orchestrator shutting down");
                    break;
                }
            }
        }
    }

    /// Dispatches one event. Never returns an error: failures become
    /// structured outcomes so the event loop cannot crash.
    pub async fn handle_event(&self, event: BackgroundEvent) -> EventOutcome {
        let result = match event {
            BackgroundEvent::TabNavigated { url, title, .. } => {
                self.on_tab_navigated(url, title).await
            }
            BackgroundEvent::AlarmTick => self.on_alarm_tick().await,
            BackgroundEvent::Message(message) => match message {
                ExtensionMessage::MeetingStatus { meeting_id } => {
                    self.on_meeting_status(meeting_id).await
                }
                ExtensionMessage::ExtractOpenGraph { capture } => {
                    self.on_extract_open_graph(capture).await
                }
            },
        };

        match result {
            Ok(data) => EventOutcome::ok(data),
            Err(err) => EventOutcome::failed(&err),
        }
    }

    async fn on_tab_navigated(&self, url: String, title: String) -> Result<OutcomeData, Error> {
        let visited_at = Utc::now();
        self.gate
            .with_store(move |bundle| async move {
                let record = tracker::track_visit(&bundle.visits, &url, &title, visited_at).await?;
                Ok(OutcomeData::Visit(record))
            })
            .await
    }

    async fn on_alarm_tick(&self) -> Result<OutcomeData, Error> {
        let refreshed = self
            .calendar
            .fetch_segments()
            .await
            .map_err(Error::Other)?;
        let segments = normalize_segments(refreshed);
        log_info!("calendar refresh delivered {} segment(s)", segments.len());

        self.gate
            .with_store(move |bundle| async move {
                bundle.segments.replace_all(&segments).await?;
                let stored = bundle.segments.list().await?;
                let schedule = compute_up_next(&stored, Utc::now());
                Ok(OutcomeData::Schedule {
                    segment_count: stored.len(),
                    current: schedule.current,
                    up_next: schedule.up_next,
                })
            })
            .await
    }

    async fn on_meeting_status(&self, meeting_id: String) -> Result<OutcomeData, Error> {
        self.gate
            .with_store(move |bundle| async move {
                let segment = bundle.segments.get(&meeting_id).await?;
                let is_current = segment
                    .as_ref()
                    .map(|s| s.contains(Utc::now()))
                    .unwrap_or(false);
                Ok(OutcomeData::Meeting { segment, is_current })
            })
            .await
    }

    async fn on_extract_open_graph(&self, capture: MetadataCapture) -> Result<OutcomeData, Error> {
        self.gate
            .with_store(move |bundle| async move {
                let record = tracker::record_metadata(&bundle.metadata, capture).await?;
                Ok(OutcomeData::Metadata(record))
            })
            .await
    }
}
