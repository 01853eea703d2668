use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::Error;
use crate::store::models::{MetadataCapture, TimeSegment, VisitRecord, WebsiteMetadataRecord};

/// One inbound host event. The core assumes nothing about how the host
/// registered its listeners, only that each event expects one outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BackgroundEvent {
    TabNavigated {
        url: String,
        title: String,
        tab_id: u32,
    },
    AlarmTick,
    Message(ExtensionMessage),
}

/// Structured requests arriving over the extension message channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExtensionMessage {
    /// `{action: "meetingStatus", meetingId: ...}`
    MeetingStatus { meeting_id: String },
    /// `{action: "extractOpenGraph", capture: {...}}`; the content script
    /// has already pulled the page's OpenGraph tags.
    ExtractOpenGraph { capture: MetadataCapture },
}

/// Successful payloads, one shape per event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutcomeData {
    Visit(VisitRecord),
    Schedule {
        segment_count: usize,
        current: Option<TimeSegment>,
        up_next: Option<TimeSegment>,
    },
    Meeting {
        segment: Option<TimeSegment>,
        is_current: bool,
    },
    Metadata(WebsiteMetadataRecord),
}

/// The single acknowledgement every event receives.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<OutcomeData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventOutcome {
    pub fn ok(data: OutcomeData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }
    }
}

/// An event plus its reply channel. The id ties log lines to outcomes.
#[derive(Debug)]
pub struct EventEnvelope {
    pub event_id: String,
    pub event: BackgroundEvent,
    pub reply: oneshot::Sender<EventOutcome>,
}

impl EventEnvelope {
    pub fn new(event: BackgroundEvent) -> (Self, oneshot::Receiver<EventOutcome>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                event_id: Uuid::new_v4().to_string(),
                event,
                reply,
            },
            rx,
        )
    }
}
