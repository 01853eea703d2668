use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event projected onto the schedule timeline. Derived 1:1 from
/// an already-normalized provider event; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSegment {
    pub id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub title: String,
    pub attendees: Vec<String>,
}

impl TimeSegment {
    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_at <= instant && instant < self.end_at
    }
}
