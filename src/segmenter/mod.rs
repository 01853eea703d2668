use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::store::models::TimeSegment;

/// What the schedule looks like at a single instant.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpNext {
    pub current: Option<TimeSegment>,
    pub up_next: Option<TimeSegment>,
}

/// Prepares a refresh payload for storage: sorts ascending by
/// `(start_at, id)` and drops entries whose span is empty or inverted.
pub fn normalize_segments(mut segments: Vec<TimeSegment>) -> Vec<TimeSegment> {
    segments.retain(|segment| {
        let valid = segment.start_at < segment.end_at;
        if !valid {
            warn!(
                "dropping segment {} with non-positive span ({} .. {})",
                segment.id, segment.start_at, segment.end_at
            );
        }
        valid
    });
    segments.sort_by(|a, b| {
        a.start_at
            .cmp(&b.start_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    segments
}

/// Finds the active segment and the next upcoming one.
///
/// `segments` must be ascending by `start_at`. `current` is the started
/// segment still covering `now` with the latest start (equal starts resolve
/// to the smallest id); `up_next` is the first segment starting strictly
/// after `now`. Derived fresh on every call; wall-clock time moves
/// independently of refreshes, so nothing is cached.
pub fn compute_up_next(segments: &[TimeSegment], now: DateTime<Utc>) -> UpNext {
    // First index whose segment starts strictly after `now`.
    let upcoming_idx = segments.partition_point(|segment| segment.start_at <= now);
    let up_next = segments.get(upcoming_idx).cloned();

    // Walk back from the boundary: the first covering segment found has the
    // latest start. Keep scanning its equal-start run for a smaller id, then
    // stop; earlier starts can only win if nothing later covers `now`.
    let mut current: Option<&TimeSegment> = None;
    for candidate in segments[..upcoming_idx].iter().rev() {
        match current {
            Some(best) => {
                if candidate.start_at < best.start_at {
                    break;
                }
                if candidate.end_at > now && candidate.id < best.id {
                    current = Some(candidate);
                }
            }
            None => {
                if candidate.end_at > now {
                    current = Some(candidate);
                }
            }
        }
    }

    UpNext {
        current: current.cloned(),
        up_next,
    }
}
