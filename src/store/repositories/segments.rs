use std::path::PathBuf;

use anyhow::Result;
use rusqlite::{params, Row};

use crate::error::StoreOpenError;
use crate::store::helpers::{attendees_from_json, attendees_to_json, parse_datetime};
use crate::store::models::TimeSegment;
use crate::store::{Store, StoreKind};

/// The stored schedule: an ordered sequence of time segments, replaced
/// wholesale on every calendar refresh.
#[derive(Clone)]
pub struct SegmentStore {
    store: Store,
}

impl SegmentStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreOpenError> {
        Ok(Self {
            store: Store::open(path, StoreKind::Segments)?,
        })
    }

    /// Swaps in the refreshed sequence inside one transaction, so readers
    /// never observe a half-replaced schedule.
    pub async fn replace_all(&self, segments: &[TimeSegment]) -> Result<()> {
        let segments = segments.to_vec();
        self.store
            .execute(move |conn| {
                let tx = conn.transaction()?;

                tx.execute("DELETE FROM time_segments", [])?;
                for segment in &segments {
                    tx.execute(
                        "INSERT INTO time_segments (id, start_at, end_at, title, attendees)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            segment.id,
                            segment.start_at.to_rfc3339(),
                            segment.end_at.to_rfc3339(),
                            segment.title,
                            attendees_to_json(&segment.attendees)?,
                        ],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Loads the sequence ascending by start time, ties broken by id.
    pub async fn list(&self) -> Result<Vec<TimeSegment>> {
        self.store
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, start_at, end_at, title, attendees
                     FROM time_segments
                     ORDER BY start_at ASC, id ASC",
                )?;

                let mut rows = stmt.query([])?;
                let mut segments = Vec::new();
                while let Some(row) = rows.next()? {
                    segments.push(segment_from_row(row)?);
                }

                Ok(segments)
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<TimeSegment>> {
        let id = id.to_string();
        self.store
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, start_at, end_at, title, attendees
                     FROM time_segments
                     WHERE id = ?1",
                )?;

                let mut rows = stmt.query(params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(segment_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }
}

fn segment_from_row(row: &Row<'_>) -> Result<TimeSegment> {
    Ok(TimeSegment {
        id: row.get(0)?,
        start_at: parse_datetime(&row.get::<_, String>(1)?, "start_at")?,
        end_at: parse_datetime(&row.get::<_, String>(2)?, "end_at")?,
        title: row.get(3)?,
        attendees: attendees_from_json(&row.get::<_, String>(4)?)?,
    })
}
