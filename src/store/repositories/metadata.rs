use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::error::StoreOpenError;
use crate::store::helpers::parse_datetime;
use crate::store::models::{MetadataCapture, WebsiteMetadataRecord};
use crate::store::{Store, StoreKind};

/// Per-domain website metadata, one row per domain.
#[derive(Clone)]
pub struct MetadataStore {
    store: Store,
}

impl MetadataStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreOpenError> {
        Ok(Self {
            store: Store::open(path, StoreKind::Metadata)?,
        })
    }

    pub async fn get(&self, domain: &str) -> Result<Option<WebsiteMetadataRecord>> {
        let domain = domain.to_string();
        self.store
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, title, description, og_image, captured_at
                     FROM website_metadata
                     WHERE domain = ?1",
                )?;

                let mut rows = stmt.query(params![domain])?;
                match rows.next()? {
                    Some(row) => Ok(Some(metadata_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn put(&self, record: &WebsiteMetadataRecord) -> Result<()> {
        let record = record.clone();
        self.store
            .execute(move |conn| {
                upsert_metadata(conn, &record)?;
                Ok(())
            })
            .await
    }

    /// Merges a capture into the stored record in a single worker task.
    /// Missing fields never erase previously captured ones.
    pub async fn upsert_merged(&self, capture: MetadataCapture) -> Result<WebsiteMetadataRecord> {
        self.store
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, title, description, og_image, captured_at
                     FROM website_metadata
                     WHERE domain = ?1",
                )?;
                let mut rows = stmt.query(params![capture.domain])?;
                let existing = match rows.next()? {
                    Some(row) => Some(metadata_from_row(row)?),
                    None => None,
                };
                drop(rows);
                drop(stmt);

                let record = match existing {
                    Some(mut record) => {
                        record.absorb(capture);
                        record
                    }
                    None => WebsiteMetadataRecord::from_capture(capture),
                };

                upsert_metadata(conn, &record)?;
                Ok(record)
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<WebsiteMetadataRecord>> {
        self.store
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, title, description, og_image, captured_at
                     FROM website_metadata
                     ORDER BY domain ASC",
                )?;

                let mut rows = stmt.query([])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(metadata_from_row(row)?);
                }

                Ok(records)
            })
            .await
    }
}

fn upsert_metadata(conn: &rusqlite::Connection, record: &WebsiteMetadataRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO website_metadata (domain, title, description, og_image, captured_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (domain) DO UPDATE SET
             title = excluded.title,
             description = excluded.description,
             og_image = excluded.og_image,
             captured_at = excluded.captured_at",
        params![
            record.domain,
            record.title,
            record.description,
            record.og_image,
            record.captured_at.to_rfc3339(),
        ],
    )
    .context("failed to upsert metadata record")?;
    Ok(())
}

fn metadata_from_row(row: &Row<'_>) -> Result<WebsiteMetadataRecord> {
    Ok(WebsiteMetadataRecord {
        domain: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        og_image: row.get(3)?,
        captured_at: parse_datetime(&row.get::<_, String>(4)?, "captured_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn capture(minute: u32) -> MetadataCapture {
        MetadataCapture {
            domain: "a.com".into(),
            title: None,
            description: None,
            og_image: None,
            captured_at: ts(minute),
        }
    }

    #[tokio::test]
    async fn partial_captures_merge_instead_of_replacing() {
        let dir = TempDir::new().expect("temp dir");
        let store = MetadataStore::open(dir.path().join("website-metadata.sqlite3"))
            .expect("store opens");

        store
            .upsert_merged(MetadataCapture {
                title: Some("T".into()),
                ..capture(0)
            })
            .await
            .expect("first capture");
        let merged = store
            .upsert_merged(MetadataCapture {
                description: Some("D".into()),
                ..capture(5)
            })
            .await
            .expect("second capture");

        assert_eq!(merged.title.as_deref(), Some("T"));
        assert_eq!(merged.description.as_deref(), Some("D"));

        let stored = store.get("a.com").await.expect("get").expect("record exists");
        assert_eq!(stored, merged);
    }

    #[tokio::test]
    async fn unknown_domain_is_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let store = MetadataStore::open(dir.path().join("website-metadata.sqlite3"))
            .expect("store opens");

        assert!(store.get("nowhere.test").await.expect("get").is_none());
        assert!(store.list().await.expect("list").is_empty());
    }
}
