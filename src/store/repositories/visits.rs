use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::StoreOpenError;
use crate::store::helpers::{parse_datetime, to_i64, to_u64};
use crate::store::models::{PageKey, VisitRecord};
use crate::store::{Store, StoreKind};

/// Keyed collection of page-visit records.
#[derive(Clone)]
pub struct VisitStore {
    store: Store,
}

impl VisitStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreOpenError> {
        Ok(Self {
            store: Store::open(path, StoreKind::Visits)?,
        })
    }

    pub async fn get(&self, key: &PageKey) -> Result<Option<VisitRecord>> {
        let key = key.clone();
        self.store
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, pathname, url, title, first_visited_at, last_visited_at, visit_count
                     FROM visits
                     WHERE domain = ?1 AND pathname = ?2",
                )?;

                let mut rows = stmt.query(params![key.domain, key.pathname])?;
                match rows.next()? {
                    Some(row) => Ok(Some(visit_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn put(&self, record: &VisitRecord) -> Result<()> {
        let record = record.clone();
        self.store
            .execute(move |conn| {
                upsert_visit(conn, &record)?;
                Ok(())
            })
            .await
    }

    /// Applies one navigation to the stored record in a single worker task,
    /// so two events for the same page cannot lose an update between the
    /// read and the write.
    pub async fn record_visit(
        &self,
        key: &PageKey,
        url: &str,
        title: &str,
        visited_at: DateTime<Utc>,
    ) -> Result<VisitRecord> {
        let key = key.clone();
        let url = url.to_string();
        let title = title.to_string();
        self.store
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, pathname, url, title, first_visited_at, last_visited_at, visit_count
                     FROM visits
                     WHERE domain = ?1 AND pathname = ?2",
                )?;
                let mut rows = stmt.query(params![key.domain, key.pathname])?;
                let existing = match rows.next()? {
                    Some(row) => Some(visit_from_row(row)?),
                    None => None,
                };
                drop(rows);
                drop(stmt);

                let record = match existing {
                    Some(mut record) => {
                        record.register_visit(&url, &title, visited_at);
                        record
                    }
                    None => VisitRecord::first_visit(&key, &url, &title, visited_at),
                };

                upsert_visit(conn, &record)?;
                Ok(record)
            })
            .await
    }

    /// Full scan, ordered by key. Each call re-runs the query from the start.
    pub async fn list(&self) -> Result<Vec<VisitRecord>> {
        self.store
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, pathname, url, title, first_visited_at, last_visited_at, visit_count
                     FROM visits
                     ORDER BY domain ASC, pathname ASC",
                )?;

                let mut rows = stmt.query([])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(visit_from_row(row)?);
                }

                Ok(records)
            })
            .await
    }

    /// Most-visited pages for the host popup.
    pub async fn top_visits(&self, limit: u32) -> Result<Vec<VisitRecord>> {
        self.store
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT domain, pathname, url, title, first_visited_at, last_visited_at, visit_count
                     FROM visits
                     ORDER BY visit_count DESC, last_visited_at DESC
                     LIMIT ?1",
                )?;

                let mut rows = stmt.query(params![limit])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(visit_from_row(row)?);
                }

                Ok(records)
            })
            .await
    }
}

fn upsert_visit(conn: &rusqlite::Connection, record: &VisitRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO visits (domain, pathname, url, title, first_visited_at, last_visited_at, visit_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (domain, pathname) DO UPDATE SET
             url = excluded.url,
             title = excluded.title,
             last_visited_at = excluded.last_visited_at,
             visit_count = excluded.visit_count",
        params![
            record.domain,
            record.pathname,
            record.url,
            record.title,
            record.first_visited_at.to_rfc3339(),
            record.last_visited_at.to_rfc3339(),
            to_i64(record.visit_count)?,
        ],
    )
    .context("failed to upsert visit record")?;
    Ok(())
}

fn visit_from_row(row: &Row<'_>) -> Result<VisitRecord> {
    Ok(VisitRecord {
        domain: row.get(0)?,
        pathname: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        first_visited_at: parse_datetime(&row.get::<_, String>(4)?, "first_visited_at")?,
        last_visited_at: parse_datetime(&row.get::<_, String>(5)?, "last_visited_at")?,
        visit_count: to_u64(row.get::<_, i64>(6)?, "visit_count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 11, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn key(pathname: &str) -> PageKey {
        PageKey {
            domain: "docs.example.com".into(),
            pathname: pathname.into(),
        }
    }

    async fn open_store(dir: &TempDir) -> VisitStore {
        VisitStore::open(dir.path().join("visits.sqlite3")).expect("store opens")
    }

    #[tokio::test]
    async fn count_matches_calls_and_timestamp_is_the_max() {
        let dir = TempDir::new().expect("temp dir");
        let store = open_store(&dir).await;
        let key = key("/guides/setup");

        // Deliberately out of delivery order.
        for minute in [10, 3, 7, 1] {
            store
                .record_visit(&key, "https://docs.example.com/guides/setup", "Setup", ts(minute))
                .await
                .expect("visit recorded");
        }

        let record = store.get(&key).await.expect("get").expect("record exists");
        assert_eq!(record.visit_count, 4);
        assert_eq!(record.first_visited_at, ts(10));
        assert_eq!(record.last_visited_at, ts(10));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let key = key("/api");

        {
            let store = open_store(&dir).await;
            store
                .record_visit(&key, "https://docs.example.com/api", "API", ts(0))
                .await
                .expect("visit recorded");
        }

        let store = open_store(&dir).await;
        let record = store.get(&key).await.expect("get").expect("record exists");
        assert_eq!(record.visit_count, 1);
        assert_eq!(record.title, "API");
    }

    #[tokio::test]
    async fn top_visits_orders_by_count() {
        let dir = TempDir::new().expect("temp dir");
        let store = open_store(&dir).await;

        for _ in 0..3 {
            store
                .record_visit(&key("/hot"), "https://docs.example.com/hot", "Hot", ts(1))
                .await
                .expect("visit recorded");
        }
        store
            .record_visit(&key("/cold"), "https://docs.example.com/cold", "Cold", ts(2))
            .await
            .expect("visit recorded");

        let top = store.top_visits(1).await.expect("top visits");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].pathname, "/hot");
        assert_eq!(top[0].visit_count, 3);

        let all = store.list().await.expect("list");
        assert_eq!(all.len(), 2);
    }
}
