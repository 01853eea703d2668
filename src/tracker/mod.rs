use chrono::{DateTime, Utc};
use url::Url;

use crate::error::Error;
use crate::store::models::{MetadataCapture, PageKey, VisitRecord, WebsiteMetadataRecord};
use crate::store::{MetadataStore, VisitStore};

/// Splits a navigation URL into its tracked `(domain, pathname)` identity.
/// Rejects anything the host would not record: unparsable input and URLs
/// without a host.
pub fn parse_page_key(raw: &str) -> Result<PageKey, Error> {
    let url = Url::parse(raw).map_err(|err| Error::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    let host = url.host_str().ok_or_else(|| Error::InvalidUrl {
        url: raw.to_string(),
        reason: "missing host".into(),
    })?;

    Ok(PageKey {
        domain: host.to_ascii_lowercase(),
        pathname: url.path().to_string(),
    })
}

/// Records one navigation. Creates the record on first sight of the page,
/// otherwise increments the count and advances `last_visited_at`
/// monotonically. Invalid input is rejected before any store access.
pub async fn track_visit(
    visits: &VisitStore,
    raw_url: &str,
    title: &str,
    visited_at: DateTime<Utc>,
) -> Result<VisitRecord, Error> {
    let key = parse_page_key(raw_url)?;
    let record = visits.record_visit(&key, raw_url, title, visited_at).await?;
    Ok(record)
}

/// Folds a metadata capture into the stored record for its domain.
pub async fn record_metadata(
    metadata: &MetadataStore,
    capture: MetadataCapture,
) -> Result<WebsiteMetadataRecord, Error> {
    Ok(metadata.upsert_merged(capture).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn page_key_lowercases_the_domain() {
        let key = parse_page_key("https://Docs.Example.COM/Guides/Setup?tab=1#top")
            .expect("parsable url");
        assert_eq!(key.domain, "docs.example.com");
        assert_eq!(key.pathname, "/Guides/Setup");
    }

    #[test]
    fn garbage_input_is_invalid() {
        let err = parse_page_key("not a url").expect_err("must reject");
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn hostless_urls_are_invalid() {
        let err = parse_page_key("data:text/plain,hello").expect_err("must reject");
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn invalid_url_leaves_the_store_untouched() {
        let dir = TempDir::new().expect("temp dir");
        let visits = VisitStore::open(dir.path().join("visits.sqlite3")).expect("store opens");

        let err = track_visit(&visits, "not a url", "Broken", ts())
            .await
            .expect_err("must reject");
        assert!(matches!(err, Error::InvalidUrl { .. }));

        assert!(visits.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn tracked_visit_lands_in_the_store() {
        let dir = TempDir::new().expect("temp dir");
        let visits = VisitStore::open(dir.path().join("visits.sqlite3")).expect("store opens");

        let record = track_visit(&visits, "https://example.com/notes", "Notes", ts())
            .await
            .expect("visit tracked");
        assert_eq!(record.domain, "example.com");
        assert_eq!(record.visit_count, 1);

        let again = track_visit(&visits, "https://example.com/notes", "Notes", ts())
            .await
            .expect("visit tracked");
        assert_eq!(again.visit_count, 2);
    }
}
