use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(domain, pathname)` identity of a tracked page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub domain: String,
    pub pathname: String,
}

/// One tracked page, keyed by `(domain, pathname)`. Created on the first
/// observed navigation and mutated on every later one; never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub domain: String,
    pub pathname: String,
    pub url: String,
    pub title: String,
    pub first_visited_at: DateTime<Utc>,
    pub last_visited_at: DateTime<Utc>,
    pub visit_count: u64,
}

impl VisitRecord {
    pub fn first_visit(key: &PageKey, url: &str, title: &str, visited_at: DateTime<Utc>) -> Self {
        Self {
            domain: key.domain.clone(),
            pathname: key.pathname.clone(),
            url: url.to_string(),
            title: title.to_string(),
            first_visited_at: visited_at,
            last_visited_at: visited_at,
            visit_count: 1,
        }
    }

    /// Counts a repeat navigation. `last_visited_at` only moves forward, so
    /// out-of-order event delivery cannot roll the record back; url and title
    /// follow the newest navigation seen so far.
    pub fn register_visit(&mut self, url: &str, title: &str, visited_at: DateTime<Utc>) {
        self.visit_count = self.visit_count.saturating_add(1);
        if visited_at >= self.last_visited_at {
            self.last_visited_at = visited_at;
            self.url = url.to_string();
            self.title = title.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn key() -> PageKey {
        PageKey {
            domain: "docs.example.com".into(),
            pathname: "/guides/setup".into(),
        }
    }

    #[test]
    fn repeat_visits_increment_count() {
        let mut record = VisitRecord::first_visit(&key(), "https://docs.example.com/guides/setup", "Setup", ts(0));
        record.register_visit("https://docs.example.com/guides/setup", "Setup", ts(5));
        record.register_visit("https://docs.example.com/guides/setup", "Setup", ts(10));

        assert_eq!(record.visit_count, 3);
        assert_eq!(record.first_visited_at, ts(0));
        assert_eq!(record.last_visited_at, ts(10));
    }

    #[test]
    fn out_of_order_delivery_keeps_latest_timestamp() {
        let mut record = VisitRecord::first_visit(&key(), "https://docs.example.com/guides/setup", "Setup", ts(20));
        record.register_visit("https://docs.example.com/guides/setup", "Setup v2", ts(5));

        assert_eq!(record.visit_count, 2);
        assert_eq!(record.last_visited_at, ts(20));
        // The stale event must not overwrite the newest title either.
        assert_eq!(record.title, "Setup");
    }
}
