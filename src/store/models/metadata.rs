use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-domain page metadata, merged field-by-field across captures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteMetadataRecord {
    pub domain: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub og_image: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// A freshly observed capture from the content script, not yet merged with
/// whatever is already stored for the domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCapture {
    pub domain: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub og_image: Option<String>,
    pub captured_at: DateTime<Utc>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

impl WebsiteMetadataRecord {
    pub fn from_capture(capture: MetadataCapture) -> Self {
        Self {
            domain: capture.domain,
            title: non_empty(capture.title),
            description: non_empty(capture.description),
            og_image: non_empty(capture.og_image),
            captured_at: capture.captured_at,
        }
    }

    /// Folds a capture into the record. A newer capture overwrites only the
    /// fields it actually carries, so a page without an OG image cannot erase
    /// a previously captured one; an older capture only fills gaps.
    pub fn absorb(&mut self, capture: MetadataCapture) {
        let newer = capture.captured_at >= self.captured_at;
        let title = non_empty(capture.title);
        let description = non_empty(capture.description);
        let og_image = non_empty(capture.og_image);

        if newer {
            self.title = title.or(self.title.take());
            self.description = description.or(self.description.take());
            self.og_image = og_image.or(self.og_image.take());
            self.captured_at = capture.captured_at;
        } else {
            self.title = self.title.take().or(title);
            self.description = self.description.take().or(description);
            self.og_image = self.og_image.take().or(og_image);
        }
    }
}
