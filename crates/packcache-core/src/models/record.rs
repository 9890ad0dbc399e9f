use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Metadata for one pack that has been fully cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DownloadedPackRecord {
    pub slug: String,
    pub version: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub cached_at: DateTime<Utc>,
}

/// Downloaded packs keyed by identifier.
pub type DownloadedPackMap = BTreeMap<String, DownloadedPackRecord>;

impl DownloadedPackRecord {
    pub fn new(slug: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: version.into(),
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Clock skew lands here too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Parse a stored downloaded-pack map.
///
/// Missing, malformed or non-object content yields an empty map so a
/// tampered or half-written store never takes the client down.
pub fn parse_downloaded_pack_map(value: Option<&str>) -> DownloadedPackMap {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return DownloadedPackMap::new();
    };

    match serde_json::from_str::<DownloadedPackMap>(raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed downloaded pack map");
            DownloadedPackMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_serializes_camel_case() {
        let record = DownloadedPackRecord::new("paris", "v1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["slug"], "paris");
        assert_eq!(json["version"], "v1");
        assert!(json["cachedAt"].is_string());
    }

    #[test]
    fn test_parse_downloaded_pack_map_tolerates_garbage() {
        assert!(parse_downloaded_pack_map(None).is_empty());
        assert!(parse_downloaded_pack_map(Some("")).is_empty());
        assert!(parse_downloaded_pack_map(Some("{not json")).is_empty());
        assert!(parse_downloaded_pack_map(Some("[1,2,3]")).is_empty());
        assert!(parse_downloaded_pack_map(Some("\"paris\"")).is_empty());
    }

    #[test]
    fn test_parse_downloaded_pack_map_reads_records() {
        let raw = r#"{"paris":{"slug":"paris","version":"v2","cachedAt":"2026-01-01T00:00:00Z"}}"#;
        let map = parse_downloaded_pack_map(Some(raw));
        assert_eq!(map.len(), 1);
        assert_eq!(map["paris"].version, "v2");
    }

    #[test]
    fn test_age_display() {
        let mut record = DownloadedPackRecord::new("paris", "v1");
        assert_eq!(record.age_display(), "just now");

        record.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(record.age_display(), "5m ago");

        record.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(record.age_display(), "2h ago");

        record.cached_at = Utc::now() - Duration::hours(25);
        assert_eq!(record.age_display(), "1d ago");
    }
}
