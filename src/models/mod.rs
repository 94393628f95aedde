mod article;
mod query;
mod run_stats;
mod source;
mod taxonomy;

pub use article::{Article, RawEntry, StagedArticle, StoredArticle};
pub use query::{ArticlePage, ArticleQuery, SortOrder};
pub use run_stats::{ImportCounters, RunStats};
pub use source::{NewSource, Source};
pub use taxonomy::{Category, SiteCategory, Tag};

use chrono::{DateTime, Utc};

/// Parse the timestamp shapes seen in feeds, staging payloads and SQLite rows.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    // RFC3339 (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    // Naive ISO timestamps with optional fraction (e.g., "2026-01-11T12:34:56.123456")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}
