use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::parse_datetime;

/// Unnormalized record produced by the feed or crawl fetchers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub url: Option<String>,
    pub title: Option<String>,
    /// Full body (`content:encoded`, Atom content, or text scraped from a page).
    pub content: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Category terms declared by the feed entry.
    pub categories: Vec<String>,
    /// Category label picked by a crawl walker.
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    /// Namespaced per-item elements keyed by qualified name, e.g. `orgsource:tags`.
    pub extensions: HashMap<String, String>,
}

/// Canonical, pre-persistence article. This is also the staging wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub content: String,
    pub url: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Lenient read-side view of one staged article dictionary.
///
/// Accepts the legacy fields older producers wrote (`site_categories`, `created_at`,
/// `slug`) and tolerates wrongly typed optional fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StagedArticle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub site_category: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub site_categories: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
}

impl StagedArticle {
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Declared site category, falling back to the first legacy plural entry.
    pub fn category_label(&self) -> Option<&str> {
        self.site_category
            .as_deref()
            .or_else(|| self.site_categories.first().map(String::as_str))
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .as_deref()
            .or(self.created_at.as_deref())
            .and_then(parse_datetime)
    }
}

impl From<&Article> for StagedArticle {
    fn from(article: &Article) -> Self {
        Self {
            title: Some(article.title.clone()),
            content: Some(article.content.clone()),
            url: Some(article.url.clone()),
            source: Some(article.source.clone()),
            site_category: article.site_category.clone(),
            site_categories: Vec::new(),
            tags: article.tags.clone(),
            published_at: article.published_at.map(|dt| dt.to_rfc3339()),
            created_at: None,
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    })
}

/// Persisted article as exposed to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredArticle {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub url: String,
    pub source_id: i64,
    pub source_name: String,
    pub site_category: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn staged_article_tolerates_legacy_fields() {
        let staged = StagedArticle::from_value(json!({
            "title": "Новина",
            "slug": "",
            "content": "text",
            "url": "https://example.ua/1",
            "source": "ТСН",
            "site_categories": ["Політика", "Економіка"],
            "tags": ["a", null, 3, "b"],
            "created_at": "2024-05-01T10:00:00.123456"
        }))
        .unwrap();

        assert_eq!(staged.category_label(), Some("Політика"));
        assert_eq!(staged.tags, vec!["a", "b"]);
        assert!(staged.published().is_some());
    }

    #[test]
    fn non_list_tags_are_ignored() {
        let staged = StagedArticle::from_value(json!({"title": "A", "tags": {"x": 1}})).unwrap();
        assert!(staged.tags.is_empty());
        assert_eq!(staged.url, None);
    }

    #[test]
    fn article_serializes_to_staging_shape() {
        let article = Article {
            title: "A".into(),
            content: "body".into(),
            url: "http://x/1".into(),
            source: "Foo".into(),
            site_category: None,
            tags: vec!["t".into()],
            published_at: None,
        };
        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(
            value,
            json!({"title": "A", "content": "body", "url": "http://x/1", "source": "Foo", "tags": ["t"]})
        );
    }
}
