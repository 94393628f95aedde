use chrono::{DateTime, Utc};
use serde::Serialize;

use super::StoredArticle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            SortOrder::Newest => "a.created_at DESC, a.id DESC",
            SortOrder::Oldest => "a.created_at ASC, a.id ASC",
        }
    }
}

/// Read-side filter over persisted articles.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleQuery {
    pub search: Option<String>,
    pub source_id: Option<i64>,
    pub category_slug: Option<String>,
    pub tag_slug: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub order: SortOrder,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            search: None,
            source_id: None,
            category_slug: None,
            tag_slug: None,
            created_from: None,
            created_to: None,
            order: SortOrder::Newest,
            page: 1,
            per_page: 10,
        }
    }
}

impl ArticleQuery {
    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticlePage {
    pub items: Vec<StoredArticle>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl ArticlePage {
    pub fn page_count(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}
