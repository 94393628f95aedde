//! Raw feed entries and crawled pages into canonical articles.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::{ImportConfig, Limits};
use crate::db::Repository;
use crate::error::Result;
use crate::models::{Article, RawEntry, Source};
use crate::rules::RuleRegistry;
use crate::text::{html_to_text, normalize_label, truncate_chars, truncate_for_log};

const UNTITLED: &str = "Untitled";

/// Why an entry never became an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingUrl,
    MissingTitle,
    AlreadyStored,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingUrl => write!(f, "missing url"),
            Rejection::MissingTitle => write!(f, "missing title"),
            Rejection::AlreadyStored => write!(f, "url already stored"),
        }
    }
}

/// Outcome of normalizing a batch of one source's entries.
#[derive(Debug, Default)]
pub struct Normalized {
    pub articles: Vec<Article>,
    pub rejected: usize,
}

pub struct ArticleNormalizer {
    rules: RuleRegistry,
    limits: Limits,
    allow_untitled: bool,
}

impl ArticleNormalizer {
    pub fn new(rules: RuleRegistry, limits: Limits, import: &ImportConfig) -> Self {
        Self {
            rules,
            limits,
            allow_untitled: import.allow_untitled,
        }
    }

    /// Normalize one entry, rejecting it when its URL is already in the store.
    ///
    /// Only a store failure is an error; every validation problem is a [`Rejection`].
    pub async fn normalize(
        &self,
        entry: &RawEntry,
        source: &Source,
        repo: &Repository,
    ) -> Result<std::result::Result<Article, Rejection>> {
        let Some(url) = self.url_of(entry) else {
            return Ok(Err(Rejection::MissingUrl));
        };
        if repo.url_exists(&url).await? {
            return Ok(Err(Rejection::AlreadyStored));
        }
        Ok(self.build(entry, source, url))
    }

    /// Normalize entries in order, dropping rejects and repeated URLs.
    pub async fn normalize_all(
        &self,
        entries: &[RawEntry],
        source: &Source,
        repo: &Repository,
    ) -> Result<Normalized> {
        let mut out = Normalized::default();
        let mut seen = HashSet::new();

        for entry in entries {
            match self.normalize(entry, source, repo).await? {
                Ok(article) if seen.insert(article.url.clone()) => out.articles.push(article),
                Ok(article) => {
                    debug!(url = %article.url, "Repeated entry in batch");
                    out.rejected += 1;
                }
                Err(reason) => {
                    debug!(
                        source = %source.name,
                        url = entry.url.as_deref().unwrap_or("-"),
                        %reason,
                        "Entry rejected"
                    );
                    out.rejected += 1;
                }
            }
        }

        Ok(out)
    }

    fn url_of(&self, entry: &RawEntry) -> Option<String> {
        entry
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| truncate_chars(u, self.limits.url))
    }

    /// Every step that needs no store access.
    pub fn build(
        &self,
        entry: &RawEntry,
        source: &Source,
        url: String,
    ) -> std::result::Result<Article, Rejection> {
        let title = entry
            .title
            .as_deref()
            .map(|t| html_to_text(t).replace('\n', " "))
            .filter(|t| !t.is_empty());
        let title = match title {
            Some(title) => title,
            None if self.allow_untitled => UNTITLED.to_string(),
            None => return Err(Rejection::MissingTitle),
        };

        let rules = self.rules.resolve_for(source);
        let content = rules.extract_content(entry).unwrap_or_default();
        let category = rules
            .extract_category(entry)
            .map(|c| normalize_label(&c))
            .filter(|c| !c.is_empty());

        let mut tags: Vec<String> = Vec::new();
        for tag in rules.extract_tags(entry) {
            let tag = normalize_label(&tag);
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        debug!(
            source = %source.name,
            url = %url,
            title = %truncate_for_log(&title, 60),
            "Normalized entry"
        );

        Ok(Article {
            title: truncate_chars(&title, self.limits.title),
            content: truncate_chars(&content, self.limits.content),
            url,
            source: source.name.clone(),
            site_category: category,
            tags,
            published_at: entry.published,
        })
    }
}
