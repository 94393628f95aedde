use std::collections::HashMap;
use std::sync::Arc;

use scraper::Html;
use url::Url;

use crate::models::RawEntry;
use crate::text::page_text;

use super::profiles;
use super::selectors::{
    all_texts, article_links, block_text, first_datetime, first_link, first_text, LinkTier,
    LinkTiers,
};

/// Article links found on one listing page, plus the next listing page if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub links: Vec<String>,
    pub next: Option<String>,
    pub tier: LinkTier,
}

/// Per-site page walking capability. Fetching is done by the caller.
pub trait SiteWalker: Send + Sync {
    fn domain(&self) -> &str;

    fn start_urls(&self) -> Vec<String>;

    fn read_listing(&self, html: &str, page_url: &Url) -> Listing;

    fn read_article(&self, html: &str, url: &Url) -> RawEntry;

    /// Site category label for an article, derived from its URL.
    fn map_category(&self, url: &Url) -> Option<String>;
}

/// Static selector profile for one site.
pub struct SiteProfile {
    pub domain: &'static str,
    pub start_urls: &'static [&'static str],
    pub links: LinkTiers,
    pub next_page: &'static [&'static str],
    pub title: &'static [&'static str],
    pub content: &'static [&'static str],
    pub tags: &'static [&'static str],
    /// Tags added when the article text mentions them.
    pub keyword_tags: &'static [&'static str],
    pub published: &'static [(&'static str, &'static str)],
    pub map_category: fn(&Url) -> Option<String>,
}

/// A [`SiteWalker`] driven entirely by a [`SiteProfile`].
pub struct ProfileWalker {
    profile: &'static SiteProfile,
}

impl ProfileWalker {
    pub const fn new(profile: &'static SiteProfile) -> Self {
        Self { profile }
    }
}

impl SiteWalker for ProfileWalker {
    fn domain(&self) -> &str {
        self.profile.domain
    }

    fn start_urls(&self) -> Vec<String> {
        self.profile.start_urls.iter().map(|u| u.to_string()).collect()
    }

    fn read_listing(&self, html: &str, page_url: &Url) -> Listing {
        let document = Html::parse_document(html);
        let (links, tier) = article_links(&document, page_url, &self.profile.links);
        let next = first_link(&document, page_url, self.profile.next_page);
        Listing { links, next, tier }
    }

    fn read_article(&self, html: &str, url: &Url) -> RawEntry {
        let document = Html::parse_document(html);
        let profile = self.profile;

        let content = block_text(&document, profile.content).or_else(|| page_text(html));

        let mut tags = all_texts(&document, profile.tags);
        if let Some(text) = content.as_deref().map(str::to_lowercase) {
            for keyword in profile.keyword_tags {
                if text.contains(keyword) && !tags.iter().any(|t| t.to_lowercase() == *keyword) {
                    tags.push(keyword.to_string());
                }
            }
        }

        RawEntry {
            url: Some(url.to_string()),
            title: first_text(&document, profile.title),
            content,
            category: self.map_category(url),
            tags,
            published: first_datetime(&document, profile.published),
            ..RawEntry::default()
        }
    }

    fn map_category(&self, url: &Url) -> Option<String> {
        (self.profile.map_category)(url)
    }
}

/// Walkers by site domain.
#[derive(Clone, Default)]
pub struct WalkerRegistry {
    walkers: HashMap<String, Arc<dyn SiteWalker>>,
}

impl WalkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for profile in profiles::ALL {
            registry.register(Arc::new(ProfileWalker::new(profile)));
        }
        registry
    }

    pub fn register(&mut self, walker: Arc<dyn SiteWalker>) {
        self.walkers.insert(walker.domain().to_lowercase(), walker);
    }

    /// Walker for `domain` or one of its parent domains.
    pub fn for_domain(&self, domain: &str) -> Option<Arc<dyn SiteWalker>> {
        let domain = domain.to_lowercase();
        let mut candidate = domain.as_str();
        loop {
            if let Some(walker) = self.walkers.get(candidate) {
                return Some(walker.clone());
            }
            candidate = candidate.split_once('.')?.1;
            if !candidate.contains('.') {
                return None;
            }
        }
    }

    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.walkers.keys().cloned().collect();
        domains.sort();
        domains
    }
}
