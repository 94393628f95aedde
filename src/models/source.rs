use serde::{Deserialize, Serialize};
use url::Url;

/// A configured publisher. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub feed_url: Option<String>,
    pub active: bool,
    pub needs_scraping: bool,
}

/// Catalog record as delivered by a seed file or admin tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    #[serde(default, alias = "rss_url", alias = "feedUrl")]
    pub feed_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, alias = "needsScraping")]
    pub needs_scraping: bool,
}

fn default_active() -> bool {
    true
}

impl Source {
    /// Host of the origin URL, lowercased and without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.url)
    }

    pub fn is_feed_eligible(&self) -> bool {
        self.active
            && self
                .feed_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }

    pub fn is_crawl_eligible(&self) -> bool {
        self.active && self.needs_scraping
    }
}

pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
