use std::time::Duration;

use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{FeedConfig, HttpConfig};
use crate::error::{AppError, Result};
use crate::models::{RawEntry, Source};

use super::extensions::scan_item_extensions;

pub struct FeedFetcher {
    client: Client,
    concurrency: usize,
    source_timeout: Duration,
}

impl FeedFetcher {
    pub fn new(http: &HttpConfig, feed: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .user_agent(&http.user_agent)
            .build()?;

        Ok(Self::with_client(client, feed))
    }

    pub fn with_client(client: Client, feed: &FeedConfig) -> Self {
        Self {
            client,
            concurrency: feed.concurrency.max(1),
            source_timeout: Duration::from_secs(feed.source_timeout_secs),
        }
    }

    /// Entries of one source's feed, in document order.
    ///
    /// Never fails: transport errors, bad statuses and unparseable documents are logged
    /// and yield an empty list.
    pub async fn fetch_feed(&self, source: &Source) -> Vec<RawEntry> {
        if !source.is_feed_eligible() {
            debug!(source = %source.name, "Source is not feed eligible, skipping");
            return Vec::new();
        }
        let Some(url) = source.feed_url.as_deref().map(str::trim) else {
            return Vec::new();
        };

        match self.try_fetch(url).await {
            Ok(entries) => {
                info!(source = %source.name, count = entries.len(), "Fetched feed");
                entries
            }
            Err(e) => {
                warn!(source = %source.name, url, error = %e, "Feed fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<RawEntry>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        parse_entries(&bytes)
    }

    /// Fetch every eligible source with bounded parallelism.
    ///
    /// Each source runs under its own timeout; a source that times out contributes an
    /// empty list and does not hold up the others. Completion order across sources is
    /// not preserved.
    pub async fn fetch_all(&self, sources: Vec<Source>) -> Vec<(Source, Vec<RawEntry>)> {
        stream::iter(sources.into_iter().filter(Source::is_feed_eligible))
            .map(|source| async move {
                match tokio::time::timeout(self.source_timeout, self.fetch_feed(&source)).await {
                    Ok(entries) => (source, entries),
                    Err(_) => {
                        warn!(
                            source = %source.name,
                            timeout_secs = self.source_timeout.as_secs(),
                            "Feed fetch timed out"
                        );
                        (source, Vec::new())
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Parse an RSS/Atom/JSON feed document into raw entries.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>> {
    let feed = parser::parse(bytes).map_err(AppError::FeedParse)?;
    let mut extensions = scan_item_extensions(&String::from_utf8_lossy(bytes));

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| !href.is_empty());
            let item_extensions = url
                .as_deref()
                .and_then(|u| extensions.remove(u))
                .unwrap_or_default();

            RawEntry {
                title: entry
                    .title
                    .map(|t| t.content.trim().to_string())
                    .filter(|t| !t.is_empty()),
                content: entry.content.and_then(|c| c.body),
                summary: entry.summary.map(|s| s.content),
                description: entry
                    .media
                    .iter()
                    .find_map(|m| m.description.as_ref().map(|d| d.content.clone())),
                categories: entry.categories.into_iter().map(|c| c.term).collect(),
                category: None,
                tags: Vec::new(),
                published: entry.published.or(entry.updated),
                extensions: item_extensions,
                url,
            }
        })
        .collect();

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:orgsource="http://orgsource.ua/rss">
  <channel>
    <title>Укрінформ</title>
    <link>https://www.ukrinform.ua</link>
    <description>Новини</description>
    <item>
      <title>Перша новина</title>
      <link>https://www.ukrinform.ua/rubric-polytics/1-persha.html</link>
      <description>Короткий опис</description>
      <category>Політика</category>
      <category>Київ</category>
      <pubDate>Mon, 12 Jan 2026 10:00:00 +0200</pubDate>
      <orgsource:tags>Зеленський, ЄС</orgsource:tags>
    </item>
    <item>
      <title>Друга новина</title>
      <link>https://www.ukrinform.ua/rubric-economy/2-druha.html</link>
      <content:encoded><![CDATA[<p>Повний <b>текст</b></p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;

    fn source(feed_url: Option<&str>, active: bool) -> Source {
        Source {
            id: 1,
            name: "УКРІНФОРМ".into(),
            url: "https://www.ukrinform.ua".into(),
            feed_url: feed_url.map(str::to_string),
            active,
            needs_scraping: false,
        }
    }

    fn fetcher() -> FeedFetcher {
        let feed = FeedConfig {
            concurrency: 2,
            source_timeout_secs: 5,
        };
        FeedFetcher::new(&HttpConfig::default(), &feed).unwrap()
    }

    #[test]
    fn entries_keep_document_order_and_fields() {
        let entries = parse_entries(FEED.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title.as_deref(), Some("Перша новина"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.ukrinform.ua/rubric-polytics/1-persha.html")
        );
        assert_eq!(first.summary.as_deref(), Some("Короткий опис"));
        assert_eq!(first.categories, vec!["Політика", "Київ"]);
        assert!(first.published.is_some());
        assert_eq!(first.extensions["orgsource:tags"], "Зеленський, ЄС");

        let second = &entries[1];
        assert_eq!(second.title.as_deref(), Some("Друга новина"));
        assert!(second.content.as_deref().unwrap_or_default().contains("Повний"));
        assert!(second.extensions.is_empty());
    }

    #[test]
    fn extensions_follow_items_with_escaped_links() {
        let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:orgsource="http://orgsource.ua/rss">
  <channel>
    <title>Укрінформ</title>
    <item>
      <title>Новина з параметрами</title>
      <link>https://www.ukrinform.ua/news?id=1&amp;lang=ua</link>
      <orgsource:tags>Київ, ЗСУ</orgsource:tags>
    </item>
  </channel>
</rss>"#;
        let entries = parse_entries(feed.as_bytes()).unwrap();

        assert_eq!(
            entries[0].url.as_deref(),
            Some("https://www.ukrinform.ua/news?id=1&lang=ua")
        );
        assert_eq!(entries[0].extensions["orgsource:tags"], "Київ, ЗСУ");
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_entries(b"<html><body>not a feed</body></html>").is_err());
    }

    #[tokio::test]
    async fn ineligible_sources_yield_nothing() {
        let fetcher = fetcher();
        assert!(fetcher.fetch_feed(&source(None, true)).await.is_empty());
        assert!(fetcher
            .fetch_feed(&source(Some("https://example.invalid/rss"), false))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn unreachable_source_fails_soft_and_others_continue() {
        let fetcher = fetcher();
        let sources = vec![
            source(Some("http://127.0.0.1:9/rss"), true),
            source(None, true),
        ];

        let results = fetcher.fetch_all(sources).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_empty());
    }
}
