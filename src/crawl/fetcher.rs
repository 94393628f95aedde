use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::db::Repository;
use crate::models::{RawEntry, Source};

use super::http::PageFetcher;
use super::selectors::LinkTier;
use super::walker::{SiteWalker, WalkerRegistry};

/// Walks listing and article pages of sources that have no usable feed.
pub struct CrawlFetcher {
    pages: Arc<dyn PageFetcher>,
    walkers: WalkerRegistry,
    repo: Repository,
    max_pages: usize,
    max_articles: usize,
    concurrency: usize,
    source_concurrency: usize,
    source_timeout: Duration,
}

impl CrawlFetcher {
    pub fn new(
        pages: Arc<dyn PageFetcher>,
        walkers: WalkerRegistry,
        repo: Repository,
        config: &CrawlConfig,
    ) -> Self {
        Self {
            pages,
            walkers,
            repo,
            max_pages: config.max_pages.max(1),
            max_articles: config.max_articles_per_source,
            concurrency: config.concurrency.max(1),
            source_concurrency: config.source_concurrency.max(1),
            source_timeout: Duration::from_secs(config.source_timeout_secs),
        }
    }

    /// New, not yet stored article entries of one source, in listing order.
    ///
    /// Never fails: an unknown site, an unreachable listing or a broken article page
    /// only shrink the result.
    pub async fn fetch_by_source(&self, source: &Source) -> Vec<RawEntry> {
        if !source.is_crawl_eligible() {
            debug!(source = %source.name, "Source is not crawl eligible, skipping");
            return Vec::new();
        }
        let Some(walker) = source.domain().and_then(|d| self.walkers.for_domain(&d)) else {
            warn!(source = %source.name, url = %source.url, "No page walker for source domain");
            return Vec::new();
        };

        let links = self.collect_links(source, walker.as_ref()).await;
        let fresh = self.drop_stored(links).await;
        info!(source = %source.name, count = fresh.len(), "Crawling article pages");

        let walker = walker.as_ref();
        let entries: Vec<RawEntry> = stream::iter(fresh)
            .map(|link| async move { self.read_article(walker, &link).await })
            .buffered(self.concurrency)
            .filter_map(|entry| async move { entry })
            .collect()
            .await;

        info!(source = %source.name, count = entries.len(), "Crawled source");
        entries
    }

    /// Crawl eligible sources, each under its own timeout budget.
    pub async fn fetch_all(&self, sources: Vec<Source>) -> Vec<(Source, Vec<RawEntry>)> {
        stream::iter(sources.into_iter().filter(Source::is_crawl_eligible))
            .map(|source| async move {
                match tokio::time::timeout(self.source_timeout, self.fetch_by_source(&source)).await
                {
                    Ok(entries) => (source, entries),
                    Err(_) => {
                        warn!(
                            source = %source.name,
                            timeout_secs = self.source_timeout.as_secs(),
                            "Crawl timed out"
                        );
                        (source, Vec::new())
                    }
                }
            })
            .buffer_unordered(self.source_concurrency)
            .collect()
            .await
    }

    async fn collect_links(&self, source: &Source, walker: &dyn SiteWalker) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();

        'start: for start in walker.start_urls() {
            let mut next = Some(start);
            let mut pages = 0;

            while let Some(page) = next.take() {
                if pages >= self.max_pages || !visited.insert(page.clone()) {
                    break;
                }
                pages += 1;

                let page_url = match Url::parse(&page) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(source = %source.name, url = %page, error = %e, "Bad listing URL");
                        break;
                    }
                };
                let html = match self.pages.fetch_page(&page).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(source = %source.name, url = %page, error = %e, "Listing page failed");
                        break;
                    }
                };

                let listing = walker.read_listing(&html, &page_url);
                match listing.tier {
                    LinkTier::None => {
                        warn!(source = %source.name, url = %page, "No article links on listing page")
                    }
                    LinkTier::Primary => {
                        debug!(source = %source.name, url = %page, count = listing.links.len(), "Listing links")
                    }
                    tier => info!(
                        source = %source.name,
                        url = %page,
                        ?tier,
                        count = listing.links.len(),
                        "Listing links found by fallback selectors"
                    ),
                }

                for link in listing.links {
                    if links.len() >= self.max_articles {
                        break 'start;
                    }
                    if seen.insert(link.clone()) {
                        links.push(link);
                    }
                }
                next = listing.next;
            }
        }

        links
    }

    async fn drop_stored(&self, links: Vec<String>) -> Vec<String> {
        let mut fresh = Vec::with_capacity(links.len());
        for link in links {
            match self.repo.url_exists(&link).await {
                Ok(true) => debug!(url = %link, "Already stored, not crawling"),
                Ok(false) => fresh.push(link),
                Err(e) => warn!(url = %link, error = %e, "Existence check failed, skipping link"),
            }
        }
        fresh
    }

    async fn read_article(&self, walker: &dyn SiteWalker, link: &str) -> Option<RawEntry> {
        let url = Url::parse(link).ok()?;
        match self.pages.fetch_page(link).await {
            Ok(html) => Some(walker.read_article(&html, &url)),
            Err(e) => {
                warn!(url = %link, error = %e, "Article page failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::stub::StubPages;
    use crate::models::NewSource;

    fn crawl_source(name: &str, url: &str) -> Source {
        Source {
            id: 1,
            name: name.into(),
            url: url.into(),
            feed_url: None,
            active: true,
            needs_scraping: true,
        }
    }

    fn config(max_pages: usize) -> CrawlConfig {
        CrawlConfig {
            max_pages,
            ..CrawlConfig::default()
        }
    }

    const UKRINFORM_LISTING: &str = r#"<html><body><main>
        <a href="/news/1-persha.html">Перша</a>
        <a href="https://elsewhere.example/news/2.html">Чужа</a>
        <a href="/about">Про нас</a>
    </main></body></html>"#;

    const UKRINFORM_ARTICLE: &str = r#"<html><body>
        <h1 class="newsTitle">Перша новина</h1>
        <div class="newsText"><p>Текст новини.</p></div>
        <div class="tags"><a>Київ</a></div>
    </body></html>"#;

    #[tokio::test]
    async fn fallback_pattern_links_are_still_crawled() {
        let pages = StubPages::new(&[
            ("https://www.ukrinform.ua/block-lastnews", UKRINFORM_LISTING),
            ("https://www.ukrinform.ua/news/1-persha.html", UKRINFORM_ARTICLE),
        ]);
        let repo = Repository::in_memory().await.unwrap();
        let crawler = CrawlFetcher::new(pages.clone(), WalkerRegistry::builtin(), repo, &config(3));

        let entries = crawler
            .fetch_by_source(&crawl_source("УКРІНФОРМ", "https://www.ukrinform.ua"))
            .await;

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.url.as_deref(), Some("https://www.ukrinform.ua/news/1-persha.html"));
        assert_eq!(entry.title.as_deref(), Some("Перша новина"));
        assert_eq!(entry.content.as_deref(), Some("Текст новини."));
        assert_eq!(entry.tags, vec!["Київ"]);
        assert!(!pages.requests().iter().any(|u| u.contains("elsewhere")));
    }

    #[tokio::test]
    async fn stored_urls_are_not_crawled_again() {
        let pages = StubPages::new(&[
            ("https://www.ukrinform.ua/block-lastnews", UKRINFORM_LISTING),
            ("https://www.ukrinform.ua/news/1-persha.html", UKRINFORM_ARTICLE),
        ]);
        let repo = Repository::in_memory().await.unwrap();
        let (source_id, _) = repo
            .upsert_source(NewSource {
                name: "УКРІНФОРМ".into(),
                url: "https://www.ukrinform.ua".into(),
                feed_url: None,
                active: true,
                needs_scraping: true,
            })
            .await
            .unwrap();
        repo.call(move |conn| {
            conn.execute(
                "INSERT INTO articles (title, slug, url, source_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    "Перша новина",
                    "persha-novyna",
                    "https://www.ukrinform.ua/news/1-persha.html",
                    source_id,
                    "2026-01-01T00:00:00.000000Z"
                ],
            )
        })
        .await
        .unwrap();

        let crawler = CrawlFetcher::new(pages.clone(), WalkerRegistry::builtin(), repo, &config(3));
        let entries = crawler
            .fetch_by_source(&crawl_source("УКРІНФОРМ", "https://www.ukrinform.ua"))
            .await;

        assert!(entries.is_empty());
        assert_eq!(pages.requests(), vec!["https://www.ukrinform.ua/block-lastnews"]);
    }

    #[tokio::test]
    async fn pagination_is_bounded_and_loops_are_cut() {
        let page = |n: u32, next: u32| {
            format!(
                r#"<div class="archive-item"><h2 class="entry-title"><a href="https://armyinform.com.ua/2026/01/{n}/a/">a</a></h2></div>
                   <a class="next page-numbers" href="https://armyinform.com.ua/category/news/page/{next}/">next</a>"#
            )
        };
        let first = page(1, 2);
        let second = page(2, 1);
        let pages = StubPages::new(&[
            ("https://armyinform.com.ua/category/news/", first.as_str()),
            ("https://armyinform.com.ua/category/news/page/2/", second.as_str()),
            ("https://armyinform.com.ua/category/news/page/1/", first.as_str()),
        ]);
        let repo = Repository::in_memory().await.unwrap();
        let crawler = CrawlFetcher::new(pages.clone(), WalkerRegistry::builtin(), repo, &config(10));

        let links = crawler
            .collect_links(
                &crawl_source("АрміяInform", "https://armyinform.com.ua"),
                WalkerRegistry::builtin()
                    .for_domain("armyinform.com.ua")
                    .unwrap()
                    .as_ref(),
            )
            .await;

        assert_eq!(links.len(), 2);
        // page/1/ is a distinct URL, then its "next" points back to the already visited page/2/
        assert_eq!(pages.requests().len(), 3);

        let bounded = CrawlFetcher::new(pages.clone(), WalkerRegistry::builtin(), Repository::in_memory().await.unwrap(), &config(1));
        let links = bounded
            .collect_links(
                &crawl_source("АрміяInform", "https://armyinform.com.ua"),
                WalkerRegistry::builtin()
                    .for_domain("armyinform.com.ua")
                    .unwrap()
                    .as_ref(),
            )
            .await;
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn unknown_domain_yields_nothing() {
        let pages = StubPages::new(&[]);
        let repo = Repository::in_memory().await.unwrap();
        let crawler = CrawlFetcher::new(pages.clone(), WalkerRegistry::builtin(), repo, &config(3));

        let entries = crawler
            .fetch_by_source(&crawl_source("Невідомий", "https://unknown.example"))
            .await;

        assert!(entries.is_empty());
        assert!(pages.requests().is_empty());
    }

    #[tokio::test]
    async fn broken_article_page_does_not_stop_the_source() {
        let listing = r#"<div class="archive-item"><h2 class="entry-title">
            <a href="https://armyinform.com.ua/2026/01/01/broken/">x</a></h2></div>
            <div class="archive-item"><h2 class="entry-title">
            <a href="https://armyinform.com.ua/2026/01/02/ok/">y</a></h2></div>"#;
        let article = r#"<h1 class="entry-title">Добре</h1><div class="single-content"><p>Так.</p></div>"#;
        let pages = StubPages::new(&[
            ("https://armyinform.com.ua/category/news/", listing),
            ("https://armyinform.com.ua/2026/01/02/ok/", article),
        ]);
        let repo = Repository::in_memory().await.unwrap();
        let crawler = CrawlFetcher::new(pages, WalkerRegistry::builtin(), repo, &config(1));

        let entries = crawler
            .fetch_by_source(&crawl_source("АрміяInform", "https://armyinform.com.ua"))
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("Добре"));
        assert_eq!(entries[0].category.as_deref(), Some("news"));
    }
}
