//! Fetch, normalize and stage; then import. The two halves only meet in staging.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::crawl::{CrawlFetcher, HttpPageFetcher, PageFetcher, WalkerRegistry};
use crate::db::Repository;
use crate::error::Result;
use crate::feed::FeedFetcher;
use crate::import::{ImportOptions, Importer};
use crate::models::{Article, RunStats, Source};
use crate::normalize::ArticleNormalizer;
use crate::rules::RuleRegistry;
use crate::staging::{self, StagingStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    #[default]
    All,
    FeedsOnly,
    CrawlOnly,
}

/// Which catalog sources a fetch run looks at.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub name: Option<String>,
    pub mode: FetchMode,
}

impl SourceFilter {
    fn admits(&self, source: &Source) -> bool {
        self.name
            .as_deref()
            .map_or(true, |name| source.name.trim() == name.trim())
    }
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub sources_processed: usize,
    pub articles: Vec<Article>,
    pub rejected: usize,
}

pub struct Pipeline {
    repo: Repository,
    feeds: FeedFetcher,
    crawler: CrawlFetcher,
    normalizer: ArticleNormalizer,
    staging: Arc<dyn StagingStore>,
    importer: Importer,
    default_key: String,
}

impl Pipeline {
    pub async fn new(config: &Config) -> Result<Self> {
        let repo = Repository::new(&config.db_path).await?;
        let feeds = FeedFetcher::new(&config.http, &config.feed)?;
        let pages: Arc<dyn PageFetcher> =
            Arc::new(HttpPageFetcher::new(&config.http, &config.crawl)?);
        Ok(Self::with_parts(config, repo, feeds, pages))
    }

    /// Assemble from an open store and fetch backends.
    pub fn with_parts(
        config: &Config,
        repo: Repository,
        feeds: FeedFetcher,
        pages: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            crawler: CrawlFetcher::new(pages, WalkerRegistry::builtin(), repo.clone(), &config.crawl),
            normalizer: ArticleNormalizer::new(RuleRegistry::builtin(), config.limits, &config.import),
            staging: staging::open(&config.staging, &repo),
            importer: Importer::new(repo.clone(), config.limits),
            default_key: config.staging.default_key.clone(),
            feeds,
            repo,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn staging(&self) -> &dyn StagingStore {
        self.staging.as_ref()
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// Fetch every eligible source, normalize its entries and stage the new articles under `key`.
    ///
    /// Source failures only shrink the result. An empty result leaves staging untouched.
    pub async fn run_fetch(&self, filter: &SourceFilter, key: &str) -> Result<FetchReport> {
        let sources: Vec<Source> = self
            .repo
            .all_sources()
            .await?
            .into_iter()
            .filter(|s| filter.admits(s))
            .collect();

        let feed_sources: Vec<Source> = match filter.mode {
            FetchMode::CrawlOnly => Vec::new(),
            _ => sources.iter().filter(|s| s.is_feed_eligible()).cloned().collect(),
        };
        let crawl_sources: Vec<Source> = match filter.mode {
            FetchMode::FeedsOnly => Vec::new(),
            _ => sources.iter().filter(|s| s.is_crawl_eligible()).cloned().collect(),
        };

        if feed_sources.is_empty() && crawl_sources.is_empty() {
            warn!(filter = ?filter, "No eligible sources");
            return Ok(FetchReport::default());
        }
        info!(
            feeds = feed_sources.len(),
            crawled = crawl_sources.len(),
            "Fetching sources"
        );

        let (fed, crawled) = tokio::join!(
            self.feeds.fetch_all(feed_sources),
            self.crawler.fetch_all(crawl_sources)
        );

        let mut report = FetchReport::default();
        let mut processed = HashSet::new();
        let mut seen = HashSet::new();

        for (source, entries) in fed.into_iter().chain(crawled) {
            processed.insert(source.id);
            let normalized = self
                .normalizer
                .normalize_all(&entries, &source, &self.repo)
                .await?;
            info!(
                source = %source.name,
                fetched = entries.len(),
                accepted = normalized.articles.len(),
                rejected = normalized.rejected,
                "Normalized source"
            );

            report.rejected += normalized.rejected;
            for article in normalized.articles {
                // A source both fed and crawled can yield the same URL twice.
                if seen.insert(article.url.clone()) {
                    report.articles.push(article);
                } else {
                    report.rejected += 1;
                }
            }
        }
        report.sources_processed = processed.len();

        if report.articles.is_empty() {
            warn!(key, "No new articles, staging left untouched");
        } else {
            self.staging.put(key, &report.articles).await?;
            info!(
                key,
                sources = report.sources_processed,
                articles = report.articles.len(),
                "Staged articles"
            );
        }

        Ok(report)
    }

    pub async fn run_import(&self, key: &str, options: ImportOptions) -> Result<RunStats> {
        self.importer
            .run_import(self.staging.as_ref(), key, options)
            .await
    }

    /// Fetch then import against the same staging key.
    pub async fn run(
        &self,
        filter: &SourceFilter,
        key: &str,
        options: ImportOptions,
    ) -> Result<(FetchReport, RunStats)> {
        let report = self.run_fetch(filter, key).await?;
        let run = self.run_import(key, options).await?;
        Ok((report, run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::crawl::stub::StubPages;
    use crate::models::NewSource;

    const TAX_LISTING: &str = r#"<html><body>
        <div class="news-list">
            <div class="news-title"><a href="/media-tsentr/novini/1.html">Про ПДВ</a></div>
        </div>
    </body></html>"#;

    const TAX_ARTICLE: &str = r#"<html><body>
        <h1 class="page-title">Про ПДВ</h1>
        <div class="news-detail-text"><p>Зміни щодо ПДВ для бізнесу.</p></div>
    </body></html>"#;

    async fn pipeline(pages: Arc<StubPages>) -> Pipeline {
        let repo = Repository::in_memory().await.unwrap();
        catalog::load_sources(
            &repo,
            vec![
                NewSource {
                    name: "ДПС України".into(),
                    url: "https://tax.gov.ua/".into(),
                    feed_url: None,
                    active: true,
                    needs_scraping: true,
                },
                NewSource {
                    name: "Недоступне".into(),
                    url: "http://127.0.0.1:9/".into(),
                    feed_url: Some("http://127.0.0.1:9/rss".into()),
                    active: true,
                    needs_scraping: false,
                },
            ],
        )
        .await
        .unwrap();

        let config = Config::default();
        let feeds = FeedFetcher::new(&config.http, &config.feed).unwrap();
        Pipeline::with_parts(&config, repo, feeds, pages)
    }

    fn stub() -> Arc<StubPages> {
        StubPages::new(&[
            ("https://tax.gov.ua/media-tsentr/novini/", TAX_LISTING),
            ("https://tax.gov.ua/media-tsentr/novini/1.html", TAX_ARTICLE),
        ])
    }

    #[tokio::test]
    async fn failing_feed_does_not_stop_the_crawl() {
        let pipeline = pipeline(stub()).await;

        let report = pipeline.run_fetch(&SourceFilter::default(), "k").await.unwrap();
        assert_eq!(report.sources_processed, 2);
        assert_eq!(report.articles.len(), 1);

        let article = &report.articles[0];
        assert_eq!(article.title, "Про ПДВ");
        assert_eq!(article.source, "ДПС України");
        assert_eq!(article.site_category.as_deref(), Some("новини"));
        assert_eq!(article.tags, vec!["пдв", "бізнес"]);

        assert_eq!(pipeline.staging().get("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_run_finds_nothing_new() {
        let pipeline = pipeline(stub()).await;
        let filter = SourceFilter {
            name: Some("ДПС України".into()),
            mode: FetchMode::CrawlOnly,
        };
        let options = ImportOptions {
            clear_after: true,
            delete_existing: false,
        };

        let (report, run) = pipeline.run(&filter, "k", options).await.unwrap();
        assert_eq!(report.sources_processed, 1);
        assert_eq!(run.imported, 1);
        assert!(pipeline.staging().get("k").await.unwrap().is_empty());

        let (report, run) = pipeline.run(&filter, "k", options).await.unwrap();
        assert!(report.articles.is_empty());
        assert_eq!(run.counters().total(), 0);
        assert_eq!(pipeline.repository().article_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filter_without_eligible_sources_stages_nothing() {
        let pages = stub();
        let pipeline = pipeline(pages.clone()).await;
        let filter = SourceFilter {
            name: Some("ДПС України".into()),
            mode: FetchMode::FeedsOnly,
        };

        let report = pipeline.run_fetch(&filter, "k").await.unwrap();
        assert_eq!(report.sources_processed, 0);
        assert!(pages.requests().is_empty());
        assert!(pipeline.staging().keys().await.unwrap().is_empty());
    }
}
