use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const APP_DIR: &str = "news-ingest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub staging: StagingConfig,

    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Sources fetched in parallel.
    #[serde(default = "default_feed_concurrency")]
    pub concurrency: usize,

    /// Budget for one source, fetch and parse included.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Listing pages followed per start URL.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_max_articles")]
    pub max_articles_per_source: usize,

    /// In-flight article requests per source.
    #[serde(default = "default_crawl_concurrency")]
    pub concurrency: usize,

    /// Sources crawled in parallel.
    #[serde(default = "default_crawl_source_concurrency")]
    pub source_concurrency: usize,

    /// Minimum gap between two requests to the same host.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retried in addition to every 5xx status.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    #[serde(default = "default_crawl_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingBackend {
    Sqlite,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_backend")]
    pub backend: StagingBackend,

    /// Directory used by the file backend.
    #[serde(default = "default_staging_dir")]
    pub dir: String,

    #[serde(default = "default_staging_key")]
    pub default_key: String,
}

/// Storage capacities, in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_title_len")]
    pub title: usize,

    #[serde(default = "default_url_len")]
    pub url: usize,

    #[serde(default = "default_content_len")]
    pub content: usize,

    #[serde(default = "default_article_slug_len")]
    pub article_slug: usize,

    #[serde(default = "default_taxonomy_name_len")]
    pub taxonomy_name: usize,

    #[serde(default = "default_taxonomy_slug_len")]
    pub taxonomy_slug: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Substitute "Untitled" for a missing title instead of rejecting the entry.
    #[serde(default)]
    pub allow_untitled: bool,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("news.db").to_string_lossy().to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

fn default_feed_concurrency() -> usize {
    5
}

fn default_source_timeout_secs() -> u64 {
    60
}

fn default_max_pages() -> usize {
    3
}

fn default_max_articles() -> usize {
    50
}

fn default_crawl_concurrency() -> usize {
    2
}

fn default_crawl_source_concurrency() -> usize {
    2
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_statuses() -> Vec<u16> {
    vec![408, 429]
}

fn default_true() -> bool {
    true
}

fn default_crawl_source_timeout_secs() -> u64 {
    600
}

fn default_staging_backend() -> StagingBackend {
    StagingBackend::Sqlite
}

fn default_staging_dir() -> String {
    data_dir().join("staging").to_string_lossy().to_string()
}

fn default_staging_key() -> String {
    "rss_parsed_news".to_string()
}

fn default_title_len() -> usize {
    500
}

fn default_url_len() -> usize {
    500
}

fn default_content_len() -> usize {
    100_000
}

fn default_article_slug_len() -> usize {
    500
}

fn default_taxonomy_name_len() -> usize {
    100
}

fn default_taxonomy_slug_len() -> usize {
    50
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            concurrency: default_feed_concurrency(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_articles_per_source: default_max_articles(),
            concurrency: default_crawl_concurrency(),
            source_concurrency: default_crawl_source_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            retry_statuses: default_retry_statuses(),
            respect_robots: true,
            source_timeout_secs: default_crawl_source_timeout_secs(),
        }
    }
}

impl CrawlConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        (500..600).contains(&status) || self.retry_statuses.contains(&status)
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            backend: default_staging_backend(),
            dir: default_staging_dir(),
            default_key: default_staging_key(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            title: default_title_len(),
            url: default_url_len(),
            content: default_content_len(),
            article_slug: default_article_slug_len(),
            taxonomy_name: default_taxonomy_name_len(),
            taxonomy_slug: default_taxonomy_slug_len(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            http: HttpConfig::default(),
            feed: FeedConfig::default(),
            crawl: CrawlConfig::default(),
            staging: StagingConfig::default(),
            limits: Limits::default(),
            import: ImportConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.feed.concurrency == 0
            || self.crawl.concurrency == 0
            || self.crawl.source_concurrency == 0
        {
            return Err(AppError::Config("concurrency must be at least 1".into()));
        }
        if self.limits.taxonomy_slug < 16 {
            return Err(AppError::Config(
                "limits.taxonomy_slug must leave room for a uuid suffix".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/news.db"

            [crawl]
            max_pages = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/news.db");
        assert_eq!(config.crawl.max_pages, 7);
        assert_eq!(config.crawl.max_retries, 3);
        assert_eq!(config.staging.backend, StagingBackend::Sqlite);
        assert_eq!(config.staging.default_key, "rss_parsed_news");
        assert_eq!(config.limits.article_slug, 500);
        assert!(!config.import.allow_untitled);
    }

    #[test]
    fn retryable_statuses_cover_server_errors() {
        let crawl = CrawlConfig::default();
        assert!(crawl.is_retryable(500));
        assert!(crawl.is_retryable(524));
        assert!(crawl.is_retryable(408));
        assert!(crawl.is_retryable(429));
        assert!(!crawl.is_retryable(404));
        assert!(!crawl.is_retryable(403));
    }

    #[test]
    fn load_from_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let written = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let read = Config::load_from(&path).unwrap();
        assert_eq!(read.db_path, written.db_path);
        assert_eq!(read.crawl.retry_statuses, vec![408, 429]);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[feed]\nconcurrency = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn crawl_source_concurrency_is_read_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[crawl]\nsource_concurrency = 4\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.crawl.source_concurrency, 4);
        assert_eq!(config.crawl.concurrency, 2);

        std::fs::write(&path, "[crawl]\nsource_concurrency = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    }
}
