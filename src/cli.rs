//! Command-line interface.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};

use crate::import::ImportOptions;
use crate::models::{ArticleQuery, SortOrder};
use crate::pipeline::{FetchMode, SourceFilter};

#[derive(Parser, Debug)]
#[command(name = "news-ingest", author, version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long, global = true, env = "NEWS_INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `news_ingest=trace`. RUST_LOG wins when set.
    #[arg(long, global = true, env = "NEWS_INGEST_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch feeds and crawl sites, then stage the new articles
    Fetch {
        #[command(flatten)]
        sources: SourceArgs,

        /// Staging key (defaults to `staging.default_key`)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Import staged articles into the store
    Import {
        #[command(flatten)]
        flags: ImportFlags,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// Fetch, then import the same staging key
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        flags: ImportFlags,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// Create or update catalog sources
    LoadSources {
        /// TOML file with `[[sources]]` tables; the built-in catalog when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show recent import runs
    Runs {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// List stored articles
    Articles(ArticlesArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Only this catalog source, by name
    #[arg(short, long)]
    pub source: Option<String>,

    #[arg(long, conflicts_with = "crawl_only")]
    pub feeds_only: bool,

    #[arg(long)]
    pub crawl_only: bool,
}

impl SourceArgs {
    pub fn filter(&self) -> SourceFilter {
        let mode = if self.feeds_only {
            FetchMode::FeedsOnly
        } else if self.crawl_only {
            FetchMode::CrawlOnly
        } else {
            FetchMode::All
        };
        SourceFilter {
            name: self.source.clone(),
            mode,
        }
    }
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ImportFlags {
    /// Clear the staged payload when at least one article was imported
    #[arg(long)]
    pub clear: bool,

    /// Delete ALL stored articles before importing
    #[arg(long)]
    pub delete_existing: bool,
}

impl ImportFlags {
    pub fn options(&self) -> ImportOptions {
        ImportOptions {
            clear_after: self.clear,
            delete_existing: self.delete_existing,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ArticlesArgs {
    /// Text to look for in title or content
    #[arg(short = 'q', long)]
    pub search: Option<String>,

    /// Source name
    #[arg(short, long)]
    pub source: Option<String>,

    /// Curated category slug
    #[arg(long)]
    pub category: Option<String>,

    /// Tag slug
    #[arg(long)]
    pub tag: Option<String>,

    /// Created on or after this day (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Created on or before this day (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Oldest first
    #[arg(long)]
    pub oldest: bool,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long, default_value_t = 10)]
    pub per_page: u32,

    /// Print the page as JSON
    #[arg(long)]
    pub json: bool,
}

impl ArticlesArgs {
    pub fn query(&self, source_id: Option<i64>) -> ArticleQuery {
        ArticleQuery {
            search: self.search.clone(),
            source_id,
            category_slug: self.category.clone(),
            tag_slug: self.tag.clone(),
            created_from: self
                .from
                .map(|day| Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))),
            created_to: self.to.and_then(|day| {
                day.succ_opt()
                    .map(|next| Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)))
                    .map(|end| end - chrono::Duration::microseconds(1))
            }),
            order: if self.oldest {
                SortOrder::Oldest
            } else {
                SortOrder::Newest
            },
            page: self.page.max(1),
            per_page: self.per_page.max(1),
        }
    }
}
