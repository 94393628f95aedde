//! Source catalog seeding.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::db::Repository;
use crate::error::Result;
use crate::models::NewSource;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sources: Vec<NewSource>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub created: usize,
    pub updated: usize,
    pub invalid: usize,
}

fn feed(name: &str, url: &str, feed_url: &str) -> NewSource {
    NewSource {
        name: name.to_string(),
        url: url.to_string(),
        feed_url: Some(feed_url.to_string()),
        active: true,
        needs_scraping: false,
    }
}

fn crawled(name: &str, url: &str) -> NewSource {
    NewSource {
        name: name.to_string(),
        url: url.to_string(),
        feed_url: None,
        active: true,
        needs_scraping: true,
    }
}

/// The outlets the pipeline ships with.
pub fn builtin() -> Vec<NewSource> {
    vec![
        feed(
            "Кореспондент",
            "https://ua.korrespondent.net",
            "http://k.img.com.ua/rss/ua/all_news2.0.xml",
        ),
        feed("ТСН", "https://tsn.ua", "https://tsn.ua/rss/full.rss"),
        feed(
            "Українська правда",
            "https://www.pravda.com.ua",
            "https://www.pravda.com.ua/rss/view_news/",
        ),
        feed(
            "Радіо Свобода",
            "https://www.radiosvoboda.org",
            "https://www.radiosvoboda.org/api/zrqitl-vomx-tpeoumq",
        ),
        feed("Суспільне", "https://suspilne.media", "https://suspilne.media/rss/all.rss"),
        feed(
            "АрміяInform",
            "https://armyinform.com.ua",
            "https://armyinform.com.ua/feed/",
        ),
        feed("Еспресо", "https://espreso.tv/", "https://espreso.tv/rss"),
        feed("LIGA.net", "https://www.liga.net/", "https://www.liga.net/news/all/rss.xml"),
        feed("Лівий Берег", "https://lb.ua/", "https://lb.ua/rss/ukr/news.xml"),
        feed(
            "УКРІНФОРМ",
            "https://www.ukrinform.ua/",
            "https://www.ukrinform.ua/rss/block-lastnews",
        ),
        feed("УНІАН", "https://www.unian.ua/", "https://rss.unian.net/site/news_ukr.rss"),
        crawled("ДПС України", "https://tax.gov.ua/"),
    ]
}

/// Read `[[sources]]` tables from a TOML catalog file.
pub fn from_file(path: &Path) -> Result<Vec<NewSource>> {
    let content = std::fs::read_to_string(path)?;
    let catalog: CatalogFile = toml::from_str(&content)?;
    Ok(catalog.sources)
}

/// Upsert every record by name. Records without a name or URL are skipped.
pub async fn load_sources(repo: &Repository, sources: Vec<NewSource>) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    for source in sources {
        if source.name.trim().is_empty() || source.url.trim().is_empty() {
            warn!(name = %source.name, "Catalog record without name or url");
            report.invalid += 1;
            continue;
        }

        let name = source.name.clone();
        let (_, created) = repo.upsert_source(source).await?;
        if created {
            info!(%name, "Created source");
            report.created += 1;
        } else {
            info!(%name, "Updated source");
            report.updated += 1;
        }
    }

    Ok(report)
}
