use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;

use super::{decode_payload, encode_articles, StagingStore};

/// Staging table in the article database.
#[derive(Clone)]
pub struct SqliteStaging {
    repo: Repository,
}

impl SqliteStaging {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl StagingStore for SqliteStaging {
    async fn put(&self, key: &str, articles: &[Article]) -> Result<()> {
        let payload = encode_articles(articles)?;
        self.repo.staging_put(key, payload).await?;
        info!(key, count = articles.len(), "Staged articles");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<Value>> {
        match self.repo.staging_get(key).await? {
            Some(payload) => {
                let items = decode_payload(&payload);
                debug!(key, count = items.len(), "Read staged payload");
                Ok(items)
            }
            None => {
                let similar: Vec<String> = self
                    .repo
                    .staging_keys()
                    .await?
                    .into_iter()
                    .filter(|k| k.contains(key) || key.contains(k.as_str()))
                    .collect();
                warn!(key, ?similar, "No staged payload under key");
                Ok(Vec::new())
            }
        }
    }

    async fn clear(&self, key: &str) -> Result<bool> {
        self.repo.staging_delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.repo.staging_keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str) -> Article {
        Article {
            title: "Заголовок".into(),
            content: "Текст".into(),
            url: url.into(),
            source: "ТСН".into(),
            site_category: Some("політика".into()),
            tags: vec!["війна".into()],
            published_at: None,
        }
    }

    #[tokio::test]
    async fn put_overwrites_and_clear_removes() {
        let repo = Repository::in_memory().await.unwrap();
        let staging = SqliteStaging::new(repo);

        staging.put("run", &[article("https://tsn.ua/1")]).await.unwrap();
        staging
            .put("run", &[article("https://tsn.ua/2"), article("https://tsn.ua/3")])
            .await
            .unwrap();

        let items = staging.get("run").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["url"], "https://tsn.ua/2");
        assert_eq!(items[1]["site_category"], "політика");

        assert!(staging.clear("run").await.unwrap());
        assert!(!staging.clear("run").await.unwrap());
        assert!(staging.get("run").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_envelope_in_the_table_is_unwrapped() {
        let repo = Repository::in_memory().await.unwrap();
        let inner = serde_json::json!([{"title": "A", "url": "http://x/1"}]).to_string();
        let wrapped = serde_json::json!([{ "value": inner }]).to_string();
        repo.staging_put("rss_parsed_news", wrapped).await.unwrap();

        let staging = SqliteStaging::new(repo);
        let items = staging.get("rss_parsed_news").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "A");
    }
}
