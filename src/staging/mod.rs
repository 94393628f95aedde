//! Holding area between a fetch run and an import run, keyed by run key.

mod envelope;
mod file;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{StagingBackend, StagingConfig};
use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;

pub use envelope::{decode_payload, Envelope};
pub use file::FileStaging;
pub use sqlite::SqliteStaging;

#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Replace whatever is staged under `key` with `articles`.
    async fn put(&self, key: &str, articles: &[Article]) -> Result<()>;

    /// Staged article dictionaries under `key`, in staging order. Missing key gives an empty list.
    async fn get(&self, key: &str) -> Result<Vec<Value>>;

    /// Drop the payload under `key`. Returns whether anything was removed.
    async fn clear(&self, key: &str) -> Result<bool>;

    /// Keys currently holding a payload.
    async fn keys(&self) -> Result<Vec<String>>;
}

pub fn open(config: &StagingConfig, repo: &Repository) -> Arc<dyn StagingStore> {
    match config.backend {
        StagingBackend::Sqlite => Arc::new(SqliteStaging::new(repo.clone())),
        StagingBackend::File => Arc::new(FileStaging::new(&config.dir)),
    }
}

/// Wire form written by `put`: a bare JSON array of article objects.
pub(crate) fn encode_articles(articles: &[Article]) -> Result<String> {
    Ok(serde_json::to_string(articles)?)
}
