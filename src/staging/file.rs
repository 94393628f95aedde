use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::Article;

use super::{decode_payload, encode_articles, StagingStore};

/// One `<key>.json` file per staging key.
#[derive(Debug, Clone)]
pub struct FileStaging {
    dir: PathBuf,
}

impl FileStaging {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(AppError::Staging(format!("invalid staging key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl StagingStore for FileStaging {
    async fn put(&self, key: &str, articles: &[Article]) -> Result<()> {
        let path = self.path_for(key)?;
        let payload = encode_articles(articles)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        // write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!(key, path = %path.display(), count = articles.len(), "Staged articles");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(decode_payload(&payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(key, path = %path.display(), "No staged payload under key");
                Ok(Vec::new())
            }
            Err(e) => Err(AppError::Staging(format!("{}: {}", path.display(), e))),
        }
    }

    async fn clear(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
