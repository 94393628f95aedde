use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Limits;
use crate::db::{is_fatal, is_unique_violation, timestamp, Repository};
use crate::error::Result;
use crate::models::{ImportCounters, RunStats, StagedArticle};
use crate::staging::StagingStore;
use crate::stats::RunLedger;
use crate::text::{slug_or_fallback, truncate_chars, truncate_for_log};

use super::taxonomy::{get_or_create, Taxonomy};

/// What happened to one staged item. Exactly one per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Imported { slug: String },
    Skipped(&'static str),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Drop the staged payload after a run that imported something.
    pub clear_after: bool,
    /// Delete every stored article before importing.
    pub delete_existing: bool,
}

pub fn tally(outcomes: &[ItemOutcome]) -> ImportCounters {
    let mut counters = ImportCounters::default();
    for outcome in outcomes {
        match outcome {
            ItemOutcome::Imported { .. } => counters.imported += 1,
            ItemOutcome::Skipped(_) => counters.skipped += 1,
            ItemOutcome::Failed(_) => counters.errors += 1,
        }
    }
    counters
}

pub struct Importer {
    repo: Repository,
    ledger: RunLedger,
    limits: Limits,
}

impl Importer {
    pub fn new(repo: Repository, limits: Limits) -> Self {
        Self {
            ledger: RunLedger::new(repo.clone()),
            repo,
            limits,
        }
    }

    /// Import staged article dictionaries and return the per-item tallies.
    pub async fn import_batch(&self, items: Vec<Value>) -> Result<ImportCounters> {
        let outcomes = self.import_items(items).await?;
        Ok(tally(&outcomes))
    }

    /// Import items in staging order inside one transaction.
    ///
    /// Every item runs in its own savepoint; a failed item is rolled back alone.
    /// A database failure that can take the enclosing transaction with it (disk full, I/O,
    /// interrupted or lost connection) aborts the whole batch and nothing is committed.
    pub async fn import_items(&self, items: Vec<Value>) -> Result<Vec<ItemOutcome>> {
        let limits = self.limits;
        let total = items.len();

        let outcomes = self
            .repo
            .call(move |conn| {
                let mut tx = conn.transaction()?;
                let mut outcomes = Vec::with_capacity(items.len());

                for value in items {
                    let sp = tx.savepoint()?;
                    let outcome = import_one(&sp, value, &limits)?;
                    if matches!(outcome, ItemOutcome::Imported { .. }) {
                        sp.commit()?;
                    }
                    outcomes.push(outcome);
                }

                tx.commit()?;
                Ok(outcomes)
            })
            .await?;

        debug!(items = total, "Batch committed");
        Ok(outcomes)
    }

    /// Import everything staged under `key`, recorded as one run.
    pub async fn run_import(
        &self,
        staging: &dyn StagingStore,
        key: &str,
        options: ImportOptions,
    ) -> Result<RunStats> {
        let run = self.ledger.begin().await?;

        if options.delete_existing {
            let deleted = self.repo.delete_all_articles().await?;
            warn!(deleted, "Deleted all existing articles before import");
        }

        let items = staging.get(key).await?;
        info!(key, items = items.len(), "Importing staged articles");

        let counters = self.import_batch(items).await?;
        let run = self.ledger.finish(&run, counters).await?;

        if options.clear_after && counters.imported > 0 {
            staging.clear(key).await?;
            info!(key, "Cleared staging after import");
        }

        Ok(run)
    }
}

/// Outcome of one item. `Err` only for failures that end the batch.
fn import_one(conn: &Connection, value: Value, limits: &Limits) -> rusqlite::Result<ItemOutcome> {
    let staged = match StagedArticle::from_value(value) {
        Ok(staged) => staged,
        Err(e) => {
            warn!(error = %e, "Invalid staged item");
            return Ok(ItemOutcome::Failed(format!("invalid item: {}", e)));
        }
    };

    let title = staged.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let url = staged.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let (Some(title), Some(url)) = (title, url) else {
        debug!(url = staged.url.as_deref().unwrap_or("-"), "Missing title or url");
        return Ok(ItemOutcome::Skipped("missing title or url"));
    };

    let title = truncate_chars(title, limits.title);
    let url = truncate_chars(url, limits.url);
    let slug = slug_or_fallback(&title, limits.article_slug);

    match persist(conn, &staged, &title, &url, slug.clone(), limits) {
        Ok(outcome) => Ok(outcome),
        Err(e) if is_unique_violation(&e) => {
            debug!(%url, %slug, "Lost insert race, already stored");
            Ok(ItemOutcome::Skipped("duplicate on write"))
        }
        // The savepoint is gone once SQLite has rolled back the outer transaction.
        Err(e) if is_fatal(&e) || conn.is_autocommit() => {
            error!(%url, %slug, error = %e, "Database failure, aborting batch");
            Err(e)
        }
        Err(e) => {
            error!(
                %url,
                %slug,
                title = %truncate_for_log(&title, 80),
                error = %e,
                "Failed to persist article"
            );
            Ok(ItemOutcome::Failed(e.to_string()))
        }
    }
}

fn persist(
    conn: &Connection,
    staged: &StagedArticle,
    title: &str,
    url: &str,
    slug: String,
    limits: &Limits,
) -> rusqlite::Result<ItemOutcome> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM articles WHERE slug = ?1 OR url = ?2)",
        params![slug, url],
        |row| row.get(0),
    )?;
    if exists {
        debug!(%url, %slug, "Already stored");
        return Ok(ItemOutcome::Skipped("already stored"));
    }

    let source_name = staged.source.as_deref().map(str::trim).unwrap_or_default();
    let source_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM sources WHERE name = ?1",
            params![source_name],
            |row| row.get(0),
        )
        .optional()?;
    let Some(source_id) = source_id else {
        error!(
            %url,
            source = source_name,
            title = %truncate_for_log(title, 80),
            "Unknown source"
        );
        return Ok(ItemOutcome::Failed(format!("unknown source {:?}", source_name)));
    };

    let site_category_id = match staged.category_label() {
        Some(label) => get_or_create(conn, Taxonomy::SiteCategory, label, limits)?,
        None => None,
    };

    let content = truncate_chars(staged.content.as_deref().unwrap_or_default(), limits.content);
    conn.execute(
        r#"INSERT INTO articles
               (title, slug, content, url, source_id, site_category_id, created_at, published_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        params![
            title,
            slug,
            content,
            url,
            source_id,
            site_category_id,
            timestamp(Utc::now()),
            staged.published().map(timestamp),
        ],
    )?;
    let article_id = conn.last_insert_rowid();

    for tag in &staged.tags {
        if let Some(tag_id) = get_or_create(conn, Taxonomy::Tag, tag, limits)? {
            conn.execute(
                "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
                params![article_id, tag_id],
            )?;
        }
    }

    debug!(%url, %slug, "Imported");
    Ok(ItemOutcome::Imported { slug })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, ArticleQuery, NewSource, SortOrder};
    use crate::staging::SqliteStaging;
    use serde_json::json;

    async fn repo_with_source(name: &str) -> Repository {
        let repo = Repository::in_memory().await.unwrap();
        repo.upsert_source(NewSource {
            name: name.into(),
            url: "https://tsn.ua".into(),
            feed_url: Some("https://tsn.ua/rss/full.rss".into()),
            active: true,
            needs_scraping: false,
        })
        .await
        .unwrap();
        repo
    }

    fn importer(repo: &Repository) -> Importer {
        Importer::new(repo.clone(), Limits::default())
    }

    #[tokio::test]
    async fn unknown_source_counts_as_error() {
        let repo = repo_with_source("ТСН").await;
        let counters = importer(&repo)
            .import_batch(vec![json!({"title": "A", "url": "http://x/1", "source": "Foo"})])
            .await
            .unwrap();

        assert_eq!(
            counters,
            ImportCounters {
                imported: 0,
                skipped: 0,
                errors: 1
            }
        );
        assert_eq!(repo.article_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stored_url_is_skipped_next_to_a_new_article() {
        let repo = repo_with_source("ТСН").await;
        let importer = importer(&repo);
        importer
            .import_batch(vec![json!({"title": "Перша", "url": "https://tsn.ua/1", "source": "ТСН"})])
            .await
            .unwrap();

        let counters = importer
            .import_batch(vec![
                json!({"title": "Друга", "url": "https://tsn.ua/2", "source": "ТСН"}),
                json!({"title": "Інший заголовок", "url": "https://tsn.ua/1", "source": "ТСН"}),
            ])
            .await
            .unwrap();

        assert_eq!(
            counters,
            ImportCounters {
                imported: 1,
                skipped: 1,
                errors: 0
            }
        );
        assert_eq!(repo.article_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reimporting_a_batch_skips_everything() {
        let repo = repo_with_source("ТСН").await;
        let importer = importer(&repo);
        let batch = vec![
            json!({"title": "Новина 1", "url": "https://tsn.ua/1", "source": "ТСН", "tags": ["Війна"]}),
            json!({"title": "Новина 2", "url": "https://tsn.ua/2", "source": "ТСН", "site_category": "Політика"}),
        ];

        let first = importer.import_batch(batch.clone()).await.unwrap();
        assert_eq!(first.imported, 2);
        let tags_before = repo.tags().await.unwrap();

        let second = importer.import_batch(batch).await.unwrap();
        assert_eq!(
            second,
            ImportCounters {
                imported: 0,
                skipped: 2,
                errors: 0
            }
        );
        assert_eq!(repo.article_count().await.unwrap(), 2);
        assert_eq!(repo.tags().await.unwrap(), tags_before);
        assert_eq!(repo.site_categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_bad_item_does_not_abort_the_batch() {
        let repo = repo_with_source("ТСН").await;
        let outcomes = importer(&repo)
            .import_items(vec![
                json!({"title": "Без адреси", "source": "ТСН"}),
                json!("not an object"),
                json!({"title": "Ціла", "url": "https://tsn.ua/3", "source": "ТСН"}),
                json!({"title": "Ціла", "url": "https://tsn.ua/4", "source": "ТСН"}),
            ])
            .await
            .unwrap();

        assert_eq!(outcomes[0], ItemOutcome::Skipped("missing title or url"));
        assert!(matches!(outcomes[1], ItemOutcome::Failed(_)));
        assert_eq!(
            outcomes[2],
            ItemOutcome::Imported {
                slug: "tsila".into()
            }
        );
        assert_eq!(outcomes[3], ItemOutcome::Skipped("already stored"));
        assert_eq!(tally(&outcomes).total(), 4);
    }

    #[tokio::test]
    async fn label_variants_share_taxonomy_rows() {
        let repo = repo_with_source("ТСН").await;
        importer(&repo)
            .import_batch(vec![
                json!({"title": "A", "url": "https://tsn.ua/a", "source": "ТСН",
                       "site_category": "Політика ", "tags": ["Політика "]}),
                json!({"title": "B", "url": "https://tsn.ua/b", "source": "ТСН",
                       "site_categories": ["політика"], "tags": ["політика", "ПОЛІТИКА"]}),
            ])
            .await
            .unwrap();

        assert_eq!(repo.site_categories().await.unwrap().len(), 1);
        let tags = repo.tags().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "політика");

        let b = repo.article_by_slug("b").await.unwrap().unwrap();
        assert_eq!(b.tags, vec!["політика"]);
        assert_eq!(b.site_category.as_deref(), Some("політика"));
    }

    #[tokio::test]
    async fn insert_race_is_reported_as_unique_violation() {
        let repo = repo_with_source("ТСН").await;
        importer(&repo)
            .import_batch(vec![json!({"title": "A", "url": "https://tsn.ua/a", "source": "ТСН"})])
            .await
            .unwrap();

        // Bypass the existence check the way a concurrent importer would.
        let err = repo
            .call(|conn| {
                conn.execute(
                    "INSERT INTO articles (title, slug, url, source_id, created_at) VALUES ('A', 'a2', 'https://tsn.ua/a', 1, '')",
                    [],
                )
            })
            .await
            .unwrap_err();
        match err {
            crate::error::AppError::Database(tokio_rusqlite::Error::Rusqlite(e)) => {
                assert!(is_unique_violation(&e))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn published_time_is_kept_and_created_at_is_import_time() {
        let repo = repo_with_source("ТСН").await;
        let before = Utc::now();
        importer(&repo)
            .import_batch(vec![json!({
                "title": "A", "url": "https://tsn.ua/a", "source": "ТСН",
                "published_at": "2024-05-01T10:00:00+00:00"
            })])
            .await
            .unwrap();

        let article = repo.article_by_slug("a").await.unwrap().unwrap();
        assert!(article.created_at >= before - chrono::Duration::seconds(1));
        assert_eq!(
            article.published_at.map(|dt| dt.to_rfc3339()),
            Some("2024-05-01T10:00:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn imported_articles_are_queryable() {
        let repo = repo_with_source("ТСН").await;
        importer(&repo)
            .import_batch(vec![
                json!({"title": "Ракетний удар", "content": "Обстріл Києва", "url": "https://tsn.ua/1",
                       "source": "ТСН", "site_category": "Війна", "tags": ["Київ"]}),
                json!({"title": "Бюджет", "content": "Засідання ради", "url": "https://tsn.ua/2",
                       "source": "ТСН", "site_category": "Економіка", "tags": ["Рада"]}),
                json!({"title": "Вибори", "content": "Рада та Київ", "url": "https://tsn.ua/3",
                       "source": "ТСН", "site_category": "Політика", "tags": ["Київ", "Рада"]}),
            ])
            .await
            .unwrap();

        let by_tag = repo
            .query_articles(&ArticleQuery {
                tag_slug: Some("kyyiv".into()),
                order: SortOrder::Oldest,
                ..ArticleQuery::default()
            })
            .await
            .unwrap();
        let titles: Vec<_> = by_tag.items.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Ракетний удар", "Вибори"]);

        repo.create_category("Безпека", 50).await.unwrap();
        assert!(repo.map_site_category("viyna", "bezpeka").await.unwrap());
        let by_category = repo
            .query_articles(&ArticleQuery {
                category_slug: Some("bezpeka".into()),
                ..ArticleQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_category.total, 1);
        assert_eq!(by_category.items[0].slug, "raketnyy-udar");

        let search = repo
            .query_articles(&ArticleQuery {
                search: Some("Засідання".into()),
                ..ArticleQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(search.total, 1);

        let paged = repo
            .query_articles(&ArticleQuery {
                per_page: 2,
                page: 2,
                ..ArticleQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.page_count(), 2);
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.items[0].title, "Ракетний удар");
    }

    #[tokio::test]
    async fn run_import_records_a_run_and_clears_staging() {
        let repo = repo_with_source("ТСН").await;
        let staging = SqliteStaging::new(repo.clone());
        let article = Article {
            title: "Новина".into(),
            content: "Текст".into(),
            url: "https://tsn.ua/n".into(),
            source: "ТСН".into(),
            site_category: None,
            tags: Vec::new(),
            published_at: None,
        };
        staging.put("k", &[article]).await.unwrap();

        let importer = importer(&repo);
        let options = ImportOptions {
            clear_after: true,
            delete_existing: false,
        };
        let run = importer.run_import(&staging, "k", options).await.unwrap();
        assert!(run.is_finished());
        assert_eq!(run.imported, 1);
        assert!(staging.get("k").await.unwrap().is_empty());

        // Nothing staged: the run still completes with zero counters.
        let empty = importer.run_import(&staging, "k", options).await.unwrap();
        assert_eq!(empty.counters(), ImportCounters::default());
        assert_eq!(repo.recent_runs(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn staging_is_kept_when_nothing_was_imported() {
        let repo = repo_with_source("ТСН").await;
        let staging = SqliteStaging::new(repo.clone());
        staging
            .put(
                "k",
                &[Article {
                    title: "Нікому".into(),
                    content: String::new(),
                    url: "https://x/1".into(),
                    source: "Foo".into(),
                    site_category: None,
                    tags: Vec::new(),
                    published_at: None,
                }],
            )
            .await
            .unwrap();

        let run = importer(&repo)
            .run_import(
                &staging,
                "k",
                ImportOptions {
                    clear_after: true,
                    delete_existing: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(run.errors, 1);
        assert_eq!(staging.get("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_database_aborts_the_batch_without_partial_commit() {
        let repo = repo_with_source("ТСН").await;
        let importer = importer(&repo);
        importer
            .import_batch(vec![json!({"title": "Стара", "url": "https://tsn.ua/0", "source": "ТСН"})])
            .await
            .unwrap();

        // No room for a single new page.
        repo.call(|conn| {
            let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            conn.query_row(&format!("PRAGMA max_page_count = {}", pages), [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .await
        .unwrap();

        let result = importer
            .import_items(vec![
                json!({"title": "Перша", "url": "https://tsn.ua/1", "source": "ТСН"}),
                json!({"title": "Велика", "url": "https://tsn.ua/2", "source": "ТСН", "content": "ї".repeat(50_000)}),
                json!({"title": "Третя", "url": "https://tsn.ua/3", "source": "ТСН"}),
            ])
            .await;

        match result {
            Err(crate::error::AppError::Database(tokio_rusqlite::Error::Rusqlite(e))) => {
                assert!(is_fatal(&e), "unexpected error: {e}")
            }
            other => panic!("expected a fatal database error, got {other:?}"),
        }
        assert_eq!(repo.article_count().await.unwrap(), 1);
        assert!(repo.article_by_slug("persha").await.unwrap().is_none());
    }

    #[test]
    fn storage_failures_are_fatal_and_constraints_are_not() {
        let full = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            None,
        );
        let io = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
            None,
        );
        let unique = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            None,
        );

        assert!(is_fatal(&full));
        assert!(is_fatal(&io));
        assert!(!is_fatal(&unique));
        assert!(is_unique_violation(&unique));
        assert!(!is_fatal(&rusqlite::Error::QueryReturnedNoRows));
    }
}
