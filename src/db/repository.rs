use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    parse_datetime, ArticlePage, ArticleQuery, Category, ImportCounters, NewSource, RunStats,
    SiteCategory, Source, StoredArticle, Tag,
};
use crate::text::{safe_slugify, truncate_chars, with_unique_suffix};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = r#"a.id, a.title, a.slug, a.content, a.url, a.source_id, s.name,
    sc.name, a.created_at, a.published_at
    FROM articles a
    JOIN sources s ON s.id = a.source_id
    LEFT JOIN site_categories sc ON sc.id = a.site_category_id"#;

/// Handle to the durable store. Cheap to clone; all clones share one connection thread.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Run `f` on the connection thread. Used by the importer for its transactions.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let result = self
            .conn
            .call(move |conn| f(conn).map_err(tokio_rusqlite::Error::from))
            .await?;
        Ok(result)
    }

    // Source operations

    /// Insert or update a catalog record by name. Returns the id and whether it was created.
    pub async fn upsert_source(&self, source: NewSource) -> Result<(i64, bool)> {
        let result = self
            .conn
            .call(move |conn| {
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM sources WHERE name = ?1",
                        params![source.name],
                        |row| row.get(0),
                    )
                    .optional()?;

                conn.execute(
                    r#"INSERT INTO sources (name, url, feed_url, active, needs_scraping)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(name) DO UPDATE SET
                           url = excluded.url,
                           feed_url = excluded.feed_url,
                           active = excluded.active,
                           needs_scraping = excluded.needs_scraping"#,
                    params![
                        source.name,
                        source.url,
                        source.feed_url,
                        source.active,
                        source.needs_scraping
                    ],
                )?;

                let id = match existing {
                    Some(id) => id,
                    None => conn.last_insert_rowid(),
                };
                Ok((id, existing.is_none()))
            })
            .await?;
        Ok(result)
    }

    pub async fn all_sources(&self) -> Result<Vec<Source>> {
        let sources = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, url, feed_url, active, needs_scraping FROM sources ORDER BY name",
                )?;
                let sources = stmt
                    .query_map([], source_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    pub async fn source_by_name(&self, name: &str) -> Result<Option<Source>> {
        let name = name.to_string();
        let source = self
            .conn
            .call(move |conn| {
                let source = conn
                    .query_row(
                        "SELECT id, name, url, feed_url, active, needs_scraping FROM sources WHERE name = ?1",
                        params![name],
                        source_from_row,
                    )
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    // Article operations

    pub async fn url_exists(&self, url: &str) -> Result<bool> {
        let url = url.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM articles WHERE url = ?1)",
                    params![url],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    pub async fn article_count(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as u64)
    }

    pub async fn delete_all_articles(&self) -> Result<usize> {
        let deleted = self
            .conn
            .call(|conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM article_tags", [])?;
                let deleted = tx.execute("DELETE FROM articles", [])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn article_by_slug(&self, slug: &str) -> Result<Option<StoredArticle>> {
        let slug = slug.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} WHERE a.slug = ?1", ARTICLE_COLUMNS);
                let article = conn
                    .query_row(&sql, params![slug], article_from_row)
                    .optional()?;
                match article {
                    Some(mut article) => {
                        article.tags = tags_for(conn, article.id)?;
                        Ok(Some(article))
                    }
                    None => Ok(None),
                }
            })
            .await?;
        Ok(article)
    }

    /// Filtered, stably ordered page of persisted articles.
    pub async fn query_articles(&self, query: &ArticleQuery) -> Result<ArticlePage> {
        let query = query.clone();
        let page = self
            .conn
            .call(move |conn| {
                let mut clauses: Vec<&str> = Vec::new();
                let mut values: Vec<Value> = Vec::new();

                if let Some(term) = query.search.as_deref().filter(|t| !t.trim().is_empty()) {
                    let pattern = format!("%{}%", term.trim());
                    clauses.push("(a.title LIKE ? OR a.content LIKE ?)");
                    values.push(Value::Text(pattern.clone()));
                    values.push(Value::Text(pattern));
                }
                if let Some(source_id) = query.source_id {
                    clauses.push("a.source_id = ?");
                    values.push(Value::Integer(source_id));
                }
                if let Some(category) = &query.category_slug {
                    clauses.push(
                        r#"EXISTS (SELECT 1 FROM site_categories fsc
                                   JOIN categories c ON c.id = fsc.category_id
                                   WHERE fsc.id = a.site_category_id AND c.slug = ?)"#,
                    );
                    values.push(Value::Text(category.clone()));
                }
                if let Some(tag) = &query.tag_slug {
                    clauses.push(
                        r#"EXISTS (SELECT 1 FROM article_tags ft
                                   JOIN tags t ON t.id = ft.tag_id
                                   WHERE ft.article_id = a.id AND t.slug = ?)"#,
                    );
                    values.push(Value::Text(tag.clone()));
                }
                if let Some(from) = query.created_from {
                    clauses.push("a.created_at >= ?");
                    values.push(Value::Text(timestamp(from)));
                }
                if let Some(to) = query.created_to {
                    clauses.push("a.created_at <= ?");
                    values.push(Value::Text(timestamp(to)));
                }

                let filter = if clauses.is_empty() {
                    String::new()
                } else {
                    format!(" WHERE {}", clauses.join(" AND "))
                };

                let count_sql = format!(
                    "SELECT COUNT(*) FROM articles a{}",
                    filter
                );
                let total: i64 =
                    conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;

                let page_sql = format!(
                    "SELECT {}{} ORDER BY {} LIMIT ? OFFSET ?",
                    ARTICLE_COLUMNS,
                    filter,
                    query.order.sql()
                );
                values.push(Value::Integer(i64::from(query.per_page)));
                values.push(Value::Integer(query.offset()));

                let mut stmt = conn.prepare(&page_sql)?;
                let mut items = stmt
                    .query_map(params_from_iter(values.iter()), article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                drop(stmt);

                for article in &mut items {
                    article.tags = tags_for(conn, article.id)?;
                }

                Ok(ArticlePage {
                    items,
                    total: total as u64,
                    page: query.page.max(1),
                    per_page: query.per_page,
                })
            })
            .await?;
        Ok(page)
    }

    // Taxonomy operations

    /// Create a curated category, or return the existing one with that name.
    ///
    /// A slug already taken by a different category gets a random suffix.
    pub async fn create_category(&self, name: &str, slug_len: usize) -> Result<Category> {
        let name = name.trim().to_string();
        let category = self
            .conn
            .call(move |conn| {
                if let Some(existing) = conn
                    .query_row(
                        "SELECT id, name, slug FROM categories WHERE name = ?1",
                        params![name],
                        category_from_row,
                    )
                    .optional()?
                {
                    return Ok(existing);
                }

                let mut slug = safe_slugify(&name, slug_len);
                let taken: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM categories WHERE slug = ?1)",
                    params![slug],
                    |row| row.get(0),
                )?;
                if slug.is_empty() || taken {
                    slug = with_unique_suffix(&slug, slug_len);
                }

                conn.execute(
                    "INSERT INTO categories (name, slug) VALUES (?1, ?2)",
                    params![name, slug],
                )?;
                Ok(Category {
                    id: conn.last_insert_rowid(),
                    name,
                    slug,
                })
            })
            .await?;
        Ok(category)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let categories = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name, slug FROM categories ORDER BY name")?;
                let categories = stmt
                    .query_map([], category_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(categories)
            })
            .await?;
        Ok(categories)
    }

    /// Link a site category to a curated category. Returns false if either is unknown.
    pub async fn map_site_category(&self, site_slug: &str, category_slug: &str) -> Result<bool> {
        let site_slug = site_slug.to_string();
        let category_slug = category_slug.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE site_categories
                       SET category_id = (SELECT id FROM categories WHERE slug = ?2)
                       WHERE slug = ?1 AND EXISTS (SELECT 1 FROM categories WHERE slug = ?2)"#,
                    params![site_slug, category_slug],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    pub async fn site_categories(&self) -> Result<Vec<SiteCategory>> {
        let site_categories = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, slug, category_id FROM site_categories ORDER BY name",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(SiteCategory {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            slug: row.get(2)?,
                            category_id: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(site_categories)
    }

    pub async fn tags(&self) -> Result<Vec<Tag>> {
        let tags = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name, slug FROM tags ORDER BY name")?;
                let tags = stmt
                    .query_map([], |row| {
                        Ok(Tag {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            slug: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    // Run stats

    pub async fn insert_run(&self, started_at: DateTime<Utc>) -> Result<RunStats> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO run_stats (started_at) VALUES (?1)",
                    params![timestamp(started_at)],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(RunStats {
            id,
            started_at,
            completed_at: None,
            imported: 0,
            skipped: 0,
            errors: 0,
        })
    }

    /// Set completion time and counters. Fails if the run is unknown or already finished.
    pub async fn finish_run(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        counters: ImportCounters,
    ) -> Result<RunStats> {
        let (changed, run) = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE run_stats
                       SET completed_at = ?1, imported = ?2, skipped = ?3, errors = ?4
                       WHERE id = ?5 AND completed_at IS NULL"#,
                    params![
                        timestamp(completed_at),
                        counters.imported as i64,
                        counters.skipped as i64,
                        counters.errors as i64,
                        id
                    ],
                )?;
                let run = run_by_id(conn, id)?;
                Ok((changed, run))
            })
            .await?;

        match (changed, run) {
            (_, None) => Err(AppError::RunNotFound(id)),
            (0, Some(_)) => Err(AppError::RunFinalized(id)),
            (_, Some(run)) => Ok(run),
        }
    }

    pub async fn run(&self, id: i64) -> Result<Option<RunStats>> {
        let run = self
            .conn
            .call(move |conn| Ok(run_by_id(conn, id)?))
            .await?;
        Ok(run)
    }

    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunStats>> {
        let runs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, started_at, completed_at, imported, skipped, errors
                       FROM run_stats ORDER BY id DESC LIMIT ?1"#,
                )?;
                let runs = stmt
                    .query_map(params![limit], run_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(runs)
            })
            .await?;
        Ok(runs)
    }

    // Staging blobs

    pub async fn staging_put(&self, key: &str, payload: String) -> Result<()> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO staging (key, payload) VALUES (?1, ?2)
                       ON CONFLICT(key) DO UPDATE SET
                           payload = excluded.payload,
                           updated_at = datetime('now')"#,
                    params![key, payload],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn staging_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let payload = self
            .conn
            .call(move |conn| {
                let payload = conn
                    .query_row(
                        "SELECT payload FROM staging WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(payload)
            })
            .await?;
        Ok(payload)
    }

    pub async fn staging_delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM staging WHERE key = ?1", params![key])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }

    pub async fn staging_keys(&self) -> Result<Vec<String>> {
        let keys = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key FROM staging ORDER BY key")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await?;
        Ok(keys)
    }
}

/// Canonical text form for stored timestamps; sorts lexicographically.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// True for UNIQUE / PRIMARY KEY constraint failures.
/// Errors after which SQLite may have rolled back the open transaction on its own.
pub fn is_fatal(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::DiskFull
                | ErrorCode::SystemIoFailure
                | ErrorCode::OutOfMemory
                | ErrorCode::CannotOpen
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::OperationInterrupted
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

fn required_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp {:?}", raw).into(),
        )
    })
}

fn optional_datetime(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| parse_datetime(&s)))
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        feed_url: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        needs_scraping: row.get::<_, i64>(5)? != 0,
    })
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<StoredArticle> {
    Ok(StoredArticle {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        url: row.get(4)?,
        source_id: row.get(5)?,
        source_name: row.get(6)?,
        site_category: row.get(7)?,
        tags: Vec::new(),
        created_at: required_datetime(row, 8)?,
        published_at: optional_datetime(row, 9)?,
    })
}

fn run_from_row(row: &Row) -> rusqlite::Result<RunStats> {
    Ok(RunStats {
        id: row.get(0)?,
        started_at: required_datetime(row, 1)?,
        completed_at: optional_datetime(row, 2)?,
        imported: row.get::<_, i64>(3)? as u64,
        skipped: row.get::<_, i64>(4)? as u64,
        errors: row.get::<_, i64>(5)? as u64,
    })
}

fn run_by_id(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<RunStats>> {
    conn.query_row(
        r#"SELECT id, started_at, completed_at, imported, skipped, errors
           FROM run_stats WHERE id = ?1"#,
        params![id],
        run_from_row,
    )
    .optional()
}

fn tags_for(conn: &rusqlite::Connection, article_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT t.name FROM tags t
           JOIN article_tags at ON at.tag_id = t.id
           WHERE at.article_id = ?1
           ORDER BY t.name"#,
    )?;
    let tags = stmt
        .query_map(params![article_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

/// Clip a taxonomy name to its column capacity.
pub(crate) fn clip_name(name: &str, max: usize) -> String {
    truncate_chars(name.trim(), max)
}
