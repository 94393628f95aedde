use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Limits;
use crate::db::clip_name;
use crate::text::{normalize_label, slug_or_fallback};

#[derive(Debug, Clone, Copy)]
pub(super) enum Taxonomy {
    SiteCategory,
    Tag,
}

impl Taxonomy {
    fn table(self) -> &'static str {
        match self {
            Taxonomy::SiteCategory => "site_categories",
            Taxonomy::Tag => "tags",
        }
    }
}

/// Id of the row whose slug matches the normalized label, created on first sight.
///
/// A label that normalizes to nothing yields `None`. Name matches are also accepted
/// so labels with a random fallback slug are not duplicated.
pub(super) fn get_or_create(
    conn: &Connection,
    kind: Taxonomy,
    label: &str,
    limits: &Limits,
) -> rusqlite::Result<Option<i64>> {
    let name = clip_name(&normalize_label(label), limits.taxonomy_name);
    if name.is_empty() {
        return Ok(None);
    }
    let slug = slug_or_fallback(&name, limits.taxonomy_slug);
    let table = kind.table();

    let existing: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT id FROM {} WHERE slug = ?2 OR name = ?1 ORDER BY slug = ?2 DESC LIMIT 1",
                table
            ),
            params![name, slug],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(existing);
    }

    conn.execute(
        &format!("INSERT INTO {} (name, slug) VALUES (?1, ?2)", table),
        params![name, slug],
    )?;
    Ok(Some(conn.last_insert_rowid()))
}
