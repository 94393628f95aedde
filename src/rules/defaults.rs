use crate::models::RawEntry;
use crate::text::html_to_text;

use super::registry::{Cleaner, Extractor, SiteRules};

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

pub(super) fn full_content(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    Ok(non_empty(entry.content.as_ref()))
}

pub(super) fn summary(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    Ok(non_empty(entry.summary.as_ref()))
}

pub(super) fn description(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    Ok(non_empty(entry.description.as_ref()))
}

pub(super) fn entry_tags(entry: &RawEntry) -> anyhow::Result<Option<Vec<String>>> {
    Ok(Some(entry.tags.clone()))
}

/// Feed categories after the first one; the first becomes the site category.
pub(super) fn extra_feed_categories(entry: &RawEntry) -> anyhow::Result<Option<Vec<String>>> {
    Ok(Some(entry.categories.iter().skip(1).cloned().collect()))
}

pub(super) fn entry_category(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    Ok(non_empty(entry.category.as_ref()))
}

pub(super) fn first_feed_category(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    Ok(non_empty(entry.categories.first()))
}

/// Rules every source falls back to, field by field.
pub fn default_rules() -> SiteRules {
    SiteRules::new()
        .content(Extractor::new("content", full_content))
        .content(Extractor::new("summary", summary))
        .content(Extractor::new("description", description))
        .tags(Extractor::new("entry_tags", entry_tags))
        .tags(Extractor::new("extra_feed_categories", extra_feed_categories))
        .category(Extractor::new("entry_category", entry_category))
        .category(Extractor::new("first_feed_category", first_feed_category))
        .cleaner(Cleaner::new("html_to_text", html_to_text))
}
