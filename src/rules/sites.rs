//! Built-in per-site rule sets.

use anyhow::Context;

use crate::models::RawEntry;
use crate::text::{html_to_text, strip_boilerplate};

use super::defaults::{
    description, entry_category, entry_tags, extra_feed_categories, first_feed_category,
    full_content, summary,
};
use super::registry::{Cleaner, Extractor, RuleRegistry, SiteRules};

/// Ukrinform rubric path segments mapped to site category labels.
const UKRINFORM_RUBRICS: &[(&str, &str)] = &[
    ("rubric-ato", "war"),
    ("rubric-vidbudova", "war"),
    ("rubric-tymchasovo-okupovani", "war"),
    ("rubric-polytics", "politics"),
    ("rubric-economy", "economy"),
    ("rubric-factcheck", "factcheck"),
    ("rubric-world", "world"),
    ("rubric-regions", "regions"),
    ("rubric-kyiv", "regions"),
    ("rubric-society", "society"),
    ("rubric-culture", "culture"),
    ("rubric-diaspora", "diaspora"),
    ("rubric-sports", "sports"),
];

pub fn ukrinform_rubric(segment: &str) -> Option<&'static str> {
    UKRINFORM_RUBRICS
        .iter()
        .find(|(rubric, _)| *rubric == segment)
        .map(|(_, label)| *label)
}

/// First `rubric-*` path segment of the entry URL, mapped to a label.
fn ukrinform_rubric_from_url(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    let Some(url) = entry.url.as_deref() else {
        return Ok(None);
    };
    let parsed = url::Url::parse(url).context("entry url does not parse")?;
    let rubric = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .find(|segment| segment.starts_with("rubric-"));
    Ok(rubric.and_then(ukrinform_rubric).map(str::to_string))
}

/// Tags from the provider's `<orgsource:tags>` block: comma separated or nested elements.
fn orgsource_tags(entry: &RawEntry) -> anyhow::Result<Option<Vec<String>>> {
    let Some(block) = entry.extensions.get("orgsource:tags") else {
        return Ok(None);
    };
    let tags = html_to_text(&block.replace('>', ">\n"))
        .split(|c| c == ',' || c == ';' || c == '\n')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    Ok(Some(tags))
}

/// Full article text some Ukrainian feeds publish in `<yandex:full-text>`.
fn yandex_full_text(entry: &RawEntry) -> anyhow::Result<Option<String>> {
    Ok(entry
        .extensions
        .get("yandex:full-text")
        .filter(|text| !text.trim().is_empty())
        .cloned())
}

pub fn register_all(registry: &mut RuleRegistry) {
    let cleaned = |rules: SiteRules| {
        rules
            .cleaner(Cleaner::new("html_to_text", html_to_text))
            .cleaner(Cleaner::new("strip_boilerplate", strip_boilerplate))
    };

    registry.register(
        "ukrinform.ua",
        cleaned(
            SiteRules::new()
                .tags(Extractor::new("orgsource_tags", orgsource_tags))
                .tags(Extractor::new("entry_tags", entry_tags))
                .tags(Extractor::new("extra_feed_categories", extra_feed_categories))
                .category(Extractor::new("entry_category", entry_category))
                .category(Extractor::new("ukrinform_rubric", ukrinform_rubric_from_url))
                .category(Extractor::new("first_feed_category", first_feed_category)),
        ),
    );

    for domain in ["tsn.ua", "unian.ua"] {
        registry.register(
            domain,
            cleaned(
                SiteRules::new()
                    .content(Extractor::new("yandex_full_text", yandex_full_text))
                    .content(Extractor::new("content", full_content))
                    .content(Extractor::new("summary", summary))
                    .content(Extractor::new("description", description)),
            ),
        );
    }

    registry.register("armyinform.com.ua", cleaned(SiteRules::new()));
}
