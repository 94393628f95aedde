use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{RawEntry, Source};

use super::defaults::default_rules;
use super::sites;

/// Values an extractor may produce. Empty values count as "no result".
pub trait Extracted: Sized {
    fn is_blank(&self) -> bool;
}

impl Extracted for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Extracted for Vec<String> {
    fn is_blank(&self) -> bool {
        self.iter().all(|item| item.trim().is_empty())
    }
}

/// A named field extractor.
pub struct Extractor<T> {
    pub name: &'static str,
    pub run: fn(&RawEntry) -> anyhow::Result<Option<T>>,
}

impl<T> Clone for Extractor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Extractor<T> {}

impl<T> std::fmt::Debug for Extractor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Extractor").field(&self.name).finish()
    }
}

impl<T> Extractor<T> {
    pub const fn new(name: &'static str, run: fn(&RawEntry) -> anyhow::Result<Option<T>>) -> Self {
        Self { name, run }
    }
}

/// A named content post-processor, applied in order to the winning content.
#[derive(Clone, Copy)]
pub struct Cleaner {
    pub name: &'static str,
    pub run: fn(&str) -> String,
}

impl std::fmt::Debug for Cleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cleaner").field(&self.name).finish()
    }
}

impl Cleaner {
    pub const fn new(name: &'static str, run: fn(&str) -> String) -> Self {
        Self { name, run }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SiteRules {
    pub content: Vec<Extractor<String>>,
    pub tags: Vec<Extractor<Vec<String>>>,
    pub category: Vec<Extractor<String>>,
    pub cleaners: Vec<Cleaner>,
}

impl SiteRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, extractor: Extractor<String>) -> Self {
        self.content.push(extractor);
        self
    }

    pub fn tags(mut self, extractor: Extractor<Vec<String>>) -> Self {
        self.tags.push(extractor);
        self
    }

    pub fn category(mut self, extractor: Extractor<String>) -> Self {
        self.category.push(extractor);
        self
    }

    pub fn cleaner(mut self, cleaner: Cleaner) -> Self {
        self.cleaners.push(cleaner);
        self
    }

    /// Fill every empty field list from `defaults`.
    fn inherit(mut self, defaults: &SiteRules) -> Self {
        if self.content.is_empty() {
            self.content = defaults.content.clone();
        }
        if self.tags.is_empty() {
            self.tags = defaults.tags.clone();
        }
        if self.category.is_empty() {
            self.category = defaults.category.clone();
        }
        if self.cleaners.is_empty() {
            self.cleaners = defaults.cleaners.clone();
        }
        self
    }

    /// Winning content with every cleaner applied.
    pub fn extract_content(&self, entry: &RawEntry) -> Option<String> {
        let raw = first_non_empty(&self.content, entry, "content")?;
        let cleaned = self
            .cleaners
            .iter()
            .fold(raw, |text, cleaner| (cleaner.run)(&text));
        (!cleaned.trim().is_empty()).then_some(cleaned)
    }

    pub fn extract_tags(&self, entry: &RawEntry) -> Vec<String> {
        first_non_empty(&self.tags, entry, "tags").unwrap_or_default()
    }

    pub fn extract_category(&self, entry: &RawEntry) -> Option<String> {
        first_non_empty(&self.category, entry, "category")
    }
}

/// Try extractors in order; the first non-empty result wins. Errors count as no result.
pub fn first_non_empty<T: Extracted>(
    chain: &[Extractor<T>],
    entry: &RawEntry,
    field: &str,
) -> Option<T> {
    for extractor in chain {
        match (extractor.run)(entry) {
            Ok(Some(value)) if !value.is_blank() => {
                debug!(field, extractor = extractor.name, "Extractor produced a value");
                return Some(value);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    field,
                    extractor = extractor.name,
                    url = entry.url.as_deref().unwrap_or("-"),
                    error = %e,
                    "Extractor failed, trying next"
                );
            }
        }
    }
    None
}

/// Lookup table from site identity to rule set, with a default rule set.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    defaults: SiteRules,
    sites: HashMap<String, SiteRules>,
}

impl RuleRegistry {
    pub fn new(defaults: SiteRules) -> Self {
        Self {
            defaults,
            sites: HashMap::new(),
        }
    }

    /// Defaults plus every built-in site rule set.
    pub fn builtin() -> Self {
        let mut registry = Self::new(default_rules());
        sites::register_all(&mut registry);
        registry
    }

    /// Register `rules` under a domain pattern or declared source name.
    pub fn register(&mut self, pattern: &str, rules: SiteRules) {
        self.sites.insert(normalize_key(pattern), rules);
    }

    pub fn defaults(&self) -> &SiteRules {
        &self.defaults
    }

    /// Effective rule set: exact match on domain, then on name, merged with defaults.
    pub fn resolve(&self, domain: Option<&str>, name: Option<&str>) -> SiteRules {
        let matched = domain
            .and_then(|d| self.sites.get(&normalize_key(d)))
            .or_else(|| name.and_then(|n| self.sites.get(&normalize_key(n))));

        match matched {
            Some(rules) => rules.clone().inherit(&self.defaults),
            None => self.defaults.clone(),
        }
    }

    pub fn resolve_for(&self, source: &Source) -> SiteRules {
        self.resolve(source.domain().as_deref(), Some(&source.name))
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize_key(pattern: &str) -> String {
    let key = pattern.trim().to_lowercase();
    key.strip_prefix("www.").unwrap_or(&key).to_string()
}
