//! CSS selector helpers shared by the page walkers.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::parse_datetime;
use crate::text::collapse_whitespace;

/// Which link tier produced a listing's article links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTier {
    Primary,
    Structural,
    PathPattern,
    None,
}

/// Article-link selectors for a listing page, tried tier by tier.
#[derive(Debug, Clone, Copy)]
pub struct LinkTiers {
    pub primary: &'static [&'static str],
    pub structural: &'static [&'static str],
    /// Last resort: any `<a href>` whose href contains one of these.
    pub path_patterns: &'static [&'static str],
}

fn parse(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!(selector, error = ?e, "Invalid selector skipped");
            None
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>()).replace('\n', " ")
}

/// Resolve `href` against `base`, keeping http(s) links on the same site.
fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let site = site_of(base)?;
    let host = url.host_str()?.to_lowercase();
    if host != site && !host.ends_with(&format!(".{}", site)) {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn site_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn push_unique(links: &mut Vec<String>, link: String, page: &str) {
    if link != page && !links.contains(&link) {
        links.push(link);
    }
}

fn hrefs_for(document: &Html, base: &Url, selectors: &[&str]) -> Vec<String> {
    let mut links = Vec::new();
    for selector in selectors.iter().filter_map(|s| parse(s)) {
        for element in document.select(&selector) {
            if let Some(link) = element.value().attr("href").and_then(|h| resolve(base, h)) {
                push_unique(&mut links, link, base.as_str());
            }
        }
    }
    links
}

/// Article links from the first tier that yields any, in document order, deduplicated.
pub fn article_links(document: &Html, base: &Url, tiers: &LinkTiers) -> (Vec<String>, LinkTier) {
    let primary = hrefs_for(document, base, tiers.primary);
    if !primary.is_empty() {
        return (primary, LinkTier::Primary);
    }

    let structural = hrefs_for(document, base, tiers.structural);
    if !structural.is_empty() {
        return (structural, LinkTier::Structural);
    }

    let mut fallback = Vec::new();
    if let Some(any_link) = parse("a[href]") {
        for element in document.select(&any_link) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !tiers.path_patterns.iter().any(|p| href.contains(p)) {
                continue;
            }
            if let Some(link) = resolve(base, href) {
                push_unique(&mut fallback, link, base.as_str());
            }
        }
    }
    if fallback.is_empty() {
        (fallback, LinkTier::None)
    } else {
        (fallback, LinkTier::PathPattern)
    }
}

/// First `href` matched by any selector, resolved against `base`.
pub fn first_link(document: &Html, base: &Url, selectors: &[&str]) -> Option<String> {
    hrefs_for(document, base, selectors).into_iter().next()
}

/// Text of the first element matched by the first selector that matches a non-empty one.
pub fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().filter_map(|s| parse(s)).find_map(|selector| {
        document
            .select(&selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Texts of every element matched by the first selector that yields any.
pub fn all_texts(document: &Html, selectors: &[&str]) -> Vec<String> {
    selectors
        .iter()
        .filter_map(|s| parse(s))
        .map(|selector| {
            document
                .select(&selector)
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
        })
        .find(|texts| !texts.is_empty())
        .unwrap_or_default()
}

/// Paragraph texts joined by blank lines, from the first selector that yields any.
pub fn block_text(document: &Html, selectors: &[&str]) -> Option<String> {
    let parts = all_texts(document, selectors);
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// First parseable timestamp from `(selector, attribute)` pairs; an empty attribute reads text.
pub fn first_datetime(
    document: &Html,
    sources: &[(&str, &str)],
) -> Option<chrono::DateTime<chrono::Utc>> {
    sources.iter().find_map(|(selector, attr)| {
        let selector = parse(selector)?;
        document.select(&selector).find_map(|element| {
            let raw = if attr.is_empty() {
                element_text(element)
            } else {
                element.value().attr(attr)?.to_string()
            };
            parse_datetime(&raw)
        })
    })
}
