//! Namespaced per-item elements (`<orgsource:tags>`, `<yandex:full-text>`) that the
//! feed parser drops. They are read straight from the raw document and keyed by item link.

use std::collections::HashMap;
use std::sync::OnceLock;

use quick_xml::escape::unescape;
use regex::Regex;

struct Patterns {
    item: Regex,
    rss_link: Regex,
    atom_link: Regex,
    open_tag: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                item: Regex::new(r"(?s)<(item|entry)\b[^>]*>(.*?)</(?:item|entry)>").ok()?,
                rss_link: Regex::new(r"(?s)<link>(.*?)</link>").ok()?,
                atom_link: Regex::new(r#"<link\b[^>]*\bhref=["']([^"']+)["']"#).ok()?,
                open_tag: Regex::new(r"<([A-Za-z][\w.-]*:[\w.-]+)\b[^>]*?(/?)>").ok()?,
            })
        })
        .as_ref()
}

/// Elements already mapped by the feed parser.
fn is_known(name: &str) -> bool {
    let prefix = name.split(':').next().unwrap_or_default();
    matches!(prefix, "content" | "dc" | "atom" | "media" | "itunes")
}

/// Map from item link to that item's namespaced elements, by qualified name.
pub fn scan_item_extensions(document: &str) -> HashMap<String, HashMap<String, String>> {
    let mut by_link = HashMap::new();
    let Some(patterns) = patterns() else {
        return by_link;
    };

    for item in patterns.item.captures_iter(document) {
        let body = item.get(2).map(|m| m.as_str()).unwrap_or_default();
        let link = patterns
            .rss_link
            .captures(body)
            .or_else(|| patterns.atom_link.captures(body))
            .and_then(|c| c.get(1))
            .map(|m| decode_link(m.as_str()))
            .filter(|link| !link.is_empty());

        let Some(link) = link else {
            continue;
        };
        let elements = namespaced_elements(body, &patterns.open_tag);
        if !elements.is_empty() {
            by_link.insert(link, elements);
        }
    }

    by_link
}

fn namespaced_elements(body: &str, open_tag: &Regex) -> HashMap<String, String> {
    let mut elements = HashMap::new();
    let mut pos = 0;

    while let Some(open) = open_tag.captures_at(body, pos) {
        let (Some(whole), Some(name)) = (open.get(0), open.get(1)) else {
            break;
        };
        pos = whole.end();

        let self_closing = open.get(2).is_some_and(|m| !m.as_str().is_empty());
        if self_closing || is_known(name.as_str()) {
            continue;
        }

        let closing = format!("</{}>", name.as_str());
        let Some(rel_end) = body[pos..].find(&closing) else {
            continue;
        };
        let inner = &body[pos..pos + rel_end];
        elements
            .entry(name.as_str().to_string())
            .or_insert_with(|| strip_cdata(inner).trim().to_string());
        // nested elements belong to this one
        pos += rel_end + closing.len();
    }

    elements
}

/// Link text as the feed parser reports it: CDATA unwrapped, entities decoded.
fn decode_link(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
    {
        return inner.trim().to_string();
    }
    match unescape(trimmed) {
        Ok(decoded) => decoded.trim().to_string(),
        Err(_) => trimmed.to_string(),
    }
}

fn strip_cdata(text: &str) -> String {
    text.replace("<![CDATA[", "").replace("]]>", "")
}
