//! Content cleaning: markup and boilerplate removal from feed and page fragments.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Node};

const SKIPPED: &[&str] = &["script", "style", "noscript", "iframe", "template"];
const BLOCKS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "blockquote",
    "section", "article", "header", "footer", "figure", "figcaption", "pre", "table",
];

fn boilerplate_line() -> Option<&'static Regex> {
    static LINE: OnceLock<Option<Regex>> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(
            r"(?i)^(читайте також|читайте нас|підписуйтесь|read more|read also|share this|фото:|photo:)",
        )
        .ok()
    })
    .as_ref()
}

/// Convert an HTML/XML fragment to plain text.
///
/// Block elements become line breaks, entities are decoded, script-like elements are
/// dropped. Input without markup passes through whitespace collapsing only.
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return collapse_whitespace(fragment);
    }

    let document = Html::parse_fragment(fragment);
    let mut text = String::with_capacity(fragment.len());

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(element) if BLOCKS.contains(&element.name()) => text.push('\n'),
            Node::Text(chunk) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|e| SKIPPED.contains(&e.name()))
                });
                if !hidden {
                    text.push_str(chunk);
                }
            }
            _ => {}
        }
    }

    collapse_whitespace(&text)
}

/// Whole-page text for pages where no content selector matched.
pub fn page_text(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), 80) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };
    let cleaned = collapse_whitespace(&text);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Trim every line, squeeze inner runs of spaces and drop blank lines.
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop "read also" / share / photo-credit lines left over from article bodies.
pub fn strip_boilerplate(text: &str) -> String {
    let Some(pattern) = boilerplate_line() else {
        return text.to_string();
    };
    text.lines()
        .filter(|line| !pattern.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercased, trimmed label with inner whitespace squeezed. Used for tags and categories.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Shorten a string for log output, noting how much was cut.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…(+{} bytes)", &s[..idx], s.len() - idx),
        None => s.to_string(),
    }
}
