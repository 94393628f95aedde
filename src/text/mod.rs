//! Text utilities shared by the normalizer, extractors and importer.

mod cleaner;
mod slug;

pub use cleaner::{
    collapse_whitespace, html_to_text, normalize_label, page_text, strip_boilerplate, truncate_chars,
    truncate_for_log,
};
pub use slug::{safe_slugify, slug_or_fallback, with_unique_suffix};
