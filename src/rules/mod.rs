//! Per-site extraction rules.
//!
//! Each site's rule set is data: ordered lists of plain functions per field, keyed by
//! domain or source name. Lookups merge a site's lists with the defaults field by field.

mod defaults;
mod registry;
pub mod sites;

pub use defaults::default_rules;
pub use registry::{Cleaner, Extracted, Extractor, RuleRegistry, SiteRules};
