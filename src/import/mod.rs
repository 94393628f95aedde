//! Staged articles into the durable store, one savepoint per item.

mod importer;
mod taxonomy;

pub use importer::{tally, ImportOptions, Importer, ItemOutcome};
