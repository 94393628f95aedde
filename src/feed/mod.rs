mod extensions;
mod fetcher;

pub use extensions::scan_item_extensions;
pub use fetcher::{parse_entries, FeedFetcher};
