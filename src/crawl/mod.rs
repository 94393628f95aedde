mod fetcher;
mod http;
mod profiles;
mod selectors;
#[cfg(test)]
pub(crate) mod stub;
mod walker;

pub use fetcher::CrawlFetcher;
pub use http::{HostSchedule, HttpPageFetcher, PageFetcher};
pub use selectors::{LinkTier, LinkTiers};
pub use walker::{Listing, ProfileWalker, SiteProfile, SiteWalker, WalkerRegistry};
