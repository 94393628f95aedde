//! News ingestion: feeds and crawled pages into a deduplicated article store.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod feed;
pub mod import;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub mod staging;
pub mod stats;
pub mod text;
