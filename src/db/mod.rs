mod repository;
mod schema;

pub(crate) use repository::clip_name;
pub use repository::{is_fatal, is_unique_violation, timestamp, Repository};
