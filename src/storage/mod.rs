mod feeds;
mod items;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Feed, FeedItem, FeedSummary, FeedUpdate, ItemRow, StorageError};
