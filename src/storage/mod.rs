mod feeds;
mod items;
mod schema;
mod settings;
mod store;
mod types;

pub use schema::Database;
pub use settings::POLLING_INTERVAL_KEY;
pub use store::FeedStore;
pub use types::{DatabaseError, Feed, Folder, Item, NewItem};
