//! Storage backends for connections and message records

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ConnectionStore, MessageStore, SortOrder};
