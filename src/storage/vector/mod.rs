//! Vector store backends.

mod sqlite;

pub use sqlite::SqliteVectorStore;
