//! Relational store backends.

mod sqlite;

pub use sqlite::SqliteDocumentStore;
