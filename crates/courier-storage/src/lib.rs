//! Courier storage crate - durable key-value persistence.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! [`DurableStore`] abstraction the offline queue persists through,
//! plus an in-memory store for tests and ephemeral sessions.

pub mod db;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use store::{DurableStore, MemoryStore, SqliteStore};
