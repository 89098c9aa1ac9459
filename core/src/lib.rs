//! Persistence layer for the stride fitness tracker.
//!
//! [`db::Database`] owns a SQLite connection and exposes synchronous CRUD
//! methods; [`storage::Storage`] wraps it for async callers.

pub mod db;
pub mod models;
pub mod storage;

pub use db::Database;
pub use models::Scope;
pub use storage::Storage;
