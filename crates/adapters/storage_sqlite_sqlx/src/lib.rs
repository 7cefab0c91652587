//! # homehub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `DeviceStore` port defined in `homehub-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations) and refuse to
//!   open a database whose schema version differs from this build's
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `homehub-app` (for port traits) and `homehub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod device_repo;
mod entity_repo;
pub mod error;
pub mod pool;
mod store;

pub use store::SqliteDeviceStore;
