//! SQL durable store for lorekeep sessions and messages, plus the schema
//! migrator that owns its tables.
//!
//! Works against Postgres in production and SQLite for local runs and tests;
//! the driver is chosen from the connection URL.

mod codec;
mod error;
mod message;
pub mod migrate;
mod session;
mod store;

pub use migrate::{Migration, MigrationSet, MigrationStatus, MigrationVersion, SqlMigrator};
pub use store::{SqlStore, SqlStoreBuilder};
