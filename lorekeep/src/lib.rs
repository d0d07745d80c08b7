//! Persistence for session-oriented chat servers.
//!
//! Live sessions sit in a fast store (Redis), a durable SQL store keeps the
//! long-term copy, and [`PersistenceManager`] moves data between them on a
//! schedule or on demand. [`PersistenceStack`] wires everything from a
//! [`StackConfig`].

mod config;
#[cfg(feature = "sql")]
mod stack;

pub use config::StackConfig;
#[cfg(feature = "sql")]
pub use stack::PersistenceStack;

pub use lorekeep_core::{
    EntityKind, InMemoryStore, Message, MessageReader, MessageRole, MessageWriter,
    PersistenceError, Session, SessionReader, SessionWriter, ToolCall,
};
pub use lorekeep_sync::{
    BackupResult, BackupService, CancellationToken, IntervalTrigger, ManualTrigger,
    NoopEventSink, PersistenceManager, RecordingEventSink, RestoreResult, RestoreService,
    SyncConfig, SyncEvent, SyncEventSink, SyncSummary, TracingEventSink, Trigger, TriggerHandle,
};

#[cfg(feature = "redis")]
pub use lorekeep_store_redis::RedisStore;
#[cfg(feature = "sql")]
pub use lorekeep_store_sql::{
    Migration, MigrationSet, MigrationStatus, MigrationVersion, SqlMigrator, SqlStore,
};
