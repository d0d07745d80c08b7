//! Synchronization engine between a fast session store and a durable one.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use lorekeep_core::InMemoryStore;
//! use lorekeep_sync::{IntervalTrigger, PersistenceManager};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let fast = Arc::new(InMemoryStore::new());
//!     let durable = Arc::new(InMemoryStore::new());
//!
//!     let manager = PersistenceManager::builder(
//!         Arc::new(IntervalTrigger::new(Duration::from_secs(300))),
//!         fast.clone(),
//!         fast,
//!     )
//!     .durable(durable.clone(), durable)
//!     .build()
//!     .expect("valid sync config");
//!
//!     let cancel = CancellationToken::new();
//!     let handle = Arc::new(manager).spawn(cancel.clone());
//!     cancel.cancel();
//!     let _ = handle.await;
//! }
//! ```
mod backup;
mod config;
mod events;
mod manager;
mod paging;
mod restore;
mod trigger;

pub use backup::{BackupResult, BackupService};
pub use config::SyncConfig;
pub use events::{
    NoopEventSink, RecordingEventSink, SyncEvent, SyncEventSink, SyncStage, TracingEventSink,
};
pub use manager::{DurableWriters, PersistenceManager, PersistenceManagerBuilder, SyncSummary};
pub use restore::{RestoreResult, RestoreService};
pub use trigger::{IntervalTrigger, ManualTrigger, Trigger, TriggerHandle};

pub use tokio_util::sync::CancellationToken;
