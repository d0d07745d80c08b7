//! Core types shared by the lorekeep persistence engine and its store adapters.
//!
//! The engine never talks to a concrete store. It consumes the narrow
//! [`SessionReader`], [`SessionWriter`], [`MessageReader`] and [`MessageWriter`]
//! capabilities, which each store adapter implements once.

pub mod error;
pub mod memory;
pub mod model;
pub mod store;

pub use error::{EntityKind, PersistenceError};
pub use memory::InMemoryStore;
pub use model::{Message, MessageRole, Session, ToolCall, SESSION_STATUS_ACTIVE};
pub use store::{MessageReader, MessageWriter, SessionReader, SessionWriter};
