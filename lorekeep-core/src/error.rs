use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Session,
    Message,
    Migration,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Session => write!(f, "session"),
            EntityKind::Message => write!(f, "message"),
            EntityKind::Migration => write!(f, "migration"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },
    #[error("store unreachable: {0}")]
    Connectivity(String),
    #[error("{operation} failed for session '{session_id}': {source}")]
    ItemFailed {
        operation: &'static str,
        session_id: String,
        #[source]
        source: Box<PersistenceError>,
    },
    #[error("sync pass incomplete: {} session(s) failed", .failed_sessions.len())]
    SyncIncomplete { failed_sessions: Vec<String> },
    #[error("migration {version} failed: {reason}")]
    Migration { version: String, reason: String },
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("operation was cancelled")]
    Cancelled,
}

impl PersistenceError {
    pub fn session_not_found(id: impl Into<String>) -> Self {
        PersistenceError::NotFound {
            entity: EntityKind::Session,
            id: id.into(),
        }
    }

    pub fn message_not_found(session_id: &str, message_id: &str) -> Self {
        PersistenceError::NotFound {
            entity: EntityKind::Message,
            id: format!("{session_id}/{message_id}"),
        }
    }

    pub fn migration(version: impl fmt::Display, reason: impl Into<String>) -> Self {
        PersistenceError::Migration {
            version: version.to_string(),
            reason: reason.into(),
        }
    }

    /// True for a confirmed absence, including one wrapped in item context.
    pub fn is_not_found(&self) -> bool {
        match self {
            PersistenceError::NotFound { .. } => true,
            PersistenceError::ItemFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        match self {
            PersistenceError::Connectivity(_) => true,
            PersistenceError::ItemFailed { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PersistenceError::Cancelled)
    }

    /// Attaches the operation name and session id. Cancellation passes through
    /// untouched so callers can still match on it.
    pub fn with_session(self, operation: &'static str, session_id: impl Into<String>) -> Self {
        match self {
            PersistenceError::Cancelled => PersistenceError::Cancelled,
            other => PersistenceError::ItemFailed {
                operation,
                session_id: session_id.into(),
                source: Box::new(other),
            },
        }
    }
}
