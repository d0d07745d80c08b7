use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::manager::SyncSummary;

/// Where inside a pass a per-session failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Session,
    Messages,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Session => "session",
            SyncStage::Messages => "messages",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SyncEvent {
    ManagerStarted {
        trigger: String,
        poll_interval_ms: u64,
    },
    ManagerStopped,
    TriggerFired {
        trigger: String,
        manual: bool,
    },
    TriggerCheckFailed {
        trigger: String,
        error: String,
    },
    TriggerResetFailed {
        trigger: String,
        error: String,
    },
    PassStarted {
        durable: bool,
    },
    SessionFailed {
        session_id: String,
        stage: SyncStage,
        error: String,
    },
    PassCompleted {
        summary: SyncSummary,
    },
    /// The pass could not even enumerate the fast store.
    PassFailed {
        error: String,
    },
}

impl SyncEvent {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionFailed { session_id, .. } => Some(session_id.as_str()),
            _ => None,
        }
    }
}

/// Receives everything the background manager has to report.
///
/// The manager has no other error channel, so a sink is the only place
/// repeated failures become visible.
pub trait SyncEventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl SyncEventSink for TracingEventSink {
    fn emit(&self, event: SyncEvent) {
        match event {
            SyncEvent::ManagerStarted {
                trigger,
                poll_interval_ms,
            } => tracing::info!(%trigger, poll_interval_ms, "persistence manager started"),
            SyncEvent::ManagerStopped => tracing::info!("persistence manager stopped"),
            SyncEvent::TriggerFired { trigger, manual } => {
                tracing::debug!(%trigger, manual, "sync trigger fired")
            }
            SyncEvent::TriggerCheckFailed { trigger, error } => {
                tracing::warn!(%trigger, %error, "sync trigger check failed")
            }
            SyncEvent::TriggerResetFailed { trigger, error } => {
                tracing::warn!(%trigger, %error, "sync trigger reset failed")
            }
            SyncEvent::PassStarted { durable } => tracing::debug!(durable, "sync pass started"),
            SyncEvent::SessionFailed {
                session_id,
                stage,
                error,
            } => tracing::warn!(
                %session_id,
                stage = stage.as_str(),
                %error,
                "session sync failed"
            ),
            SyncEvent::PassCompleted { summary } => tracing::info!(
                sessions = summary.sessions_processed,
                messages = summary.messages_processed,
                failed = summary.sessions_failed.len(),
                elapsed_ms = summary.elapsed.as_millis() as u64,
                durable = summary.durable,
                "sync pass completed"
            ),
            SyncEvent::PassFailed { error } => tracing::error!(%error, "sync pass failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl SyncEventSink for NoopEventSink {
    fn emit(&self, _event: SyncEvent) {}
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SyncEventSink for RecordingEventSink {
    fn emit(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
