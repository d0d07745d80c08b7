use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lorekeep_core::{MessageReader, MessageWriter, PersistenceError, SessionReader, SessionWriter};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::paging::transfer_messages;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Sessions written, excluding skipped ones.
    pub session_count: usize,
    pub message_count: usize,
    pub skipped_count: usize,
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Operator-invoked import from the durable store back into the fast store.
pub struct RestoreService {
    source_sessions: Arc<dyn SessionReader>,
    source_messages: Arc<dyn MessageReader>,
    target_reader: Arc<dyn SessionReader>,
    target_sessions: Arc<dyn SessionWriter>,
    target_messages: Arc<dyn MessageWriter>,
    page_size: usize,
}

impl RestoreService {
    pub fn new(
        source_sessions: Arc<dyn SessionReader>,
        source_messages: Arc<dyn MessageReader>,
        target_reader: Arc<dyn SessionReader>,
        target_sessions: Arc<dyn SessionWriter>,
        target_messages: Arc<dyn MessageWriter>,
    ) -> Self {
        Self {
            source_sessions,
            source_messages,
            target_reader,
            target_sessions,
            target_messages,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// `Ok(true)` when the fast store already holds the session. Only a
    /// confirmed absence counts as missing; any other read error is returned.
    async fn exists_in_target(&self, session_id: &str) -> Result<bool, PersistenceError> {
        match self.target_reader.get(session_id).await {
            Ok(_) => Ok(true),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error.with_session("restore existence check", session_id)),
        }
    }

    /// Restores every active durable session. Unless `force` is set, sessions
    /// already in the fast store are skipped along with their messages.
    pub async fn restore_all(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<RestoreResult, PersistenceError> {
        let start_time = Utc::now();
        let started = Instant::now();

        let sessions = self.source_sessions.list_active().await?;
        let mut restored = Vec::with_capacity(sessions.len());
        let mut skipped_count = 0;

        for session in &sessions {
            if cancel.is_cancelled() {
                return Err(PersistenceError::Cancelled);
            }
            if !force && self.exists_in_target(&session.id).await? {
                tracing::debug!(session_id = %session.id, "session already present, skipping");
                skipped_count += 1;
                continue;
            }
            self.target_sessions
                .create(session)
                .await
                .map_err(|error| error.with_session("restore session", &session.id))?;
            restored.push(session.id.as_str());
        }

        let mut message_count = 0;
        for session_id in &restored {
            message_count += transfer_messages(
                &*self.source_messages,
                Some(&*self.target_messages),
                session_id,
                self.page_size,
                cancel,
            )
            .await
            .map_err(|error| error.with_session("restore messages", *session_id))?;
        }

        let result = RestoreResult {
            session_count: restored.len(),
            message_count,
            skipped_count,
            duration: started.elapsed(),
            start_time,
            end_time: Utc::now(),
        };
        tracing::info!(
            sessions = result.session_count,
            messages = result.message_count,
            skipped = result.skipped_count,
            elapsed_ms = result.duration.as_millis() as u64,
            "restore completed"
        );
        Ok(result)
    }

    /// Restores one session. Without `force`, a session already in the fast
    /// store short-circuits before the durable store is read.
    ///
    /// A soft-deleted durable session is reported as not found.
    pub async fn restore_session(
        &self,
        session_id: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<RestoreResult, PersistenceError> {
        let start_time = Utc::now();
        let started = Instant::now();

        if !force && self.exists_in_target(session_id).await? {
            tracing::debug!(%session_id, "session already present, skipping");
            return Ok(RestoreResult {
                session_count: 0,
                message_count: 0,
                skipped_count: 1,
                duration: started.elapsed(),
                start_time,
                end_time: Utc::now(),
            });
        }

        let session = self
            .source_sessions
            .get(session_id)
            .await
            .map_err(|error| error.with_session("restore session", session_id))?;
        if session.is_deleted() {
            return Err(PersistenceError::session_not_found(session_id)
                .with_session("restore session", session_id));
        }
        self.target_sessions
            .create(&session)
            .await
            .map_err(|error| error.with_session("restore session", session_id))?;

        if cancel.is_cancelled() {
            return Err(PersistenceError::Cancelled);
        }
        let messages = self
            .source_messages
            .list(session_id, 0)
            .await
            .map_err(|error| error.with_session("restore messages", session_id))?;
        if !messages.is_empty() {
            self.target_messages
                .batch_create(&messages)
                .await
                .map_err(|error| error.with_session("restore messages", session_id))?;
        }

        let result = RestoreResult {
            session_count: 1,
            message_count: messages.len(),
            skipped_count: 0,
            duration: started.elapsed(),
            start_time,
            end_time: Utc::now(),
        };
        tracing::info!(
            %session_id,
            messages = result.message_count,
            elapsed_ms = result.duration.as_millis() as u64,
            "session restore completed"
        );
        Ok(result)
    }
}
