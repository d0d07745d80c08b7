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
pub struct BackupResult {
    pub session_count: usize,
    pub message_count: usize,
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Operator-invoked export from the fast store into the durable store.
///
/// Any failure aborts the whole call. Writes already issued stay applied, and
/// re-running is safe because sessions upsert and messages insert-or-ignore.
pub struct BackupService {
    source_sessions: Arc<dyn SessionReader>,
    source_messages: Arc<dyn MessageReader>,
    target_sessions: Arc<dyn SessionWriter>,
    target_messages: Arc<dyn MessageWriter>,
    page_size: usize,
}

impl BackupService {
    pub fn new(
        source_sessions: Arc<dyn SessionReader>,
        source_messages: Arc<dyn MessageReader>,
        target_sessions: Arc<dyn SessionWriter>,
        target_messages: Arc<dyn MessageWriter>,
    ) -> Self {
        Self {
            source_sessions,
            source_messages,
            target_sessions,
            target_messages,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn backup_all(&self, cancel: &CancellationToken) -> Result<BackupResult, PersistenceError> {
        let start_time = Utc::now();
        let started = Instant::now();

        let sessions = self.source_sessions.list().await?;
        if !sessions.is_empty() {
            self.target_sessions.batch_create(&sessions).await?;
        }
        tracing::debug!(count = sessions.len(), "backed up sessions");

        let mut message_count = 0;
        for session in &sessions {
            message_count += transfer_messages(
                &*self.source_messages,
                Some(&*self.target_messages),
                &session.id,
                self.page_size,
                cancel,
            )
            .await
            .map_err(|error| error.with_session("backup messages", &session.id))?;
        }

        let result = BackupResult {
            session_count: sessions.len(),
            message_count,
            duration: started.elapsed(),
            start_time,
            end_time: Utc::now(),
        };
        tracing::info!(
            sessions = result.session_count,
            messages = result.message_count,
            elapsed_ms = result.duration.as_millis() as u64,
            "backup completed"
        );
        Ok(result)
    }

    /// Copies one session and all of its messages in a single batch.
    pub async fn backup_session(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BackupResult, PersistenceError> {
        let start_time = Utc::now();
        let started = Instant::now();

        let session = self
            .source_sessions
            .get(session_id)
            .await
            .map_err(|error| error.with_session("backup session", session_id))?;
        self.target_sessions
            .create(&session)
            .await
            .map_err(|error| error.with_session("backup session", session_id))?;

        if cancel.is_cancelled() {
            return Err(PersistenceError::Cancelled);
        }
        let messages = self
            .source_messages
            .list(session_id, 0)
            .await
            .map_err(|error| error.with_session("backup messages", session_id))?;
        if !messages.is_empty() {
            self.target_messages
                .batch_create(&messages)
                .await
                .map_err(|error| error.with_session("backup messages", session_id))?;
        }

        let result = BackupResult {
            session_count: 1,
            message_count: messages.len(),
            duration: started.elapsed(),
            start_time,
            end_time: Utc::now(),
        };
        tracing::info!(
            %session_id,
            messages = result.message_count,
            elapsed_ms = result.duration.as_millis() as u64,
            "session backup completed"
        );
        Ok(result)
    }
}
