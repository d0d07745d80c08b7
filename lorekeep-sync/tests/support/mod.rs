#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use lorekeep_core::{
    InMemoryStore, Message, MessageReader, MessageRole, MessageWriter, PersistenceError, Session,
    SessionReader, SessionWriter,
};

pub fn session(id: &str) -> Session {
    Session::new(format!("campaign {id}"), "dm-1", "http://localhost:9000").with_id(id)
}

/// Adds a session with `messages` messages spaced one second apart.
pub async fn seed(store: &InMemoryStore, id: &str, messages: usize) -> Session {
    let session = session(id);
    SessionWriter::create(store, &session)
        .await
        .expect("seed session");

    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let batch: Vec<Message> = (0..messages)
        .map(|index| {
            let mut message = Message::user(id, format!("turn {index}"), "player-1")
                .with_created_at(base + Duration::seconds(index as i64));
            message.id = format!("{id}-m{index:04}");
            message
        })
        .collect();
    if !batch.is_empty() {
        MessageWriter::batch_create(store, &batch)
            .await
            .expect("seed messages");
    }
    session
}

/// Counts paged reads on top of an in-memory store.
pub struct CountingMessages {
    inner: InMemoryStore,
    page_reads: AtomicUsize,
}

impl CountingMessages {
    pub fn new(inner: InMemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            page_reads: AtomicUsize::new(0),
        })
    }

    pub fn page_reads(&self) -> usize {
        self.page_reads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageReader for CountingMessages {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Message, PersistenceError> {
        MessageReader::get(&self.inner, session_id, message_id).await
    }

    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, PersistenceError> {
        MessageReader::list(&self.inner, session_id, limit).await
    }

    async fn list_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        self.page_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.list_page(session_id, offset, limit).await
    }

    async fn list_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        self.inner.list_by_role(session_id, role, limit).await
    }
}

/// Session writer that rejects a fixed set of ids and counts every call.
pub struct FlakySessionWriter {
    inner: InMemoryStore,
    rejected: HashSet<String>,
    writes: AtomicUsize,
}

impl FlakySessionWriter {
    pub fn new(inner: InMemoryStore, rejected: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner,
            rejected: rejected.iter().map(|id| id.to_string()).collect(),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, session: &Session) -> Result<(), PersistenceError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.rejected.contains(&session.id) {
            return Err(PersistenceError::Store(format!(
                "write rejected for {}",
                session.id
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionWriter for FlakySessionWriter {
    async fn create(&self, session: &Session) -> Result<(), PersistenceError> {
        self.check(session)?;
        SessionWriter::create(&self.inner, session).await
    }

    async fn batch_create(&self, sessions: &[Session]) -> Result<(), PersistenceError> {
        for session in sessions {
            self.check(session)?;
        }
        SessionWriter::batch_create(&self.inner, sessions).await
    }

    async fn update(&self, session: &Session) -> Result<(), PersistenceError> {
        self.check(session)?;
        self.inner.update(session).await
    }
}

/// Session reader whose point reads always fail with a connectivity error.
pub struct UnreachableSessions;

#[async_trait::async_trait]
impl SessionReader for UnreachableSessions {
    async fn get(&self, _id: &str) -> Result<Session, PersistenceError> {
        Err(PersistenceError::Connectivity("connection refused".to_string()))
    }

    async fn list(&self) -> Result<Vec<Session>, PersistenceError> {
        Err(PersistenceError::Connectivity("connection refused".to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Session>, PersistenceError> {
        Err(PersistenceError::Connectivity("connection refused".to_string()))
    }
}

/// Message writer that rejects every write for a fixed set of sessions.
pub struct FlakyMessageWriter {
    inner: InMemoryStore,
    rejected: HashSet<String>,
}

impl FlakyMessageWriter {
    pub fn new(inner: InMemoryStore, rejected: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner,
            rejected: rejected.iter().map(|id| id.to_string()).collect(),
        })
    }

    fn check(&self, message: &Message) -> Result<(), PersistenceError> {
        if self.rejected.contains(&message.session_id) {
            return Err(PersistenceError::Store(format!(
                "message write rejected for {}",
                message.session_id
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageWriter for FlakyMessageWriter {
    async fn create(&self, message: &Message) -> Result<(), PersistenceError> {
        self.check(message)?;
        MessageWriter::create(&self.inner, message).await
    }

    async fn batch_create(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        for message in messages {
            self.check(message)?;
        }
        MessageWriter::batch_create(&self.inner, messages).await
    }
}
