use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::model::{Message, MessageRole, Session};
use crate::store::{MessageReader, MessageWriter, SessionReader, SessionWriter};
use crate::PersistenceError;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    // kept sorted by (created_at, id)
    messages: HashMap<String, Vec<Message>>,
    message_ids: HashSet<String>,
}

/// Store held entirely in process memory.
///
/// Implements every capability trait, so it can stand in for either side of a
/// sync. `delete_session` gives fast-store semantics (hard delete) and
/// `soft_delete_session` gives durable-store semantics.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sessions = self.read().map(|inner| inner.sessions.len()).unwrap_or(0);
        f.debug_struct("InMemoryStore")
            .field("sessions", &sessions)
            .finish()
    }
}

fn poisoned() -> PersistenceError {
    PersistenceError::Store("in-memory store lock poisoned".into())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, PersistenceError> {
        self.inner.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, PersistenceError> {
        self.inner.write().map_err(|_| poisoned())
    }

    /// Removes the session and all of its messages. Returns whether it existed.
    pub fn delete_session(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut inner = self.write()?;
        let existed = inner.sessions.remove(id).is_some();
        if let Some(messages) = inner.messages.remove(id) {
            for message in messages {
                inner.message_ids.remove(&message.id);
            }
        }
        Ok(existed)
    }

    pub fn soft_delete_session(&self, id: &str) -> Result<(), PersistenceError> {
        let mut inner = self.write()?;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| PersistenceError::session_not_found(id))?;
        let now = Utc::now();
        session.deleted_at = Some(now);
        session.updated_at = now;
        Ok(())
    }

    pub fn session_count(&self) -> Result<usize, PersistenceError> {
        Ok(self.read()?.sessions.len())
    }

    pub fn message_count(&self, session_id: &str) -> Result<usize, PersistenceError> {
        Ok(self
            .read()?
            .messages
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0))
    }

    pub fn total_message_count(&self) -> Result<usize, PersistenceError> {
        Ok(self.read()?.message_ids.len())
    }

    fn sorted_sessions(inner: &Inner, active_only: bool) -> Vec<Session> {
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|session| !active_only || !session.is_deleted())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    fn insert_messages(inner: &mut Inner, messages: &[Message]) -> Result<(), PersistenceError> {
        for message in messages {
            if !inner.sessions.contains_key(&message.session_id) {
                return Err(PersistenceError::InvalidData(format!(
                    "message {} references unknown session {}",
                    message.id, message.session_id
                )));
            }
        }

        let mut touched = HashSet::new();
        for message in messages {
            if !inner.message_ids.insert(message.id.clone()) {
                continue;
            }
            inner
                .messages
                .entry(message.session_id.clone())
                .or_default()
                .push(message.clone());
            touched.insert(message.session_id.clone());
        }

        for session_id in touched {
            if let Some(list) = inner.messages.get_mut(&session_id) {
                list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionReader for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Session, PersistenceError> {
        self.read()?
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::session_not_found(id))
    }

    async fn list(&self) -> Result<Vec<Session>, PersistenceError> {
        Ok(Self::sorted_sessions(&*self.read()?, false))
    }

    async fn list_active(&self) -> Result<Vec<Session>, PersistenceError> {
        Ok(Self::sorted_sessions(&*self.read()?, true))
    }
}

#[async_trait::async_trait]
impl SessionWriter for InMemoryStore {
    async fn create(&self, session: &Session) -> Result<(), PersistenceError> {
        self.write()?
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn batch_create(&self, sessions: &[Session]) -> Result<(), PersistenceError> {
        let mut inner = self.write()?;
        for session in sessions {
            inner.sessions.insert(session.id.clone(), session.clone());
        }
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), PersistenceError> {
        let mut inner = self.write()?;
        let slot = inner
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| PersistenceError::session_not_found(&session.id))?;
        *slot = session.clone();
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageReader for InMemoryStore {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Message, PersistenceError> {
        self.read()?
            .messages
            .get(session_id)
            .and_then(|list| list.iter().find(|message| message.id == message_id))
            .cloned()
            .ok_or_else(|| PersistenceError::message_not_found(session_id, message_id))
    }

    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, PersistenceError> {
        let inner = self.read()?;
        let Some(list) = inner.messages.get(session_id) else {
            return Ok(Vec::new());
        };
        let take = if limit == 0 { list.len() } else { limit };
        Ok(list.iter().take(take).cloned().collect())
    }

    async fn list_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        let inner = self.read()?;
        let Some(list) = inner.messages.get(session_id) else {
            return Ok(Vec::new());
        };
        Ok(list.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn list_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        let inner = self.read()?;
        let Some(list) = inner.messages.get(session_id) else {
            return Ok(Vec::new());
        };
        let take = if limit == 0 { usize::MAX } else { limit };
        Ok(list
            .iter()
            .filter(|message| message.role == role)
            .take(take)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl MessageWriter for InMemoryStore {
    async fn create(&self, message: &Message) -> Result<(), PersistenceError> {
        let mut inner = self.write()?;
        Self::insert_messages(&mut inner, std::slice::from_ref(message))
    }

    async fn batch_create(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        let mut inner = self.write()?;
        Self::insert_messages(&mut inner, messages)
    }
}
