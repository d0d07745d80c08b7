use crate::model::{Message, MessageRole, Session};
use crate::PersistenceError;

#[async_trait::async_trait]
pub trait SessionReader: Send + Sync {
    /// Returns [`PersistenceError::NotFound`] when the session is absent.
    async fn get(&self, id: &str) -> Result<Session, PersistenceError>;
    async fn list(&self) -> Result<Vec<Session>, PersistenceError>;
    /// Sessions without a soft-delete mark. Stores that never soft-delete
    /// return the same set as [`SessionReader::list`].
    async fn list_active(&self) -> Result<Vec<Session>, PersistenceError>;
}

#[async_trait::async_trait]
pub trait SessionWriter: Send + Sync {
    /// Insert-or-update keyed by session id.
    async fn create(&self, session: &Session) -> Result<(), PersistenceError>;
    async fn batch_create(&self, sessions: &[Session]) -> Result<(), PersistenceError>;
    async fn update(&self, session: &Session) -> Result<(), PersistenceError>;
}

#[async_trait::async_trait]
pub trait MessageReader: Send + Sync {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Message, PersistenceError>;
    /// First `limit` messages in creation order; `limit == 0` returns all of them.
    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, PersistenceError>;
    /// `limit` messages starting at `offset`, in creation order.
    async fn list_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError>;
    async fn list_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError>;
}

#[async_trait::async_trait]
pub trait MessageWriter: Send + Sync {
    /// Insert-or-ignore keyed by message id. The owning session must exist.
    async fn create(&self, message: &Message) -> Result<(), PersistenceError>;
    async fn batch_create(&self, messages: &[Message]) -> Result<(), PersistenceError>;
}
