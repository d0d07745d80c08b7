use fred::interfaces::{KeysInterface, SortedSetsInterface, TransactionInterface};
use lorekeep_core::{PersistenceError, Session, SessionReader, SessionWriter};

use crate::keys::{safe_id, score};
use crate::{map_redis_error, RedisStore};

impl RedisStore {
    async fn load_sessions(&self) -> Result<Vec<Session>, PersistenceError> {
        let ids: Vec<String> = self
            .client
            .zrange(self.keys.sessions(), 0_i64, -1_i64, None, false, None, false)
            .await
            .map_err(map_redis_error)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.keys.session(id)).collect();
        let payloads: Vec<Option<String>> =
            self.client.mget(keys).await.map_err(map_redis_error)?;

        let mut sessions = Vec::with_capacity(ids.len());
        for (id, payload) in ids.iter().zip(payloads) {
            match payload {
                Some(payload) => sessions.push(serde_json::from_str(&payload)?),
                None => tracing::warn!(session_id = %id, "session index entry has no payload"),
            }
        }
        Ok(sessions)
    }

    /// Overwrites each session and refreshes its index entry atomically.
    async fn write_sessions(&self, sessions: &[Session]) -> Result<(), PersistenceError> {
        if sessions.is_empty() {
            return Ok(());
        }
        let mut queued = Vec::with_capacity(sessions.len());
        for session in sessions {
            let id = safe_id("session", &session.id)?;
            queued.push((id, score(&session.created_at), serde_json::to_string(session)?));
        }

        let trx = self.client.multi();
        for (id, score, payload) in queued {
            trx.set::<(), _, _>(self.keys.session(id), payload, None, None, false)
                .await
                .map_err(map_redis_error)?;
            trx.zadd::<(), _, _>(
                self.keys.sessions(),
                None,
                None,
                false,
                false,
                vec![(score, id.to_string())],
            )
            .await
            .map_err(map_redis_error)?;
        }
        trx.exec::<()>(true).await.map_err(map_redis_error)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionReader for RedisStore {
    async fn get(&self, id: &str) -> Result<Session, PersistenceError> {
        let id = safe_id("session", id)?;
        let payload: Option<String> = self
            .client
            .get(self.keys.session(id))
            .await
            .map_err(map_redis_error)?;
        let payload = payload.ok_or_else(|| PersistenceError::session_not_found(id))?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn list(&self) -> Result<Vec<Session>, PersistenceError> {
        self.load_sessions().await
    }

    /// The fast store never soft-deletes, so this matches `list`.
    async fn list_active(&self) -> Result<Vec<Session>, PersistenceError> {
        self.load_sessions().await
    }
}

#[async_trait::async_trait]
impl SessionWriter for RedisStore {
    async fn create(&self, session: &Session) -> Result<(), PersistenceError> {
        self.write_sessions(std::slice::from_ref(session)).await
    }

    async fn batch_create(&self, sessions: &[Session]) -> Result<(), PersistenceError> {
        self.write_sessions(sessions).await
    }

    async fn update(&self, session: &Session) -> Result<(), PersistenceError> {
        let id = safe_id("session", &session.id)?;
        if !self.session_exists(id).await? {
            return Err(PersistenceError::session_not_found(id));
        }
        self.write_sessions(std::slice::from_ref(session)).await
    }
}
