use std::collections::BTreeMap;

use fred::interfaces::{KeysInterface, SortedSetsInterface};
use lorekeep_core::{Message, MessageReader, MessageRole, MessageWriter, PersistenceError};

use crate::keys::{member_message_id, message_member, safe_id};
use crate::{map_redis_error, RedisStore};

impl RedisStore {
    /// Messages at index positions `start..=stop` of the session's index.
    ///
    /// A payload missing behind an index entry is an error, so a page is never
    /// silently shorter than the index says.
    async fn load_range(
        &self,
        session_id: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Message>, PersistenceError> {
        let session_id = safe_id("session", session_id)?;
        let members: Vec<String> = self
            .client
            .zrange(self.keys.messages(session_id), start, stop, None, false, None, false)
            .await
            .map_err(map_redis_error)?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members
            .iter()
            .map(|member| self.keys.message(session_id, member_message_id(member)))
            .collect();
        let payloads: Vec<Option<String>> =
            self.client.mget(keys).await.map_err(map_redis_error)?;

        members
            .iter()
            .zip(payloads)
            .map(|(member, payload)| match payload {
                Some(payload) => serde_json::from_str(&payload).map_err(PersistenceError::from),
                None => Err(PersistenceError::InvalidData(format!(
                    "message {} of session {session_id} is indexed but has no payload",
                    member_message_id(member)
                ))),
            })
            .collect()
    }

    /// Writes each payload and its index entry in one script call per session.
    /// Messages whose id already exists are left untouched.
    async fn insert_messages(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut by_session: BTreeMap<&str, (Vec<String>, Vec<String>)> = BTreeMap::new();
        for message in messages {
            let session_id = safe_id("session", &message.session_id)?;
            let message_id = safe_id("message", &message.id)?;
            let (keys, args) = by_session
                .entry(session_id)
                .or_insert_with(|| (vec![self.keys.messages(session_id)], Vec::new()));
            keys.push(self.keys.message(session_id, message_id));
            args.push(serde_json::to_string(message)?);
            args.push(message.created_at.timestamp_micros().to_string());
            args.push(message_member(&message.created_at, message_id));
        }
        for session_id in by_session.keys() {
            if !self.session_exists(session_id).await? {
                return Err(PersistenceError::InvalidData(format!(
                    "messages reference unknown session {session_id}"
                )));
            }
        }

        for (session_id, (keys, args)) in by_session {
            let written = self.eval_insert(keys, args).await?;
            tracing::debug!(%session_id, written, "inserted messages");
        }
        Ok(())
    }
}

fn to_i64(value: usize) -> Result<i64, PersistenceError> {
    i64::try_from(value)
        .map_err(|_| PersistenceError::InvalidData(format!("index {value} does not fit into i64")))
}

#[async_trait::async_trait]
impl MessageReader for RedisStore {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Message, PersistenceError> {
        let session_id = safe_id("session", session_id)?;
        let message_id = safe_id("message", message_id)?;
        let payload: Option<String> = self
            .client
            .get(self.keys.message(session_id, message_id))
            .await
            .map_err(map_redis_error)?;
        let payload =
            payload.ok_or_else(|| PersistenceError::message_not_found(session_id, message_id))?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, PersistenceError> {
        let stop = if limit == 0 { -1 } else { to_i64(limit)? - 1 };
        self.load_range(session_id, 0, stop).await
    }

    async fn list_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = to_i64(offset)?;
        let stop = start + to_i64(limit)? - 1;
        self.load_range(session_id, start, stop).await
    }

    async fn list_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        let take = if limit == 0 { usize::MAX } else { limit };
        Ok(self
            .load_range(session_id, 0, -1)
            .await?
            .into_iter()
            .filter(|message| message.role == role)
            .take(take)
            .collect())
    }
}

#[async_trait::async_trait]
impl MessageWriter for RedisStore {
    async fn create(&self, message: &Message) -> Result<(), PersistenceError> {
        self.insert_messages(std::slice::from_ref(message)).await
    }

    async fn batch_create(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        self.insert_messages(messages).await
    }
}
