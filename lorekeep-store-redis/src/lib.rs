//! Redis fast store for lorekeep.
//!
//! Sessions and messages are stored as JSON strings. Sorted-set indexes keep
//! sessions and each session's messages in creation order.

mod keys;
mod message;
mod script;
mod session;

use std::sync::Arc;

use fred::interfaces::{KeysInterface, LuaInterface, SortedSetsInterface, TransactionInterface};
use fred::prelude::*;
use lorekeep_core::PersistenceError;
use tokio::sync::RwLock;

use crate::keys::{member_message_id, Keys};
use crate::script::LUA_INSERT_MESSAGES;

pub use keys::safe_id;

#[derive(Clone)]
pub struct RedisStore {
    client: RedisClient,
    namespace: String,
    keys: Keys,
    script_sha: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

pub(crate) fn map_redis_error(error: RedisError) -> PersistenceError {
    match error.kind() {
        RedisErrorKind::IO
        | RedisErrorKind::Timeout
        | RedisErrorKind::Canceled
        | RedisErrorKind::Cluster
        | RedisErrorKind::Backpressure => PersistenceError::Connectivity(error.to_string()),
        _ => PersistenceError::Store(error.to_string()),
    }
}

impl RedisStore {
    pub async fn new(url: &str, namespace: impl Into<String>) -> Result<Self, PersistenceError> {
        let config = RedisConfig::from_url(url).map_err(map_redis_error)?;
        let client = RedisClient::new(config, None, None, None);
        client.init().await.map_err(map_redis_error)?;
        Self::from_client(client, namespace)
    }

    /// Uses a client that is already connected.
    pub fn from_client(
        client: RedisClient,
        namespace: impl Into<String>,
    ) -> Result<Self, PersistenceError> {
        let namespace = namespace.into();
        if namespace.contains(':') {
            return Err(PersistenceError::InvalidConfig(format!(
                "redis namespace must not contain ':': {namespace:?}"
            )));
        }
        safe_id("namespace", &namespace)?;
        Ok(Self {
            client,
            keys: Keys::new(&namespace),
            namespace,
            script_sha: Arc::new(RwLock::new(None)),
        })
    }

    async fn load_insert_script(&self) -> Result<String, PersistenceError> {
        let sha = self
            .client
            .script_load::<String, _>(LUA_INSERT_MESSAGES)
            .await
            .map_err(map_redis_error)?;
        *self.script_sha.write().await = Some(sha.clone());
        Ok(sha)
    }

    /// Runs the message insert script, reloading it if the server lost it.
    pub(crate) async fn eval_insert(
        &self,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> Result<i64, PersistenceError> {
        let cached = self.script_sha.read().await.clone();
        let sha = match cached {
            Some(sha) => sha,
            None => self.load_insert_script().await?,
        };

        match self
            .client
            .evalsha::<i64, _, _, _>(sha, keys.clone(), args.clone())
            .await
        {
            Ok(written) => Ok(written),
            Err(error) if error.to_string().to_ascii_uppercase().contains("NOSCRIPT") => {
                let sha = self.load_insert_script().await?;
                self.client
                    .evalsha::<i64, _, _, _>(sha, keys, args)
                    .await
                    .map_err(map_redis_error)
            }
            Err(error) => Err(map_redis_error(error)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    pub(crate) async fn session_exists(&self, session_id: &str) -> Result<bool, PersistenceError> {
        let count: i64 = self
            .client
            .exists(self.keys.session(session_id))
            .await
            .map_err(map_redis_error)?;
        Ok(count > 0)
    }

    /// Removes a session, its index entry and all of its messages. Returns
    /// whether the session existed.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, PersistenceError> {
        let session_id = safe_id("session", session_id)?;
        let existed = self.session_exists(session_id).await?;

        let index = self.keys.messages(session_id);
        let members: Vec<String> = self
            .client
            .zrange(&index, 0_i64, -1_i64, None, false, None, false)
            .await
            .map_err(map_redis_error)?;

        let mut doomed: Vec<String> = members
            .iter()
            .map(|member| self.keys.message(session_id, member_message_id(member)))
            .collect();
        doomed.push(index);
        let _: i64 = self.client.del(doomed).await.map_err(map_redis_error)?;

        let trx = self.client.multi();
        trx.del::<(), _>(self.keys.session(session_id))
            .await
            .map_err(map_redis_error)?;
        trx.zrem::<(), _, _>(self.keys.sessions(), session_id.to_string())
            .await
            .map_err(map_redis_error)?;
        trx.exec::<()>(true).await.map_err(map_redis_error)?;

        tracing::debug!(%session_id, messages = members.len(), existed, "deleted session");
        Ok(existed)
    }
}
