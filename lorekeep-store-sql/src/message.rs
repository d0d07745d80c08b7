use std::collections::BTreeSet;

use lorekeep_core::{Message, MessageReader, MessageRole, MessageWriter, PersistenceError};
use sqlx::AnyConnection;

use crate::codec::{encode_tool_calls, format_timestamp, message_from_row, MESSAGE_COLUMNS};
use crate::error::map_sqlx_error;
use crate::store::SqlStore;

const INSERT_MESSAGE_SQL: &str = "INSERT INTO client_messages (
        id, session_id, role, content, tool_calls, player_id, created_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (id) DO NOTHING";

fn to_i64(value: usize, what: &str) -> Result<i64, PersistenceError> {
    i64::try_from(value)
        .map_err(|_| PersistenceError::InvalidData(format!("{what} {value} does not fit into i64")))
}

async fn ensure_session(conn: &mut AnyConnection, session_id: &str) -> Result<(), PersistenceError> {
    let found = sqlx::query("SELECT id FROM client_sessions WHERE id = $1")
        .bind(session_id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_error)?;
    if found.is_none() {
        return Err(PersistenceError::InvalidData(format!(
            "messages reference unknown session {session_id}"
        )));
    }
    Ok(())
}

async fn insert_message(conn: &mut AnyConnection, message: &Message) -> Result<(), PersistenceError> {
    sqlx::query(INSERT_MESSAGE_SQL)
        .bind(message.id.clone())
        .bind(message.session_id.clone())
        .bind(message.role.as_str().to_string())
        .bind(message.content.clone())
        .bind(encode_tool_calls(message)?)
        .bind(message.player_id.clone())
        .bind(format_timestamp(&message.created_at))
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

impl SqlStore {
    async fn select_messages(
        &self,
        session_id: &str,
        role: Option<MessageRole>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        let mut sql = format!("SELECT {MESSAGE_COLUMNS} FROM client_messages WHERE session_id = $1");
        let mut next = 2;
        if role.is_some() {
            sql.push_str(&format!(" AND role = ${next}"));
            next += 1;
        }
        sql.push_str(" ORDER BY created_at, id");
        if limit > 0 {
            sql.push_str(&format!(" LIMIT ${next}"));
            next += 1;
        }
        if offset > 0 {
            if limit == 0 {
                return Err(PersistenceError::InvalidData(
                    "an offset needs a non-zero limit".to_string(),
                ));
            }
            sql.push_str(&format!(" OFFSET ${next}"));
        }

        let mut query = sqlx::query(&sql).bind(session_id.to_string());
        if let Some(role) = role {
            query = query.bind(role.as_str().to_string());
        }
        if limit > 0 {
            query = query.bind(to_i64(limit, "limit")?);
        }
        if offset > 0 {
            query = query.bind(to_i64(offset, "offset")?);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(message_from_row).collect()
    }
}

#[async_trait::async_trait]
impl MessageReader for SqlStore {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Message, PersistenceError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM client_messages WHERE session_id = $1 AND id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(session_id.to_string())
            .bind(message_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| PersistenceError::message_not_found(session_id, message_id))?;
        message_from_row(&row)
    }

    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, PersistenceError> {
        self.select_messages(session_id, None, 0, limit).await
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
        self.select_messages(session_id, None, offset, limit).await
    }

    async fn list_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        self.select_messages(session_id, Some(role), 0, limit).await
    }
}

#[async_trait::async_trait]
impl MessageWriter for SqlStore {
    async fn create(&self, message: &Message) -> Result<(), PersistenceError> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        ensure_session(&mut conn, &message.session_id).await?;
        insert_message(&mut conn, message).await
    }

    /// Inserts in one transaction after checking every referenced session.
    async fn batch_create(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let sessions: BTreeSet<&str> = messages
            .iter()
            .map(|message| message.session_id.as_str())
            .collect();
        for session_id in sessions {
            ensure_session(&mut tx, session_id).await?;
        }
        for message in messages {
            insert_message(&mut tx, message).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(count = messages.len(), "inserted messages");
        Ok(())
    }
}
