use lorekeep_core::{PersistenceError, Session, SessionReader, SessionWriter};
use sqlx::AnyConnection;

use crate::codec::{encode_settings, format_timestamp, session_from_row, SESSION_COLUMNS};
use crate::error::map_sqlx_error;
use crate::store::SqlStore;

// Soft-delete state belongs to the durable side, so upserts leave it alone.
const UPSERT_SESSION_SQL: &str = "INSERT INTO client_sessions (
        id, name, creator_id, mcp_server_url, websocket_key,
        max_players, settings, status, created_at, updated_at, deleted_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (id) DO UPDATE SET
        name = excluded.name,
        creator_id = excluded.creator_id,
        mcp_server_url = excluded.mcp_server_url,
        websocket_key = excluded.websocket_key,
        max_players = excluded.max_players,
        settings = excluded.settings,
        status = excluded.status,
        updated_at = excluded.updated_at";

pub(crate) async fn upsert_session(
    conn: &mut AnyConnection,
    session: &Session,
) -> Result<(), PersistenceError> {
    sqlx::query(UPSERT_SESSION_SQL)
        .bind(session.id.clone())
        .bind(session.name.clone())
        .bind(session.creator_id.clone())
        .bind(session.mcp_server_url.clone())
        .bind(session.websocket_key.clone())
        .bind(session.max_players)
        .bind(encode_settings(session)?)
        .bind(session.status.clone())
        .bind(format_timestamp(&session.created_at))
        .bind(format_timestamp(&session.updated_at))
        .bind(session.deleted_at.as_ref().map(format_timestamp))
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

impl SqlStore {
    async fn select_sessions(&self, active_only: bool) -> Result<Vec<Session>, PersistenceError> {
        let filter = if active_only {
            " WHERE deleted_at IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM client_sessions{filter} ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(session_from_row).collect()
    }
}

#[async_trait::async_trait]
impl SessionReader for SqlStore {
    async fn get(&self, id: &str) -> Result<Session, PersistenceError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM client_sessions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| PersistenceError::session_not_found(id))?;
        session_from_row(&row)
    }

    async fn list(&self) -> Result<Vec<Session>, PersistenceError> {
        self.select_sessions(false).await
    }

    async fn list_active(&self) -> Result<Vec<Session>, PersistenceError> {
        self.select_sessions(true).await
    }
}

#[async_trait::async_trait]
impl SessionWriter for SqlStore {
    async fn create(&self, session: &Session) -> Result<(), PersistenceError> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        upsert_session(&mut conn, session).await
    }

    /// All sessions commit together or not at all.
    async fn batch_create(&self, sessions: &[Session]) -> Result<(), PersistenceError> {
        if sessions.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for session in sessions {
            upsert_session(&mut tx, session).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(count = sessions.len(), "upserted sessions");
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            "UPDATE client_sessions SET
                name = $2, creator_id = $3, mcp_server_url = $4, websocket_key = $5,
                max_players = $6, settings = $7, status = $8, updated_at = $9
            WHERE id = $1",
        )
        .bind(session.id.clone())
        .bind(session.name.clone())
        .bind(session.creator_id.clone())
        .bind(session.mcp_server_url.clone())
        .bind(session.websocket_key.clone())
        .bind(session.max_players)
        .bind(encode_settings(session)?)
        .bind(session.status.clone())
        .bind(format_timestamp(&session.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::session_not_found(&session.id));
        }
        Ok(())
    }
}
