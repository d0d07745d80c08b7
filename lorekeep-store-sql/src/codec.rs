use chrono::{DateTime, SecondsFormat, Utc};
use lorekeep_core::{Message, PersistenceError, Session, ToolCall};
use sqlx::any::AnyRow;
use sqlx::Row;

use crate::error::map_sqlx_error;

pub(crate) const SESSION_COLUMNS: &str = "id, name, creator_id, mcp_server_url, websocket_key, \
     max_players, settings, status, created_at, updated_at, deleted_at";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, tool_calls, player_id, created_at";

/// Fixed-width RFC 3339, so text order matches time order.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| PersistenceError::InvalidData(format!("bad timestamp {value:?}: {error}")))
}

fn text(row: &AnyRow, column: &str) -> Result<String, PersistenceError> {
    row.try_get(column).map_err(map_sqlx_error)
}

fn optional_text(row: &AnyRow, column: &str) -> Result<Option<String>, PersistenceError> {
    row.try_get(column).map_err(map_sqlx_error)
}

pub(crate) fn session_from_row(row: &AnyRow) -> Result<Session, PersistenceError> {
    let settings = text(row, "settings")?;
    Ok(Session {
        id: text(row, "id")?,
        name: text(row, "name")?,
        creator_id: text(row, "creator_id")?,
        mcp_server_url: text(row, "mcp_server_url")?,
        websocket_key: text(row, "websocket_key")?,
        max_players: row.try_get("max_players").map_err(map_sqlx_error)?,
        settings: serde_json::from_str(&settings)?,
        status: text(row, "status")?,
        created_at: parse_timestamp(&text(row, "created_at")?)?,
        updated_at: parse_timestamp(&text(row, "updated_at")?)?,
        deleted_at: optional_text(row, "deleted_at")?
            .map(|value| parse_timestamp(&value))
            .transpose()?,
    })
}

pub(crate) fn message_from_row(row: &AnyRow) -> Result<Message, PersistenceError> {
    let tool_calls: Vec<ToolCall> = match optional_text(row, "tool_calls")? {
        Some(raw) if !raw.is_empty() => serde_json::from_str(&raw)?,
        _ => Vec::new(),
    };
    Ok(Message {
        id: text(row, "id")?,
        session_id: text(row, "session_id")?,
        role: text(row, "role")?.parse()?,
        content: text(row, "content")?,
        tool_calls,
        player_id: optional_text(row, "player_id")?,
        created_at: parse_timestamp(&text(row, "created_at")?)?,
    })
}

pub(crate) fn encode_settings(session: &Session) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(&session.settings)?)
}

pub(crate) fn encode_tool_calls(message: &Message) -> Result<Option<String>, PersistenceError> {
    if message.tool_calls.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&message.tool_calls)?))
}
