use chrono::{DateTime, SecondsFormat, Utc};
use lorekeep_core::PersistenceError;

/// Rejects ids that would break key layout or glob patterns.
pub fn safe_id<'a>(kind: &str, id: &'a str) -> Result<&'a str, PersistenceError> {
    if id.is_empty() {
        return Err(PersistenceError::InvalidData(format!(
            "{kind} id must not be empty"
        )));
    }

    if id
        .chars()
        .any(|c| matches!(c, '{' | '}' | '*' | '?' | '\n' | '\r'))
    {
        return Err(PersistenceError::InvalidData(format!(
            "{kind} id contains characters invalid in Redis keys: {id:?}"
        )));
    }

    Ok(id)
}

/// Key layout. Session keys share the namespace hash tag and each session's
/// message keys share a per-session tag, so every multi-key command touches a
/// single cluster slot.
#[derive(Debug, Clone)]
pub(crate) struct Keys {
    namespace: String,
}

impl Keys {
    pub(crate) fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }

    pub(crate) fn sessions(&self) -> String {
        format!("{{lk:{}}}:sessions", self.namespace)
    }

    pub(crate) fn session(&self, session_id: &str) -> String {
        format!("{{lk:{}}}:session:{session_id}", self.namespace)
    }

    pub(crate) fn messages(&self, session_id: &str) -> String {
        format!("{{lk:{}:{session_id}}}:messages", self.namespace)
    }

    pub(crate) fn message(&self, session_id: &str, message_id: &str) -> String {
        format!("{{lk:{}:{session_id}}}:message:{message_id}", self.namespace)
    }
}

/// Sorted-set score for a timestamp, in microseconds. Exact in an `f64` for
/// any timestamp this store will see.
pub(crate) fn score(at: &DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64
}

/// Index member for a message. Members with equal scores sort by the
/// fixed-width nanosecond timestamp first and the id second.
pub(crate) fn message_member(created_at: &DateTime<Utc>, message_id: &str) -> String {
    format!(
        "{}|{message_id}",
        created_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    )
}

pub(crate) fn member_message_id(member: &str) -> &str {
    member
        .split_once('|')
        .map(|(_, message_id)| message_id)
        .unwrap_or(member)
}
