use std::str::FromStr;

use lorekeep_core::{Message, MessageRole, PersistenceError, Session, ToolCall};

#[test]
fn new_session_defaults() {
    let session = Session::new("Lost Mine", "dm-1", "http://mcp.local");

    assert!(!session.id.is_empty());
    assert_eq!(session.max_players, 4);
    assert!(session.is_active());
    assert!(!session.is_deleted());
    assert_eq!(session.settings, serde_json::json!({}));
    assert_eq!(session.created_at, session.updated_at);
}

#[test]
fn session_json_omits_missing_soft_delete() {
    let session = Session::new("Lost Mine", "dm-1", "http://mcp.local");
    let value = serde_json::to_value(&session).expect("session should serialize");

    assert!(value.get("deleted_at").is_none());
    let back: Session = serde_json::from_value(value).expect("session should deserialize");
    assert_eq!(back, session);
}

#[test]
fn message_roles_parse_and_display() {
    for role in [
        MessageRole::User,
        MessageRole::Assistant,
        MessageRole::System,
        MessageRole::Tool,
    ] {
        assert_eq!(MessageRole::from_str(role.as_str()).unwrap(), role);
        assert_eq!(role.to_string(), role.as_str());
    }

    let err = MessageRole::from_str("narrator").unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidData(_)));
}

#[test]
fn message_role_serializes_lowercase() {
    let message = Message::assistant("s-1", "You enter the cave.");
    let value = serde_json::to_value(&message).expect("message should serialize");
    assert_eq!(value["role"], "assistant");
    assert!(value.get("tool_calls").is_none());
    assert!(value.get("player_id").is_none());
}

#[test]
fn user_message_carries_player() {
    let mut message = Message::user("s-1", "I roll for initiative", "player-7");
    assert_eq!(message.player_id.as_deref(), Some("player-7"));
    assert!(!message.has_tool_calls());

    message.tool_calls.push(ToolCall {
        id: "call-1".to_string(),
        name: "roll_dice".to_string(),
        arguments: serde_json::json!({"sides": 20}),
    });
    assert!(message.has_tool_calls());
}
