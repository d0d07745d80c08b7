use chrono::{Duration, TimeZone, Utc};
use lorekeep_core::{
    Message, MessageReader, MessageRole, MessageWriter, PersistenceError, Session, SessionReader,
    SessionWriter, ToolCall,
};
use lorekeep_store_sql::SqlStore;

async fn store() -> SqlStore {
    SqlStore::builder("sqlite::memory:")
        .max_connections(1)
        .min_connections(1)
        .build()
        .await
        .expect("sqlite store")
}

fn at(seconds: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::seconds(seconds)
}

fn session(id: &str, created: i64) -> Session {
    let mut session = Session::new(format!("campaign {id}"), "dm-1", "http://localhost:9000")
        .with_id(id);
    session.created_at = at(created);
    session.updated_at = at(created);
    session
}

fn message(session_id: &str, index: usize, role: MessageRole) -> Message {
    let mut message = Message::new(session_id, role, format!("line {index}"))
        .with_created_at(at(index as i64));
    message.id = format!("{session_id}-{index:03}");
    message
}

#[tokio::test]
async fn build_applies_embedded_schema() {
    let store = store().await;
    assert!(store
        .migrator()
        .is_up_to_date()
        .await
        .expect("migration status"));
}

#[tokio::test]
async fn session_upsert_is_idempotent_and_updates_fields() {
    let store = store().await;
    let mut original = session("s1", 0);
    original.settings = serde_json::json!({"difficulty": "hard"});

    SessionWriter::create(&store, &original).await.expect("insert");
    SessionWriter::create(&store, &original).await.expect("re-insert");
    assert_eq!(SessionReader::list(&store).await.expect("list").len(), 1);

    let mut renamed = original.clone();
    renamed.name = "renamed".to_string();
    renamed.max_players = 6;
    SessionWriter::create(&store, &renamed).await.expect("upsert");

    let stored = SessionReader::get(&store, "s1").await.expect("get");
    assert_eq!(stored, renamed);
}

#[tokio::test]
async fn sessions_list_in_creation_order_and_hide_soft_deleted() {
    let store = store().await;
    SessionWriter::batch_create(
        &store,
        &[session("late", 30), session("early", 10), session("middle", 20)],
    )
    .await
    .expect("batch");

    let ids: Vec<String> = SessionReader::list(&store)
        .await
        .expect("list")
        .into_iter()
        .map(|session| session.id)
        .collect();
    assert_eq!(ids, vec!["early", "middle", "late"]);

    store.soft_delete("middle").await.expect("soft delete");
    let active: Vec<String> = store
        .list_active()
        .await
        .expect("active")
        .into_iter()
        .map(|session| session.id)
        .collect();
    assert_eq!(active, vec!["early", "late"]);

    let deleted = SessionReader::get(&store, "middle").await.expect("still stored");
    assert!(deleted.is_deleted());

    // An upsert from the fast side does not undo the soft delete.
    SessionWriter::create(&store, &session("middle", 20))
        .await
        .expect("upsert");
    assert_eq!(store.list_active().await.expect("active").len(), 2);
}

#[tokio::test]
async fn missing_rows_are_not_found() {
    let store = store().await;
    assert!(SessionReader::get(&store, "ghost")
        .await
        .expect_err("no session")
        .is_not_found());
    assert!(MessageReader::get(&store, "ghost", "m1")
        .await
        .expect_err("no message")
        .is_not_found());
    assert!(store
        .update(&session("ghost", 0))
        .await
        .expect_err("no row to update")
        .is_not_found());
    assert!(store
        .soft_delete("ghost")
        .await
        .expect_err("no row to delete")
        .is_not_found());
}

#[tokio::test]
async fn message_batches_are_insert_or_ignore() {
    let store = store().await;
    SessionWriter::create(&store, &session("s1", 0))
        .await
        .expect("session");

    let batch: Vec<Message> = (0..5)
        .map(|index| message("s1", index, MessageRole::User))
        .collect();
    MessageWriter::batch_create(&store, &batch).await.expect("first");
    MessageWriter::batch_create(&store, &batch).await.expect("second");
    MessageWriter::create(&store, &batch[0]).await.expect("single");

    let stored = MessageReader::list(&store, "s1", 0).await.expect("list");
    assert_eq!(stored, batch);
}

#[tokio::test]
async fn message_batch_with_unknown_session_writes_nothing() {
    let store = store().await;
    SessionWriter::create(&store, &session("s1", 0))
        .await
        .expect("session");

    let batch = vec![
        message("s1", 0, MessageRole::User),
        message("nope", 1, MessageRole::User),
    ];
    let error = MessageWriter::batch_create(&store, &batch)
        .await
        .expect_err("unknown session");
    assert!(matches!(error, PersistenceError::InvalidData(_)));
    assert!(MessageReader::list(&store, "s1", 0)
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn message_reads_page_filter_and_keep_tool_calls() {
    let store = store().await;
    SessionWriter::create(&store, &session("s1", 0))
        .await
        .expect("session");

    let mut batch: Vec<Message> = (0..7)
        .map(|index| {
            let role = if index % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            message("s1", index, role)
        })
        .collect();
    batch[1].tool_calls.push(ToolCall {
        id: "call-1".to_string(),
        name: "roll_dice".to_string(),
        arguments: serde_json::json!({"sides": 20}),
    });
    batch[2].player_id = Some("player-7".to_string());
    // Insert out of order; reads come back by creation time.
    batch.reverse();
    MessageWriter::batch_create(&store, &batch).await.expect("batch");
    batch.reverse();

    let first_three = MessageReader::list(&store, "s1", 3).await.expect("list");
    assert_eq!(first_three, batch[..3].to_vec());

    let page = store.list_page("s1", 3, 3).await.expect("page");
    assert_eq!(page, batch[3..6].to_vec());
    let tail = store.list_page("s1", 6, 3).await.expect("tail");
    assert_eq!(tail.len(), 1);
    assert!(store.list_page("s1", 7, 3).await.expect("past end").is_empty());

    let assistant = store
        .list_by_role("s1", MessageRole::Assistant, 0)
        .await
        .expect("by role");
    assert_eq!(assistant.len(), 3);
    assert!(assistant[0].has_tool_calls());
    assert_eq!(
        store
            .list_by_role("s1", MessageRole::User, 2)
            .await
            .expect("by role")
            .len(),
        2
    );

    let fetched = MessageReader::get(&store, "s1", "s1-002").await.expect("get");
    assert_eq!(fetched.player_id.as_deref(), Some("player-7"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn postgres_round_trip() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
    let store = SqlStore::builder(url)
        .max_connections(2)
        .build()
        .await
        .expect("postgres store");

    let id = format!("pg-{}", uuid_like());
    SessionWriter::create(&store, &session(&id, 0))
        .await
        .expect("session");
    MessageWriter::batch_create(&store, &[message(&id, 0, MessageRole::System)])
        .await
        .expect("message");

    assert_eq!(
        MessageReader::list(&store, &id, 0).await.expect("list").len(),
        1
    );
    store.soft_delete(&id).await.expect("soft delete");
}

fn uuid_like() -> String {
    Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
}
