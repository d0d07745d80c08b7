use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, TimeZone, Utc};
use fred::interfaces::SortedSetsInterface;
use lorekeep_core::{
    Message, MessageReader, MessageRole, MessageWriter, PersistenceError, Session, SessionReader,
    SessionWriter,
};
use lorekeep_store_redis::RedisStore;

fn redis_test_url() -> String {
    std::env::var("REDIS_TEST_URL")
        .expect("REDIS_TEST_URL must be set to run Redis integration tests")
}

fn unique_namespace(prefix: &str) -> String {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    format!("{prefix}-{nonce}")
}

async fn store(prefix: &str) -> RedisStore {
    RedisStore::new(&redis_test_url(), unique_namespace(prefix))
        .await
        .expect("redis store should connect")
}

fn message(session_id: &str, index: usize) -> Message {
    let base = Utc
        .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    let role = if index % 3 == 0 {
        MessageRole::Assistant
    } else {
        MessageRole::User
    };
    let mut message = Message::new(session_id, role, format!("line {index}"))
        .with_created_at(base + Duration::seconds(index as i64));
    message.id = format!("m{index:03}");
    message
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn session_round_trip_and_overwrite() {
    let store = store("lk-session").await;
    let mut session = Session::new("Lost Mine", "dm-1", "http://localhost:9000").with_id("s1");

    SessionWriter::create(&store, &session).await.expect("create");
    session.name = "Lost Mine of Phandelver".to_string();
    store.update(&session).await.expect("update");

    let loaded = SessionReader::get(&store, "s1").await.expect("get");
    assert_eq!(loaded, session);
    assert_eq!(SessionReader::list(&store).await.expect("list").len(), 1);
    assert_eq!(store.list_active().await.expect("active").len(), 1);
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn missing_entries_are_not_found() {
    let store = store("lk-missing").await;
    assert!(SessionReader::get(&store, "ghost")
        .await
        .expect_err("missing session")
        .is_not_found());
    assert!(store
        .update(&Session::new("x", "y", "z").with_id("ghost"))
        .await
        .expect_err("update missing")
        .is_not_found());
    assert!(MessageReader::get(&store, "ghost", "m1")
        .await
        .expect_err("missing message")
        .is_not_found());
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn messages_are_insert_or_ignore_and_paged_in_order() {
    let store = store("lk-messages").await;
    let session = Session::new("Curse", "dm-1", "http://localhost:9000").with_id("s1");
    SessionWriter::create(&store, &session).await.expect("session");

    let batch: Vec<Message> = (0..10).map(|index| message("s1", index)).collect();
    let mut shuffled = batch.clone();
    shuffled.reverse();
    MessageWriter::batch_create(&store, &shuffled).await.expect("batch");
    MessageWriter::batch_create(&store, &batch).await.expect("again");

    assert_eq!(MessageReader::list(&store, "s1", 0).await.expect("all"), batch);
    assert_eq!(
        MessageReader::list(&store, "s1", 4).await.expect("first"),
        batch[..4].to_vec()
    );
    assert_eq!(
        store.list_page("s1", 8, 4).await.expect("tail"),
        batch[8..].to_vec()
    );
    assert_eq!(
        store
            .list_by_role("s1", MessageRole::Assistant, 0)
            .await
            .expect("by role")
            .len(),
        4
    );
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn messages_for_unknown_session_are_rejected() {
    let store = store("lk-orphan").await;
    let error = MessageWriter::create(&store, &message("nope", 0))
        .await
        .expect_err("unknown session");
    assert!(matches!(error, PersistenceError::InvalidData(_)));
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn delete_session_removes_messages() {
    let store = store("lk-delete").await;
    let session = Session::new("Tomb", "dm-1", "http://localhost:9000").with_id("s1");
    SessionWriter::create(&store, &session).await.expect("session");
    MessageWriter::batch_create(&store, &[message("s1", 0), message("s1", 1)])
        .await
        .expect("messages");

    assert!(store.delete_session("s1").await.expect("delete"));
    assert!(!store.delete_session("s1").await.expect("second delete"));
    assert!(SessionReader::list(&store).await.expect("list").is_empty());
    assert!(MessageReader::list(&store, "s1", 0)
        .await
        .expect("messages")
        .is_empty());
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn unsafe_ids_are_rejected_before_any_write() {
    let store = store("lk-unsafe").await;
    let error = SessionWriter::create(
        &store,
        &Session::new("bad", "dm", "http://localhost").with_id("a*b"),
    )
    .await
    .expect_err("unsafe id");
    assert!(matches!(error, PersistenceError::InvalidData(_)));
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn messages_within_one_millisecond_keep_creation_order() {
    let store = store("lk-order").await;
    let session = Session::new("Rime", "dm-1", "http://localhost:9000").with_id("s1");
    SessionWriter::create(&store, &session).await.expect("session");

    let base = Utc
        .timestamp_opt(1_700_000_000, 0)
        .single()
        .expect("valid timestamp");
    // Ids sort against creation order, so only the timestamp can keep them straight.
    let offsets = [
        ("zz-tool", Duration::microseconds(100)),
        ("mm-assistant", Duration::microseconds(900)),
        ("aa-user", Duration::microseconds(900) + Duration::nanoseconds(1)),
    ];
    let batch: Vec<Message> = offsets
        .iter()
        .map(|(id, offset)| {
            let mut message = Message::assistant("s1", *id).with_created_at(base + *offset);
            message.id = id.to_string();
            message
        })
        .collect();
    let mut reversed = batch.clone();
    reversed.reverse();
    MessageWriter::batch_create(&store, &reversed).await.expect("batch");

    let ids: Vec<String> = MessageReader::list(&store, "s1", 0)
        .await
        .expect("list")
        .into_iter()
        .map(|message| message.id)
        .collect();
    assert_eq!(ids, vec!["zz-tool", "mm-assistant", "aa-user"]);
    assert_eq!(
        store.list_page("s1", 1, 1).await.expect("page")[0].id,
        "mm-assistant"
    );
}

#[tokio::test]
#[ignore = "requires REDIS_TEST_URL"]
async fn indexed_message_without_payload_is_an_error() {
    let namespace = unique_namespace("lk-orphan-index");
    let store = RedisStore::new(&redis_test_url(), namespace.clone())
        .await
        .expect("redis store should connect");
    let session = Session::new("Ghosts", "dm-1", "http://localhost:9000").with_id("s1");
    SessionWriter::create(&store, &session).await.expect("session");
    MessageWriter::batch_create(&store, &[message("s1", 0)])
        .await
        .expect("message");

    let _: () = store
        .client()
        .zadd(
            format!("{{lk:{namespace}:s1}}:messages"),
            None,
            None,
            false,
            false,
            vec![(1.0e18, "9999-12-31T00:00:00.000000000Z|lost".to_string())],
        )
        .await
        .expect("raw index entry");

    let error = store
        .list_page("s1", 0, 10)
        .await
        .expect_err("page with a missing payload");
    assert!(matches!(error, PersistenceError::InvalidData(_)));
}
