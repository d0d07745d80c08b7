mod support;

use std::sync::Arc;

use lorekeep_core::{InMemoryStore, MessageReader, PersistenceError};
use lorekeep_sync::{BackupService, CancellationToken};
use support::{seed, CountingMessages, FlakySessionWriter};

fn service(fast: &InMemoryStore, durable: &InMemoryStore) -> BackupService {
    BackupService::new(
        Arc::new(fast.clone()),
        Arc::new(fast.clone()),
        Arc::new(durable.clone()),
        Arc::new(durable.clone()),
    )
}

#[tokio::test]
async fn backup_all_is_idempotent() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();
    seed(&fast, "s1", 120).await;
    seed(&fast, "s2", 3).await;
    let backup = service(&fast, &durable);
    let cancel = CancellationToken::new();

    let first = backup.backup_all(&cancel).await.expect("first backup");
    assert_eq!(first.session_count, 2);
    assert_eq!(first.message_count, 123);
    assert!(first.end_time >= first.start_time);

    let second = backup.backup_all(&cancel).await.expect("second backup");
    assert_eq!(second.message_count, 123);
    assert_eq!(durable.session_count().expect("count"), 2);
    assert_eq!(durable.total_message_count().expect("count"), 123);
}

#[tokio::test]
async fn exact_multiple_of_page_size_needs_no_trailing_read() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();
    seed(&fast, "s1", 200).await;
    seed(&fast, "s2", 0).await;
    let messages = CountingMessages::new(fast.clone());

    let backup = BackupService::new(
        Arc::new(fast.clone()),
        messages.clone(),
        Arc::new(durable.clone()),
        Arc::new(durable.clone()),
    )
    .with_page_size(100);

    let result = backup
        .backup_all(&CancellationToken::new())
        .await
        .expect("backup");
    assert_eq!(result.message_count, 200);
    assert_eq!(durable.message_count("s1").expect("count"), 200);
    // Two reads for s1, one for the empty s2.
    assert_eq!(messages.page_reads(), 3);
}

#[tokio::test]
async fn backup_all_pages_until_short_page() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();
    seed(&fast, "s1", 250).await;
    let messages = CountingMessages::new(fast.clone());

    let backup = BackupService::new(
        Arc::new(fast.clone()),
        messages.clone(),
        Arc::new(durable.clone()),
        Arc::new(durable.clone()),
    )
    .with_page_size(100);

    let result = backup
        .backup_all(&CancellationToken::new())
        .await
        .expect("backup");
    assert_eq!(result.message_count, 250);
    assert_eq!(messages.page_reads(), 3);

    let copied = MessageReader::list(&durable, "s1", 0).await.expect("list");
    let source = MessageReader::list(&fast, "s1", 0).await.expect("list");
    assert_eq!(copied, source);
}

#[tokio::test]
async fn backup_all_fails_when_session_batch_fails() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();
    seed(&fast, "s1", 2).await;

    let backup = BackupService::new(
        Arc::new(fast.clone()),
        Arc::new(fast.clone()),
        FlakySessionWriter::new(durable.clone(), &["s1"]),
        Arc::new(durable.clone()),
    );

    let error = backup
        .backup_all(&CancellationToken::new())
        .await
        .expect_err("batch rejected");
    assert!(matches!(error, PersistenceError::Store(_)));
    assert_eq!(durable.total_message_count().expect("count"), 0);
}

#[tokio::test]
async fn backup_all_honours_cancellation_before_paging() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();
    seed(&fast, "s1", 2).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = service(&fast, &durable)
        .backup_all(&cancel)
        .await
        .expect_err("cancelled");
    assert!(error.is_cancelled());
    assert_eq!(durable.total_message_count().expect("count"), 0);
}

#[tokio::test]
async fn backup_session_copies_one_session() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();
    seed(&fast, "s1", 4).await;
    seed(&fast, "s2", 9).await;

    let result = service(&fast, &durable)
        .backup_session("s1", &CancellationToken::new())
        .await
        .expect("backup session");

    assert_eq!(result.session_count, 1);
    assert_eq!(result.message_count, 4);
    assert_eq!(durable.session_count().expect("count"), 1);
    assert_eq!(durable.message_count("s2").expect("count"), 0);
}

#[tokio::test]
async fn backup_session_reports_missing_session() {
    let fast = InMemoryStore::new();
    let durable = InMemoryStore::new();

    let error = service(&fast, &durable)
        .backup_session("ghost", &CancellationToken::new())
        .await
        .expect_err("missing session");
    assert!(error.is_not_found());
    assert!(error.to_string().contains("ghost"));
}
