mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use common::{StaticConfirmations, UnreadableStore};
use payment_guard::error::AppError;
use payment_guard::models::{SubmissionAttributes, SubmissionStatus};
use payment_guard::repositories::{MemorySubmissionStore, PostgresSubmissionStore, SubmissionStore};
use payment_guard::services::{ConfirmedSubmission, PostCommitResolver, ReconciliationJob};

fn attributes() -> SubmissionAttributes {
    SubmissionAttributes::from_payment(&common::payment(), SubmissionStatus::Confirmed)
}

#[tokio::test]
async fn test_many_writers_create_one_record() {
    let store = MemorySubmissionStore::new();
    let resolver = PostCommitResolver::new(Arc::new(store.clone()));

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.persist("sig-race", attributes()).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.record.signature, "sig-race");
        if outcome.created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_failed_existence_check_writes_nothing() {
    let store = Arc::new(UnreadableStore::default());
    let resolver = PostCommitResolver::new(store.clone());

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.persist("sig-unreadable", attributes()).await })
        })
        .collect();

    for task in tasks {
        let result = task.await.unwrap();
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }
    assert_eq!(store.creates(), 0);
}

#[tokio::test]
async fn test_reconciliation_recovers_missed_write() {
    let store = MemorySubmissionStore::new();
    let resolver = PostCommitResolver::new(Arc::new(store.clone()));
    let now = Utc::now();

    let source = StaticConfirmations::new(vec![
        ConfirmedSubmission {
            signature: "sig-crashed".to_string(),
            payment: common::payment(),
            confirmed_at: now - Duration::seconds(5),
        },
        ConfirmedSubmission {
            signature: "sig-ancient".to_string(),
            payment: common::payment(),
            confirmed_at: now - Duration::hours(2),
        },
    ]);
    let job = ReconciliationJob::new(Arc::new(source), resolver.clone(), 60);

    let report = job.run_at(now).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 0);

    let record = resolver.find("sig-crashed").await.unwrap().expect("reconciled");
    assert_eq!(record.status, SubmissionStatus::Reconciled);

    // The optimistic write arriving late finds the record and creates nothing.
    let late = resolver.persist("sig-crashed", attributes()).await.unwrap();
    assert!(!late.created);
    assert_eq!(late.record.status, SubmissionStatus::Reconciled);

    let again = job.run_at(now).await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_history_lists_sender_records_newest_first() {
    let store = MemorySubmissionStore::new();
    let resolver = PostCommitResolver::new(Arc::new(store));

    resolver.persist("sig-a", attributes()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    resolver.persist("sig-b", attributes()).await.unwrap();

    let history = resolver.history("alice", 10).await.unwrap();
    let signatures: Vec<&str> = history.iter().map(|r| r.signature.as_str()).collect();
    assert_eq!(signatures, vec!["sig-b", "sig-a"]);

    assert!(resolver.history("carol", 10).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_store_is_unique_by_signature() {
    let pool = common::setup_test_db().await;
    let store = PostgresSubmissionStore::new(pool.clone());
    let resolver = PostCommitResolver::new(Arc::new(store));
    let signature = format!("sig-{}", Uuid::new_v4());

    let first = resolver.persist(&signature, attributes()).await.unwrap();
    let second = resolver.persist(&signature, attributes()).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(second.record.amount, first.record.amount);

    common::cleanup_test_data(&pool, "alice").await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_conflict_returns_existing_row() {
    let pool = common::setup_test_db().await;
    let store = PostgresSubmissionStore::new(pool.clone());
    let signature = format!("sig-{}", Uuid::new_v4());
    let record = payment_guard::models::SubmissionRecord::new(&signature, attributes());

    let (_, created) = store.create_if_absent(&record).await.unwrap();
    let (existing, created_again) = store.create_if_absent(&record).await.unwrap();

    assert!(created);
    assert!(!created_again);
    assert_eq!(existing.signature, signature);

    common::cleanup_test_data(&pool, "alice").await;
}
