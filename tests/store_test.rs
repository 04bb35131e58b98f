//! Uplift request store tests

mod common;

use common::form;
use phab_uplift::error::Error;
use phab_uplift::request::{NewUpliftRequest, ReplicationTarget};
use phab_uplift::store::{MemoryStore, RequestFilter, SqliteStore, UpliftStore};
use phab_uplift::types::{Phid, RevisionId, RevisionRef, UpliftStatus};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn new_request(revision: u64, repository: &str) -> NewUpliftRequest {
    NewUpliftRequest {
        revision_id: RevisionId(revision),
        repository: repository.to_string(),
        form: form(),
        requester_email: "dev@example.com".into(),
    }
}

fn target(id: u64) -> ReplicationTarget {
    ReplicationTarget {
        revision: RevisionRef {
            id: RevisionId(id),
            phid: Phid::from(format!("PHID-DREV-uplift-{id}")),
        },
        diff_phid: Phid::from(format!("PHID-DIFF-uplift-{id}")),
    }
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("requests.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        let request = store.insert(new_request(100, "mozilla-beta")).await.unwrap();
        store.record_replication(request.id, &target(5000)).await.unwrap();
        store.insert(new_request(99, "mozilla-beta")).await.unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    assert_eq!(store.path(), path.as_path());
    let reopened = store
        .find(RevisionId(100), "mozilla-beta")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reopened.status, UpliftStatus::Created);
    assert_eq!(reopened.target_revision_id, Some(RevisionId(5000)));
    assert_eq!(
        reopened.target_revision_phid,
        Some(Phid::from("PHID-DREV-uplift-5000"))
    );
    assert_eq!(reopened.form, form());
    assert_eq!(reopened.requester_email, "dev@example.com");
    assert_eq!(store.list(&RequestFilter::default()).await.unwrap().len(), 2);

    let err = store.insert(new_request(100, "mozilla-beta")).await.unwrap_err();
    assert!(err.is_conflict());

    // Ids keep increasing across reopen
    let next = store.insert(new_request(101, "mozilla-beta")).await.unwrap();
    assert_eq!(next.id, 3);
}

#[tokio::test]
async fn test_new_database_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("absent.db")).await.unwrap();

    assert!(store.list(&RequestFilter::default()).await.unwrap().is_empty());
    assert!(store.get(1).await.unwrap().is_none());
    assert!(
        store
            .find(RevisionId(1), "mozilla-beta")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_open_rejects_non_database_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("requests.db");
    std::fs::write(&path, "{ not a database }\n".repeat(256)).unwrap();

    let err = SqliteStore::open(&path).await.unwrap_err();

    assert!(matches!(err, Error::Persistence(_)), "{err}");
    assert!(err.to_string().contains("cannot open store"));
}

#[tokio::test]
async fn test_failed_mutation_leaves_row_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("requests.db")).await.unwrap();
    let request = store.insert(new_request(1, "mozilla-beta")).await.unwrap();

    assert_err!(
        store
            .transition(request.id, UpliftStatus::Created, UpliftStatus::Landed)
            .await
    );
    let err = store.record_replication(42, &target(1)).await.unwrap_err();
    assert!(matches!(err, Error::RequestNotFound(42)));

    assert_eq!(store.get(request.id).await.unwrap(), Some(request));
}

#[tokio::test]
async fn test_two_handles_share_the_natural_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("requests.db");
    let first = SqliteStore::open(&path).await.unwrap();
    let second = SqliteStore::open(&path).await.unwrap();

    let created = assert_ok!(first.insert(new_request(100, "mozilla-beta")).await);
    let err = second
        .insert(new_request(100, "mozilla-beta"))
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{err}");

    // A status change through one handle is seen by the other
    second
        .transition(created.id, UpliftStatus::Created, UpliftStatus::Approved)
        .await
        .unwrap();
    let err = first
        .transition(created.id, UpliftStatus::Created, UpliftStatus::Rejected)
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{err}");

    let rows = first.list(&RequestFilter::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, UpliftStatus::Approved);
}

#[tokio::test]
async fn test_transition_is_compare_and_set() {
    let store = MemoryStore::new();
    let request = store.insert(new_request(1, "mozilla-beta")).await.unwrap();

    let approved = store
        .transition(request.id, UpliftStatus::Created, UpliftStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, UpliftStatus::Approved);

    // A second caller still expecting `created` loses
    let err = store
        .transition(request.id, UpliftStatus::Created, UpliftStatus::Rejected)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let err = store
        .transition(request.id, UpliftStatus::Approved, UpliftStatus::Created)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let err = store
        .transition(77, UpliftStatus::Created, UpliftStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestNotFound(77)));
}

#[tokio::test]
async fn test_failure_then_retry_clears_error() {
    let store = MemoryStore::new();
    let request = store.insert(new_request(1, "mozilla-beta")).await.unwrap();

    let failed = store.record_failure(request.id, "diff upload failed").await.unwrap();
    assert_eq!(failed.status, UpliftStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("diff upload failed"));

    let retried = store
        .transition(request.id, UpliftStatus::Failed, UpliftStatus::Created)
        .await
        .unwrap();
    assert_eq!(retried.status, UpliftStatus::Created);
    assert!(retried.last_error.is_none());
    assert!(retried.updated_at >= failed.updated_at);
}

#[tokio::test]
async fn test_list_filters() {
    let store = MemoryStore::new();
    store.insert(new_request(1, "mozilla-beta")).await.unwrap();
    store.insert(new_request(1, "mozilla-release")).await.unwrap();
    let other = store.insert(new_request(2, "mozilla-beta")).await.unwrap();
    store.record_failure(other.id, "boom").await.unwrap();

    let by_revision = RequestFilter {
        revision_id: Some(RevisionId(1)),
        ..RequestFilter::default()
    };
    let by_repo = RequestFilter {
        repository: Some("mozilla-beta".into()),
        ..RequestFilter::default()
    };
    let failed = RequestFilter {
        status: Some(UpliftStatus::Failed),
        ..RequestFilter::default()
    };

    assert_eq!(store.list(&by_revision).await.unwrap().len(), 2);
    assert_eq!(store.list(&by_repo).await.unwrap().len(), 2);
    let failed = store.list(&failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].revision_id, RevisionId(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_have_one_winner() {
    let store = Arc::new(MemoryStore::new());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.insert(new_request(100, "mozilla-beta")).await })
        })
        .collect();

    let mut won = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(store.list(&RequestFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_across_handles_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("requests.db");
    let handles = [
        Arc::new(SqliteStore::open(&path).await.unwrap()),
        Arc::new(SqliteStore::open(&path).await.unwrap()),
    ];

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&handles[n % 2]);
            tokio::spawn(async move { store.insert(new_request(100, "mozilla-beta")).await })
        })
        .collect();

    let mut won = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(conflicts, 7);
    let reopened = SqliteStore::open(&path).await.unwrap();
    assert_eq!(reopened.list(&RequestFilter::default()).await.unwrap().len(), 1);
}
