mod common;

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tourbot::errors::StoreError;
use tourbot::store::{DateRange, InMemorySubmissionStore, ListQuery, SubmissionStore};

use common::submission;

#[tokio::test]
async fn test_concurrent_creates_get_unique_increasing_ids() {
    let store = Arc::new(InMemorySubmissionStore::new());

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create(submission(i, "Турция", 50_000)).await.unwrap().id })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 50);
    ids.sort_unstable();
    assert_eq!(ids, (1..=50).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_delete_returns_record_and_get_reports_not_found() {
    let store = InMemorySubmissionStore::new();
    let created = store.create(submission(1, "Египет", 70_000)).await.unwrap();

    let deleted = store.delete(created.id).await.unwrap();
    assert_eq!(deleted, created);
    assert!(matches!(store.get(created.id).await, Err(StoreError::NotFound(id)) if id == created.id));
    assert!(matches!(store.delete(created.id).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_list_is_newest_first_and_limited() {
    let store = InMemorySubmissionStore::new();
    for (i, destination) in ["Турция", "Египет", "ОАЭ", "Таиланд"].iter().enumerate() {
        store.create(submission(i as i64, destination, 20_000)).await.unwrap();
    }

    let all = store.list(ListQuery::all()).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    assert_eq!(all[0].destination, "Таиланд");

    let recent = store.list(ListQuery::recent(2)).await.unwrap();
    assert_eq!(recent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 3]);
}

#[tokio::test]
async fn test_aggregate_and_ranges() {
    let store = InMemorySubmissionStore::new();
    store.create(submission(1, "Турция", 50_000)).await.unwrap();
    store.create(submission(1, "Египет", 30_000)).await.unwrap();
    store.create(submission(2, "Турция", 20_000)).await.unwrap();

    let overall = store.aggregate(None).await.unwrap();
    assert_eq!(overall.count, 3);
    assert_eq!(overall.budget_sum, 100_000);
    assert_eq!(overall.unique_users, 2);

    let future = store
        .aggregate(Some(DateRange::since(Utc::now() + Duration::hours(1))))
        .await
        .unwrap();
    assert_eq!(future.count, 0);
    assert_eq!(future.budget_sum, 0);

    let window = DateRange::between(Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1));
    assert_eq!(store.list(ListQuery::within(window)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_distinct_user_ids() {
    let store = InMemorySubmissionStore::new();
    for user in [5, 3, 5, 9, 3] {
        store.create(submission(user, "Грузия", 15_000)).await.unwrap();
    }
    assert_eq!(store.distinct_user_ids().await.unwrap(), vec![3, 5, 9]);
}
