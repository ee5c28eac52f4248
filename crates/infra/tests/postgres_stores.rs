//! Postgres adapter tests. They need a scratch database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/stockroom_test cargo test -p stockroom-infra -- --ignored
//! ```

use std::sync::Arc;

use serde_json::{Map, Value, json};
use sqlx::PgPool;
use stockroom_core::{NumberFormat, SequenceKey};
use stockroom_infra::{
    DocumentStore, DocumentStoreError, PostgresCounterStore, PostgresDocumentStore,
    PostgresQuarantine, db,
};
use stockroom_numbering::{
    AllocationError, CounterStore, CounterStoreError, KeyQuarantine, NumberAllocator,
};

async fn pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = db::connect(&url).await.expect("connect to DATABASE_URL");
    db::ensure_schema(&pool).await.expect("schema");
    Some(pool)
}

/// Key and collection names no other run has used.
fn fresh(tag: &str) -> (SequenceKey, String) {
    let run = uuid::Uuid::now_v7().simple().to_string();
    let key = format!("{tag}{}-2026", &run[24..]).to_uppercase();
    (key.parse().unwrap(), format!("{tag}-{run}").to_lowercase())
}

fn body(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_allocation_issues_each_number_once() {
    let Some(pool) = pool().await else { return };
    let counters = Arc::new(PostgresCounterStore::new(pool));
    let (key, _) = fresh("ALC");

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let counters = counters.clone();
            let key = key.clone();
            tokio::spawn(async move { counters.allocate_next(&key).await.unwrap() })
        })
        .collect();

    let mut seqs = Vec::new();
    for h in handles {
        seqs.push(h.await.unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=50).collect::<Vec<u64>>());
    assert_eq!(counters.peek(&key).await.unwrap(), 50);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn raise_floor_only_moves_up() {
    let Some(pool) = pool().await else { return };
    let counters = PostgresCounterStore::new(pool);
    let (key, _) = fresh("FLR");

    assert_eq!(counters.raise_floor(&key, 10).await.unwrap(), 10);
    assert_eq!(counters.raise_floor(&key, 4).await.unwrap(), 10);
    assert_eq!(counters.allocate_next(&key).await.unwrap(), 11);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn quarantine_is_shared_through_the_database() {
    let Some(pool) = pool().await else { return };
    let (key, _) = fresh("QRN");

    let detector = KeyQuarantine::with_store(PostgresQuarantine::new(pool.clone()));
    let counters = PostgresCounterStore::new(pool.clone());
    counters.allocate_next(&key).await.unwrap();
    assert!(detector.block(&key, "seq 1 stored twice").await.unwrap());

    // The counter statement itself refuses the key.
    assert_eq!(
        counters.allocate_next(&key).await,
        Err(CounterStoreError::Quarantined(key.clone()))
    );

    // So does an allocator started later with its own handle.
    let other_process = NumberAllocator::with_quarantine(
        PostgresCounterStore::new(pool.clone()),
        NumberFormat::default(),
        KeyQuarantine::with_store(PostgresQuarantine::new(pool.clone())),
    );
    assert_eq!(
        other_process.next_for_key(&key).await,
        Err(AllocationError::DuplicateNumberDetected { key: key.clone() })
    );
    assert_eq!(counters.peek(&key).await.unwrap(), 1);

    let released = other_process.quarantine().release(&key).await.unwrap();
    assert_eq!(released.map(|e| e.reason), Some("seq 1 stored twice".to_string()));
    assert_eq!(other_process.next_for_key(&key).await.unwrap().seq(), 2);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn colliding_numbered_insert_rolls_back_and_quarantines() {
    let Some(pool) = pool().await else { return };
    let (key, collection) = fresh("DUP");
    let quarantine = KeyQuarantine::with_store(PostgresQuarantine::new(pool.clone()));
    let documents =
        PostgresDocumentStore::new(pool.clone(), NumberFormat::default(), quarantine.clone());
    let counters = PostgresCounterStore::new(pool);

    let imported = format!("{key}-1");
    documents
        .insert(&collection, body(json!({ "number": imported })), Some("number"))
        .await
        .unwrap();

    let err = documents
        .insert_numbered(&collection, Map::new(), "number", &key)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DocumentStoreError::DuplicateNumber {
            collection: collection.clone(),
            number: imported,
            key: Some(key.clone()),
        }
    );

    // The increment was part of the failed transaction.
    assert_eq!(counters.peek(&key).await.unwrap(), 0);
    assert!(quarantine.is_blocked(&key).await.unwrap());
    assert_eq!(documents.list(&collection).await.unwrap().len(), 1);

    quarantine.release(&key).await.unwrap();
}
