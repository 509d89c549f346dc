//! Behaviour every `TenantScopedStore` must share, exercised against both
//! the in-memory and the SQLite implementation.

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use fieldledger_core::action::ActionKind;
use fieldledger_core::chain::{verify_chain, GENESIS_DIGEST};
use fieldledger_core::decision::{DecisionKind, DecisionOrigin};
use fieldledger_core::operation::{
    ConflictDetail, ConflictKind, NewOperation, OfflineOperation, OperationStatus,
};
use fieldledger_core::record::{DecisionDraft, DecisionRecord};
use fieldledger_core::types::Timestamp;
use fieldledger_db::{MemoryStore, SqliteStore, StoreError, TenantScopedStore};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn sqlite_store() -> SqliteStore {
    let pool = fieldledger_db::create_memory_pool().await.unwrap();
    fieldledger_db::health_check(&pool).await.unwrap();
    fieldledger_db::run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 1, 29, 8, 0, 0).unwrap()
}

fn op(tenant: &str, entity_id: &str, at: Timestamp) -> OfflineOperation {
    let input = NewOperation::new(tenant, "u1", "finish-job", "job", entity_id, json!({"status": "done"}))
        .with_prior_payload(json!({"status": "running"}));
    OfflineOperation::pending(uuid::Uuid::now_v7(), input, ActionKind::FinishJob, at)
}

fn record(tenant: &str, sequence: i64, previous: &str) -> DecisionRecord {
    let draft = DecisionDraft::new(
        DecisionKind::JobFinished,
        DecisionOrigin::Human,
        "job",
        format!("J{sequence}"),
        "finish",
        json!({"status": "done"}),
    )
    .with_actor("u1");
    DecisionRecord::seal(
        draft,
        uuid::Uuid::now_v7(),
        tenant,
        sequence,
        t0() + Duration::seconds(sequence),
        previous,
    )
}

// ---------------------------------------------------------------------------
// Contract checks
// ---------------------------------------------------------------------------

async fn round_trips_operations(store: &dyn TenantScopedStore) {
    let mut op = op("acme", "J1", t0());
    store.insert_pending_bounded(&op, 100).await.unwrap();

    let loaded = store.get_operation("acme", op.id).await.unwrap().unwrap();
    assert_eq!(loaded, op);

    op.apply_transition(OperationStatus::Syncing, None, t0(), 3).unwrap();
    let detail = ConflictDetail::new(ConflictKind::DataDeleted, "gone", op.payload.clone());
    op.apply_transition(OperationStatus::Conflicted, Some(detail), t0(), 3)
        .unwrap();
    store.update_operation(&op).await.unwrap();

    let loaded = store.get_operation("acme", op.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OperationStatus::Conflicted);
    assert_eq!(loaded.attempts, 1);
    assert_eq!(loaded.conflict.unwrap().kind, ConflictKind::DataDeleted);
}

async fn isolates_tenants(store: &dyn TenantScopedStore) {
    let a = op("acme", "J1", t0());
    let b = op("globex", "J1", t0());
    store.insert_pending_bounded(&a, 100).await.unwrap();
    store.insert_pending_bounded(&b, 100).await.unwrap();

    assert!(store.get_operation("globex", a.id).await.unwrap().is_none());
    assert!(!store.delete_operation("globex", a.id).await.unwrap());

    let pending = store
        .list_operations("acme", &[OperationStatus::Pending])
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, a.id);

    assert_eq!(store.purge_operations("globex").await.unwrap(), 1);
    assert_eq!(
        store.count_operations("acme", OperationStatus::Pending).await.unwrap(),
        1
    );

    assert_matches!(
        store.list_operations("", &[OperationStatus::Pending]).await,
        Err(StoreError::TenantRequired)
    );
}

async fn orders_by_client_time_then_insertion(store: &dyn TenantScopedStore) {
    let late = op("acme", "J1", t0() + Duration::minutes(5));
    let early = op("acme", "J2", t0());
    let tie = op("acme", "J3", t0());
    for o in [&late, &early, &tie] {
        store.insert_pending_bounded(o, 100).await.unwrap();
    }

    let ids: Vec<_> = store
        .list_operations("acme", &[OperationStatus::Pending])
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids, vec![early.id, tie.id, late.id]);
}

async fn enforces_capacity(store: &dyn TenantScopedStore) {
    let first = op("acme", "J1", t0());
    store.insert_pending_bounded(&first, 2).await.unwrap();
    store
        .insert_pending_bounded(&op("acme", "J2", t0()), 2)
        .await
        .unwrap();

    assert_matches!(
        store.insert_pending_bounded(&op("acme", "J3", t0()), 2).await,
        Err(StoreError::CapacityExceeded { limit: 2, .. })
    );
    // Other tenants are unaffected.
    store
        .insert_pending_bounded(&op("globex", "J3", t0()), 2)
        .await
        .unwrap();

    assert!(store.delete_operation("acme", first.id).await.unwrap());
    store
        .insert_pending_bounded(&op("acme", "J4", t0()), 2)
        .await
        .unwrap();
}

async fn appends_with_compare_and_swap(store: &dyn TenantScopedStore) {
    assert_eq!(store.chain_tail("acme").await.unwrap().digest, GENESIS_DIGEST);

    let first = record("acme", 1, GENESIS_DIGEST);
    store.append_record(&first, GENESIS_DIGEST).await.unwrap();

    // A second writer that still believes the chain is empty loses.
    let stale = record("acme", 1, GENESIS_DIGEST);
    assert_matches!(
        store.append_record(&stale, GENESIS_DIGEST).await,
        Err(StoreError::TailMismatch { .. })
    );

    let second = record("acme", 2, &first.digest);
    store.append_record(&second, &first.digest).await.unwrap();

    let tail = store.chain_tail("acme").await.unwrap();
    assert_eq!(tail.sequence, 2);
    assert_eq!(tail.digest, second.digest);
    assert_eq!(tail.timestamp, Some(second.timestamp));

    // Chains are per tenant.
    assert_eq!(store.chain_tail("globex").await.unwrap().sequence, 0);

    let records = store.list_records("acme").await.unwrap();
    assert_eq!(records, vec![first, second]);
    assert!(verify_chain("acme", &records, t0()).intact);

    assert_eq!(store.list_tenants().await.unwrap(), vec!["acme".to_string()]);
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_round_trips_operations() {
    round_trips_operations(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_isolates_tenants() {
    isolates_tenants(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_orders_pending() {
    orders_by_client_time_then_insertion(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_enforces_capacity() {
    enforces_capacity(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_appends_with_cas() {
    appends_with_compare_and_swap(&MemoryStore::new()).await;
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_round_trips_operations() {
    round_trips_operations(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_isolates_tenants() {
    isolates_tenants(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_orders_pending() {
    orders_by_client_time_then_insertion(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_enforces_capacity() {
    enforces_capacity(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_appends_with_cas() {
    appends_with_compare_and_swap(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_rejects_record_updates() {
    let store = sqlite_store().await;
    let first = record("acme", 1, GENESIS_DIGEST);
    store.append_record(&first, GENESIS_DIGEST).await.unwrap();

    let result = sqlx::query("UPDATE decision_records SET severity = 'low'")
        .execute(store.pool())
        .await;
    assert!(result.is_err());

    let result = sqlx::query("DELETE FROM decision_records")
        .execute(store.pool())
        .await;
    assert!(result.is_err());
    assert_eq!(store.list_records("acme").await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_surfaces_severity_tampering() {
    let store = sqlite_store().await;
    let mut previous = GENESIS_DIGEST.to_string();
    for seq in 1..=3 {
        let r = record("acme", seq, &previous);
        store.append_record(&r, &previous).await.unwrap();
        previous = r.digest;
    }

    sqlx::query("DROP TRIGGER trg_decision_records_no_update")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE decision_records SET severity = 'low' WHERE sequence = 2")
        .execute(store.pool())
        .await
        .unwrap();

    let records = store.list_records("acme").await.unwrap();
    let result = verify_chain("acme", &records, t0());
    assert!(!result.intact);
    assert_eq!(result.first_break.unwrap().sequence, 2);
}
