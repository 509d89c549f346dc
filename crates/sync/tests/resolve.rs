mod common;

use assert_matches::assert_matches;
use fieldledger_core::conflict::{FieldChoice, FieldResolution, ServerState};
use fieldledger_core::decision::DecisionKind;
use fieldledger_core::operation::ResolutionStrategy;
use fieldledger_core::types::OperationId;
use fieldledger_sync::{QueueError, SyncError};
use serde_json::{json, Value};

use common::{harness, job_op, Harness};

/// Queue an operation on J1 that conflicts with a concurrent server edit.
async fn conflicted(h: &Harness) -> OperationId {
    h.remote.set_state(
        "acme",
        "job",
        "J1",
        json!({"status": "cancelled", "notes": "customer called"}),
    );
    let id = h
        .ctx
        .queue()
        .enqueue(
            job_op(
                "acme",
                "finish-job",
                "J1",
                json!({"status": "finished", "notes": "all done"}),
            )
            .with_prior_payload(json!({"status": "in_progress", "notes": ""})),
        )
        .await
        .unwrap();
    h.ctx.coordinator().drain("acme").await.unwrap();
    id
}

fn server_fields(h: &Harness) -> Value {
    match h.remote.state("acme", "job", "J1") {
        Some(ServerState::Current(fields)) => Value::Object(fields),
        other => panic!("unexpected server state {other:?}"),
    }
}

#[tokio::test]
async fn keep_server_discards_the_local_change() {
    let h = harness();
    let id = conflicted(&h).await;

    let resolved = h
        .ctx
        .coordinator()
        .resolve_conflict("acme", id, ResolutionStrategy::KeepServer, &[])
        .await
        .unwrap();

    let detail = resolved.conflict.unwrap();
    assert_eq!(detail.resolution, Some(ResolutionStrategy::KeepServer));
    assert!(detail.resolved_at.is_some());
    assert!(h.remote.applied().is_empty());
    assert_matches!(
        h.ctx.queue().get("acme", id).await,
        Err(QueueError::NotFound(_))
    );

    let records = h.ctx.ledger().records("acme").await.unwrap();
    let last = records.last().unwrap();
    assert_eq!(last.kind, DecisionKind::OfflineConflictResolved);
    assert_eq!(last.after["resolution"], json!("keep_server"));
    assert!(h.ctx.ledger().verify("acme").await.unwrap().intact);
}

#[tokio::test]
async fn keep_local_pushes_the_local_payload() {
    let h = harness();
    let id = conflicted(&h).await;

    h.ctx
        .coordinator()
        .resolve_conflict("acme", id, ResolutionStrategy::KeepLocal, &[])
        .await
        .unwrap();

    assert_eq!(
        server_fields(&h),
        json!({"status": "finished", "notes": "all done"})
    );
}

#[tokio::test]
async fn merge_applies_field_choices_over_the_server_snapshot() {
    let h = harness();
    let id = conflicted(&h).await;

    let choices = [
        FieldChoice {
            field: "status".into(),
            resolution: FieldResolution::Local,
        },
        FieldChoice {
            field: "notes".into(),
            resolution: FieldResolution::Custom(json!("customer called; finished anyway")),
        },
    ];
    let resolved = h
        .ctx
        .coordinator()
        .resolve_conflict("acme", id, ResolutionStrategy::Merge, &choices)
        .await
        .unwrap();

    let expected = json!({"status": "finished", "notes": "customer called; finished anyway"});
    assert_eq!(resolved.payload, expected);
    assert_eq!(server_fields(&h), expected);
}

#[tokio::test]
async fn pushing_a_resolution_needs_connectivity() {
    let h = harness();
    let id = conflicted(&h).await;
    h.connectivity.set_online(false);

    assert_matches!(
        h.ctx
            .coordinator()
            .resolve_conflict("acme", id, ResolutionStrategy::KeepLocal, &[])
            .await,
        Err(SyncError::Offline)
    );

    // Still waiting for resolution, and manual settlement works offline.
    assert_eq!(h.ctx.queue().list_conflicted("acme").await.unwrap().len(), 1);
    h.ctx
        .coordinator()
        .resolve_conflict("acme", id, ResolutionStrategy::Manual, &[])
        .await
        .unwrap();
    assert!(h.ctx.queue().list_conflicted("acme").await.unwrap().is_empty());
}

#[tokio::test]
async fn only_conflicted_operations_can_be_resolved() {
    let h = harness();
    h.connectivity.set_online(false);
    let id = h
        .ctx
        .queue()
        .enqueue(job_op("acme", "add-note", "J1", json!({"note": "x"})))
        .await
        .unwrap();

    assert_matches!(
        h.ctx
            .coordinator()
            .resolve_conflict("acme", id, ResolutionStrategy::KeepServer, &[])
            .await,
        Err(SyncError::NotConflicted(found)) if found == id
    );
}

#[tokio::test]
async fn unresolved_conflicts_cannot_be_removed() {
    let h = harness();
    let id = conflicted(&h).await;

    assert_matches!(
        h.ctx.queue().remove("acme", id).await,
        Err(QueueError::UnresolvedConflict(_))
    );
}
