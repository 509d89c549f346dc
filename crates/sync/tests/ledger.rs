mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use fieldledger_core::chain::{BreakReason, GENESIS_DIGEST};
use fieldledger_core::decision::{DecisionKind, DecisionOrigin, Severity};
use fieldledger_core::record::DecisionDraft;
use fieldledger_events::SyncEventKind;
use fieldledger_sync::{DecisionQuery, LedgerError};
use serde_json::json;

use common::{harness, Harness};

fn note(job_id: &str, n: usize) -> DecisionDraft {
    DecisionDraft::new(
        DecisionKind::JobNoteAdded,
        DecisionOrigin::Human,
        "job",
        job_id,
        "add-note",
        json!({"note": format!("note {n}")}),
    )
    .with_actor("u1")
}

async fn seed(h: &Harness, tenant_id: &str, n: usize) {
    for i in 0..n {
        h.ctx.ledger().append(tenant_id, note("J1", i)).await.unwrap();
        h.clock.advance(Duration::seconds(30));
    }
}

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_links_records_from_genesis() {
    let h = harness();
    seed(&h, "acme", 3).await;

    let records = h.ctx.ledger().records("acme").await.unwrap();
    let sequences: Vec<_> = records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(records[0].previous_digest, GENESIS_DIGEST);
    assert_eq!(records[1].previous_digest, records[0].digest);
    assert_eq!(records[2].previous_digest, records[1].digest);
    assert!(records.iter().all(|r| r.severity == Severity::Low));
}

#[tokio::test]
async fn tenants_have_independent_chains() {
    let h = harness();
    seed(&h, "acme", 2).await;
    seed(&h, "globex", 1).await;

    let globex = h.ctx.ledger().records("globex").await.unwrap();
    assert_eq!(globex.len(), 1);
    assert_eq!(globex[0].sequence, 1);
    assert_eq!(globex[0].previous_digest, GENESIS_DIGEST);
}

#[tokio::test]
async fn human_records_require_an_actor() {
    let h = harness();
    let mut draft = note("J1", 0);
    draft.actor_id = None;

    assert_matches!(
        h.ctx.ledger().append("acme", draft).await,
        Err(LedgerError::ActorRequired)
    );
    assert_matches!(
        h.ctx.ledger().append("", note("J1", 0)).await,
        Err(LedgerError::TenantRequired)
    );
}

#[tokio::test]
async fn concurrent_appends_serialise_per_tenant() {
    let h = harness();
    let mut tasks = Vec::new();
    for i in 0..4 {
        let ledger = h.ctx.ledger().clone();
        tasks.push(tokio::spawn(async move {
            ledger.append("acme", note("J1", i)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let verification = h.ctx.ledger().verify("acme").await.unwrap();
    assert!(verification.intact);
    assert_eq!(verification.verified_entries, 4);
}

#[tokio::test]
async fn clock_going_backwards_never_regresses_timestamps() {
    let h = harness();
    seed(&h, "acme", 1).await;
    h.clock.advance(Duration::hours(-2));
    h.ctx.ledger().append("acme", note("J1", 1)).await.unwrap();

    let records = h.ctx.ledger().records("acme").await.unwrap();
    assert!(records[1].timestamp >= records[0].timestamp);
    assert!(h.ctx.ledger().verify("acme").await.unwrap().intact);
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chains_of_any_length_verify_until_tampered() {
    for n in 0..=5usize {
        let h = harness();
        seed(&h, "acme", n).await;

        let clean = h.ctx.ledger().verify("acme").await.unwrap();
        assert!(clean.intact, "untouched chain of {n} should verify");
        assert_eq!(clean.verified_entries, n);

        if n < 3 {
            continue;
        }

        let mut third = h.ctx.ledger().records("acme").await.unwrap().remove(2);
        third.severity = Severity::Critical;
        assert!(h.store.replace_record(third));

        let tampered = h.ctx.ledger().verify("acme").await.unwrap();
        assert!(!tampered.intact, "tampered chain of {n} should fail");
        assert_eq!(tampered.intact_through, 2);
        let brk = tampered.first_break.as_ref().unwrap();
        assert_eq!(brk.sequence, 3);
        assert_eq!(brk.reason, BreakReason::SeverityMismatch);
        assert!(tampered.is_record_intact(2));
        assert!(!tampered.is_record_intact(3));
    }
}

#[tokio::test]
async fn payload_tampering_fails_the_single_record_check() {
    let h = harness();
    seed(&h, "acme", 2).await;

    let mut first = h.ctx.ledger().records("acme").await.unwrap().remove(0);
    assert!(h.ctx.ledger().verify_one(&first));
    first.after = json!({"note": "rewritten"});
    assert!(!h.ctx.ledger().verify_one(&first));
    assert!(h.store.replace_record(first));

    let result = h.ctx.ledger().verify("acme").await.unwrap();
    assert_eq!(result.first_break.unwrap().reason, BreakReason::DigestMismatch);
}

#[tokio::test]
async fn break_publishes_an_integrity_alert() {
    let h = harness();
    seed(&h, "acme", 3).await;
    let mut second = h.ctx.ledger().records("acme").await.unwrap().remove(1);
    second.entity_id = "J2".into();
    h.store.replace_record(second.clone());

    let mut events = h.ctx.bus().subscribe();
    h.ctx.ledger().verify("acme").await.unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.tenant_id.as_deref(), Some("acme"));
    assert_matches!(
        event.kind,
        SyncEventKind::IntegrityAlert { sequence: 2, record_id, .. } if record_id == second.id
    );
}

#[tokio::test]
async fn empty_chain_reports_the_genesis_tail() {
    let h = harness();
    let result = h.ctx.ledger().verify("acme").await.unwrap();
    assert!(result.intact);
    assert_eq!(result.verified_entries, 0);
    assert_eq!(result.tail_digest, GENESIS_DIGEST);
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn query_filters_and_returns_newest_first() {
    let h = harness();
    seed(&h, "acme", 3).await;
    h.ctx
        .ledger()
        .append(
            "acme",
            DecisionDraft::new(
                DecisionKind::JobFinished,
                DecisionOrigin::Human,
                "job",
                "J2",
                "finish-job",
                json!({"status": "finished"}),
            )
            .with_actor("u2"),
        )
        .await
        .unwrap();

    let all = h
        .ctx
        .ledger()
        .query("acme", &DecisionQuery::default())
        .await
        .unwrap();
    assert_eq!(all.first().unwrap().sequence, 4);
    assert_eq!(all.last().unwrap().sequence, 1);

    let finished = h
        .ctx
        .ledger()
        .query(
            "acme",
            &DecisionQuery {
                severities: vec![Severity::High],
                ..DecisionQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].actor_id.as_deref(), Some("u2"));

    let stats = h
        .ctx
        .ledger()
        .statistics("acme", &DecisionQuery::default())
        .await
        .unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.human, 4);
}
