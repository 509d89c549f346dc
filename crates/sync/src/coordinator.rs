//! Drains a tenant's queue to the remote system of record.
//!
//! One drain per tenant at a time: a second request while one is running
//! is rejected, not queued. Within a drain, operations are processed one at
//! a time in `created_at_local` order so that a pause/resume/finish sequence
//! on the same job is never applied out of order.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::SubsecRound;
use fieldledger_core::clock::Clock;
use fieldledger_core::config::SyncLimits;
use fieldledger_core::conflict::{self, Classification, FieldChoice};
use fieldledger_core::decision::{DecisionKind, DecisionOrigin};
use fieldledger_core::operation::{
    ConflictDetail, ConflictKind, OfflineOperation, OperationStatus, ResolutionStrategy,
};
use fieldledger_core::record::DecisionDraft;
use fieldledger_core::types::{OperationId, Timestamp};
use fieldledger_events::{EventBus, SyncEvent, SyncEventKind};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncError;
use crate::ledger::AuditLedger;
use crate::queue::OperationQueue;
use crate::remote::{ApplyOutcome, RemoteEndpoint, RemoteError};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one operation during a drain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    Synced,
    /// Server already had the change. Counted as synced.
    Duplicate,
    Conflicted { kind: ConflictKind },
    Failed { error: String, exhausted: bool },
    /// Skipped because an earlier operation on the same target failed or
    /// is waiting on conflict resolution.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub operation_id: OperationId,
    pub entity: String,
    pub entity_id: String,
    #[serde(flatten)]
    pub outcome: OperationOutcome,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub tenant_id: String,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub expired: usize,
    /// Operations an interrupted earlier pass left Syncing or Synced.
    pub recovered: usize,
    pub synced: usize,
    pub conflicted: usize,
    pub failed: usize,
    pub deferred: usize,
    pub operations: Vec<OperationReport>,
}

impl SyncReport {
    fn record(&mut self, op: &OfflineOperation, outcome: OperationOutcome) {
        match &outcome {
            OperationOutcome::Synced | OperationOutcome::Duplicate => self.synced += 1,
            OperationOutcome::Conflicted { .. } => self.conflicted += 1,
            OperationOutcome::Failed { .. } => self.failed += 1,
            OperationOutcome::Deferred => self.deferred += 1,
        }
        self.operations.push(OperationReport {
            operation_id: op.id,
            entity: op.entity.clone(),
            entity_id: op.entity_id.clone(),
            outcome,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    Completed(SyncReport),
    /// Device offline. Expiry still ran.
    Offline { expired: usize },
}

/// Last-known sync state per tenant, for status display.
#[derive(Debug, Clone, Default)]
pub(crate) struct SyncHistory {
    pub last_sync_at: Option<Timestamp>,
    pub last_sync_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct SyncCoordinator {
    queue: Arc<OperationQueue>,
    ledger: Arc<AuditLedger>,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    limits: SyncLimits,
    draining: Mutex<HashSet<String>>,
    history: Mutex<HashMap<String, SyncHistory>>,
}

/// Releases the tenant's drain slot when dropped, including on early return.
struct DrainGuard<'a> {
    draining: &'a Mutex<HashSet<String>>,
    tenant_id: String,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        lock(self.draining).remove(&self.tenant_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SyncCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<OperationQueue>,
        ledger: Arc<AuditLedger>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        limits: SyncLimits,
    ) -> Self {
        Self {
            queue,
            ledger,
            remote,
            connectivity,
            bus,
            clock,
            limits,
            draining: Mutex::new(HashSet::new()),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_draining(&self, tenant_id: &str) -> bool {
        lock(&self.draining).contains(tenant_id)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub(crate) fn history(&self, tenant_id: &str) -> SyncHistory {
        lock(&self.history)
            .get(tenant_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a drain would find anything to do.
    pub async fn has_work(&self, tenant_id: &str) -> Result<bool, SyncError> {
        Ok(!self.queue.list_syncable(tenant_id).await?.is_empty()
            || !self.queue.list_unsettled(tenant_id).await?.is_empty())
    }

    fn begin_drain(&self, tenant_id: &str) -> Result<DrainGuard<'_>, SyncError> {
        if !lock(&self.draining).insert(tenant_id.to_string()) {
            return Err(SyncError::AlreadyDraining(tenant_id.to_string()));
        }
        Ok(DrainGuard {
            draining: &self.draining,
            tenant_id: tenant_id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Drain
    // -----------------------------------------------------------------------

    /// Run one sync pass for `tenant_id`.
    ///
    /// Work an interrupted earlier pass left behind is settled first, then
    /// stale operations expire. Both happen even when offline. Each round
    /// trip is bounded by `round_trip_timeout` and a timeout counts as a
    /// transport failure.
    pub async fn drain(&self, tenant_id: &str) -> Result<DrainOutcome, SyncError> {
        if tenant_id.trim().is_empty() {
            return Err(SyncError::TenantRequired);
        }
        let _guard = self.begin_drain(tenant_id)?;

        let result = self.run_drain(tenant_id).await;
        match &result {
            Ok(DrainOutcome::Completed(report)) => {
                let mut history = lock(&self.history);
                let entry = history.entry(tenant_id.to_string()).or_default();
                entry.last_sync_at = Some(report.finished_at);
                entry.last_sync_error = (report.failed > 0)
                    .then(|| format!("{} operation(s) failed to sync", report.failed));
            }
            Ok(DrainOutcome::Offline { .. }) => {}
            Err(e) => {
                tracing::error!(tenant_id, error = %e, "Drain aborted");
                lock(&self.history)
                    .entry(tenant_id.to_string())
                    .or_default()
                    .last_sync_error = Some(e.to_string());
                self.bus.publish(
                    SyncEvent::new(SyncEventKind::SyncFailed {
                        error: e.to_string(),
                    })
                    .with_tenant(tenant_id),
                );
            }
        }
        result
    }

    async fn run_drain(&self, tenant_id: &str) -> Result<DrainOutcome, SyncError> {
        let recovered = self.recover_interrupted(tenant_id).await?;
        let expired = self
            .queue
            .expire(tenant_id, self.limits.max_age)
            .await?
            .len();

        if !self.connectivity.is_online() {
            tracing::debug!(tenant_id, expired, "Offline, skipping sync pass");
            return Ok(DrainOutcome::Offline { expired });
        }

        self.bus
            .publish(SyncEvent::new(SyncEventKind::DrainStarted).with_tenant(tenant_id));

        let mut report = SyncReport {
            tenant_id: tenant_id.to_string(),
            started_at: self.clock.now(),
            finished_at: self.clock.now(),
            expired,
            recovered,
            synced: 0,
            conflicted: 0,
            failed: 0,
            deferred: 0,
            operations: Vec::new(),
        };

        // Targets whose earlier operation has not been applied: an unresolved
        // conflict or exhausted failure from before, or a failure or conflict
        // in this pass.
        let mut blocked: HashSet<(String, String)> = self
            .queue
            .list_conflicted(tenant_id)
            .await?
            .into_iter()
            .chain(self.queue.list_exhausted(tenant_id).await?)
            .map(|op| (op.entity, op.entity_id))
            .collect();

        for op in self.queue.list_syncable(tenant_id).await? {
            let target = (op.entity.clone(), op.entity_id.clone());
            if blocked.contains(&target) {
                report.record(&op, OperationOutcome::Deferred);
                continue;
            }

            let outcome = self.sync_one(tenant_id, op.id).await?;
            if matches!(
                outcome,
                OperationOutcome::Failed { .. } | OperationOutcome::Conflicted { .. }
            ) {
                blocked.insert(target);
            }
            report.record(&op, outcome);
        }

        report.finished_at = self.clock.now();
        tracing::info!(
            tenant_id,
            synced = report.synced,
            conflicted = report.conflicted,
            failed = report.failed,
            deferred = report.deferred,
            expired = report.expired,
            recovered = report.recovered,
            "Sync pass completed"
        );
        self.bus.publish(
            SyncEvent::new(SyncEventKind::DrainCompleted {
                synced: report.synced,
                conflicted: report.conflicted,
                failed: report.failed,
                expired: report.expired,
            })
            .with_tenant(tenant_id),
        );

        Ok(DrainOutcome::Completed(report))
    }

    /// Settle operations an earlier pass left mid-flight.
    ///
    /// Holding the drain slot means nothing else is working on them. A
    /// Syncing operation already spent its attempt and becomes Failed. A
    /// Synced one gets its definitive record if it is missing and leaves
    /// the queue.
    async fn recover_interrupted(&self, tenant_id: &str) -> Result<usize, SyncError> {
        let mut recovered = 0;
        for op in self.queue.list_unsettled(tenant_id).await? {
            match op.status {
                OperationStatus::Syncing => {
                    let failed = self
                        .queue
                        .mark_status(tenant_id, op.id, OperationStatus::Failed, None)
                        .await?;
                    tracing::warn!(
                        tenant_id,
                        operation_id = %op.id,
                        attempts = failed.attempts,
                        "Interrupted sync attempt marked failed"
                    );
                }
                OperationStatus::Synced => {
                    if !self.is_recorded(&op).await? {
                        self.ledger.append(tenant_id, synced_draft(&op)).await?;
                    }
                    self.queue.remove(tenant_id, op.id).await?;
                    tracing::warn!(
                        tenant_id,
                        operation_id = %op.id,
                        "Recorded operation left synced by an interrupted pass"
                    );
                }
                _ => continue,
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Whether the definitive record for a Synced operation made it into
    /// the ledger. Records are time-ordered, so only the tail since
    /// `synced_at` is searched.
    async fn is_recorded(&self, op: &OfflineOperation) -> Result<bool, SyncError> {
        let Some(synced_at) = op.synced_at else {
            return Ok(false);
        };
        let since = synced_at.trunc_subsecs(6);
        let kind = op.action.decision_kind();
        let records = self.ledger.records(op.tenant_id()).await?;
        Ok(records
            .iter()
            .rev()
            .take_while(|r| r.timestamp >= since)
            .any(|r| {
                r.kind == kind
                    && r.entity == op.entity
                    && r.entity_id == op.entity_id
                    && r.after == op.payload
            }))
    }

    async fn sync_one(&self, tenant_id: &str, id: OperationId) -> Result<OperationOutcome, SyncError> {
        let op = self
            .queue
            .mark_status(tenant_id, id, OperationStatus::Syncing, None)
            .await?;

        let server = match self
            .round_trip(self.remote.fetch_current_state(tenant_id, &op.entity, &op.entity_id))
            .await
        {
            Ok(state) => state,
            Err(e) => return self.fail(&op, e).await,
        };

        let classification = match conflict::classify(&op, &server) {
            Classification::Safe => match self.round_trip(self.remote.apply(&op)).await {
                Ok(ApplyOutcome::Applied) => Classification::Safe,
                Ok(ApplyOutcome::Rejected { reason }) => Classification::Invalid { reason },
                Err(e) => return self.fail(&op, e).await,
            },
            other => other,
        };

        match conflict::conflict_detail(&op, &classification, &server) {
            None => self.complete(&op, &classification).await,
            Some(detail) => self.conflict(&op, detail).await,
        }
    }

    async fn round_trip<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.limits.round_trip_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    /// Safe or Duplicate: mark Synced, record the decision, drop from queue.
    async fn complete(
        &self,
        op: &OfflineOperation,
        classification: &Classification,
    ) -> Result<OperationOutcome, SyncError> {
        let tenant_id = op.tenant_id();
        self.queue
            .mark_status(tenant_id, op.id, OperationStatus::Synced, None)
            .await?;
        self.ledger.append(tenant_id, synced_draft(op)).await?;
        self.queue.remove(tenant_id, op.id).await?;

        tracing::info!(tenant_id, operation_id = %op.id, "Operation synced");
        Ok(match classification {
            Classification::Duplicate => OperationOutcome::Duplicate,
            _ => OperationOutcome::Synced,
        })
    }

    /// Conflicted: keep in queue with detail, record the conflict.
    async fn conflict(
        &self,
        op: &OfflineOperation,
        detail: ConflictDetail,
    ) -> Result<OperationOutcome, SyncError> {
        let tenant_id = op.tenant_id();
        let kind = detail.kind;
        let message = detail.message.clone();
        let server_snapshot = detail.server_snapshot.clone();

        self.queue
            .mark_status(tenant_id, op.id, OperationStatus::Conflicted, Some(detail))
            .await?;

        let mut draft = DecisionDraft::new(
            DecisionKind::OfflineSyncConflict,
            DecisionOrigin::System,
            op.entity.clone(),
            op.entity_id.clone(),
            op.action.as_str(),
            json!({
                "operation_id": op.id,
                "conflict_kind": kind,
                "message": message,
                "local": op.payload,
            }),
        )
        .with_actor(op.actor_id())
        .with_description(message.clone());
        if let Some(snapshot) = server_snapshot {
            draft = draft.with_before(snapshot);
        }
        self.ledger.append(tenant_id, draft).await?;

        tracing::warn!(
            tenant_id,
            operation_id = %op.id,
            conflict_kind = %kind,
            %message,
            "Operation conflicted"
        );
        Ok(OperationOutcome::Conflicted { kind })
    }

    /// Transport failure: mark Failed, no decision recorded.
    async fn fail(
        &self,
        op: &OfflineOperation,
        error: RemoteError,
    ) -> Result<OperationOutcome, SyncError> {
        let tenant_id = op.tenant_id();
        let failed = self
            .queue
            .mark_status(tenant_id, op.id, OperationStatus::Failed, None)
            .await?;
        let exhausted = failed.is_retry_exhausted(self.limits.max_attempts);

        tracing::warn!(
            tenant_id,
            operation_id = %op.id,
            attempts = failed.attempts,
            exhausted,
            error = %error,
            "Operation failed to sync"
        );
        self.bus.publish(
            SyncEvent::new(SyncEventKind::SyncFailed {
                error: format!("{}: {error}", op.id),
            })
            .with_tenant(tenant_id),
        );

        Ok(OperationOutcome::Failed {
            error: error.to_string(),
            exhausted,
        })
    }

    // -----------------------------------------------------------------------
    // Conflict resolution
    // -----------------------------------------------------------------------

    /// Settle a conflicted operation and remove it from the queue.
    ///
    /// - `KeepServer`: local change is discarded.
    /// - `KeepLocal`: local payload is applied to the remote as-is.
    /// - `Merge`: `choices` pick server, local, or custom values per field;
    ///   unchosen fields keep the local value. The result is applied.
    /// - `Manual`: settled outside the system; nothing is applied.
    ///
    /// The resolution is written to the operation and the ledger before the
    /// operation is removed.
    pub async fn resolve_conflict(
        &self,
        tenant_id: &str,
        id: OperationId,
        strategy: ResolutionStrategy,
        choices: &[FieldChoice],
    ) -> Result<OfflineOperation, SyncError> {
        let mut op = self.queue.get(tenant_id, id).await?;
        if !op.has_unresolved_conflict() {
            return Err(SyncError::NotConflicted(id));
        }
        let Some(detail) = op.conflict.as_ref() else {
            return Err(SyncError::NotConflicted(id));
        };
        let server_snapshot = detail.server_snapshot.clone();
        let conflict_kind = detail.kind;

        match strategy {
            ResolutionStrategy::KeepServer | ResolutionStrategy::Manual => {}
            ResolutionStrategy::KeepLocal => self.push_resolution(&op).await?,
            ResolutionStrategy::Merge => {
                let server = server_snapshot
                    .as_ref()
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let local = op.payload.as_object().cloned().unwrap_or_else(Map::new);
                op.payload = Value::Object(conflict::merge_payload(&server, &local, choices));
                self.push_resolution(&op).await?;
            }
        }

        let now = self.clock.now();
        if let Some(detail) = op.conflict.as_mut() {
            detail.resolution = Some(strategy);
            detail.resolved_at = Some(now);
        }
        self.queue.save(&op).await?;

        let mut draft = DecisionDraft::new(
            DecisionKind::OfflineConflictResolved,
            DecisionOrigin::Human,
            op.entity.clone(),
            op.entity_id.clone(),
            op.action.as_str(),
            json!({
                "operation_id": op.id,
                "conflict_kind": conflict_kind,
                "resolution": strategy,
                "payload": op.payload,
            }),
        )
        .with_actor(op.actor_id())
        .with_description(format!("Conflict resolved: {}", strategy.label()));
        if let Some(snapshot) = server_snapshot {
            draft = draft.with_before(snapshot);
        }
        self.ledger.append(tenant_id, draft).await?;
        self.queue.remove(tenant_id, id).await?;

        tracing::info!(tenant_id, operation_id = %id, resolution = %strategy, "Conflict resolved");
        Ok(op)
    }

    async fn push_resolution(&self, op: &OfflineOperation) -> Result<(), SyncError> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        match self.round_trip(self.remote.apply(op)).await {
            Ok(ApplyOutcome::Applied) => Ok(()),
            Ok(ApplyOutcome::Rejected { reason }) => Err(SyncError::Rejected(reason)),
            Err(e) => Err(SyncError::Remote(e.to_string())),
        }
    }
}

/// The definitive record of an applied operation.
fn synced_draft(op: &OfflineOperation) -> DecisionDraft {
    let mut draft = DecisionDraft::new(
        op.action.decision_kind(),
        DecisionOrigin::Human,
        op.entity.clone(),
        op.entity_id.clone(),
        op.action.as_str(),
        op.payload.clone(),
    )
    .with_actor(op.actor_id())
    .with_description(format!("{} synced from offline queue", op.action.label()));
    if let Some(prior) = &op.prior_payload {
        draft = draft.with_before(prior.clone());
    }
    if let Some(provenance) = &op.provenance {
        draft = draft.with_provenance(provenance.clone());
    }
    draft
}
