//! The offline operation queue.
//!
//! Validates and persists whitelisted actions recorded while disconnected.
//! Counters are never cached: every count and age is read from the store.

use std::sync::Arc;
use std::time::Duration;

use fieldledger_core::action::ActionKind;
use fieldledger_core::clock::Clock;
use fieldledger_core::config::{to_delta, SyncLimits};
use fieldledger_core::decision::{DecisionKind, DecisionOrigin};
use fieldledger_core::operation::{
    ConflictDetail, NewOperation, OfflineOperation, OperationStatus,
};
use fieldledger_core::record::DecisionDraft;
use fieldledger_core::types::OperationId;
use fieldledger_db::TenantScopedStore;
use fieldledger_events::{EventBus, SyncEvent, SyncEventKind};
use serde_json::json;

use crate::error::QueueError;
use crate::ledger::AuditLedger;

pub struct OperationQueue {
    store: Arc<dyn TenantScopedStore>,
    ledger: Arc<AuditLedger>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    limits: SyncLimits,
}

impl OperationQueue {
    pub fn new(
        store: Arc<dyn TenantScopedStore>,
        ledger: Arc<AuditLedger>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        limits: SyncLimits,
    ) -> Self {
        Self {
            store,
            ledger,
            bus,
            clock,
            limits,
        }
    }

    pub fn limits(&self) -> &SyncLimits {
        &self.limits
    }

    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Validate and persist a new Pending operation.
    ///
    /// A provisional decision record is appended afterwards; if that fails
    /// the failure is logged and the enqueue still succeeds.
    pub async fn enqueue(&self, input: NewOperation) -> Result<OperationId, QueueError> {
        if input.tenant_id.trim().is_empty() {
            return Err(QueueError::TenantRequired);
        }
        if input.actor_id.trim().is_empty() {
            return Err(QueueError::ActorRequired);
        }
        let action: ActionKind = input
            .action
            .parse()
            .map_err(|_| QueueError::ActionNotWhitelisted(input.action.clone()))?;

        let op = OfflineOperation::pending(uuid::Uuid::now_v7(), input, action, self.clock.now());
        self.store
            .insert_pending_bounded(&op, self.limits.max_pending)
            .await?;

        tracing::info!(
            tenant_id = %op.tenant_id(),
            operation_id = %op.id,
            action = %op.action,
            entity = %op.entity,
            entity_id = %op.entity_id,
            "Offline operation queued"
        );

        self.record_enqueue(&op).await;
        self.bus.publish(
            SyncEvent::new(SyncEventKind::OperationQueued {
                operation_id: op.id,
                action: op.action.as_str().to_string(),
            })
            .with_tenant(op.tenant_id()),
        );

        Ok(op.id)
    }

    async fn record_enqueue(&self, op: &OfflineOperation) {
        let mut draft = DecisionDraft::new(
            DecisionKind::OfflineOperationQueued,
            DecisionOrigin::Human,
            op.entity.clone(),
            op.entity_id.clone(),
            op.action.as_str(),
            json!({
                "operation_id": op.id,
                "action": op.action.as_str(),
                "created_at_local": op.created_at_local,
            }),
        )
        .with_actor(op.actor_id())
        .with_description(format!("{} recorded offline", op.action.label()));
        if let Some(provenance) = &op.provenance {
            draft = draft.with_provenance(provenance.clone());
        }

        if let Err(e) = self.ledger.append(op.tenant_id(), draft).await {
            tracing::warn!(
                tenant_id = %op.tenant_id(),
                operation_id = %op.id,
                error = %e,
                "Failed to record queued operation in decision ledger"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, tenant_id: &str, id: OperationId) -> Result<OfflineOperation, QueueError> {
        self.store
            .get_operation(tenant_id, id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    /// Pending operations, oldest first.
    pub async fn list_pending(&self, tenant_id: &str) -> Result<Vec<OfflineOperation>, QueueError> {
        Ok(self
            .store
            .list_operations(tenant_id, &[OperationStatus::Pending])
            .await?)
    }

    /// Pending plus Failed-with-attempts-left, oldest first. This is what a
    /// drain works through.
    pub async fn list_syncable(&self, tenant_id: &str) -> Result<Vec<OfflineOperation>, QueueError> {
        let max_attempts = self.limits.max_attempts;
        let ops = self
            .store
            .list_operations(tenant_id, &[OperationStatus::Pending, OperationStatus::Failed])
            .await?;
        Ok(ops
            .into_iter()
            .filter(|op| op.status == OperationStatus::Pending || op.is_retryable(max_attempts))
            .collect())
    }

    /// Syncing or Synced operations with no drain running: a pass stopped
    /// before it wrote the outcome. The next drain settles them.
    pub async fn list_unsettled(&self, tenant_id: &str) -> Result<Vec<OfflineOperation>, QueueError> {
        Ok(self
            .store
            .list_operations(tenant_id, &[OperationStatus::Syncing, OperationStatus::Synced])
            .await?)
    }

    /// Conflicted operations awaiting resolution.
    pub async fn list_conflicted(&self, tenant_id: &str) -> Result<Vec<OfflineOperation>, QueueError> {
        let ops = self
            .store
            .list_operations(tenant_id, &[OperationStatus::Conflicted])
            .await?;
        Ok(ops.into_iter().filter(|op| op.has_unresolved_conflict()).collect())
    }

    /// Failed operations that ran out of attempts and need manual action.
    pub async fn list_exhausted(&self, tenant_id: &str) -> Result<Vec<OfflineOperation>, QueueError> {
        let max_attempts = self.limits.max_attempts;
        let ops = self
            .store
            .list_operations(tenant_id, &[OperationStatus::Failed])
            .await?;
        Ok(ops
            .into_iter()
            .filter(|op| op.is_retry_exhausted(max_attempts))
            .collect())
    }

    pub async fn count_pending(&self, tenant_id: &str) -> Result<usize, QueueError> {
        Ok(self
            .store
            .count_operations(tenant_id, OperationStatus::Pending)
            .await?)
    }

    /// Age of the oldest Pending operation, `None` when nothing is pending.
    pub async fn oldest_pending_age(&self, tenant_id: &str) -> Result<Option<chrono::Duration>, QueueError> {
        let now = self.clock.now();
        Ok(self
            .list_pending(tenant_id)
            .await?
            .first()
            .map(|op| op.age(now)))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Transition an operation and persist it.
    pub async fn mark_status(
        &self,
        tenant_id: &str,
        id: OperationId,
        status: OperationStatus,
        conflict: Option<ConflictDetail>,
    ) -> Result<OfflineOperation, QueueError> {
        let mut op = self.get(tenant_id, id).await?;
        let from = op.status;
        op.apply_transition(status, conflict, self.clock.now(), self.limits.max_attempts)?;
        self.store.update_operation(&op).await?;

        tracing::debug!(
            tenant_id,
            operation_id = %id,
            %from,
            to = %status,
            attempts = op.attempts,
            "Operation status changed"
        );
        Ok(op)
    }

    /// Persist an operation whose conflict detail was edited in place.
    pub(crate) async fn save(&self, op: &OfflineOperation) -> Result<(), QueueError> {
        Ok(self.store.update_operation(op).await?)
    }

    /// Hard delete. An unresolved conflict must be resolved first.
    pub async fn remove(&self, tenant_id: &str, id: OperationId) -> Result<(), QueueError> {
        let op = self.get(tenant_id, id).await?;
        if op.has_unresolved_conflict() {
            return Err(QueueError::UnresolvedConflict(id));
        }
        if !self.store.delete_operation(tenant_id, id).await? {
            return Err(QueueError::NotFound(id));
        }
        tracing::debug!(tenant_id, operation_id = %id, "Operation removed");
        Ok(())
    }

    /// Delete every operation of a tenant, e.g. on logout. Returns the count.
    pub async fn purge_tenant(&self, tenant_id: &str) -> Result<u64, QueueError> {
        let purged = self.store.purge_operations(tenant_id).await?;
        tracing::info!(tenant_id, purged, "Offline queue purged");
        Ok(purged)
    }

    /// Move Pending operations older than `max_age` to Expired and record
    /// each expiry in the ledger.
    pub async fn expire(
        &self,
        tenant_id: &str,
        max_age: Duration,
    ) -> Result<Vec<OfflineOperation>, QueueError> {
        let now = self.clock.now();
        let max_age = to_delta(max_age);
        let mut expired = Vec::new();

        for mut op in self.list_pending(tenant_id).await? {
            if op.age(now) <= max_age {
                continue;
            }
            op.apply_transition(OperationStatus::Expired, None, now, self.limits.max_attempts)?;
            self.store.update_operation(&op).await?;

            let draft = DecisionDraft::new(
                DecisionKind::OfflineOperationExpired,
                DecisionOrigin::System,
                op.entity.clone(),
                op.entity_id.clone(),
                op.action.as_str(),
                json!({
                    "operation_id": op.id,
                    "created_at_local": op.created_at_local,
                    "age_hours": op.age(now).num_hours(),
                }),
            )
            .with_actor(op.actor_id())
            .with_before(op.payload.clone());
            self.ledger.append(tenant_id, draft).await?;

            tracing::warn!(
                tenant_id,
                operation_id = %op.id,
                age_hours = op.age(now).num_hours(),
                "Offline operation expired"
            );
            expired.push(op);
        }

        Ok(expired)
    }
}
