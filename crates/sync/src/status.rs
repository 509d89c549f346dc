//! Read-only sync status for the host UI.
//!
//! Nothing in the sync path reads these values back; every count is
//! recomputed from the store on each call.

use fieldledger_core::types::Timestamp;
use serde::Serialize;

use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use crate::queue::OperationQueue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub tenant_id: String,
    pub pending_count: usize,
    pub conflicted_count: usize,
    /// Failed operations out of attempts, waiting on manual action.
    pub exhausted_count: usize,
    /// Left mid-sync by an interrupted drain. Settled by the next drain.
    pub unsettled_count: usize,
    pub oldest_pending_age_secs: Option<i64>,
    pub last_sync_at: Option<Timestamp>,
    pub last_sync_error: Option<String>,
    pub is_syncing: bool,
    pub is_online: bool,
    /// Oldest pending operation is past the alert age.
    pub stale: bool,
}

pub async fn snapshot(
    queue: &OperationQueue,
    coordinator: &SyncCoordinator,
    tenant_id: &str,
) -> Result<SyncStatus, SyncError> {
    let pending_count = queue.count_pending(tenant_id).await?;
    let conflicted_count = queue.list_conflicted(tenant_id).await?.len();
    let exhausted_count = queue.list_exhausted(tenant_id).await?.len();
    let is_syncing = coordinator.is_draining(tenant_id);
    // A running drain owns its Syncing operation.
    let unsettled_count = if is_syncing {
        0
    } else {
        queue.list_unsettled(tenant_id).await?.len()
    };
    let oldest = queue.oldest_pending_age(tenant_id).await?;
    let history = coordinator.history(tenant_id);

    let stale = oldest.is_some_and(|age| age > queue.limits().alert_age_delta());

    Ok(SyncStatus {
        tenant_id: tenant_id.to_string(),
        pending_count,
        conflicted_count,
        exhausted_count,
        unsettled_count,
        oldest_pending_age_secs: oldest.map(|age| age.num_seconds()),
        last_sync_at: history.last_sync_at,
        last_sync_error: history.last_sync_error,
        is_syncing,
        is_online: coordinator.is_online(),
        stale,
    })
}
