//! The tenant-scoped persistence boundary.
//!
//! Every call takes the tenant explicitly. Implementations must never return
//! or touch rows of another tenant, and must reject an empty tenant id with
//! [`StoreError::TenantRequired`].

use async_trait::async_trait;
use fieldledger_core::chain::GENESIS_DIGEST;
use fieldledger_core::operation::{OfflineOperation, OperationStatus};
use fieldledger_core::record::DecisionRecord;
use fieldledger_core::types::{OperationId, Timestamp};

use crate::error::StoreError;

/// Current end of a tenant's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    /// 0 for an empty chain.
    pub sequence: i64,
    pub digest: String,
    pub timestamp: Option<Timestamp>,
}

impl ChainTail {
    pub fn genesis() -> Self {
        Self {
            sequence: 0,
            digest: GENESIS_DIGEST.to_string(),
            timestamp: None,
        }
    }
}

#[async_trait]
pub trait TenantScopedStore: Send + Sync {
    // -- Queue ---------------------------------------------------------------

    /// Insert a Pending operation unless the tenant already holds `limit`
    /// Pending operations. The check and the insert are one atomic step.
    async fn insert_pending_bounded(
        &self,
        op: &OfflineOperation,
        limit: usize,
    ) -> Result<(), StoreError>;

    async fn get_operation(
        &self,
        tenant_id: &str,
        id: OperationId,
    ) -> Result<Option<OfflineOperation>, StoreError>;

    /// Overwrite the mutable fields of an existing operation.
    async fn update_operation(&self, op: &OfflineOperation) -> Result<(), StoreError>;

    /// Returns whether a row was deleted.
    async fn delete_operation(&self, tenant_id: &str, id: OperationId) -> Result<bool, StoreError>;

    /// Operations in any of `statuses`, ordered by `created_at_local` then
    /// insertion order.
    async fn list_operations(
        &self,
        tenant_id: &str,
        statuses: &[OperationStatus],
    ) -> Result<Vec<OfflineOperation>, StoreError>;

    async fn count_operations(
        &self,
        tenant_id: &str,
        status: OperationStatus,
    ) -> Result<usize, StoreError>;

    /// Delete every operation of one tenant. Ledger records are kept.
    async fn purge_operations(&self, tenant_id: &str) -> Result<u64, StoreError>;

    /// Tenants with any queued operation or ledger record.
    async fn list_tenants(&self) -> Result<Vec<String>, StoreError>;

    // -- Ledger --------------------------------------------------------------

    async fn chain_tail(&self, tenant_id: &str) -> Result<ChainTail, StoreError>;

    /// Append `record` only if the tenant's tail digest still equals
    /// `expected_tail`; otherwise fail with [`StoreError::TailMismatch`].
    async fn append_record(
        &self,
        record: &DecisionRecord,
        expected_tail: &str,
    ) -> Result<(), StoreError>;

    /// Every record of the tenant in sequence order.
    async fn list_records(&self, tenant_id: &str) -> Result<Vec<DecisionRecord>, StoreError>;
}
