//! Durable [`TenantScopedStore`] on SQLite.

use std::collections::BTreeSet;

use async_trait::async_trait;
use fieldledger_core::operation::{OfflineOperation, OperationStatus};
use fieldledger_core::record::DecisionRecord;
use fieldledger_core::types::OperationId;

use crate::error::{require_tenant, StoreError};
use crate::models::decode_ts;
use crate::repositories::{DecisionRecordRepo, OperationRepo};
use crate::store::{ChainTail, TenantScopedStore};
use crate::DbPool;

/// SQLite-backed store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Wrap an already migrated pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl TenantScopedStore for SqliteStore {
    async fn insert_pending_bounded(
        &self,
        op: &OfflineOperation,
        limit: usize,
    ) -> Result<(), StoreError> {
        require_tenant(op.tenant_id())?;
        if OperationRepo::insert_bounded(&self.pool, op, limit).await? {
            Ok(())
        } else {
            Err(StoreError::CapacityExceeded {
                tenant_id: op.tenant_id().to_string(),
                limit,
            })
        }
    }

    async fn get_operation(
        &self,
        tenant_id: &str,
        id: OperationId,
    ) -> Result<Option<OfflineOperation>, StoreError> {
        require_tenant(tenant_id)?;
        OperationRepo::find_by_id(&self.pool, tenant_id, &id.to_string())
            .await?
            .map(OfflineOperation::try_from)
            .transpose()
    }

    async fn update_operation(&self, op: &OfflineOperation) -> Result<(), StoreError> {
        require_tenant(op.tenant_id())?;
        if OperationRepo::update_state(&self.pool, op).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(op.id))
        }
    }

    async fn delete_operation(&self, tenant_id: &str, id: OperationId) -> Result<bool, StoreError> {
        require_tenant(tenant_id)?;
        Ok(OperationRepo::delete(&self.pool, tenant_id, &id.to_string()).await?)
    }

    async fn list_operations(
        &self,
        tenant_id: &str,
        statuses: &[OperationStatus],
    ) -> Result<Vec<OfflineOperation>, StoreError> {
        require_tenant(tenant_id)?;
        OperationRepo::list_by_status(&self.pool, tenant_id, statuses)
            .await?
            .into_iter()
            .map(OfflineOperation::try_from)
            .collect()
    }

    async fn count_operations(
        &self,
        tenant_id: &str,
        status: OperationStatus,
    ) -> Result<usize, StoreError> {
        require_tenant(tenant_id)?;
        let count = OperationRepo::count_by_status(&self.pool, tenant_id, status).await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn purge_operations(&self, tenant_id: &str) -> Result<u64, StoreError> {
        require_tenant(tenant_id)?;
        Ok(OperationRepo::delete_for_tenant(&self.pool, tenant_id).await?)
    }

    async fn list_tenants(&self) -> Result<Vec<String>, StoreError> {
        let mut tenants: BTreeSet<String> = OperationRepo::list_tenants(&self.pool)
            .await?
            .into_iter()
            .collect();
        tenants.extend(DecisionRecordRepo::list_tenants(&self.pool).await?);
        Ok(tenants.into_iter().collect())
    }

    async fn chain_tail(&self, tenant_id: &str) -> Result<ChainTail, StoreError> {
        require_tenant(tenant_id)?;
        match DecisionRecordRepo::find_tail(&self.pool, tenant_id).await? {
            Some(row) => Ok(ChainTail {
                sequence: row.sequence,
                digest: row.digest,
                timestamp: Some(decode_ts("timestamp", &row.timestamp)?),
            }),
            None => Ok(ChainTail::genesis()),
        }
    }

    async fn append_record(
        &self,
        record: &DecisionRecord,
        expected_tail: &str,
    ) -> Result<(), StoreError> {
        require_tenant(&record.tenant_id)?;
        if DecisionRecordRepo::append_if_tail(&self.pool, record, expected_tail).await? {
            Ok(())
        } else {
            tracing::debug!(
                tenant_id = %record.tenant_id,
                sequence = record.sequence,
                "Chain tail moved, append rejected"
            );
            Err(StoreError::TailMismatch {
                expected: expected_tail.to_string(),
            })
        }
    }

    async fn list_records(&self, tenant_id: &str) -> Result<Vec<DecisionRecord>, StoreError> {
        require_tenant(tenant_id)?;
        DecisionRecordRepo::list_for_tenant(&self.pool, tenant_id)
            .await?
            .into_iter()
            .map(DecisionRecord::try_from)
            .collect()
    }
}
