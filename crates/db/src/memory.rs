//! In-process store for tests and ephemeral sessions.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fieldledger_core::operation::{OfflineOperation, OperationStatus};
use fieldledger_core::record::DecisionRecord;
use fieldledger_core::types::OperationId;

use crate::error::{require_tenant, StoreError};
use crate::store::{ChainTail, TenantScopedStore};

#[derive(Default)]
struct Inner {
    /// Per tenant, in insertion order, tagged with a global insertion counter.
    operations: HashMap<String, Vec<(u64, OfflineOperation)>>,
    next_seq: u64,
    chains: HashMap<String, Vec<DecisionRecord>>,
}

/// [`TenantScopedStore`] backed by a mutex-guarded map.
///
/// The lock is never held across an await point.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    ledger_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every ledger write fail with [`StoreError::Unavailable`] until
    /// switched back.
    pub fn set_ledger_unavailable(&self, unavailable: bool) {
        self.ledger_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite a stored record in place, bypassing the append path.
    ///
    /// Only for simulating tampering.
    pub fn replace_record(&self, record: DecisionRecord) -> bool {
        let mut inner = self.lock();
        let Some(chain) = inner.chains.get_mut(&record.tenant_id) else {
            return false;
        };
        match chain.iter_mut().find(|r| r.sequence == record.sequence) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TenantScopedStore for MemoryStore {
    async fn insert_pending_bounded(
        &self,
        op: &OfflineOperation,
        limit: usize,
    ) -> Result<(), StoreError> {
        require_tenant(op.tenant_id())?;
        let mut inner = self.lock();
        let seq = inner.next_seq;
        let ops = inner.operations.entry(op.tenant_id().to_string()).or_default();

        let pending = ops
            .iter()
            .filter(|(_, o)| o.status == OperationStatus::Pending)
            .count();
        if pending >= limit {
            return Err(StoreError::CapacityExceeded {
                tenant_id: op.tenant_id().to_string(),
                limit,
            });
        }

        ops.push((seq, op.clone()));
        inner.next_seq += 1;
        Ok(())
    }

    async fn get_operation(
        &self,
        tenant_id: &str,
        id: OperationId,
    ) -> Result<Option<OfflineOperation>, StoreError> {
        require_tenant(tenant_id)?;
        let inner = self.lock();
        Ok(inner
            .operations
            .get(tenant_id)
            .and_then(|ops| ops.iter().find(|(_, o)| o.id == id))
            .map(|(_, o)| o.clone()))
    }

    async fn update_operation(&self, op: &OfflineOperation) -> Result<(), StoreError> {
        require_tenant(op.tenant_id())?;
        let mut inner = self.lock();
        let slot = inner
            .operations
            .get_mut(op.tenant_id())
            .and_then(|ops| ops.iter_mut().find(|(_, o)| o.id == op.id))
            .ok_or(StoreError::NotFound(op.id))?;
        slot.1 = op.clone();
        Ok(())
    }

    async fn delete_operation(&self, tenant_id: &str, id: OperationId) -> Result<bool, StoreError> {
        require_tenant(tenant_id)?;
        let mut inner = self.lock();
        let Some(ops) = inner.operations.get_mut(tenant_id) else {
            return Ok(false);
        };
        let before = ops.len();
        ops.retain(|(_, o)| o.id != id);
        Ok(ops.len() < before)
    }

    async fn list_operations(
        &self,
        tenant_id: &str,
        statuses: &[OperationStatus],
    ) -> Result<Vec<OfflineOperation>, StoreError> {
        require_tenant(tenant_id)?;
        let inner = self.lock();
        let mut matching: Vec<&(u64, OfflineOperation)> = inner
            .operations
            .get(tenant_id)
            .map(|ops| ops.iter().filter(|(_, o)| statuses.contains(&o.status)).collect())
            .unwrap_or_default();
        matching.sort_by(|(a_seq, a), (b_seq, b)| {
            a.created_at_local
                .cmp(&b.created_at_local)
                .then(a_seq.cmp(b_seq))
        });
        Ok(matching.into_iter().map(|(_, o)| o.clone()).collect())
    }

    async fn count_operations(
        &self,
        tenant_id: &str,
        status: OperationStatus,
    ) -> Result<usize, StoreError> {
        require_tenant(tenant_id)?;
        let inner = self.lock();
        Ok(inner
            .operations
            .get(tenant_id)
            .map(|ops| ops.iter().filter(|(_, o)| o.status == status).count())
            .unwrap_or(0))
    }

    async fn purge_operations(&self, tenant_id: &str) -> Result<u64, StoreError> {
        require_tenant(tenant_id)?;
        let mut inner = self.lock();
        Ok(inner
            .operations
            .remove(tenant_id)
            .map(|ops| ops.len() as u64)
            .unwrap_or(0))
    }

    async fn list_tenants(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        let tenants: BTreeSet<String> = inner
            .operations
            .iter()
            .filter(|(_, ops)| !ops.is_empty())
            .map(|(t, _)| t.clone())
            .chain(
                inner
                    .chains
                    .iter()
                    .filter(|(_, chain)| !chain.is_empty())
                    .map(|(t, _)| t.clone()),
            )
            .collect();
        Ok(tenants.into_iter().collect())
    }

    async fn chain_tail(&self, tenant_id: &str) -> Result<ChainTail, StoreError> {
        require_tenant(tenant_id)?;
        let inner = self.lock();
        Ok(inner
            .chains
            .get(tenant_id)
            .and_then(|chain| chain.last())
            .map(|last| ChainTail {
                sequence: last.sequence,
                digest: last.digest.clone(),
                timestamp: Some(last.timestamp),
            })
            .unwrap_or_else(ChainTail::genesis))
    }

    async fn append_record(
        &self,
        record: &DecisionRecord,
        expected_tail: &str,
    ) -> Result<(), StoreError> {
        require_tenant(&record.tenant_id)?;
        if self.ledger_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger writes disabled".into()));
        }

        let mut inner = self.lock();
        let chain = inner.chains.entry(record.tenant_id.clone()).or_default();
        let (tail_digest, tail_sequence) = chain
            .last()
            .map(|r| (r.digest.as_str(), r.sequence))
            .unwrap_or((fieldledger_core::chain::GENESIS_DIGEST, 0));

        if tail_digest != expected_tail || record.sequence != tail_sequence + 1 {
            return Err(StoreError::TailMismatch {
                expected: expected_tail.to_string(),
            });
        }

        chain.push(record.clone());
        Ok(())
    }

    async fn list_records(&self, tenant_id: &str) -> Result<Vec<DecisionRecord>, StoreError> {
        require_tenant(tenant_id)?;
        let inner = self.lock();
        Ok(inner.chains.get(tenant_id).cloned().unwrap_or_default())
    }
}
