//! The per-tenant decision ledger.
//!
//! [`AuditLedger`] is the only writer of decision records. Appends are
//! serialised per tenant by compare-and-swap on the chain tail in the store;
//! tenants never contend with each other.

use std::sync::Arc;

use chrono::SubsecRound;
use fieldledger_core::chain::{self, ChainVerification};
use fieldledger_core::clock::Clock;
use fieldledger_core::record::{DecisionDraft, DecisionRecord};
use fieldledger_db::{StoreError, TenantScopedStore};
use fieldledger_events::{EventBus, SyncEvent, SyncEventKind};

use crate::error::LedgerError;
use crate::query::{self, DecisionQuery, DecisionStatistics};

pub struct AuditLedger {
    store: Arc<dyn TenantScopedStore>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    append_retries: u32,
}

impl AuditLedger {
    pub fn new(
        store: Arc<dyn TenantScopedStore>,
        clock: Arc<dyn Clock>,
        bus: Arc<EventBus>,
        append_retries: u32,
    ) -> Self {
        Self {
            store,
            clock,
            bus,
            append_retries,
        }
    }

    /// Seal `draft` onto the end of the tenant's chain.
    ///
    /// The timestamp is the ledger clock truncated to microseconds, raised
    /// to the tail's timestamp if the clock is behind it.
    pub async fn append(
        &self,
        tenant_id: &str,
        draft: DecisionDraft,
    ) -> Result<DecisionRecord, LedgerError> {
        if tenant_id.trim().is_empty() {
            return Err(LedgerError::TenantRequired);
        }
        if draft.origin.requires_actor()
            && draft.actor_id.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            return Err(LedgerError::ActorRequired);
        }

        for attempt in 0..=self.append_retries {
            let tail = self.store.chain_tail(tenant_id).await?;
            let now = self.clock.now().trunc_subsecs(6);
            let timestamp = tail.timestamp.map_or(now, |t| t.max(now));

            let record = DecisionRecord::seal(
                draft.clone(),
                uuid::Uuid::now_v7(),
                tenant_id,
                tail.sequence + 1,
                timestamp,
                tail.digest.as_str(),
            );

            match self.store.append_record(&record, &tail.digest).await {
                Ok(()) => {
                    tracing::debug!(
                        tenant_id,
                        sequence = record.sequence,
                        kind = %record.kind,
                        "Decision record appended"
                    );
                    return Ok(record);
                }
                Err(StoreError::TailMismatch { .. }) => {
                    tracing::debug!(tenant_id, attempt, "Chain tail moved, retrying append");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            tenant_id: tenant_id.to_string(),
            attempts: self.append_retries + 1,
        })
    }

    /// Replay the tenant's whole chain.
    ///
    /// A break is published as an integrity alert. It is never repaired.
    pub async fn verify(&self, tenant_id: &str) -> Result<ChainVerification, LedgerError> {
        if tenant_id.trim().is_empty() {
            return Err(LedgerError::TenantRequired);
        }
        let records = self.store.list_records(tenant_id).await?;
        let result = chain::verify_chain(tenant_id, &records, self.clock.now());

        if let Some(brk) = &result.first_break {
            let reason = brk.reason.to_string();
            tracing::error!(
                tenant_id,
                sequence = brk.sequence,
                record_id = %brk.record_id,
                %reason,
                "Decision ledger integrity check failed"
            );
            self.bus.publish(
                SyncEvent::new(SyncEventKind::IntegrityAlert {
                    sequence: brk.sequence,
                    record_id: brk.record_id,
                    reason,
                })
                .with_tenant(tenant_id),
            );
        } else {
            tracing::debug!(tenant_id, entries = result.verified_entries, "Decision ledger verified");
        }

        Ok(result)
    }

    /// Check one record's own digest.
    ///
    /// Weaker than [`verify`](Self::verify): catches field tampering on this
    /// record only, never reordering, insertion, or deletion.
    pub fn verify_one(&self, record: &DecisionRecord) -> bool {
        chain::verify_record(record)
    }

    /// All records of the tenant in sequence order.
    pub async fn records(&self, tenant_id: &str) -> Result<Vec<DecisionRecord>, LedgerError> {
        Ok(self.store.list_records(tenant_id).await?)
    }

    /// Filtered page of records, newest first.
    pub async fn query(
        &self,
        tenant_id: &str,
        filter: &DecisionQuery,
    ) -> Result<Vec<DecisionRecord>, LedgerError> {
        let records = self.store.list_records(tenant_id).await?;
        Ok(query::filter_records(records, filter))
    }

    /// Aggregates over every record matching `filter`, ignoring paging.
    pub async fn statistics(
        &self,
        tenant_id: &str,
        filter: &DecisionQuery,
    ) -> Result<DecisionStatistics, LedgerError> {
        let records = self.store.list_records(tenant_id).await?;
        Ok(query::summarize(records.iter().filter(|r| filter.matches(r))))
    }
}
