//! Wires the sync components together.
//!
//! A host builds one [`OfflineContext`] per device and passes it where it
//! needs the queue, ledger, or coordinator. There is no process-wide
//! singleton.

use std::sync::Arc;

use fieldledger_core::clock::Clock;
use fieldledger_core::config::SyncLimits;
use fieldledger_db::TenantScopedStore;
use fieldledger_events::EventBus;

use crate::connectivity::{ConnectivityMonitor, ConnectivityRelay};
use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use crate::ledger::AuditLedger;
use crate::queue::OperationQueue;
use crate::remote::RemoteEndpoint;
use crate::scheduler::{SchedulerHandle, SyncScheduler};
use crate::status::{self, SyncStatus};

#[derive(Clone)]
pub struct OfflineContext {
    bus: Arc<EventBus>,
    ledger: Arc<AuditLedger>,
    queue: Arc<OperationQueue>,
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    limits: SyncLimits,
}

impl OfflineContext {
    pub fn new(
        store: Arc<dyn TenantScopedStore>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
        limits: SyncLimits,
    ) -> Self {
        let bus = Arc::new(EventBus::default());
        let ledger = Arc::new(AuditLedger::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&bus),
            limits.append_retries,
        ));
        let queue = Arc::new(OperationQueue::new(
            store,
            Arc::clone(&ledger),
            Arc::clone(&bus),
            Arc::clone(&clock),
            limits.clone(),
        ));
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&queue),
            Arc::clone(&ledger),
            remote,
            Arc::clone(&connectivity),
            Arc::clone(&bus),
            clock,
            limits.clone(),
        ));

        Self {
            bus,
            ledger,
            queue,
            coordinator,
            connectivity,
            limits,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn limits(&self) -> &SyncLimits {
        &self.limits
    }

    /// Start publishing connectivity edges on the bus. One per device,
    /// shared by every tenant's scheduler.
    pub fn connectivity_relay(&self) -> ConnectivityRelay {
        ConnectivityRelay::spawn(self.connectivity.as_ref(), Arc::clone(&self.bus))
    }

    /// Start a background scheduler for `tenant_id`.
    pub fn scheduler(&self, tenant_id: impl Into<String>) -> SchedulerHandle {
        SyncScheduler::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.connectivity),
            self.limits.clone(),
            tenant_id,
        )
        .spawn()
    }

    pub async fn status(&self, tenant_id: &str) -> Result<SyncStatus, SyncError> {
        if tenant_id.trim().is_empty() {
            return Err(SyncError::TenantRequired);
        }
        status::snapshot(&self.queue, &self.coordinator, tenant_id).await
    }
}
