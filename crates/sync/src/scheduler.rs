//! Triggers drains for one tenant.
//!
//! [`SyncScheduler`] runs as a background task and drains when connectivity
//! comes back (after `reconnect_delay`), on every `sync_interval` tick while
//! there is work, and on explicit request. It exits when its
//! [`CancellationToken`] is cancelled or its handle is dropped.
//!
//! Connectivity edges are published once per device by
//! [`ConnectivityRelay`](crate::connectivity::ConnectivityRelay), not here.

use std::sync::Arc;

use fieldledger_core::config::SyncLimits;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::connectivity::ConnectivityMonitor;
use crate::coordinator::{DrainOutcome, SyncCoordinator};
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// SyncScheduler
// ---------------------------------------------------------------------------

pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    limits: SyncLimits,
    tenant_id: String,
}

/// Handle to a running scheduler. Dropping it stops the scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    trigger: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Ask for a drain now. Coalesced with any request already waiting.
    pub fn request_sync(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the scheduler and wait for it. A drain in progress completes
    /// first.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Sync scheduler task failed");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SyncScheduler {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        limits: SyncLimits,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            connectivity,
            limits,
            tenant_id: tenant_id.into(),
        }
    }

    /// Spawn the scheduler loop on the current runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let (trigger, requests) = mpsc::channel(1);
        let mut online_rx = self.connectivity.subscribe();
        let online = *online_rx.borrow_and_update();
        let join = tokio::spawn(self.run(cancel.clone(), requests, online_rx, online));
        SchedulerHandle {
            cancel,
            trigger,
            join: Some(join),
        }
    }

    async fn run(
        self,
        cancel: CancellationToken,
        mut requests: mpsc::Receiver<()>,
        mut online_rx: watch::Receiver<bool>,
        mut was_online: bool,
    ) {
        let mut connectivity_open = true;

        let period = self.limits.sync_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(tenant_id = %self.tenant_id, online = was_online, "Sync scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(tenant_id = %self.tenant_id, "Sync scheduler cancelled");
                    break;
                }
                changed = online_rx.changed(), if connectivity_open => {
                    if changed.is_err() {
                        tracing::warn!(tenant_id = %self.tenant_id, "Connectivity source closed");
                        connectivity_open = false;
                        continue;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online == was_online {
                        continue;
                    }
                    was_online = online;

                    if online {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.limits.reconnect_delay) => {}
                        }
                        self.drain("reconnect").await;
                    }
                }
                _ = interval.tick() => {
                    match self.coordinator.has_work(&self.tenant_id).await {
                        Ok(true) => self.drain("interval").await,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!(tenant_id = %self.tenant_id, error = %e, "Failed to check queue");
                        }
                    }
                }
                Some(()) = requests.recv() => {
                    self.drain("requested").await;
                }
            }
        }
    }

    async fn drain(&self, trigger: &'static str) {
        match self.coordinator.drain(&self.tenant_id).await {
            Ok(DrainOutcome::Completed(report)) => {
                tracing::debug!(
                    tenant_id = %self.tenant_id,
                    trigger,
                    synced = report.synced,
                    failed = report.failed,
                    "Scheduled drain finished"
                );
            }
            Ok(DrainOutcome::Offline { expired }) => {
                tracing::debug!(tenant_id = %self.tenant_id, trigger, expired, "Skipped drain while offline");
            }
            Err(SyncError::AlreadyDraining(_)) => {
                tracing::debug!(tenant_id = %self.tenant_id, trigger, "Drain already running");
            }
            Err(e) => {
                tracing::warn!(tenant_id = %self.tenant_id, trigger, error = %e, "Scheduled drain failed");
            }
        }
    }
}
