//! Offline operation queue, sync coordinator and decision ledger.
//!
//! Field work is recorded into [`OperationQueue`] while the device is
//! offline and replayed against a [`RemoteEndpoint`] by [`SyncCoordinator`]
//! once connectivity returns. Every definitive outcome is sealed into the
//! tenant's hash-chained [`AuditLedger`].

pub mod connectivity;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod query;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod status;

pub use connectivity::{ConnectivityMonitor, ConnectivityRelay, ManualConnectivity};
pub use context::OfflineContext;
pub use coordinator::{DrainOutcome, OperationOutcome, OperationReport, SyncCoordinator, SyncReport};
pub use error::{LedgerError, QueueError, SyncError};
pub use ledger::AuditLedger;
pub use query::{DecisionQuery, DecisionStatistics};
pub use queue::OperationQueue;
pub use remote::{ApplyOutcome, RemoteEndpoint, RemoteError};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use status::SyncStatus;
