//! Offline operation model and its status state machine.
//!
//! An [`OfflineOperation`] is created Pending by the queue and moves through
//! the transitions in [`state_machine`]. `tenant_id` and `actor_id` are
//! private to the constructor: nothing after creation can rewrite them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionKind;
use crate::error::CoreError;
use crate::types::{OperationId, Provenance, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an offline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
    Expired,
    Conflicted,
}

impl OperationStatus {
    pub const ALL: [OperationStatus; 6] = [
        OperationStatus::Pending,
        OperationStatus::Syncing,
        OperationStatus::Synced,
        OperationStatus::Failed,
        OperationStatus::Expired,
        OperationStatus::Conflicted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Syncing => "syncing",
            OperationStatus::Synced => "synced",
            OperationStatus::Failed => "failed",
            OperationStatus::Expired => "expired",
            OperationStatus::Conflicted => "conflicted",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationStatus::Pending => "Pending",
            OperationStatus::Syncing => "Syncing",
            OperationStatus::Synced => "Synced",
            OperationStatus::Failed => "Failed",
            OperationStatus::Expired => "Expired",
            OperationStatus::Conflicted => "Conflict",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationStatus::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "operation status",
                value: s.to_string(),
            })
    }
}

/// Status state machine for offline operations.
pub mod state_machine {
    use super::OperationStatus::{self, *};
    use crate::error::CoreError;

    /// Statuses reachable from `from`.
    ///
    /// `Failed -> Syncing` is listed here but is further gated on the attempt
    /// count by [`validate_retry`].
    pub fn valid_transitions(from: OperationStatus) -> &'static [OperationStatus] {
        match from {
            Pending => &[Syncing, Expired],
            Syncing => &[Synced, Conflicted, Failed],
            Failed => &[Syncing],
            // Terminal. Conflicted waits for manual resolution.
            Synced | Expired | Conflicted => &[],
        }
    }

    pub fn can_transition(from: OperationStatus, to: OperationStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    pub fn validate_transition(from: OperationStatus, to: OperationStatus) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from, to })
        }
    }

    /// A Failed operation may re-enter Syncing only below the attempt cap.
    pub fn validate_retry(attempts: u32, max_attempts: u32) -> Result<(), CoreError> {
        if attempts < max_attempts {
            Ok(())
        } else {
            Err(CoreError::RetryLimitReached { attempts })
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// Stored classification of a conflicted operation.
///
/// A duplicate is not a conflict: it syncs as a success and never reaches
/// this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    ConcurrentModification,
    DataDeleted,
    InvalidData,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictKind::ConcurrentModification => "concurrent_modification",
            ConflictKind::DataDeleted => "data_deleted",
            ConflictKind::InvalidData => "invalid_data",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConflictKind::ConcurrentModification => "Modified concurrently",
            ConflictKind::DataDeleted => "Data deleted",
            ConflictKind::InvalidData => "Invalid data",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an operator settled a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepServer,
    KeepLocal,
    Merge,
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::KeepServer => "keep_server",
            ResolutionStrategy::KeepLocal => "keep_local",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResolutionStrategy::KeepServer => "Keep server version",
            ResolutionStrategy::KeepLocal => "Keep local version",
            ResolutionStrategy::Merge => "Merge",
            ResolutionStrategy::Manual => "Resolve manually",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ResolutionStrategy::KeepServer,
            ResolutionStrategy::KeepLocal,
            ResolutionStrategy::Merge,
            ResolutionStrategy::Manual,
        ]
        .into_iter()
        .find(|v| v.as_str() == s)
        .ok_or_else(|| CoreError::UnknownVariant {
            kind: "resolution strategy",
            value: s.to_string(),
        })
    }
}

/// A single field where the server and the local operation disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub server_value: Value,
    pub local_value: Value,
    /// What the client saw before making its change, if it captured it.
    pub prior_value: Option<Value>,
}

/// Conflict detail attached to a Conflicted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub kind: ConflictKind,
    pub message: String,
    /// `None` when the target no longer exists server-side.
    pub server_snapshot: Option<Value>,
    pub local_snapshot: Value,
    #[serde(default)]
    pub fields: Vec<FieldConflict>,
    pub resolution: Option<ResolutionStrategy>,
    pub resolved_at: Option<Timestamp>,
}

impl ConflictDetail {
    pub fn new(kind: ConflictKind, message: impl Into<String>, local_snapshot: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            server_snapshot: None,
            local_snapshot,
            fields: Vec::new(),
            resolution: None,
            resolved_at: None,
        }
    }

    pub fn with_server_snapshot(mut self, snapshot: Value) -> Self {
        self.server_snapshot = Some(snapshot);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldConflict>) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Caller input for an enqueue.
///
/// `action` is the raw wire name; it is checked against the whitelist by the
/// queue, never trusted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub tenant_id: String,
    pub actor_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub payload: Value,
    pub prior_payload: Option<Value>,
    pub provenance: Option<Provenance>,
}

impl NewOperation {
    pub fn new(
        tenant_id: impl Into<String>,
        actor_id: impl Into<String>,
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            action: action.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            payload,
            prior_payload: None,
            provenance: None,
        }
    }

    pub fn with_prior_payload(mut self, prior: Value) -> Self {
        self.prior_payload = Some(prior);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

/// A queued offline write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineOperation {
    pub id: OperationId,
    tenant_id: String,
    actor_id: String,
    pub action: ActionKind,
    pub entity: String,
    pub entity_id: String,
    pub payload: Value,
    pub prior_payload: Option<Value>,
    /// Client clock at enqueue. Used for age and per-device ordering only.
    pub created_at_local: Timestamp,
    pub status: OperationStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<Timestamp>,
    pub synced_at: Option<Timestamp>,
    pub conflict: Option<ConflictDetail>,
    pub provenance: Option<Provenance>,
}

impl OfflineOperation {
    /// Build a fresh Pending operation from an already validated request.
    pub fn pending(id: OperationId, input: NewOperation, action: ActionKind, now: Timestamp) -> Self {
        Self {
            id,
            tenant_id: input.tenant_id,
            actor_id: input.actor_id,
            action,
            entity: input.entity,
            entity_id: input.entity_id,
            payload: input.payload,
            prior_payload: input.prior_payload,
            created_at_local: now,
            status: OperationStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            synced_at: None,
            conflict: None,
            provenance: input.provenance,
        }
    }

    /// Reassemble an operation read back from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OperationId,
        tenant_id: String,
        actor_id: String,
        action: ActionKind,
        entity: String,
        entity_id: String,
        payload: Value,
        prior_payload: Option<Value>,
        created_at_local: Timestamp,
        status: OperationStatus,
        attempts: u32,
        last_attempt_at: Option<Timestamp>,
        synced_at: Option<Timestamp>,
        conflict: Option<ConflictDetail>,
        provenance: Option<Provenance>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            actor_id,
            action,
            entity,
            entity_id,
            payload,
            prior_payload,
            created_at_local,
            status,
            attempts,
            last_attempt_at,
            synced_at,
            conflict,
            provenance,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Age relative to `now`; zero if the local clock ran backwards.
    pub fn age(&self, now: Timestamp) -> chrono::Duration {
        (now - self.created_at_local).max(chrono::Duration::zero())
    }

    /// Whether this operation targets the same business object as `other`.
    pub fn same_target(&self, other: &OfflineOperation) -> bool {
        self.entity == other.entity && self.entity_id == other.entity_id
    }

    /// Failed with attempts left.
    pub fn is_retryable(&self, max_attempts: u32) -> bool {
        self.status == OperationStatus::Failed && self.attempts < max_attempts
    }

    /// Failed with no attempts left. Needs manual action.
    pub fn is_retry_exhausted(&self, max_attempts: u32) -> bool {
        self.status == OperationStatus::Failed && self.attempts >= max_attempts
    }

    /// Conflicted and not yet given a resolution.
    pub fn has_unresolved_conflict(&self) -> bool {
        self.status == OperationStatus::Conflicted
            && !self.conflict.as_ref().is_some_and(ConflictDetail::is_resolved)
    }

    /// Move to `to`, stamping the fields that go with it.
    ///
    /// - Syncing increments `attempts` and stamps `last_attempt_at`.
    /// - Synced stamps `synced_at`.
    /// - Conflicted requires `conflict`.
    pub fn apply_transition(
        &mut self,
        to: OperationStatus,
        conflict: Option<ConflictDetail>,
        now: Timestamp,
        max_attempts: u32,
    ) -> Result<(), CoreError> {
        state_machine::validate_transition(self.status, to)?;
        if self.status == OperationStatus::Failed && to == OperationStatus::Syncing {
            state_machine::validate_retry(self.attempts, max_attempts)?;
        }

        match to {
            OperationStatus::Syncing => {
                self.attempts += 1;
                self.last_attempt_at = Some(now);
            }
            OperationStatus::Synced => {
                self.synced_at = Some(now);
            }
            OperationStatus::Conflicted => {
                let detail = conflict.ok_or_else(|| {
                    CoreError::Validation("a conflicted operation requires conflict detail".into())
                })?;
                self.conflict = Some(detail);
            }
            OperationStatus::Pending | OperationStatus::Failed | OperationStatus::Expired => {}
        }
        self.status = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
