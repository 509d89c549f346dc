//! Conflict classification for queued operations at sync time.
//!
//! Comparison is field-level: only the fields an operation writes are looked
//! at, so concurrent edits to unrelated fields never conflict.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::operation::{ConflictDetail, ConflictKind, FieldConflict, OfflineOperation};

/// Fields an offline payload may never write.
pub const RESERVED_FIELDS: &[&str] = &["id", "tenant_id", "created_at", "updated_at"];

/// Authoritative server state of an operation's target, fetched at sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "fields", rename_all = "snake_case")]
pub enum ServerState {
    /// The entity was deleted server-side.
    Gone,
    Current(Map<String, Value>),
}

/// Classifier verdict for a single operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Apply as-is.
    Safe,
    /// Server already reflects this exact change. Counts as success.
    Duplicate,
    /// Fields this operation writes were changed by someone else.
    ModifiedConcurrently { fields: Vec<FieldConflict> },
    TargetGone,
    Invalid { reason: String },
}

impl Classification {
    /// Stored conflict kind, or `None` for outcomes that count as success.
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Classification::Safe | Classification::Duplicate => None,
            Classification::ModifiedConcurrently { .. } => Some(ConflictKind::ConcurrentModification),
            Classification::TargetGone => Some(ConflictKind::DataDeleted),
            Classification::Invalid { .. } => Some(ConflictKind::InvalidData),
        }
    }

    pub fn is_success(&self) -> bool {
        self.conflict_kind().is_none()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify `op` against the server's current state.
///
/// Checks run in order: target gone, invalid payload, duplicate, concurrent
/// modification. An operation without a `prior_payload` has no baseline to
/// compare against and is never classified as a concurrent modification.
pub fn classify(op: &OfflineOperation, server: &ServerState) -> Classification {
    let server_fields = match server {
        ServerState::Gone => return Classification::TargetGone,
        ServerState::Current(fields) => fields,
    };

    let local = match validate_payload(&op.payload) {
        Ok(local) => local,
        Err(reason) => return Classification::Invalid { reason },
    };

    if local
        .iter()
        .all(|(key, value)| server_fields.get(key) == Some(value))
    {
        return Classification::Duplicate;
    }

    let Some(prior) = op.prior_payload.as_ref().and_then(Value::as_object) else {
        return Classification::Safe;
    };

    let fields = detect_field_conflicts(server_fields, local, prior);
    if fields.is_empty() {
        Classification::Safe
    } else {
        Classification::ModifiedConcurrently { fields }
    }
}

/// Fields where the server moved away from what the client last saw, to a
/// value other than the one the client is writing.
pub fn detect_field_conflicts(
    server: &Map<String, Value>,
    local: &Map<String, Value>,
    prior: &Map<String, Value>,
) -> Vec<FieldConflict> {
    let mut conflicts = Vec::new();

    for (key, local_value) in local {
        let server_value = server.get(key);
        let prior_value = prior.get(key);
        if server_value != prior_value && server_value != Some(local_value) {
            conflicts.push(FieldConflict {
                field: key.clone(),
                server_value: server_value.cloned().unwrap_or(Value::Null),
                local_value: local_value.clone(),
                prior_value: prior_value.cloned(),
            });
        }
    }

    conflicts
}

fn validate_payload(payload: &Value) -> Result<&Map<String, Value>, String> {
    let Some(fields) = payload.as_object() else {
        return Err("payload must be an object".to_string());
    };
    if fields.is_empty() {
        return Err("payload is empty".to_string());
    }
    if let Some(reserved) = fields.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
        return Err(format!("payload writes reserved field '{reserved}'"));
    }
    Ok(fields)
}

/// Build the conflict detail stored on a Conflicted operation.
///
/// Returns `None` for Safe and Duplicate.
pub fn conflict_detail(
    op: &OfflineOperation,
    classification: &Classification,
    server: &ServerState,
) -> Option<ConflictDetail> {
    let kind = classification.conflict_kind()?;
    let message = match classification {
        Classification::ModifiedConcurrently { fields } => {
            let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
            format!("{} {} was modified concurrently: {}", op.entity, op.entity_id, names.join(", "))
        }
        Classification::TargetGone => format!("{} {} no longer exists", op.entity, op.entity_id),
        Classification::Invalid { reason } => format!("invalid data: {reason}"),
        Classification::Safe | Classification::Duplicate => return None,
    };

    let mut detail = ConflictDetail::new(kind, message, op.payload.clone());
    if let ServerState::Current(fields) = server {
        detail = detail.with_server_snapshot(Value::Object(fields.clone()));
    }
    if let Classification::ModifiedConcurrently { fields } = classification {
        detail = detail.with_fields(fields.clone());
    }
    Some(detail)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Per-field outcome when merging a conflicted operation by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "keep", content = "value", rename_all = "snake_case")]
pub enum FieldResolution {
    Server,
    Local,
    Custom(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChoice {
    pub field: String,
    pub resolution: FieldResolution,
}

/// Build a merged payload. Starts from the local payload and applies each
/// choice; fields without a choice keep the local value.
pub fn merge_payload(
    server: &Map<String, Value>,
    local: &Map<String, Value>,
    choices: &[FieldChoice],
) -> Map<String, Value> {
    let mut result = local.clone();

    for choice in choices {
        match &choice.resolution {
            FieldResolution::Server => match server.get(&choice.field) {
                Some(val) => {
                    result.insert(choice.field.clone(), val.clone());
                }
                None => {
                    result.remove(&choice.field);
                }
            },
            FieldResolution::Local => {}
            FieldResolution::Custom(value) => {
                result.insert(choice.field.clone(), value.clone());
            }
        }
    }

    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
