//! `decision_records` row model. Records are immutable, so there is no
//! update DTO.

use fieldledger_core::error::CoreError;
use fieldledger_core::record::{AgentMetadata, DecisionRecord};
use fieldledger_core::types::Provenance;
use serde_json::Value;
use sqlx::FromRow;

use super::{decode_json, decode_opt_json, decode_ts, decode_uuid};
use crate::error::StoreError;

/// A row from `decision_records`.
#[derive(Debug, Clone, FromRow)]
pub struct DecisionRecordRow {
    pub tenant_id: String,
    pub sequence: i64,
    pub id: String,
    pub actor_id: Option<String>,
    pub kind: String,
    pub origin: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub before_snapshot: Option<String>,
    pub after_snapshot: String,
    pub agent: Option<String>,
    pub provenance: Option<String>,
    pub timestamp: String,
    pub previous_digest: String,
    pub digest: String,
}

/// Tail columns only.
#[derive(Debug, Clone, FromRow)]
pub struct ChainTailRow {
    pub sequence: i64,
    pub digest: String,
    pub timestamp: String,
}

impl TryFrom<DecisionRecordRow> for DecisionRecord {
    type Error = StoreError;

    fn try_from(row: DecisionRecordRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &str, e: CoreError| StoreError::Corrupt(format!("{column}: {e}"));

        // Severity is read back as stored, not re-derived, so tampering with
        // it stays visible to verification.
        Ok(DecisionRecord {
            id: decode_uuid("id", &row.id)?,
            tenant_id: row.tenant_id,
            sequence: row.sequence,
            actor_id: row.actor_id,
            kind: row.kind.parse().map_err(|e| corrupt("kind", e))?,
            origin: row.origin.parse().map_err(|e| corrupt("origin", e))?,
            severity: row.severity.parse().map_err(|e| corrupt("severity", e))?,
            title: row.title,
            description: row.description,
            entity: row.entity,
            entity_id: row.entity_id,
            action: row.action,
            before: decode_opt_json::<Value>(row.before_snapshot.as_deref())?,
            after: decode_json::<Value>(&row.after_snapshot)?,
            agent: decode_opt_json::<AgentMetadata>(row.agent.as_deref())?,
            provenance: decode_opt_json::<Provenance>(row.provenance.as_deref())?,
            timestamp: decode_ts("timestamp", &row.timestamp)?,
            previous_digest: row.previous_digest,
            digest: row.digest,
        })
    }
}
