//! Decision record models.
//!
//! A [`DecisionDraft`] is what callers hand to the ledger. The ledger turns it
//! into a [`DecisionRecord`] by assigning the id, sequence, timestamp,
//! severity, and chain digests. Records have no `updated_at`: they are
//! immutable once appended.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::{DecisionKind, DecisionOrigin, Severity};
use crate::types::{Provenance, RecordId, Timestamp};

// ---------------------------------------------------------------------------
// Agent metadata
// ---------------------------------------------------------------------------

/// Narrative metadata attached to automated decisions.
///
/// Display data only. None of it is part of the digest, so none of it can be
/// relied on as evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub model: Option<String>,
    pub rationale: Option<String>,
    pub tokens_used: Option<u64>,
    pub estimated_cost_cents: Option<u64>,
    /// 0-100.
    pub confidence: Option<u8>,
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// Caller-supplied fields for a new decision record.
///
/// Constructed via [`DecisionDraft::new`] and enriched with the `with_*`
/// builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDraft {
    pub actor_id: Option<String>,
    pub kind: DecisionKind,
    pub origin: DecisionOrigin,
    pub title: String,
    pub description: String,
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub before: Option<Value>,
    pub after: Value,
    pub agent: Option<AgentMetadata>,
    pub provenance: Option<Provenance>,
}

impl DecisionDraft {
    /// Create a draft with the required structured fields.
    ///
    /// The title defaults to the kind's label and the description is empty.
    pub fn new(
        kind: DecisionKind,
        origin: DecisionOrigin,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        after: Value,
    ) -> Self {
        Self {
            actor_id: None,
            kind,
            origin,
            title: kind.label().to_string(),
            description: String::new(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            before: None,
            after,
            agent: None,
            provenance: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_agent(mut self, agent: AgentMetadata) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single ledger entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: RecordId,
    pub tenant_id: String,
    /// 1-based position in the tenant's chain.
    pub sequence: i64,
    pub actor_id: Option<String>,
    pub kind: DecisionKind,
    pub origin: DecisionOrigin,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub before: Option<Value>,
    pub after: Value,
    pub agent: Option<AgentMetadata>,
    pub provenance: Option<Provenance>,
    /// Assigned by the ledger at append time.
    pub timestamp: Timestamp,
    pub previous_digest: String,
    pub digest: String,
}

impl DecisionRecord {
    /// Turn a draft into a sealed record linked onto `previous_digest`.
    ///
    /// Severity comes from the kind's fixed table, never from the caller.
    pub fn seal(
        draft: DecisionDraft,
        id: RecordId,
        tenant_id: impl Into<String>,
        sequence: i64,
        timestamp: Timestamp,
        previous_digest: impl Into<String>,
    ) -> Self {
        let mut record = Self {
            id,
            tenant_id: tenant_id.into(),
            sequence,
            actor_id: draft.actor_id,
            kind: draft.kind,
            origin: draft.origin,
            severity: draft.kind.severity(),
            title: draft.title,
            description: draft.description,
            entity: draft.entity,
            entity_id: draft.entity_id,
            action: draft.action,
            before: draft.before,
            after: draft.after,
            agent: draft.agent,
            provenance: draft.provenance,
            timestamp,
            previous_digest: previous_digest.into(),
            digest: String::new(),
        };
        record.digest = crate::chain::compute_digest(&record);
        record
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::chain::{verify_record, GENESIS_DIGEST};

    #[test]
    fn draft_defaults_title_to_kind_label() {
        let draft = DecisionDraft::new(
            DecisionKind::JobFinished,
            DecisionOrigin::Human,
            "job",
            "J1",
            "finish",
            json!({"status": "done"}),
        );
        assert_eq!(draft.title, DecisionKind::JobFinished.label());
        assert!(draft.actor_id.is_none());
    }

    #[test]
    fn seal_derives_severity_and_digest() {
        let draft = DecisionDraft::new(
            DecisionKind::PaymentMarked,
            DecisionOrigin::AutomatedAgentA,
            "payment",
            "P1",
            "mark_paid",
            json!({"amount": 1200}),
        )
        .with_agent(AgentMetadata {
            rationale: Some("within policy".into()),
            ..Default::default()
        });

        let record = DecisionRecord::seal(draft, uuid::Uuid::now_v7(), "acme", 1, Utc::now(), GENESIS_DIGEST);
        assert_eq!(record.severity, DecisionKind::PaymentMarked.severity());
        assert_eq!(record.digest.len(), 64);
        assert!(verify_record(&record));
    }
}
