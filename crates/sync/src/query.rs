//! Filtering and aggregate statistics over a tenant's decision records.

use std::collections::BTreeMap;

use fieldledger_core::decision::{DecisionKind, DecisionOrigin, Severity};
use fieldledger_core::record::DecisionRecord;
use fieldledger_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Default page size for [`DecisionQuery`].
pub const DEFAULT_LIMIT: usize = 50;
/// Upper bound on a single page.
pub const MAX_LIMIT: usize = 500;

/// Filter for decision records. Empty lists match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionQuery {
    #[serde(default)]
    pub kinds: Vec<DecisionKind>,
    #[serde(default)]
    pub origins: Vec<DecisionOrigin>,
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub entities: Vec<String>,
    pub actor_id: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl DecisionQuery {
    pub fn matches(&self, record: &DecisionRecord) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&record.kind) {
            return false;
        }
        if !self.origins.is_empty() && !self.origins.contains(&record.origin) {
            return false;
        }
        if !self.severities.is_empty() && !self.severities.contains(&record.severity) {
            return false;
        }
        if !self.entities.is_empty() && !self.entities.contains(&record.entity) {
            return false;
        }
        if let Some(actor) = &self.actor_id {
            if record.actor_id.as_deref() != Some(actor.as_str()) {
                return false;
            }
        }
        if self.from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            if !record.title.to_lowercase().contains(&needle)
                && !record.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Apply `query` to records in sequence order. Newest first.
pub fn filter_records(records: Vec<DecisionRecord>, query: &DecisionQuery) -> Vec<DecisionRecord> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    records
        .into_iter()
        .rev()
        .filter(|r| query.matches(r))
        .skip(offset)
        .take(limit)
        .collect()
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate counts over a set of decision records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionStatistics {
    pub total: usize,
    pub human: usize,
    pub automated: usize,
    pub system: usize,
    pub external: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_origin: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    /// Sum over automated decisions that reported token usage.
    pub tokens_used: u64,
    pub estimated_cost_cents: u64,
}

pub fn summarize<'a>(records: impl IntoIterator<Item = &'a DecisionRecord>) -> DecisionStatistics {
    let mut stats = DecisionStatistics::default();

    for record in records {
        stats.total += 1;
        match record.origin {
            DecisionOrigin::Human => stats.human += 1,
            DecisionOrigin::AutomatedAgentA | DecisionOrigin::AutomatedAgentB => {
                stats.automated += 1
            }
            DecisionOrigin::System => stats.system += 1,
            DecisionOrigin::ExternalChannel => stats.external += 1,
        }
        *stats.by_kind.entry(record.kind.as_str().to_string()).or_default() += 1;
        *stats
            .by_origin
            .entry(record.origin.as_str().to_string())
            .or_default() += 1;
        *stats
            .by_severity
            .entry(record.severity.as_str().to_string())
            .or_default() += 1;

        if let Some(agent) = &record.agent {
            stats.tokens_used += agent.tokens_used.unwrap_or(0);
            stats.estimated_cost_cents += agent.estimated_cost_cents.unwrap_or(0);
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use fieldledger_core::chain::GENESIS_DIGEST;
    use fieldledger_core::record::{AgentMetadata, DecisionDraft};
    use serde_json::json;

    use super::*;

    fn record(seq: i64, kind: DecisionKind, origin: DecisionOrigin, title: &str) -> DecisionRecord {
        let at = Utc.with_ymd_and_hms(2026, 1, 29, 8, 0, 0).unwrap() + Duration::minutes(seq);
        let mut draft = DecisionDraft::new(kind, origin, "job", "J1", "edit", json!({}))
            .with_title(title);
        if origin.is_automated() {
            draft = draft.with_agent(AgentMetadata {
                tokens_used: Some(100),
                estimated_cost_cents: Some(3),
                ..Default::default()
            });
        }
        DecisionRecord::seal(draft, uuid::Uuid::now_v7(), "acme", seq, at, GENESIS_DIGEST)
    }

    fn sample() -> Vec<DecisionRecord> {
        vec![
            record(1, DecisionKind::JobCreated, DecisionOrigin::Human, "Created pour"),
            record(2, DecisionKind::PaymentMarked, DecisionOrigin::AutomatedAgentA, "Paid"),
            record(3, DecisionKind::JobFinished, DecisionOrigin::Human, "Finished pour"),
            record(4, DecisionKind::SettingsChanged, DecisionOrigin::System, "Settings"),
        ]
    }

    #[test]
    fn empty_query_returns_newest_first() {
        let result = filter_records(sample(), &DecisionQuery::default());
        let seqs: Vec<i64> = result.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![4, 3, 2, 1]);
    }

    #[test]
    fn filters_combine() {
        let query = DecisionQuery {
            origins: vec![DecisionOrigin::Human],
            search: Some("POUR".into()),
            limit: Some(1),
            ..Default::default()
        };
        let result = filter_records(sample(), &query);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].sequence, 3);
    }

    #[test]
    fn statistics_split_by_origin_family() {
        let records = sample();
        let stats = summarize(&records);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.human, 2);
        assert_eq!(stats.automated, 1);
        assert_eq!(stats.system, 1);
        assert_eq!(stats.by_severity["critical"], 1);
        assert_eq!(stats.tokens_used, 100);
        assert_eq!(stats.estimated_cost_cents, 3);
    }
}
