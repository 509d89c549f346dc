//! Per-tenant hash chain over decision records.
//!
//! Each record's digest is `sha256(previous_digest | canonical(record))`.
//! The canonical encoding covers the integrity fields only; title,
//! description, agent metadata, and provenance are display data and are
//! left out.

use chrono::SecondsFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::record::DecisionRecord;
use crate::types::{RecordId, Timestamp};

/// `previous_digest` of the first record in every tenant's chain.
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// Digest computation
// ---------------------------------------------------------------------------

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Canonical text encoding of a record's integrity fields.
///
/// `serde_json::Map` is ordered by key, so nested snapshots encode the same
/// way regardless of the order their fields were inserted in.
pub fn canonical(record: &DecisionRecord) -> String {
    let value = serde_json::json!({
        "id": record.id.to_string(),
        "tenant_id": record.tenant_id,
        "sequence": record.sequence,
        "actor_id": record.actor_id,
        "kind": record.kind.as_str(),
        "origin": record.origin.as_str(),
        "severity": record.severity.as_str(),
        "entity": record.entity,
        "entity_id": record.entity_id,
        "action": record.action,
        "before": record.before,
        "after": record.after,
        "timestamp": canonical_timestamp(&record.timestamp),
    });
    value.to_string()
}

/// Timestamps are hashed at microsecond precision.
pub fn canonical_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Compute the digest a record should carry given its own fields and
/// its stored `previous_digest`.
pub fn compute_digest(record: &DecisionRecord) -> String {
    let combined = format!("{}|{}", record.previous_digest, canonical(record));
    sha256_hex(combined.as_bytes())
}

/// Check a single record in isolation.
///
/// This is weaker than [`verify_chain`]: it detects tampering with one
/// record's integrity fields but cannot detect reordering, insertion, or
/// deletion, because it never looks at the neighbouring records.
pub fn verify_record(record: &DecisionRecord) -> bool {
    record.severity == record.kind.severity() && compute_digest(record) == record.digest
}

// ---------------------------------------------------------------------------
// Chain replay
// ---------------------------------------------------------------------------

/// Why replay stopped trusting the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BreakReason {
    /// Record belongs to a different tenant.
    TenantMismatch { found: String },
    /// Sequence numbers skip or repeat.
    SequenceGap { expected: i64, found: i64 },
    /// `previous_digest` does not match the prior record's digest.
    BrokenLink,
    /// Timestamp is earlier than the prior record's.
    TimestampRegression,
    /// Severity does not match the fixed table for the kind.
    SeverityMismatch,
    /// Recomputed digest differs from the stored one.
    DigestMismatch,
}

impl std::fmt::Display for BreakReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakReason::TenantMismatch { found } => write!(f, "record belongs to tenant '{found}'"),
            BreakReason::SequenceGap { expected, found } => {
                write!(f, "expected sequence {expected}, found {found}")
            }
            BreakReason::BrokenLink => f.write_str("previous digest does not match"),
            BreakReason::TimestampRegression => f.write_str("timestamp earlier than previous record"),
            BreakReason::SeverityMismatch => f.write_str("severity does not match kind"),
            BreakReason::DigestMismatch => f.write_str("digest does not match contents"),
        }
    }
}

/// First point where a chain stops verifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreak {
    pub sequence: i64,
    pub record_id: RecordId,
    #[serde(flatten)]
    pub reason: BreakReason,
}

/// Result of replaying a tenant's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub tenant_id: String,
    /// Number of records replayed.
    pub verified_entries: usize,
    /// Whether the entire chain is valid.
    pub intact: bool,
    /// Sequence of the last record that verified, 0 if none did.
    pub intact_through: i64,
    pub first_break: Option<ChainBreak>,
    /// Digest of the last record, or the genesis digest for an empty chain.
    pub tail_digest: String,
    pub verified_at: Timestamp,
}

impl ChainVerification {
    /// Whether the record at `sequence` precedes the first break.
    ///
    /// Everything from the break onwards is untrusted, even records whose
    /// own digest happens to recompute.
    pub fn is_record_intact(&self, sequence: i64) -> bool {
        sequence >= 1 && sequence <= self.intact_through
    }
}

/// Replay `records` (in sequence order) and check every link.
///
/// Replay continues past a break only to count entries and find the tail;
/// the break position is fixed at the first failure.
pub fn verify_chain(
    tenant_id: &str,
    records: &[DecisionRecord],
    verified_at: Timestamp,
) -> ChainVerification {
    let mut expected_previous = GENESIS_DIGEST.to_string();
    let mut expected_sequence = 1i64;
    let mut previous_timestamp: Option<Timestamp> = None;
    let mut first_break: Option<ChainBreak> = None;
    let mut intact_through = 0i64;

    for record in records {
        if first_break.is_none() {
            match check_link(
                tenant_id,
                record,
                &expected_previous,
                expected_sequence,
                previous_timestamp,
            ) {
                Ok(()) => intact_through = record.sequence,
                Err(reason) => {
                    first_break = Some(ChainBreak {
                        sequence: record.sequence,
                        record_id: record.id,
                        reason,
                    });
                }
            }
        }

        expected_previous = record.digest.clone();
        expected_sequence = record.sequence + 1;
        previous_timestamp = Some(record.timestamp);
    }

    ChainVerification {
        tenant_id: tenant_id.to_string(),
        verified_entries: records.len(),
        intact: first_break.is_none(),
        intact_through,
        first_break,
        tail_digest: expected_previous,
        verified_at,
    }
}

fn check_link(
    tenant_id: &str,
    record: &DecisionRecord,
    expected_previous: &str,
    expected_sequence: i64,
    previous_timestamp: Option<Timestamp>,
) -> Result<(), BreakReason> {
    if record.tenant_id != tenant_id {
        return Err(BreakReason::TenantMismatch {
            found: record.tenant_id.clone(),
        });
    }
    if record.sequence != expected_sequence {
        return Err(BreakReason::SequenceGap {
            expected: expected_sequence,
            found: record.sequence,
        });
    }
    if record.previous_digest != expected_previous {
        return Err(BreakReason::BrokenLink);
    }
    if previous_timestamp.is_some_and(|prev| record.timestamp < prev) {
        return Err(BreakReason::TimestampRegression);
    }
    if record.severity != record.kind.severity() {
        return Err(BreakReason::SeverityMismatch);
    }
    if compute_digest(record) != record.digest {
        return Err(BreakReason::DigestMismatch);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
