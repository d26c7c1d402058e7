// crates/steward-core/src/core/ledger.rs
// ============================================================================
// Module: Steward Ledger Model
// Description: Append-only audit entries spanning all state changes.
// Purpose: Provide the replayable source of truth for audit and verification.
// Dependencies: crate::core::{evidence, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Ledger entries are append-only: no updates, no deletes. The composite key
//! partitions by trace (or plan) and sorts by event time plus a unique
//! suffix; duplicate sort keys are idempotent no-ops that return the existing
//! entry rather than an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::evidence::EvidenceRef;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::AccountId;
use crate::core::identifiers::ExportJobId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Ledger event classification.
///
/// # Invariants
/// - Variants are stable for serialization and audit export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventType {
    /// Signal creation or status change.
    Signal,
    /// Lifecycle state transition.
    Transition,
    /// Posture synthesis result.
    Synthesis,
    /// Pull or decision scheduling event.
    Schedule,
    /// Execution pipeline outcome.
    Outcome,
    /// Invariant or replay validation finding.
    Validation,
}

// ============================================================================
// SECTION: Ledger Entries
// ============================================================================

/// Append-only ledger entry.
///
/// # Invariants
/// - `(partition_key, sort_key)` is unique; duplicate inserts return the
///   existing entry.
/// - Entries are never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Partition key (trace or plan identifier).
    pub partition_key: String,
    /// Sort key (`<event_time>#<unique_suffix>`).
    pub sort_key: String,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Trace identifier.
    pub trace_id: TraceId,
    /// Event classification.
    pub event_type: LedgerEventType,
    /// Event timestamp.
    pub event_time: Timestamp,
    /// Structured event payload.
    pub data: Value,
    /// Evidence references supporting the entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<EvidenceRef>,
}

impl LedgerEntry {
    /// Builds an entry keyed by trace with the conventional sort key layout.
    #[must_use]
    pub fn for_trace(
        tenant_id: TenantId,
        account_id: AccountId,
        trace_id: TraceId,
        event_type: LedgerEventType,
        event_time: Timestamp,
        unique_suffix: &str,
        data: Value,
    ) -> Self {
        Self {
            partition_key: trace_id.as_str().to_string(),
            sort_key: format!("{}#{unique_suffix}", event_time.as_unix_millis()),
            tenant_id,
            account_id,
            trace_id,
            event_type,
            event_time,
            data,
            evidence_refs: Vec::new(),
        }
    }

    /// Attaches evidence references to the entry.
    #[must_use]
    pub fn with_evidence(mut self, refs: Vec<EvidenceRef>) -> Self {
        self.evidence_refs = refs;
        self
    }
}

// ============================================================================
// SECTION: Audit Exports
// ============================================================================

/// Terminal record of an audit export job.
///
/// # Invariants
/// - `artifact_sha256` matches the canonical hash of the exported artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditExportRecord {
    /// Export job identifier.
    pub export_job_id: ExportJobId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Inclusive range start.
    pub from: Timestamp,
    /// Inclusive range end.
    pub to: Timestamp,
    /// Object-store URI of the export artifact.
    pub artifact_uri: String,
    /// Canonical digest of the export artifact.
    pub artifact_sha256: HashDigest,
    /// Number of ledger entries exported.
    pub entry_count: u64,
    /// Export completion timestamp.
    pub completed_at: Timestamp,
}
