// crates/steward-core/src/core/posture.rs
// ============================================================================
// Module: Steward Posture Model
// Description: Synthesis output records with cryptographic input fingerprints.
// Purpose: Capture deterministic account posture for replay and verification.
// Dependencies: crate::core::{account, evidence, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Posture records are the synthesis engine's only output. Given an identical
//! `inputs_hash` and ruleset, every field is bit-identical except the
//! evaluation timestamp. Finding identifiers derive from the tenant, account,
//! ruleset version, finding kind, sub-type, and rule id, so re-evaluation
//! never mints new identities for unchanged findings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::core::account::LifecycleState;
use crate::core::evidence::EvidenceRef;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::AccountId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::RulesetVersion;
use crate::core::identifiers::SignalId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Posture Classifications
// ============================================================================

/// Account posture classification.
///
/// # Invariants
/// - Variants are stable for serialization and heat-score mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Posture {
    /// Healthy account.
    Ok,
    /// Account warrants observation.
    Watch,
    /// Account shows churn or delivery risk.
    AtRisk,
    /// Account shows expansion opportunity.
    Expand,
    /// Account is dormant.
    Dormant,
}

impl Posture {
    /// Returns the stable wire label for the posture.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Watch => "WATCH",
            Self::AtRisk => "AT_RISK",
            Self::Expand => "EXPAND",
            Self::Dormant => "DORMANT",
        }
    }
}

/// Momentum direction attached to a posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Momentum {
    /// Improving trajectory.
    Up,
    /// Stable trajectory.
    Flat,
    /// Deteriorating trajectory.
    Down,
}

// ============================================================================
// SECTION: Findings
// ============================================================================

/// Finding classification within a posture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Risk factor.
    Risk,
    /// Opportunity.
    Opportunity,
    /// Unknown requiring investigation.
    Unknown,
}

impl FindingKind {
    /// Returns the stable tag used in finding-id derivation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Risk => "risk",
            Self::Opportunity => "opportunity",
            Self::Unknown => "unknown",
        }
    }
}

/// Enumerated finding attached to a posture record.
///
/// # Invariants
/// - `finding_id` derives deterministically from the finding identity, never
///   from evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Deterministic finding identifier.
    pub finding_id: HashDigest,
    /// Finding classification.
    pub kind: FindingKind,
    /// Finding sub-type label (e.g. `churn`, `expansion`, `coverage`).
    pub sub_type: String,
    /// Rule that produced the finding.
    pub rule_id: RuleId,
    /// Human-stable description.
    pub description: String,
}

/// Derives the deterministic identifier for a finding.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn derive_finding_id(
    tenant_id: &TenantId,
    account_id: &AccountId,
    ruleset_version: &RulesetVersion,
    kind: FindingKind,
    sub_type: &str,
    rule_id: &RuleId,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &json!({
            "tenant_id": tenant_id.as_str(),
            "account_id": account_id.as_str(),
            "ruleset_version": ruleset_version.as_str(),
            "kind": kind.as_str(),
            "sub_type": sub_type,
            "rule_id": rule_id.as_str(),
        }),
    )
}

// ============================================================================
// SECTION: Posture Record
// ============================================================================

/// Deterministic synthesis output for an account.
///
/// # Invariants
/// - For a fixed `inputs_hash` and ruleset, every field except `evaluated_at`
///   is bit-identical across evaluations.
/// - `evidence_signal_ids` is sorted lexicographically and capped.
/// - `evidence_refs` is deduplicated by digest and capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureRecord {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Posture classification.
    pub posture: Posture,
    /// Momentum direction.
    pub momentum: Momentum,
    /// Risk findings.
    pub risks: Vec<Finding>,
    /// Opportunity findings.
    pub opportunities: Vec<Finding>,
    /// Unknown findings.
    pub unknowns: Vec<Finding>,
    /// Evidence signal ids (sorted, top-K).
    pub evidence_signal_ids: Vec<SignalId>,
    /// Evidence snapshot refs (deduped by digest, top-K).
    pub evidence_refs: Vec<EvidenceRef>,
    /// Digest of the sorted active signal id set observed by synthesis.
    pub active_signals_hash: HashDigest,
    /// Digest over (active signals hash, lifecycle state, ruleset version).
    pub inputs_hash: HashDigest,
    /// Lifecycle state at evaluation.
    pub lifecycle_state: LifecycleState,
    /// Ruleset version used.
    pub ruleset_version: RulesetVersion,
    /// Rule that matched.
    pub rule_id: RuleId,
    /// Evaluation timestamp.
    pub evaluated_at: Timestamp,
    /// Optional posture TTL in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_days: Option<u32>,
}

// ============================================================================
// SECTION: Input Fingerprints
// ============================================================================

/// Computes the digest of a sorted active signal id set.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn active_signals_hash(signal_ids: &[SignalId]) -> Result<HashDigest, HashError> {
    let mut sorted: Vec<&str> = signal_ids.iter().map(SignalId::as_str).collect();
    sorted.sort_unstable();
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &sorted)
}

/// Computes the synthesis inputs digest.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn inputs_hash(
    active_signals: &HashDigest,
    lifecycle_state: LifecycleState,
    ruleset_version: &RulesetVersion,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &json!({
            "active_signals_hash": active_signals.value,
            "lifecycle_state": lifecycle_state.as_str(),
            "ruleset_version": ruleset_version.as_str(),
        }),
    )
}
