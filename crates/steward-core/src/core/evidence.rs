// crates/steward-core/src/core/evidence.rs
// ============================================================================
// Module: Steward Evidence Model
// Description: Content-addressed evidence snapshots and references.
// Purpose: Provide immutable, hash-verified observation records for detectors.
// Dependencies: crate::core::{hashing, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Evidence snapshots are immutable observations of external state, addressed
//! by the SHA-256 of their canonical JSON serialization. Detectors, posture
//! records, and execution outcomes reference evidence by [`EvidenceRef`];
//! every read verifies the recomputed digest against the stored one and fails
//! closed on mismatch. Execution outcomes use a synthetic `execution://`
//! scheme whose digest covers the outcome identity rather than a fetchable
//! payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::error::Classified;
use crate::core::error::ErrorKind;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::AccountId;
use crate::core::identifiers::ActionIntentId;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// URI scheme for synthetic execution-outcome evidence.
pub const EXECUTION_EVIDENCE_SCHEME: &str = "execution://";

// ============================================================================
// SECTION: Entity References
// ============================================================================

/// Reference to the external entity an evidence snapshot observes.
///
/// # Invariants
/// - `entity_type` and `entity_id` are stable identifiers within a connector domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type identifier (`account`, `contract`, `ticket`, etc.).
    pub entity_type: String,
    /// Entity identifier within the external system.
    pub entity_id: String,
}

// ============================================================================
// SECTION: Evidence Snapshots
// ============================================================================

/// Immutable evidence snapshot captured by a connector.
///
/// # Invariants
/// - `payload` is never mutated after creation.
/// - The content address of a snapshot is the canonical hash of `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    /// Evidence identifier.
    pub evidence_id: EvidenceId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Observed external entity.
    pub entity: EntityRef,
    /// Payload schema version.
    pub schema_version: u32,
    /// Detector input contract version.
    pub detector_input_version: u32,
    /// Capture timestamp.
    pub captured_at: Timestamp,
    /// Observation payload.
    pub payload: Value,
}

impl EvidenceSnapshot {
    /// Computes the content address of this snapshot's payload.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn content_hash(&self) -> Result<HashDigest, HashError> {
        hash_canonical_json(DEFAULT_HASH_ALGORITHM, &self.payload)
    }
}

/// Reference to an evidence snapshot in the object store.
///
/// # Invariants
/// - `sha256` matches the canonical hash of the referenced payload, except
///   for `execution://` refs where it covers the outcome identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Object-store URI, or a synthetic `execution://` identifier.
    pub uri: String,
    /// Content digest for integrity verification.
    pub sha256: HashDigest,
    /// Capture timestamp.
    pub captured_at: Timestamp,
    /// Payload schema version.
    pub schema_version: u32,
    /// Detector input contract version.
    pub detector_input_version: u32,
}

impl EvidenceRef {
    /// Returns true when this ref uses the synthetic execution scheme.
    #[must_use]
    pub fn is_execution_ref(&self) -> bool {
        self.uri.starts_with(EXECUTION_EVIDENCE_SCHEME)
    }
}

/// Returns the object-store key for an evidence snapshot.
#[must_use]
pub fn evidence_object_key(entity: &EntityRef, evidence_id: &EvidenceId) -> String {
    format!("evidence/{}/{}/{}.json", entity.entity_type, entity.entity_id, evidence_id)
}

// ============================================================================
// SECTION: Execution Evidence
// ============================================================================

/// Builds the synthetic evidence ref for a terminal execution outcome.
///
/// The ref is an opaque identifier, not a fetchable URI; its digest covers
/// `{action_intent_id, completed_at, status}`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when digest serialization fails.
pub fn execution_evidence_ref(
    tenant_id: &TenantId,
    account_id: &AccountId,
    action_intent_id: &ActionIntentId,
    completed_at: Timestamp,
    status: &str,
) -> Result<EvidenceRef, HashError> {
    let digest = hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &json!({
            "action_intent_id": action_intent_id.as_str(),
            "completed_at": completed_at.as_unix_millis(),
            "status": status,
        }),
    )?;
    Ok(EvidenceRef {
        uri: format!("{EXECUTION_EVIDENCE_SCHEME}{tenant_id}/{account_id}/{action_intent_id}"),
        sha256: digest,
        captured_at: completed_at,
        schema_version: 1,
        detector_input_version: 1,
    })
}

// ============================================================================
// SECTION: Integrity Verification
// ============================================================================

/// Evidence integrity errors.
#[derive(Debug, Error)]
pub enum EvidenceIntegrityError {
    /// Recomputed digest does not match the stored reference.
    #[error("evidence hash mismatch for {uri} (expected {expected}, got {actual})")]
    HashMismatch {
        /// Reference URI that failed verification.
        uri: String,
        /// Expected digest value.
        expected: String,
        /// Recomputed digest value.
        actual: String,
    },
    /// Synthetic execution refs cannot be fetched.
    #[error("execution evidence ref is not fetchable: {0}")]
    NotFetchable(String),
    /// Payload hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for EvidenceIntegrityError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::HashMismatch { .. } | Self::NotFetchable(_) => ErrorKind::Invariant,
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

/// Verifies a fetched payload against its evidence reference.
///
/// # Errors
///
/// Returns [`EvidenceIntegrityError::HashMismatch`] when the recomputed
/// digest differs, and [`EvidenceIntegrityError::NotFetchable`] for
/// `execution://` refs.
pub fn verify_evidence_payload(
    reference: &EvidenceRef,
    payload: &Value,
) -> Result<(), EvidenceIntegrityError> {
    if reference.is_execution_ref() {
        return Err(EvidenceIntegrityError::NotFetchable(reference.uri.clone()));
    }
    let actual = hash_canonical_json(reference.sha256.algorithm, payload)?;
    if actual.value != reference.sha256.value {
        return Err(EvidenceIntegrityError::HashMismatch {
            uri: reference.uri.clone(),
            expected: reference.sha256.value.clone(),
            actual: actual.value,
        });
    }
    Ok(())
}
