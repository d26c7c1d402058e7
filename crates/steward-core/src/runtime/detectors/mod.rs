// crates/steward-core/src/runtime/detectors/mod.rs
// ============================================================================
// Module: Steward Detector Runtime
// Description: Pure structural detectors and the detector registry.
// Purpose: Convert verified evidence snapshots into deterministic signals.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! Detectors are pure functions from a verified evidence snapshot (plus the
//! prior lifecycle read-model) to zero or more signals. Detection is
//! structural: threshold counters over payload shapes, never semantic
//! judgment. Every invocation verifies the payload digest against the
//! reference before analysis; a mismatch is fatal to that invocation.
//! Detectors are registered in a table keyed by name and expose a common
//! capability set.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod activation;
pub mod discovery;
pub mod engagement;
pub mod renewal;
pub mod stakeholder;
pub mod support;
pub mod usage;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::AccountState;
use crate::core::Classified;
use crate::core::Confidence;
use crate::core::DetectorName;
use crate::core::ErrorKind;
use crate::core::EvidenceRef;
use crate::core::EvidenceSnapshot;
use crate::hashing::HashError;
use crate::core::Severity;
use crate::core::Signal;
use crate::core::SignalStatus;
use crate::core::SignalTtl;
use crate::core::SignalType;
use crate::core::TraceId;
use crate::core::derive_dedupe_key;
use crate::core::derive_signal_id;
use crate::interfaces::EvidenceStore;
use crate::interfaces::EvidenceStoreError;

// ============================================================================
// SECTION: Detector Context
// ============================================================================

/// Context supplied to a detector invocation.
///
/// # Invariants
/// - `prior_state` is the read-model before the detection, or `None` for a
///   first observation.
#[derive(Debug, Clone)]
pub struct DetectorContext {
    /// Lifecycle read-model prior to detection.
    pub prior_state: Option<AccountState>,
    /// Trace identifier for emitted signals.
    pub trace_id: TraceId,
}

// ============================================================================
// SECTION: Detector Capability
// ============================================================================

/// Detector errors.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Evidence fetch or integrity verification failed.
    #[error(transparent)]
    Evidence(#[from] EvidenceStoreError),
    /// Dedupe-key derivation failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for DetectorError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Evidence(inner) => inner.kind(),
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

/// Common capability set implemented by every detector.
///
/// Detectors must be pure: identical evidence and context yield identical
/// signals, bit for bit.
pub trait Detector: Send + Sync {
    /// Returns the registry name of the detector.
    fn name(&self) -> DetectorName;

    /// Returns the detector version recorded on emitted signals.
    fn version(&self) -> u32;

    /// Returns the signal types this detector can emit.
    fn supported_types(&self) -> Vec<SignalType>;

    /// Runs detection over a verified snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError`] when signal derivation fails; payloads
    /// missing the sections a detector inspects yield no signals instead.
    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError>;
}

// ============================================================================
// SECTION: Signal Drafts
// ============================================================================

/// Partially specified signal produced inside a detector.
#[derive(Debug, Clone)]
pub struct SignalDraft {
    /// Signal type.
    pub signal_type: SignalType,
    /// Detection confidence.
    pub confidence: Confidence,
    /// Severity classification.
    pub severity: Severity,
    /// Window key bucketing this observation.
    pub window_key: String,
    /// TTL override; defaults to the per-type table.
    pub ttl: Option<SignalTtl>,
    /// Whether the signal participates in lifecycle inference.
    pub inference_active: bool,
    /// Structured detection context.
    pub context: Map<String, Value>,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
}

impl SignalDraft {
    /// Creates a draft with type defaults and an empty context.
    #[must_use]
    pub fn new(
        signal_type: SignalType,
        confidence: Confidence,
        severity: Severity,
        window_key: String,
    ) -> Self {
        Self {
            signal_type,
            confidence,
            severity,
            window_key,
            ttl: None,
            inference_active: true,
            context: Map::new(),
            metadata: Map::new(),
        }
    }
}

/// Materializes a draft into a full signal bound to its evidence.
///
/// The dedupe key hashes the account, type, window key, and evidence digest;
/// the signal id derives from the dedupe key; `created_at` is the evidence
/// capture time so detection stays replayable.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when key derivation fails.
pub fn build_signal(
    snapshot: &EvidenceSnapshot,
    reference: &EvidenceRef,
    context: &DetectorContext,
    detector: &dyn Detector,
    draft: SignalDraft,
) -> Result<Signal, HashError> {
    let account_id = AccountId::new(snapshot.entity.entity_id.as_str());
    let dedupe_key =
        derive_dedupe_key(&account_id, draft.signal_type, &draft.window_key, &reference.sha256)?;
    let signal_id = derive_signal_id(&dedupe_key);
    Ok(Signal {
        signal_id,
        tenant_id: snapshot.tenant_id.clone(),
        account_id,
        signal_type: draft.signal_type,
        status: SignalStatus::Active,
        confidence: draft.confidence,
        severity: draft.severity,
        ttl: draft.ttl.unwrap_or_else(|| draft.signal_type.default_ttl()),
        window_key: draft.window_key,
        dedupe_key,
        evidence: reference.clone(),
        detector: detector.name(),
        detector_version: detector.version(),
        inference_active: draft.inference_active,
        context: draft.context,
        metadata: draft.metadata,
        suppression: None,
        trace_id: context.trace_id.clone(),
        created_at: snapshot.captured_at,
    })
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of detectors keyed by name.
#[derive(Default, Clone)]
pub struct DetectorRegistry {
    /// Registered detectors.
    detectors: BTreeMap<DetectorName, Arc<dyn Detector>>,
}

impl DetectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a detector, replacing any previous entry with the same name.
    #[must_use]
    pub fn with(mut self, detector: impl Detector + 'static) -> Self {
        self.detectors.insert(detector.name(), Arc::new(detector));
        self
    }

    /// Returns the detector registered under a name.
    #[must_use]
    pub fn detector(&self, name: &DetectorName) -> Option<Arc<dyn Detector>> {
        self.detectors.get(name).map(Arc::clone)
    }

    /// Returns all registered detectors in name order.
    #[must_use]
    pub fn detectors(&self) -> Vec<Arc<dyn Detector>> {
        self.detectors.values().map(Arc::clone).collect()
    }

    /// Builds the standard registry covering every built-in detector.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(activation::ActivationDetector)
            .with(engagement::EngagementDetector)
            .with(discovery::DiscoveryStallDetector)
            .with(stakeholder::StakeholderGapDetector)
            .with(usage::UsageTrendDetector)
            .with(support::SupportRiskDetector)
            .with(renewal::RenewalWindowDetector)
    }
}

// ============================================================================
// SECTION: Detection Driver
// ============================================================================

/// Fetches, verifies, and analyzes evidence with one detector.
///
/// # Errors
///
/// Returns [`DetectorError::Evidence`] when the fetch or integrity check
/// fails; the failure is fatal to this invocation.
pub fn run_detector(
    store: &dyn EvidenceStore,
    detector: &dyn Detector,
    reference: &EvidenceRef,
    context: &DetectorContext,
) -> Result<Vec<Signal>, DetectorError> {
    let snapshot = store.fetch_snapshot(reference)?;
    detector.detect(&snapshot, reference, context)
}
