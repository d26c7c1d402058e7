// crates/steward-core/src/core/signal.rs
// ============================================================================
// Module: Steward Signal Model
// Description: Detection records, status state machine, and dedupe derivation.
// Purpose: Provide idempotent, evidence-bound signal records for perception.
// Dependencies: crate::core::{evidence, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Signals are detection records produced by pure detectors over immutable
//! evidence. Identity is deterministic: the dedupe key hashes the account,
//! signal type, window key, and evidence digest, and the signal id derives
//! from the dedupe key so duplicate detections resolve to the same row. The
//! status state machine is monotonic; a suppressed signal never returns to
//! active.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::evidence::EvidenceRef;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::AccountId;
use crate::core::identifiers::DetectorName;
use crate::core::identifiers::SignalId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Signal Types
// ============================================================================

/// Lifecycle-relevant signal kinds detected by Steward.
///
/// # Invariants
/// - Variants are stable for serialization and dedupe-key derivation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    /// Account entered an activation motion (target list, attribution, or external signal).
    AccountActivationDetected,
    /// Prospect shows no engagement within the observation window.
    NoEngagementPresent,
    /// First engagement observed for the account.
    FirstEngagementOccurred,
    /// Discovery progress stalled across meetings.
    DiscoveryProgressStalled,
    /// Stakeholder coverage gap detected.
    StakeholderGapDetected,
    /// Product usage metric moved beyond the trend threshold.
    UsageTrendChange,
    /// Support load indicates emerging risk.
    SupportRiskEmerging,
    /// Contract renewal window entered.
    RenewalWindowEntered,
    /// An approved action executed successfully.
    ActionExecuted,
    /// An approved action failed terminally.
    ActionFailed,
}

impl SignalType {
    /// Returns the stable wire label for the signal type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccountActivationDetected => "ACCOUNT_ACTIVATION_DETECTED",
            Self::NoEngagementPresent => "NO_ENGAGEMENT_PRESENT",
            Self::FirstEngagementOccurred => "FIRST_ENGAGEMENT_OCCURRED",
            Self::DiscoveryProgressStalled => "DISCOVERY_PROGRESS_STALLED",
            Self::StakeholderGapDetected => "STAKEHOLDER_GAP_DETECTED",
            Self::UsageTrendChange => "USAGE_TREND_CHANGE",
            Self::SupportRiskEmerging => "SUPPORT_RISK_EMERGING",
            Self::RenewalWindowEntered => "RENEWAL_WINDOW_ENTERED",
            Self::ActionExecuted => "ACTION_EXECUTED",
            Self::ActionFailed => "ACTION_FAILED",
        }
    }

    /// Returns true for engagement-class signals used by engagement-window predicates.
    #[must_use]
    pub const fn is_engagement_class(self) -> bool {
        matches!(self, Self::FirstEngagementOccurred)
    }

    /// Returns true for execution-outcome signals that bypass lifecycle coupling.
    #[must_use]
    pub const fn is_execution_outcome(self) -> bool {
        matches!(self, Self::ActionExecuted | Self::ActionFailed)
    }

    /// Returns the default TTL for this signal type.
    #[must_use]
    pub const fn default_ttl(self) -> SignalTtl {
        match self {
            Self::AccountActivationDetected
            | Self::NoEngagementPresent
            | Self::StakeholderGapDetected => SignalTtl::Days(30),
            Self::FirstEngagementOccurred => SignalTtl::Permanent,
            Self::DiscoveryProgressStalled
            | Self::UsageTrendChange
            | Self::SupportRiskEmerging => SignalTtl::Days(14),
            Self::RenewalWindowEntered => SignalTtl::Days(90),
            Self::ActionExecuted | Self::ActionFailed => SignalTtl::Days(7),
        }
    }
}

// ============================================================================
// SECTION: Signal Status
// ============================================================================

/// Signal lifecycle status.
///
/// # Invariants
/// - `Suppressed` is terminal; no transition leads back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    /// Signal is live and participates in inference.
    Active,
    /// Signal was suppressed and is excluded from inference permanently.
    Suppressed,
    /// Signal TTL elapsed without suppression.
    Expired,
}

impl SignalStatus {
    /// Returns true when a transition from `self` to `next` is permitted.
    ///
    /// Allowed transitions: `Active -> Expired`, `Active -> Suppressed`,
    /// `Expired -> Suppressed`. Everything else is rejected, including any
    /// transition out of `Suppressed`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Expired)
                | (Self::Active, Self::Suppressed)
                | (Self::Expired, Self::Suppressed)
        )
    }
}

// ============================================================================
// SECTION: Confidence and Severity
// ============================================================================

/// Provenance of a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// Directly observed in evidence.
    Direct,
    /// Derived from structural thresholds over evidence.
    Derived,
    /// Inferred from indirect indicators.
    Inferred,
}

/// Confidence attached to a detection.
///
/// # Invariants
/// - `value` is clamped to `[0, 1]` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Confidence value in `[0, 1]`.
    pub value: f64,
    /// Provenance of the value.
    pub source: ConfidenceSource,
}

impl Confidence {
    /// Creates a confidence value, clamping into `[0, 1]`.
    #[must_use]
    pub fn new(value: f64, source: ConfidenceSource) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            source,
        }
    }
}

/// Signal severity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational severity.
    Low,
    /// Attention-worthy severity.
    Medium,
    /// Elevated severity.
    High,
    /// Highest severity.
    Critical,
}

// ============================================================================
// SECTION: TTL
// ============================================================================

/// Time-to-live for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SignalTtl {
    /// Signal expires after the given number of days.
    Days(u32),
    /// Signal never expires.
    Permanent,
}

impl SignalTtl {
    /// Returns true when the TTL has elapsed at `now` for a signal created at `created_at`.
    #[must_use]
    pub const fn elapsed(self, created_at: Timestamp, now: Timestamp) -> bool {
        match self {
            Self::Days(days) => now.days_since(created_at) >= days as i64,
            Self::Permanent => false,
        }
    }
}

// ============================================================================
// SECTION: Suppression Metadata
// ============================================================================

/// Metadata recorded when a signal is suppressed.
///
/// # Invariants
/// - Present iff the signal status is `Suppressed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionMeta {
    /// Human-stable reason label.
    pub reason: String,
    /// Suppression timestamp.
    pub suppressed_at: Timestamp,
}

// ============================================================================
// SECTION: Signal Record
// ============================================================================

/// Detection record bound to immutable evidence.
///
/// # Invariants
/// - `dedupe_key` is unique per tenant; duplicates resolve to the first row.
/// - `signal_id` derives from `dedupe_key`, so identical detections share identity.
/// - `suppression` is `Some` iff `status == Suppressed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Deterministic signal identifier.
    pub signal_id: SignalId,
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Signal type.
    pub signal_type: SignalType,
    /// Signal lifecycle status.
    pub status: SignalStatus,
    /// Detection confidence.
    pub confidence: Confidence,
    /// Severity classification.
    pub severity: Severity,
    /// Time-to-live.
    pub ttl: SignalTtl,
    /// Window key bucketing this observation.
    pub window_key: String,
    /// Idempotency key over (account, type, window key, evidence hash).
    pub dedupe_key: HashDigest,
    /// Evidence binding.
    pub evidence: EvidenceRef,
    /// Detector that produced the signal.
    pub detector: DetectorName,
    /// Detector version for replay comparison.
    pub detector_version: u32,
    /// Whether the signal participates in lifecycle inference.
    pub inference_active: bool,
    /// Structured detection context consumed by rule predicates.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// Free-form metadata consumed by rule predicates.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Suppression metadata when suppressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression: Option<SuppressionMeta>,
    /// Trace identifier correlating ledger entries.
    pub trace_id: TraceId,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

impl Signal {
    /// Returns true when the signal is expired at `now` by TTL, absent suppression.
    #[must_use]
    pub const fn ttl_elapsed(&self, now: Timestamp) -> bool {
        self.ttl.elapsed(self.created_at, now)
    }

    /// Returns true when the signal should be treated as active at `now`.
    ///
    /// Read-time TTL filtering applies even if an eventual expiry sweep has
    /// not yet updated the stored status.
    #[must_use]
    pub const fn is_active_at(&self, now: Timestamp) -> bool {
        matches!(self.status, SignalStatus::Active) && !self.ttl_elapsed(now)
    }
}

// ============================================================================
// SECTION: Identity Derivation
// ============================================================================

/// Derives the dedupe key for a detection.
///
/// The key hashes `(account, signal_type, window_key, evidence_hash)` so the
/// same observation of the same kind of change within the same window
/// collapses to one row.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn derive_dedupe_key(
    account_id: &AccountId,
    signal_type: SignalType,
    window_key: &str,
    evidence_hash: &HashDigest,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &json!({
            "account_id": account_id.as_str(),
            "signal_type": signal_type.as_str(),
            "window_key": window_key,
            "evidence_sha256": evidence_hash.value,
        }),
    )
}

/// Derives the deterministic signal id from a dedupe key.
#[must_use]
pub fn derive_signal_id(dedupe_key: &HashDigest) -> SignalId {
    let prefix: String = dedupe_key.value.chars().take(24).collect();
    SignalId::new(format!("sig-{prefix}"))
}

/// Returns the daily window key for a capture timestamp.
#[must_use]
pub fn daily_window_key(captured_at: Timestamp) -> String {
    format!("d{}", captured_at.day_key())
}
