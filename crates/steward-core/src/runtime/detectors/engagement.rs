// crates/steward-core/src/runtime/detectors/engagement.rs
// ============================================================================
// Module: Engagement Detector
// Description: Detects first engagement and absence of engagement.
// Purpose: Emit FIRST_ENGAGEMENT_OCCURRED and NO_ENGAGEMENT_PRESENT signals.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! The engagement detector inspects engagement-check evidence. An empty
//! engagement list for a prospect with no recent engagement check yields
//! NO_ENGAGEMENT_PRESENT; the first observed engagement for an account with
//! no prior last-engagement yields a permanent FIRST_ENGAGEMENT_OCCURRED.
//! When the account is already a customer, the first-engagement signal is
//! emitted as historical and excluded from lifecycle inference.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::Confidence;
use crate::core::ConfidenceSource;
use crate::core::DetectorName;
use crate::core::EvidenceRef;
use crate::core::EvidenceSnapshot;
use crate::core::LifecycleState;
use crate::core::Severity;
use crate::core::Signal;
use crate::core::SignalType;
use crate::core::daily_window_key;
use crate::runtime::detectors::Detector;
use crate::runtime::detectors::DetectorContext;
use crate::runtime::detectors::DetectorError;
use crate::runtime::detectors::SignalDraft;
use crate::runtime::detectors::build_signal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Days since the last engagement check before re-emitting no-engagement.
const NO_ENGAGEMENT_RECHECK_DAYS: i64 = 30;

// ============================================================================
// SECTION: Detector
// ============================================================================

/// Detects engagement presence and absence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngagementDetector;

impl Detector for EngagementDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("engagement")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::FirstEngagementOccurred, SignalType::NoEngagementPresent]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let engagements =
            snapshot.payload.get("engagements").and_then(Value::as_array).cloned().unwrap_or_default();
        let lifecycle = context
            .prior_state
            .as_ref()
            .map_or(LifecycleState::Prospect, |state| state.lifecycle_state);
        let last_engagement =
            context.prior_state.as_ref().and_then(|state| state.last_engagement_at);

        let mut signals = Vec::new();

        if engagements.is_empty() {
            let recheck_due = last_engagement.is_none_or(|at| {
                snapshot.captured_at.days_since(at) >= NO_ENGAGEMENT_RECHECK_DAYS
            });
            if lifecycle == LifecycleState::Prospect && recheck_due {
                let mut draft = SignalDraft::new(
                    SignalType::NoEngagementPresent,
                    Confidence::new(0.8, ConfidenceSource::Derived),
                    Severity::Medium,
                    daily_window_key(snapshot.captured_at),
                );
                draft
                    .context
                    .insert("checked_at".to_string(), json!(snapshot.captured_at.as_unix_millis()));
                signals.push(build_signal(snapshot, reference, context, self, draft)?);
            }
            return Ok(signals);
        }

        if last_engagement.is_none() {
            let historical = lifecycle == LifecycleState::Customer;
            let mut draft = SignalDraft::new(
                SignalType::FirstEngagementOccurred,
                Confidence::new(1.0, ConfidenceSource::Direct),
                Severity::Low,
                "first".to_string(),
            );
            draft.inference_active = !historical;
            draft.context.insert("engagement_count".to_string(), json!(engagements.len()));
            if historical {
                draft.context.insert("historical".to_string(), json!(true));
            }
            signals.push(build_signal(snapshot, reference, context, self, draft)?);
        }

        Ok(signals)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::AccountId;
    use crate::core::AccountState;
    use crate::core::EntityRef;
    use crate::core::EvidenceId;
    use crate::core::HashAlgorithm;
    use crate::core::HashDigest;
    use crate::core::TenantId;
    use crate::core::Timestamp;
    use crate::core::TraceId;

    /// Builds a snapshot and matching ref for detector tests.
    fn fixture(payload: Value) -> (EvidenceSnapshot, EvidenceRef) {
        let snapshot = EvidenceSnapshot {
            evidence_id: EvidenceId::new("e1"),
            tenant_id: TenantId::new("t1"),
            entity: EntityRef {
                entity_type: "account".to_string(),
                entity_id: "a1".to_string(),
            },
            schema_version: 1,
            detector_input_version: 1,
            captured_at: Timestamp::from_unix_millis(86_400_000),
            payload,
        };
        let reference = EvidenceRef {
            uri: "s3://bucket/evidence/account/a1/e1.json".to_string(),
            sha256: HashDigest {
                algorithm: HashAlgorithm::Sha256,
                value: "ab".to_string(),
            },
            captured_at: snapshot.captured_at,
            schema_version: 1,
            detector_input_version: 1,
        };
        (snapshot, reference)
    }

    /// Tests no-engagement emission for a fresh prospect.
    #[test]
    fn test_no_engagement_for_prospect() {
        let (snapshot, reference) = fixture(json!({"engagements": []}));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = EngagementDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::NoEngagementPresent);
    }

    /// Tests that a recent engagement check suppresses re-emission.
    #[test]
    fn test_recent_check_suppresses_no_engagement() {
        let (snapshot, reference) = fixture(json!({"engagements": []}));
        let mut state = AccountState::new(TenantId::new("t1"), AccountId::new("a1"));
        state.last_engagement_at = Some(snapshot.captured_at.minus_days(5));
        let context = DetectorContext {
            prior_state: Some(state),
            trace_id: TraceId::new("trace"),
        };
        let signals = EngagementDetector.detect(&snapshot, &reference, &context).unwrap();
        assert!(signals.is_empty());
    }

    /// Tests first-engagement emission and permanence.
    #[test]
    fn test_first_engagement_is_permanent() {
        let (snapshot, reference) = fixture(json!({"engagements": [{"kind": "meeting"}]}));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = EngagementDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::FirstEngagementOccurred);
        assert_eq!(signals[0].ttl, crate::core::SignalTtl::Permanent);
        assert!(signals[0].inference_active);
    }

    /// Tests that customers get a historical, non-inferring first engagement.
    #[test]
    fn test_customer_first_engagement_is_historical() {
        let (snapshot, reference) = fixture(json!({"engagements": [{"kind": "meeting"}]}));
        let mut state = AccountState::new(TenantId::new("t1"), AccountId::new("a1"));
        state.lifecycle_state = LifecycleState::Customer;
        state.has_active_contract = true;
        let context = DetectorContext {
            prior_state: Some(state),
            trace_id: TraceId::new("trace"),
        };
        let signals = EngagementDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert!(!signals[0].inference_active);
    }
}
