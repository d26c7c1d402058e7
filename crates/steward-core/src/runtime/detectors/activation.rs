// crates/steward-core/src/runtime/detectors/activation.rs
// ============================================================================
// Module: Activation Detector
// Description: Detects account activation motions in CRM evidence.
// Purpose: Emit ACCOUNT_ACTIVATION_DETECTED on target-list or attribution markers.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! An account is considered activated when the evidence carries any of a
//! target-list update, an external activation signal, or partner/inbound
//! attribution. Detection is direct, so confidence is 1.0.

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
// SECTION: Detector
// ============================================================================

/// Detects account activation markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationDetector;

impl Detector for ActivationDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("account-activation")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::AccountActivationDetected]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let mut markers = Vec::new();
        if snapshot.payload.get("target_list_updated").and_then(Value::as_bool) == Some(true) {
            markers.push("target_list_updated");
        }
        if snapshot.payload.get("external_signal").is_some_and(|value| !value.is_null()) {
            markers.push("external_signal");
        }
        if let Some(attribution) = snapshot.payload.get("attribution").and_then(Value::as_str) {
            if attribution == "partner" || attribution == "inbound" {
                markers.push("attribution");
            }
        }

        if markers.is_empty() {
            return Ok(Vec::new());
        }

        let mut draft = SignalDraft::new(
            SignalType::AccountActivationDetected,
            Confidence::new(1.0, ConfidenceSource::Direct),
            Severity::Medium,
            daily_window_key(snapshot.captured_at),
        );
        draft.context.insert("markers".to_string(), json!(markers));
        let signal = build_signal(snapshot, reference, context, self, draft)?;
        Ok(vec![signal])
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

    /// Tests that partner attribution activates the account.
    #[test]
    fn test_partner_attribution_activates() {
        let (snapshot, reference) = fixture(json!({"attribution": "partner"}));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = ActivationDetector
            .detect(&snapshot, &reference, &context)
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::AccountActivationDetected);
        assert!((signals[0].confidence.value - 1.0).abs() < f64::EPSILON);
    }

    /// Tests that unrelated payloads emit nothing.
    #[test]
    fn test_no_markers_no_signal() {
        let (snapshot, reference) = fixture(json!({"attribution": "outbound"}));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = ActivationDetector
            .detect(&snapshot, &reference, &context)
            .unwrap();
        assert!(signals.is_empty());
    }
}
