// crates/steward-core/src/runtime/detectors/renewal.rs
// ============================================================================
// Module: Renewal Window Detector
// Description: Detects contracts entering the renewal window.
// Purpose: Emit RENEWAL_WINDOW_ENTERED per contract with boundary dedupe.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! Each contract with `0 < days_to_renewal <= 90` emits a signal. The window
//! key embeds the contract id and the threshold boundary (`0-30`, `31-60`,
//! `61-90`), so a contract crossing a boundary produces a new signal while
//! repeated observations within a boundary dedupe to one row. Severity
//! tightens as renewal approaches.

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
use crate::core::Timestamp;
use crate::runtime::detectors::Detector;
use crate::runtime::detectors::DetectorContext;
use crate::runtime::detectors::DetectorError;
use crate::runtime::detectors::SignalDraft;
use crate::runtime::detectors::build_signal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Renewal window length in days.
const RENEWAL_WINDOW_DAYS: i64 = 90;

// ============================================================================
// SECTION: Detector
// ============================================================================

/// Detects contracts entering the renewal window.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenewalWindowDetector;

impl Detector for RenewalWindowDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("renewal-window")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::RenewalWindowEntered]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let Some(contracts) = snapshot.payload.get("contracts").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        for contract in contracts {
            let Some(contract_id) = contract.get("contract_id").and_then(Value::as_str) else {
                continue;
            };
            let Some(days_to_renewal) = days_to_renewal(contract, snapshot) else {
                continue;
            };
            if days_to_renewal <= 0 || days_to_renewal > RENEWAL_WINDOW_DAYS {
                continue;
            }

            let boundary = threshold_boundary(days_to_renewal);
            let severity = if days_to_renewal <= 30 {
                Severity::Critical
            } else if days_to_renewal <= 60 {
                Severity::High
            } else {
                Severity::Medium
            };

            let mut draft = SignalDraft::new(
                SignalType::RenewalWindowEntered,
                Confidence::new(1.0, ConfidenceSource::Direct),
                severity,
                format!("renewal-{contract_id}-{boundary}"),
            );
            draft.context.insert("contract_id".to_string(), json!(contract_id));
            draft.context.insert("days_to_renewal".to_string(), json!(days_to_renewal));
            draft.context.insert("threshold_boundary".to_string(), json!(boundary));
            signals.push(build_signal(snapshot, reference, context, self, draft)?);
        }
        Ok(signals)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves days to renewal from an explicit field or the renewal timestamp.
fn days_to_renewal(contract: &Value, snapshot: &EvidenceSnapshot) -> Option<i64> {
    if let Some(days) = contract.get("days_to_renewal").and_then(Value::as_i64) {
        return Some(days);
    }
    let renewal_at = contract.get("renewal_at").and_then(Value::as_i64)?;
    Some(
        Timestamp::from_unix_millis(renewal_at).days_since(snapshot.captured_at),
    )
}

/// Returns the boundary label a day count falls into.
fn threshold_boundary(days: i64) -> &'static str {
    if days <= 30 {
        "0-30"
    } else if days <= 60 {
        "31-60"
    } else {
        "61-90"
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

    /// Tests critical severity and boundary for a 20-day renewal.
    #[test]
    fn test_twenty_days_is_critical() {
        let (snapshot, reference) = fixture(json!({
            "contracts": [{"contract_id": "c1", "days_to_renewal": 20}],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = RenewalWindowDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].severity, Severity::Critical);
        assert_eq!(signals[0].context.get("threshold_boundary"), Some(&json!("0-30")));
        assert_eq!(signals[0].window_key, "renewal-c1-0-30");
    }

    /// Tests that repeated same-day detection derives identical identity.
    #[test]
    fn test_same_boundary_dedupes() {
        let (snapshot, reference) = fixture(json!({
            "contracts": [{"contract_id": "c1", "days_to_renewal": 20}],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let first = RenewalWindowDetector.detect(&snapshot, &reference, &context).unwrap();
        let second = RenewalWindowDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(first[0].dedupe_key, second[0].dedupe_key);
        assert_eq!(first[0].signal_id, second[0].signal_id);
    }

    /// Tests that contracts outside the window emit nothing.
    #[test]
    fn test_outside_window_emits_nothing() {
        let (snapshot, reference) = fixture(json!({
            "contracts": [
                {"contract_id": "c1", "days_to_renewal": 120},
                {"contract_id": "c2", "days_to_renewal": 0},
            ],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = RenewalWindowDetector.detect(&snapshot, &reference, &context).unwrap();
        assert!(signals.is_empty());
    }
}
