// crates/steward-core/src/runtime/detectors/stakeholder.rs
// ============================================================================
// Module: Stakeholder Gap Detector
// Description: Detects stakeholder coverage gaps in CRM evidence.
// Purpose: Emit STAKEHOLDER_GAP_DETECTED when role coverage is insufficient.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! Coverage is a gap when any critical role is unfilled, only one stakeholder
//! is mapped, or at least half of the expected roles are missing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

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

/// Detects stakeholder coverage gaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeholderGapDetector;

impl Detector for StakeholderGapDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("stakeholder-gap")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::StakeholderGapDetected]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let Some(stakeholders) = snapshot.payload.get("stakeholders").and_then(Value::as_array)
        else {
            return Ok(Vec::new());
        };

        let filled_roles: BTreeSet<&str> = stakeholders
            .iter()
            .filter_map(|stakeholder| stakeholder.get("role").and_then(Value::as_str))
            .collect();
        let expected_roles: Vec<&str> = snapshot
            .payload
            .get("expected_roles")
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let critical_roles: Vec<&str> = snapshot
            .payload
            .get("critical_roles")
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut reasons = Vec::new();
        let missing_critical: Vec<&str> = critical_roles
            .iter()
            .copied()
            .filter(|role| !filled_roles.contains(role))
            .collect();
        if !missing_critical.is_empty() {
            reasons.push("critical_role_missing");
        }
        if stakeholders.len() == 1 {
            reasons.push("single_stakeholder");
        }
        if !expected_roles.is_empty() {
            let missing =
                expected_roles.iter().filter(|role| !filled_roles.contains(**role)).count();
            if missing * 2 >= expected_roles.len() {
                reasons.push("expected_roles_missing");
            }
        }

        if reasons.is_empty() {
            return Ok(Vec::new());
        }

        let mut draft = SignalDraft::new(
            SignalType::StakeholderGapDetected,
            Confidence::new(0.8, ConfidenceSource::Derived),
            Severity::Medium,
            daily_window_key(snapshot.captured_at),
        );
        draft.context.insert("reasons".to_string(), json!(reasons));
        draft.context.insert("missing_critical_roles".to_string(), json!(missing_critical));
        draft.context.insert("stakeholder_count".to_string(), json!(stakeholders.len()));
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

    /// Tests that a missing critical role is a gap.
    #[test]
    fn test_missing_critical_role() {
        let (snapshot, reference) = fixture(json!({
            "stakeholders": [{"role": "champion"}, {"role": "user"}],
            "expected_roles": ["champion", "user"],
            "critical_roles": ["economic_buyer"],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = StakeholderGapDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(
            signals[0].context.get("missing_critical_roles"),
            Some(&json!(["economic_buyer"]))
        );
    }

    /// Tests that full coverage emits nothing.
    #[test]
    fn test_full_coverage_no_gap() {
        let (snapshot, reference) = fixture(json!({
            "stakeholders": [{"role": "champion"}, {"role": "economic_buyer"}],
            "expected_roles": ["champion", "economic_buyer"],
            "critical_roles": ["economic_buyer"],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = StakeholderGapDetector.detect(&snapshot, &reference, &context).unwrap();
        assert!(signals.is_empty());
    }
}
