// crates/steward-core/src/runtime/detectors/discovery.rs
// ============================================================================
// Module: Discovery Stall Detector
// Description: Detects stalled discovery via structural stall indicators.
// Purpose: Emit DISCOVERY_PROGRESS_STALLED when indicators accumulate.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! Discovery evidence is checked for four structural stall indicators: empty
//! meeting notes, missing required discovery fields, repeated meetings
//! without new data, and meetings lacking follow-ups. Two or more indicators
//! constitute a stall.

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
// SECTION: Constants
// ============================================================================

/// Required discovery fields checked for completeness.
const REQUIRED_DISCOVERY_FIELDS: [&str; 4] = ["painPoints", "budget", "decisionMaker", "timeline"];
/// Indicator count at which discovery is considered stalled.
const STALL_THRESHOLD: usize = 2;
/// Repeated-meeting count treated as a stall indicator.
const REPEAT_MEETING_THRESHOLD: u64 = 2;

// ============================================================================
// SECTION: Detector
// ============================================================================

/// Detects stalled discovery progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryStallDetector;

impl Detector for DiscoveryStallDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("discovery-stall")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::DiscoveryProgressStalled]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let mut indicators = Vec::new();

        let meetings =
            snapshot.payload.get("meetings").and_then(Value::as_array).cloned().unwrap_or_default();
        if !meetings.is_empty()
            && meetings.iter().any(|meeting| {
                meeting.get("notes").and_then(Value::as_str).is_none_or(str::is_empty)
            })
        {
            indicators.push("empty_meeting_notes");
        }

        if let Some(discovery) = snapshot.payload.get("discovery").and_then(Value::as_object) {
            let missing = REQUIRED_DISCOVERY_FIELDS
                .iter()
                .any(|field| discovery.get(*field).is_none_or(Value::is_null));
            if missing {
                indicators.push("missing_required_fields");
            }
        } else {
            indicators.push("missing_required_fields");
        }

        let repeats = snapshot
            .payload
            .get("meetings_without_new_data")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if repeats >= REPEAT_MEETING_THRESHOLD {
            indicators.push("repeated_meetings_without_new_data");
        }

        if !meetings.is_empty()
            && meetings.iter().any(|meeting| meeting.get("follow_up").is_none_or(Value::is_null))
        {
            indicators.push("missing_follow_ups");
        }

        if indicators.len() < STALL_THRESHOLD {
            return Ok(Vec::new());
        }

        let mut draft = SignalDraft::new(
            SignalType::DiscoveryProgressStalled,
            Confidence::new(0.7, ConfidenceSource::Derived),
            Severity::Medium,
            daily_window_key(snapshot.captured_at),
        );
        draft.context.insert("indicators".to_string(), json!(indicators));
        draft.context.insert("indicator_count".to_string(), json!(indicators.len()));
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

    /// Tests that two indicators produce a stall.
    #[test]
    fn test_two_indicators_stall() {
        let (snapshot, reference) = fixture(json!({
            "meetings": [{"notes": "", "follow_up": "call"}],
            "discovery": {"painPoints": "churn", "budget": null,
                          "decisionMaker": "cto", "timeline": "q3"},
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = DiscoveryStallDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].context.get("indicator_count"), Some(&json!(2)));
    }

    /// Tests that one indicator is below the stall threshold.
    #[test]
    fn test_single_indicator_is_not_a_stall() {
        let (snapshot, reference) = fixture(json!({
            "meetings": [{"notes": "good call", "follow_up": "demo"}],
            "discovery": {"painPoints": "churn", "budget": "100k",
                          "decisionMaker": "cto", "timeline": null},
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = DiscoveryStallDetector.detect(&snapshot, &reference, &context).unwrap();
        assert!(signals.is_empty());
    }
}
