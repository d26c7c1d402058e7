// crates/steward-core/src/runtime/detectors/usage.rs
// ============================================================================
// Module: Usage Trend Detector
// Description: Detects significant product-usage trend changes.
// Purpose: Emit USAGE_TREND_CHANGE when metric deltas cross the threshold.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! Each metric with a previous value is flagged when its absolute percentage
//! delta reaches 20%. The signal direction is the sign of the summed deltas;
//! downward trends carry high severity.

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

/// Absolute percentage delta at which a metric is flagged.
const TREND_THRESHOLD_PCT: f64 = 20.0;

// ============================================================================
// SECTION: Detector
// ============================================================================

/// Detects usage trend changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTrendDetector;

impl Detector for UsageTrendDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("usage-trend")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::UsageTrendChange]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let Some(metrics) = snapshot.payload.get("metrics").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut flagged = Vec::new();
        let mut delta_sum = 0.0_f64;
        for metric in metrics {
            let Some(name) = metric.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(previous) = metric.get("previous").and_then(Value::as_f64) else {
                continue;
            };
            let Some(current) = metric.get("current").and_then(Value::as_f64) else {
                continue;
            };
            if previous == 0.0 {
                continue;
            }
            let delta_pct = (current - previous) / previous * 100.0;
            if delta_pct.abs() >= TREND_THRESHOLD_PCT {
                flagged.push(json!({"name": name, "delta_pct": delta_pct}));
                delta_sum += delta_pct;
            }
        }

        if flagged.is_empty() {
            return Ok(Vec::new());
        }

        let direction = if delta_sum < 0.0 { "DOWN" } else { "UP" };
        let severity = if direction == "DOWN" { Severity::High } else { Severity::Medium };
        let mut draft = SignalDraft::new(
            SignalType::UsageTrendChange,
            Confidence::new(0.9, ConfidenceSource::Direct),
            severity,
            daily_window_key(snapshot.captured_at),
        );
        draft.context.insert("direction".to_string(), json!(direction));
        draft.context.insert("changed_metrics".to_string(), json!(flagged));
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

    /// Tests that a 30% drop flags a high-severity downward trend.
    #[test]
    fn test_downward_trend_is_high_severity() {
        let (snapshot, reference) = fixture(json!({
            "metrics": [
                {"name": "active_users", "previous": 100.0, "current": 70.0},
                {"name": "api_calls", "previous": 50.0, "current": 52.0},
            ],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = UsageTrendDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].severity, Severity::High);
        assert_eq!(signals[0].context.get("direction"), Some(&json!("DOWN")));
    }

    /// Tests that sub-threshold deltas emit nothing.
    #[test]
    fn test_small_deltas_emit_nothing() {
        let (snapshot, reference) = fixture(json!({
            "metrics": [{"name": "active_users", "previous": 100.0, "current": 110.0}],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = UsageTrendDetector.detect(&snapshot, &reference, &context).unwrap();
        assert!(signals.is_empty());
    }
}
