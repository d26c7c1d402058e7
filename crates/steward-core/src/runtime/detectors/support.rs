// crates/steward-core/src/runtime/detectors/support.rs
// ============================================================================
// Module: Support Risk Detector
// Description: Scores support load for emerging account risk.
// Purpose: Emit SUPPORT_RISK_EMERGING when the risk score crosses the floor.
// Dependencies: crate::runtime::detectors, serde_json
// ============================================================================

//! ## Overview
//! The risk score combines open high-severity tickets (2 points each), aging
//! tickets open at least seven days (1 point each), a 50% volume increase
//! (3 points), and two or more open critical tickets (5 points). A score of
//! five emits the signal; ten or more raises severity to high. Confidence
//! scales with the score and caps at 0.9.

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

/// Score at which the signal is emitted.
const EMIT_THRESHOLD: u64 = 5;
/// Score at which severity is raised to high.
const HIGH_SEVERITY_THRESHOLD: u64 = 10;
/// Age in days at which an open ticket counts as aging.
const AGING_DAYS: u64 = 7;
/// Volume increase percentage that scores.
const VOLUME_INCREASE_PCT: f64 = 50.0;

// ============================================================================
// SECTION: Detector
// ============================================================================

/// Detects emerging support risk.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupportRiskDetector;

impl Detector for SupportRiskDetector {
    fn name(&self) -> DetectorName {
        DetectorName::new("support-risk")
    }

    fn version(&self) -> u32 {
        1
    }

    fn supported_types(&self) -> Vec<SignalType> {
        vec![SignalType::SupportRiskEmerging]
    }

    fn detect(
        &self,
        snapshot: &EvidenceSnapshot,
        reference: &EvidenceRef,
        context: &DetectorContext,
    ) -> Result<Vec<Signal>, DetectorError> {
        let Some(tickets) = snapshot.payload.get("tickets").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let open = |ticket: &&Value| {
            ticket.get("status").and_then(Value::as_str).is_none_or(|status| status == "open")
        };
        let high_sev = tickets
            .iter()
            .filter(open)
            .filter(|ticket| ticket.get("severity").and_then(Value::as_str) == Some("high"))
            .count() as u64;
        let aging = tickets
            .iter()
            .filter(open)
            .filter(|ticket| {
                ticket.get("age_days").and_then(Value::as_u64).is_some_and(|age| age >= AGING_DAYS)
            })
            .count() as u64;
        let critical = tickets
            .iter()
            .filter(open)
            .filter(|ticket| ticket.get("severity").and_then(Value::as_str) == Some("critical"))
            .count() as u64;

        let volume_increase = volume_increase_pct(&snapshot.payload)
            .is_some_and(|pct| pct >= VOLUME_INCREASE_PCT);

        let mut score = 2 * high_sev + aging;
        if volume_increase {
            score += 3;
        }
        if critical >= 2 {
            score += 5;
        }

        if score < EMIT_THRESHOLD {
            return Ok(Vec::new());
        }

        let severity =
            if score >= HIGH_SEVERITY_THRESHOLD { Severity::High } else { Severity::Medium };
        let confidence = (0.5 + score as f64 / 20.0).min(0.9);
        let mut draft = SignalDraft::new(
            SignalType::SupportRiskEmerging,
            Confidence::new(confidence, ConfidenceSource::Derived),
            severity,
            daily_window_key(snapshot.captured_at),
        );
        draft.context.insert("score".to_string(), json!(score));
        draft.context.insert("high_severity_open".to_string(), json!(high_sev));
        draft.context.insert("aging_open".to_string(), json!(aging));
        draft.context.insert("critical_open".to_string(), json!(critical));
        draft.context.insert("volume_increase".to_string(), json!(volume_increase));
        let signal = build_signal(snapshot, reference, context, self, draft)?;
        Ok(vec![signal])
    }
}

/// Computes the ticket volume increase percentage, when both counts exist.
fn volume_increase_pct(payload: &Value) -> Option<f64> {
    let current = payload.get("volume_current").and_then(Value::as_f64)?;
    let previous = payload.get("volume_previous").and_then(Value::as_f64)?;
    if previous <= 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
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

    /// Tests that two critical tickets alone reach the emit floor.
    #[test]
    fn test_two_criticals_emit() {
        let (snapshot, reference) = fixture(json!({
            "tickets": [
                {"severity": "critical", "status": "open", "age_days": 1},
                {"severity": "critical", "status": "open", "age_days": 2},
            ],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = SupportRiskDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].context.get("score"), Some(&json!(5)));
        assert_eq!(signals[0].severity, Severity::Medium);
    }

    /// Tests that a high compound score raises severity and caps confidence.
    #[test]
    fn test_high_score_caps_confidence() {
        let (snapshot, reference) = fixture(json!({
            "tickets": [
                {"severity": "critical", "status": "open", "age_days": 10},
                {"severity": "critical", "status": "open", "age_days": 12},
                {"severity": "high", "status": "open", "age_days": 9},
                {"severity": "high", "status": "open", "age_days": 8},
            ],
            "volume_current": 30.0,
            "volume_previous": 10.0,
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = SupportRiskDetector.detect(&snapshot, &reference, &context).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].severity, Severity::High);
        assert!(signals[0].confidence.value <= 0.9);
    }

    /// Tests that closed tickets do not score.
    #[test]
    fn test_closed_tickets_do_not_score() {
        let (snapshot, reference) = fixture(json!({
            "tickets": [
                {"severity": "critical", "status": "closed", "age_days": 10},
                {"severity": "critical", "status": "closed", "age_days": 12},
            ],
        }));
        let context = DetectorContext {
            prior_state: None,
            trace_id: TraceId::new("trace"),
        };
        let signals = SupportRiskDetector.detect(&snapshot, &reference, &context).unwrap();
        assert!(signals.is_empty());
    }
}
