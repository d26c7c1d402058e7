// crates/steward-core/src/runtime/comparator.rs
// ============================================================================
// Module: Steward Predicate Comparator
// Description: Property-predicate evaluation for posture rules.
// Purpose: Convert signal properties into deterministic boolean outcomes.
// Dependencies: crate::core, bigdecimal, serde_json, time
// ============================================================================

//! ## Overview
//! Predicate evaluation reads signal properties (`created_at`, `context.*`,
//! `metadata.*`) and applies rule operators. Missing or type-mismatched
//! properties fail the predicate (except `not_exists`) to preserve
//! fail-closed rule matching. Numeric ordering is decimal-aware and
//! deterministic; timestamps accept unix milliseconds or RFC 3339 strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Number;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::PredicateOp;
use crate::core::PredicatePath;
use crate::core::PropertyPredicate;
use crate::core::Signal;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Predicate Evaluation
// ============================================================================

/// Evaluates a property predicate against a signal at `now`.
#[must_use]
pub fn evaluate_predicate(predicate: &PropertyPredicate, signal: &Signal, now: Timestamp) -> bool {
    let value = resolve_path(&predicate.path, signal);
    match predicate.op {
        PredicateOp::Exists => value.is_some(),
        PredicateOp::NotExists => value.is_none(),
        PredicateOp::Equals => match (value, predicate.expected.as_ref()) {
            (Some(actual), Some(expected)) => &actual == expected,
            _ => false,
        },
        PredicateOp::GreaterThan | PredicateOp::LessThan | PredicateOp::LessThanOrEqual => {
            compare_ordering(predicate.op, value.as_ref(), predicate.expected.as_ref())
        }
        PredicateOp::WithinLastDays => {
            within_last_days(value.as_ref(), predicate.expected.as_ref(), now)
        }
        PredicateOp::In => match (value, predicate.expected.as_ref()) {
            (Some(actual), Some(Value::Array(set))) => set.contains(&actual),
            _ => false,
        },
    }
}

/// Resolves a predicate path to a JSON value on the signal.
fn resolve_path(path: &PredicatePath, signal: &Signal) -> Option<Value> {
    match path {
        PredicatePath::CreatedAt => {
            Some(Value::Number(Number::from(signal.created_at.as_unix_millis())))
        }
        PredicatePath::Context(key) => signal.context.get(key).cloned(),
        PredicatePath::Metadata(key) => signal.metadata.get(key).cloned(),
    }
}

// ============================================================================
// SECTION: Ordering Comparison
// ============================================================================

/// Applies an ordering operator over actual and expected values.
fn compare_ordering(op: PredicateOp, actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };
    let (Some(left), Some(right)) = (actual.as_number(), expected.as_number()) else {
        return false;
    };
    let Some(ordering) = decimal_cmp(left, right) else {
        return false;
    };
    match op {
        PredicateOp::GreaterThan => ordering.is_gt(),
        PredicateOp::LessThan => ordering.is_lt(),
        PredicateOp::LessThanOrEqual => ordering.is_le(),
        _ => false,
    }
}

/// Compares numbers by parsing them into `BigDecimal` values.
fn decimal_cmp(left: &Number, right: &Number) -> Option<Ordering> {
    let left = decimal_from_number(left)?;
    let right = decimal_from_number(right)?;
    Some(left.cmp(&right))
}

/// Parses a JSON number into `BigDecimal` with a stable string representation.
fn decimal_from_number(number: &Number) -> Option<BigDecimal> {
    let rendered = number.to_string();
    BigDecimal::from_str(&rendered).ok()
}

// ============================================================================
// SECTION: Time Windows
// ============================================================================

/// Returns true when the property timestamp falls in the trailing window.
fn within_last_days(actual: Option<&Value>, expected: Option<&Value>, now: Timestamp) -> bool {
    let Some(days) = expected.and_then(Value::as_u64) else {
        return false;
    };
    let Some(at) = actual.and_then(timestamp_from_value) else {
        return false;
    };
    let floor = now.minus_days(i64::try_from(days).unwrap_or(i64::MAX));
    at >= floor && at <= now
}

/// Extracts a timestamp from unix milliseconds or an RFC 3339 string.
fn timestamp_from_value(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(number) => number.as_i64().map(Timestamp::from_unix_millis),
        Value::String(text) => {
            let parsed = OffsetDateTime::parse(text, &Rfc3339).ok()?;
            let millis = parsed.unix_timestamp_nanos() / 1_000_000;
            i64::try_from(millis).ok().map(Timestamp::from_unix_millis)
        }
        _ => None,
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
    clippy::float_cmp,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::AccountId;
    use crate::core::Confidence;
    use crate::core::ConfidenceSource;
    use crate::core::DetectorName;
    use crate::core::EvidenceRef;
    use crate::core::HashAlgorithm;
    use crate::core::HashDigest;
    use crate::core::Severity;
    use crate::core::SignalId;
    use crate::core::SignalStatus;
    use crate::core::SignalTtl;
    use crate::core::SignalType;
    use crate::core::TenantId;
    use crate::core::TraceId;

    /// Builds a signal with context for predicate tests.
    fn signal_with_context(context: serde_json::Map<String, Value>) -> Signal {
        Signal {
            signal_id: SignalId::new("sig-1"),
            tenant_id: TenantId::new("t1"),
            account_id: AccountId::new("a1"),
            signal_type: SignalType::UsageTrendChange,
            status: SignalStatus::Active,
            confidence: Confidence::new(0.9, ConfidenceSource::Direct),
            severity: Severity::Medium,
            ttl: SignalTtl::Days(14),
            window_key: "d0".to_string(),
            dedupe_key: HashDigest {
                algorithm: HashAlgorithm::Sha256,
                value: "00".to_string(),
            },
            evidence: EvidenceRef {
                uri: "s3://bucket/evidence/account/a1/e1.json".to_string(),
                sha256: HashDigest {
                    algorithm: HashAlgorithm::Sha256,
                    value: "00".to_string(),
                },
                captured_at: Timestamp::from_unix_millis(1_000),
                schema_version: 1,
                detector_input_version: 1,
            },
            detector: DetectorName::new("usage-trend"),
            detector_version: 1,
            inference_active: true,
            context,
            metadata: serde_json::Map::new(),
            suppression: None,
            trace_id: TraceId::new("trace-1"),
            created_at: Timestamp::from_unix_millis(1_000),
        }
    }

    /// Tests decimal-aware ordering over context values.
    #[test]
    fn test_greater_than_decimal() {
        let mut context = serde_json::Map::new();
        context.insert("delta_pct".to_string(), json!(20.5));
        let signal = signal_with_context(context);
        let predicate = PropertyPredicate {
            path: PredicatePath::Context("delta_pct".to_string()),
            op: PredicateOp::GreaterThan,
            expected: Some(json!(20)),
        };
        assert!(evaluate_predicate(&predicate, &signal, Timestamp::from_unix_millis(2_000)));
    }

    /// Tests that missing properties fail comparison operators.
    #[test]
    fn test_missing_property_fails_closed() {
        let signal = signal_with_context(serde_json::Map::new());
        let predicate = PropertyPredicate {
            path: PredicatePath::Context("absent".to_string()),
            op: PredicateOp::Equals,
            expected: Some(json!(1)),
        };
        assert!(!evaluate_predicate(&predicate, &signal, Timestamp::from_unix_millis(2_000)));
    }

    /// Tests that `not_exists` holds for missing properties.
    #[test]
    fn test_not_exists_on_missing_property() {
        let signal = signal_with_context(serde_json::Map::new());
        let predicate = PropertyPredicate {
            path: PredicatePath::Metadata("absent".to_string()),
            op: PredicateOp::NotExists,
            expected: None,
        };
        assert!(evaluate_predicate(&predicate, &signal, Timestamp::from_unix_millis(2_000)));
    }

    /// Tests the trailing-window predicate over `created_at`.
    #[test]
    fn test_within_last_days_boundary() {
        let signal = signal_with_context(serde_json::Map::new());
        let predicate = PropertyPredicate {
            path: PredicatePath::CreatedAt,
            op: PredicateOp::WithinLastDays,
            expected: Some(json!(1)),
        };
        let inside = signal.created_at.plus_hours(12);
        let outside = signal.created_at.plus_days(2);
        assert!(evaluate_predicate(&predicate, &signal, inside));
        assert!(!evaluate_predicate(&predicate, &signal, outside));
    }

    /// Tests RFC 3339 parsing in window predicates.
    #[test]
    fn test_within_last_days_rfc3339() {
        let mut context = serde_json::Map::new();
        context.insert("met_at".to_string(), json!("1970-01-01T00:00:01Z"));
        let signal = signal_with_context(context);
        let predicate = PropertyPredicate {
            path: PredicatePath::Context("met_at".to_string()),
            op: PredicateOp::WithinLastDays,
            expected: Some(json!(7)),
        };
        assert!(evaluate_predicate(&predicate, &signal, Timestamp::from_unix_millis(2_000)));
    }

    /// Tests set membership.
    #[test]
    fn test_in_set() {
        let mut context = serde_json::Map::new();
        context.insert("boundary".to_string(), json!("0-30"));
        let signal = signal_with_context(context);
        let predicate = PropertyPredicate {
            path: PredicatePath::Context("boundary".to_string()),
            op: PredicateOp::In,
            expected: Some(json!(["0-30", "31-60"])),
        };
        assert!(evaluate_predicate(&predicate, &signal, Timestamp::from_unix_millis(2_000)));
    }
}
