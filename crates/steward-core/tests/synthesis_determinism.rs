// crates/steward-core/tests/synthesis_determinism.rs
// ============================================================================
// Module: Synthesis Determinism Tests
// Description: Tests for rule matching, fingerprints, and invariant failures.
// ============================================================================
//! ## Overview
//! Validates priority-ordered first-match semantics, bit-identical outputs
//! for identical inputs, fail-loud behavior on unknown rulesets and
//! unmatched inputs, and suppression precedence ahead of synthesis.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use serde_json::json;
use steward_core::ComputedPredicate;
use steward_core::DetectorContext;
use steward_core::DetectorRegistry;
use steward_core::FindingTemplate;
use steward_core::LedgerEventType;
use steward_core::LifecycleState;
use steward_core::Momentum;
use steward_core::Posture;
use steward_core::PredicateOp;
use steward_core::PredicatePath;
use steward_core::PropertyPredicate;
use steward_core::RequiredSignal;
use steward_core::RuleId;
use steward_core::RuleOutcome;
use steward_core::RuleSpec;
use steward_core::RulesetSpec;
use steward_core::RulesetVersion;
use steward_core::SignalType;
use steward_core::Timestamp;
use steward_core::TraceId;
use steward_core::interfaces::LedgerStore;
use steward_core::runtime::InMemoryPostureStore;
use steward_core::runtime::SignalReader;
use steward_core::runtime::SignalWriter;
use steward_core::runtime::StaticRulesetSource;
use steward_core::runtime::SuppressionEngine;
use steward_core::runtime::SynthesisEngine;
use steward_core::runtime::SynthesisError;
use steward_core::runtime::run_detector;

use common::Harness;
use common::account;
use common::harness;
use common::store_snapshot;
use common::tenant;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds the standard test ruleset under the given version.
fn ruleset(version: &str) -> RulesetSpec {
    RulesetSpec {
        version: RulesetVersion::new(version),
        rules: vec![
            RuleSpec {
                rule_id: RuleId::new("usage-down-at-risk"),
                priority: 5,
                lifecycle_state: None,
                required_signals: vec![RequiredSignal {
                    signal_type: SignalType::UsageTrendChange,
                    where_predicates: vec![PropertyPredicate {
                        path: PredicatePath::Context("direction".to_string()),
                        op: PredicateOp::Equals,
                        expected: Some(json!("DOWN")),
                    }],
                }],
                excluded_signals: Vec::new(),
                computed: Vec::new(),
                evidence_signals: vec![SignalType::UsageTrendChange],
                outcome: RuleOutcome {
                    posture: Posture::AtRisk,
                    momentum: Momentum::Down,
                    risks: vec![FindingTemplate {
                        sub_type: "usage_decline".to_string(),
                        description: "usage trending down past threshold".to_string(),
                    }],
                    opportunities: Vec::new(),
                    unknowns: Vec::new(),
                    ttl_days: Some(7),
                },
            },
            RuleSpec {
                rule_id: RuleId::new("prospect-dormant"),
                priority: 10,
                lifecycle_state: Some(LifecycleState::Prospect),
                required_signals: vec![RequiredSignal {
                    signal_type: SignalType::NoEngagementPresent,
                    where_predicates: Vec::new(),
                }],
                excluded_signals: vec![SignalType::FirstEngagementOccurred],
                computed: vec![ComputedPredicate::NoEngagementInDays(30)],
                evidence_signals: vec![SignalType::NoEngagementPresent],
                outcome: RuleOutcome {
                    posture: Posture::Dormant,
                    momentum: Momentum::Down,
                    risks: Vec::new(),
                    opportunities: Vec::new(),
                    unknowns: vec![FindingTemplate {
                        sub_type: "engagement_gap".to_string(),
                        description: "no engagement observed in the window".to_string(),
                    }],
                    ttl_days: None,
                },
            },
            RuleSpec {
                rule_id: RuleId::new("steady-state"),
                priority: 100,
                lifecycle_state: None,
                required_signals: Vec::new(),
                excluded_signals: Vec::new(),
                computed: Vec::new(),
                evidence_signals: Vec::new(),
                outcome: RuleOutcome {
                    posture: Posture::Ok,
                    momentum: Momentum::Flat,
                    risks: Vec::new(),
                    opportunities: Vec::new(),
                    unknowns: Vec::new(),
                    ttl_days: None,
                },
            },
        ],
    }
}

/// Builds a synthesis engine over the harness with the given ruleset.
fn engine(harness: &Harness, spec: RulesetSpec) -> SynthesisEngine {
    let version = spec.version.clone();
    SynthesisEngine::new(
        Arc::new(harness.service.clone()),
        Arc::clone(&harness.perception),
        Arc::new(InMemoryPostureStore::new()),
        Arc::clone(&harness.ledger),
        Arc::new(StaticRulesetSource::new().with(spec)),
        version,
        Arc::clone(&harness.clock),
    )
}

/// Creates a downward usage-trend signal through the service.
fn create_usage_down(harness: &Harness, captured_at: Timestamp) {
    let (_, reference) = store_snapshot(
        harness,
        "tenant-1",
        "acct-1",
        captured_at,
        json!({"metrics": [{"name": "active_users", "previous": 100.0, "current": 60.0}]}),
    );
    let registry = DetectorRegistry::standard();
    let detector = registry
        .detector(&steward_core::DetectorName::new("usage-trend"))
        .unwrap();
    let context = DetectorContext {
        prior_state: None,
        trace_id: TraceId::new("trace-1"),
    };
    let signals =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &reference, &context).unwrap();
    harness.service.create_signal(signals[0].clone()).unwrap();
}

// ============================================================================
// SECTION: Determinism
// ============================================================================

/// Tests that identical inputs produce bit-identical posture fields.
#[test]
fn test_identical_inputs_identical_outputs() {
    let harness = harness(86_400_000);
    create_usage_down(&harness, Timestamp::from_unix_millis(86_400_000));
    let engine = engine(&harness, ruleset("determinism-v1"));

    let first = engine.synthesize(&tenant(), &account(), &TraceId::new("t1")).unwrap();
    harness.clock.advance_hours(1);
    let second = engine.synthesize(&tenant(), &account(), &TraceId::new("t2")).unwrap();

    assert_eq!(first.inputs_hash, second.inputs_hash);
    assert_eq!(first.active_signals_hash, second.active_signals_hash);
    assert_eq!(first.posture, second.posture);
    assert_eq!(first.momentum, second.momentum);
    assert_eq!(first.rule_id, second.rule_id);
    assert_eq!(first.risks, second.risks);
    assert_eq!(first.evidence_signal_ids, second.evidence_signal_ids);
    assert_ne!(first.evaluated_at, second.evaluated_at);

    assert_eq!(first.posture, Posture::AtRisk);
    assert_eq!(first.rule_id, RuleId::new("usage-down-at-risk"));
    assert_eq!(first.risks.len(), 1);
    assert_eq!(first.risks[0].sub_type, "usage_decline");
}

/// Tests that lower priority wins when multiple rules match.
#[test]
fn test_first_match_by_priority() {
    let harness = harness(86_400_000);
    create_usage_down(&harness, Timestamp::from_unix_millis(86_400_000));
    let engine = engine(&harness, ruleset("priority-v1"));

    // Both usage-down-at-risk (5) and steady-state (100) match.
    let record = engine.synthesize(&tenant(), &account(), &TraceId::new("t1")).unwrap();
    assert_eq!(record.rule_id, RuleId::new("usage-down-at-risk"));
}

// ============================================================================
// SECTION: Invariant Failures
// ============================================================================

/// Tests that an unknown ruleset version fails loudly.
#[test]
fn test_unknown_ruleset_is_fatal() {
    let harness = harness(86_400_000);
    let spec = ruleset("known-v1");
    let engine = SynthesisEngine::new(
        Arc::new(harness.service.clone()),
        Arc::clone(&harness.perception),
        Arc::new(InMemoryPostureStore::new()),
        Arc::clone(&harness.ledger),
        Arc::new(StaticRulesetSource::new().with(spec)),
        RulesetVersion::new("missing-v9"),
        Arc::clone(&harness.clock),
    );
    let result = engine.synthesize(&tenant(), &account(), &TraceId::new("t1"));
    assert!(matches!(result, Err(SynthesisError::UnknownRuleset(_))));
}

/// Tests that an unmatched input set errors and ledgers a validation entry.
#[test]
fn test_no_rule_matched_is_ledgered() {
    let harness = harness(86_400_000);
    // A ruleset whose only rule requires a signal that is absent.
    let spec = RulesetSpec {
        version: RulesetVersion::new("narrow-v1"),
        rules: vec![RuleSpec {
            rule_id: RuleId::new("needs-support-risk"),
            priority: 1,
            lifecycle_state: None,
            required_signals: vec![RequiredSignal {
                signal_type: SignalType::SupportRiskEmerging,
                where_predicates: Vec::new(),
            }],
            excluded_signals: Vec::new(),
            computed: Vec::new(),
            evidence_signals: Vec::new(),
            outcome: RuleOutcome {
                posture: Posture::Watch,
                momentum: Momentum::Flat,
                risks: Vec::new(),
                opportunities: Vec::new(),
                unknowns: Vec::new(),
                ttl_days: None,
            },
        }],
    };
    let engine = engine(&harness, spec);

    let trace = TraceId::new("trace-nomatch");
    let result = engine.synthesize(&tenant(), &account(), &trace);
    assert!(matches!(result, Err(SynthesisError::NoRuleMatched(_))));

    let entries = harness.ledger.by_trace(&trace).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, LedgerEventType::Validation);
}

// ============================================================================
// SECTION: Suppression Precedence
// ============================================================================

/// Tests that first engagement suppresses no-engagement ahead of synthesis.
#[test]
fn test_first_engagement_precedence_over_no_engagement() {
    let harness = harness(86_400_000);
    let captured = Timestamp::from_unix_millis(86_400_000);
    let registry = DetectorRegistry::standard();
    let detector =
        registry.detector(&steward_core::DetectorName::new("engagement")).unwrap();

    // A prospect with an active no-engagement signal.
    let (_, empty_ref) =
        store_snapshot(&harness, "tenant-1", "acct-1", captured, json!({"engagements": []}));
    let context = DetectorContext {
        prior_state: None,
        trace_id: TraceId::new("trace-1"),
    };
    let no_engagement =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &empty_ref, &context).unwrap();
    harness.service.create_signal(no_engagement[0].clone()).unwrap();

    // An engagement arrives; first engagement is created.
    let (_, engaged_ref) = store_snapshot(
        &harness,
        "tenant-1",
        "acct-1",
        captured.plus_hours(1),
        json!({"engagements": [{"kind": "meeting"}]}),
    );
    let first_engagement =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &engaged_ref, &context)
            .unwrap();
    let created = harness.service.create_signal(first_engagement[0].clone()).unwrap();
    let transition = match created {
        steward_core::runtime::CreateSignalResult::Created { transition, .. } => {
            transition.unwrap()
        }
        steward_core::runtime::CreateSignalResult::Duplicate { .. } => {
            panic!("first engagement must insert")
        }
    };

    // The suppression engine runs on the lifecycle transition.
    let suppression = SuppressionEngine::new(
        Arc::new(harness.service.clone()),
        Arc::clone(&harness.ledger),
        Arc::clone(&harness.clock),
    );
    let active = harness
        .service
        .signals_for_account(
            &tenant(),
            &account(),
            &steward_core::runtime::SignalFilter::default(),
        )
        .unwrap();
    let set = suppression
        .run(
            &tenant(),
            &account(),
            transition.from,
            transition.to,
            &active,
            &TraceId::new("trace-suppress"),
        )
        .unwrap();
    assert!(
        set.entries
            .iter()
            .any(|(_, signal_type)| *signal_type == SignalType::NoEngagementPresent)
    );

    // Synthesis must not observe no-engagement as active any more.
    let engine = engine(&harness, ruleset("precedence-v1"));
    let record = engine.synthesize(&tenant(), &account(), &TraceId::new("t2")).unwrap();
    assert_ne!(record.posture, Posture::Dormant);
}

/// Tests that excluded signals disqualify a rule.
#[test]
fn test_excluded_signal_disqualifies_rule() {
    let harness = harness(86_400_000);
    let captured = Timestamp::from_unix_millis(86_400_000);
    let registry = DetectorRegistry::standard();
    let detector =
        registry.detector(&steward_core::DetectorName::new("engagement")).unwrap();

    // Both no-engagement and first-engagement are active (no suppression run).
    let (_, empty_ref) =
        store_snapshot(&harness, "tenant-1", "acct-1", captured, json!({"engagements": []}));
    let context = DetectorContext {
        prior_state: None,
        trace_id: TraceId::new("trace-1"),
    };
    let no_engagement =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &empty_ref, &context).unwrap();
    harness.service.create_signal(no_engagement[0].clone()).unwrap();

    let (_, engaged_ref) = store_snapshot(
        &harness,
        "tenant-1",
        "acct-1",
        captured.plus_hours(1),
        json!({"engagements": [{"kind": "meeting"}]}),
    );
    let first_engagement =
        run_detector(harness.evidence.as_ref(), detector.as_ref(), &engaged_ref, &context)
            .unwrap();
    harness.service.create_signal(first_engagement[0].clone()).unwrap();

    // prospect-dormant excludes FIRST_ENGAGEMENT_OCCURRED, so the fallback wins.
    let engine = engine(&harness, ruleset("excluded-v1"));
    let record = engine.synthesize(&tenant(), &account(), &TraceId::new("t1")).unwrap();
    assert_eq!(record.rule_id, RuleId::new("steady-state"));
}
