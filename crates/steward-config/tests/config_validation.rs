// crates/steward-config/tests/config_validation.rs
// ============================================================================
// Module: Config Validation Tests
// Description: Tests for fail-closed configuration parsing and validation.
// ============================================================================
//! ## Overview
//! Validates defaults, cross-field checks, unknown-field rejection, and the
//! conversion helpers into core policy types.

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

use std::io::Write;

use steward_config::ConfigError;
use steward_config::load_config;
use steward_config::parse_config;
use steward_core::HeatTier;
use steward_core::PullDepth;
use steward_core::SignalTtl;
use steward_core::SignalType;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Tests that a minimal config inherits every documented default.
#[test]
fn test_minimal_config_defaults() {
    let config = parse_config("ruleset_version = \"v1\"\n").unwrap();

    assert_eq!(config.ruleset_version().as_str(), "v1");
    let weights = config.heat_weights();
    assert!((weights.posture + weights.recency + weights.volume - 1.0).abs() < 1e-9);

    let units = config.depth_units();
    assert_eq!(units.units(PullDepth::Shallow), 1);
    assert_eq!(units.units(PullDepth::Deep), 3);

    let policy = config.tier_policy();
    assert_eq!(policy.policy(HeatTier::Hot).cadence_hours, 1);
    assert_eq!(policy.policy(HeatTier::Hot).demotion_cooldown_hours, 4);
    assert_eq!(policy.policy(HeatTier::Warm).cadence_hours, 6);
    assert_eq!(policy.policy(HeatTier::Cold).cadence_hours, 72);

    let execution = config.execution();
    assert_eq!(execution.timeout_hours, 1);
    assert_eq!(execution.retry.attempts, 3);
    assert_eq!(execution.retry.initial_backoff_millis, 2_000);
    assert_eq!(execution.retry.factor, 2);

    assert_eq!(
        config.ttl_for(SignalType::FirstEngagementOccurred),
        SignalTtl::Permanent
    );
    assert_eq!(config.ttl_for(SignalType::RenewalWindowEntered), SignalTtl::Days(90));
}

/// Tests TTL overrides, with zero meaning permanent.
#[test]
fn test_ttl_overrides() {
    let config = parse_config(
        "ruleset_version = \"v1\"\n\
         [signal_ttl_days]\n\
         USAGE_TREND_CHANGE = 21\n\
         SUPPORT_RISK_EMERGING = 0\n",
    )
    .unwrap();
    assert_eq!(config.ttl_for(SignalType::UsageTrendChange), SignalTtl::Days(21));
    assert_eq!(config.ttl_for(SignalType::SupportRiskEmerging), SignalTtl::Permanent);
}

// ============================================================================
// SECTION: Cross-Field Validation
// ============================================================================

/// Tests that heat weights must sum to one.
#[test]
fn test_weights_must_sum_to_one() {
    let result = parse_config(
        "ruleset_version = \"v1\"\n\
         [heat_weights]\n\
         posture = 0.5\n\
         recency = 0.5\n\
         volume = 0.5\n",
    );
    let Err(ConfigError::Validation { field, .. }) = result else {
        panic!("weight sum violation must fail validation");
    };
    assert_eq!(field, "heat_weights");
}

/// Tests that an empty ruleset version fails closed.
#[test]
fn test_empty_ruleset_version_rejected() {
    let result = parse_config("ruleset_version = \" \"\n");
    assert!(matches!(result, Err(ConfigError::Validation { .. })));
}

/// Tests that unknown TTL signal types are rejected.
#[test]
fn test_unknown_ttl_signal_type_rejected() {
    let result = parse_config(
        "ruleset_version = \"v1\"\n\
         [signal_ttl_days]\n\
         NOT_A_SIGNAL = 5\n",
    );
    let Err(ConfigError::Validation { field, .. }) = result else {
        panic!("unknown signal type must fail validation");
    };
    assert_eq!(field, "signal_ttl_days");
}

/// Tests that a zero retry factor is rejected.
#[test]
fn test_zero_retry_factor_rejected() {
    let result = parse_config(
        "ruleset_version = \"v1\"\n\
         [retry]\n\
         attempts = 3\n\
         initial_backoff_millis = 2000\n\
         factor = 0\n",
    );
    assert!(matches!(result, Err(ConfigError::Validation { .. })));
}

/// Tests that an autonomy budget without an allowlist is rejected.
#[test]
fn test_autonomy_budget_requires_allowlist() {
    let result = parse_config(
        "ruleset_version = \"v1\"\n\
         [autonomy]\n\
         max_auto_actions_per_day = 5\n",
    );
    let Err(ConfigError::Validation { field, .. }) = result else {
        panic!("autonomy budget without allowlist must fail validation");
    };
    assert_eq!(field, "autonomy.auto_approve_types");
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Tests loading from an explicit file path.
#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steward.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "ruleset_version = \"v1\"").unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.ruleset_version().as_str(), "v1");
}

/// Tests that a missing file fails closed.
#[test]
fn test_missing_file_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let result = load_config(Some(&path));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

// ============================================================================
// SECTION: Parse Strictness
// ============================================================================

/// Tests that unknown fields are rejected rather than ignored.
#[test]
fn test_unknown_fields_rejected() {
    let result = parse_config(
        "ruleset_version = \"v1\"\n\
         surprise_field = true\n",
    );
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

/// Tests that a configured autonomy section converts into policy.
#[test]
fn test_autonomy_policy_conversion() {
    let config = parse_config(
        "ruleset_version = \"v1\"\n\
         [autonomy]\n\
         auto_approve_types = [\"crm.create_task@v1\"]\n\
         max_auto_actions_per_day = 10\n",
    )
    .unwrap();
    let policy = config.autonomy_policy();
    assert_eq!(policy.max_auto_actions_per_day, 10);
    assert_eq!(policy.auto_approve_types.len(), 1);
}
