// crates/steward-core/tests/heat_hysteresis.rs
// ============================================================================
// Module: Heat Hysteresis Tests
// Description: Tests for heat scoring, tier mapping, and demotion cooldowns.
// ============================================================================
//! ## Overview
//! Validates the weighted score components, immediate promotion, cooldown-
//! delayed demotion, and bulk scoring with per-account errors.

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
    clippy::float_cmp,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use steward_core::AccountId;
use steward_core::HeatFactors;
use steward_core::HeatState;
use steward_core::HeatTier;
use steward_core::HeatWeights;
use steward_core::TenantId;
use steward_core::TierPolicyTable;
use steward_core::Timestamp;
use steward_core::interfaces::HeatStore;
use steward_core::runtime::HeatScorer;
use steward_core::runtime::InMemoryHeatStore;
use steward_core::runtime::InMemoryPostureStore;
use steward_core::runtime::posture_component;
use steward_core::runtime::recency_component;
use steward_core::runtime::tier_for_score;

use common::Harness;
use common::account;
use common::harness;
use common::tenant;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a heat scorer over the harness with default weights and policy.
fn scorer(harness: &Harness, heat: Arc<InMemoryHeatStore>) -> HeatScorer {
    HeatScorer::new(
        Arc::new(InMemoryPostureStore::new()),
        Arc::new(harness.service.clone()),
        heat,
        HeatWeights::default(),
        TierPolicyTable::default(),
        Arc::clone(&harness.clock),
    )
}

/// Seeds a previous heat row for hysteresis tests.
fn seed_heat(heat: &InMemoryHeatStore, tier: HeatTier, computed_at: Timestamp) {
    heat.save_heat(&HeatState {
        tenant_id: tenant(),
        account_id: account(),
        heat_score: 0.9,
        heat_tier: tier,
        factors: HeatFactors {
            posture: 0.8,
            recency: 1.0,
            volume: 0.5,
        },
        computed_at,
        updated_at: computed_at,
    })
    .unwrap();
}

// ============================================================================
// SECTION: Component Mapping
// ============================================================================

/// Tests the posture component table.
#[test]
fn test_posture_component_table() {
    assert_eq!(posture_component(steward_core::Posture::Ok), 0.2);
    assert_eq!(posture_component(steward_core::Posture::Watch), 0.5);
    assert_eq!(posture_component(steward_core::Posture::AtRisk), 0.8);
    assert_eq!(posture_component(steward_core::Posture::Expand), 0.9);
    assert_eq!(posture_component(steward_core::Posture::Dormant), 0.05);
}

/// Tests the recency discretization boundaries.
#[test]
fn test_recency_boundaries() {
    let now = Timestamp::from_unix_millis(0).plus_days(30);
    assert_eq!(recency_component(Some(now.plus_hours(-1)), now), 1.0);
    assert_eq!(recency_component(Some(now.plus_hours(-5)), now), 0.7);
    assert_eq!(recency_component(Some(now.plus_hours(-23)), now), 0.4);
    assert_eq!(recency_component(Some(now.minus_days(6)), now), 0.1);
    assert_eq!(recency_component(Some(now.minus_days(8)), now), 0.0);
    assert_eq!(recency_component(None, now), 0.0);
}

/// Tests the raw-score tier thresholds.
#[test]
fn test_tier_thresholds() {
    assert_eq!(tier_for_score(0.7), HeatTier::Hot);
    assert_eq!(tier_for_score(0.69), HeatTier::Warm);
    assert_eq!(tier_for_score(0.4), HeatTier::Warm);
    assert_eq!(tier_for_score(0.39), HeatTier::Cold);
}

// ============================================================================
// SECTION: Hysteresis
// ============================================================================

/// Tests that a demotion inside the cooldown retains the hotter tier.
#[test]
fn test_demotion_inside_cooldown_is_retained() {
    let harness = harness(0);
    let heat = Arc::new(InMemoryHeatStore::new());
    // Previous HOT row computed two hours ago; HOT cooldown is four hours.
    let now = Timestamp::from_unix_millis(0).plus_days(10);
    seed_heat(&heat, HeatTier::Hot, now.plus_hours(-2));
    harness.clock.set(now);

    // No posture and no signals: raw score maps to COLD.
    let state = scorer(&harness, Arc::clone(&heat)).score_account(&tenant(), &account()).unwrap();
    assert_eq!(state.heat_tier, HeatTier::Hot);
    assert!(state.heat_score < 0.4);
}

/// Tests that a demotion after the cooldown is applied.
#[test]
fn test_demotion_after_cooldown_applies() {
    let harness = harness(0);
    let heat = Arc::new(InMemoryHeatStore::new());
    let now = Timestamp::from_unix_millis(0).plus_days(10);
    seed_heat(&heat, HeatTier::Hot, now.plus_hours(-5));
    harness.clock.set(now);

    let state = scorer(&harness, Arc::clone(&heat)).score_account(&tenant(), &account()).unwrap();
    assert_eq!(state.heat_tier, HeatTier::Cold);
}

/// Tests that promotions are never delayed.
#[test]
fn test_promotion_is_immediate() {
    let harness = harness(0);
    let heat = Arc::new(InMemoryHeatStore::new());
    let now = Timestamp::from_unix_millis(0).plus_days(10);
    seed_heat(&heat, HeatTier::Cold, now.plus_hours(-1));
    harness.clock.set(now);

    let postures = Arc::new(InMemoryPostureStore::new());
    let scorer = HeatScorer::new(
        Arc::clone(&postures),
        Arc::new(harness.service.clone()),
        Arc::clone(&heat),
        HeatWeights {
            posture: 1.0,
            recency: 0.0,
            volume: 0.0,
        },
        TierPolicyTable::default(),
        Arc::clone(&harness.clock),
    );

    // Weighting posture alone with an EXPAND posture maps to HOT.
    use steward_core::interfaces::PostureStore;
    postures
        .save_posture(&steward_core::PostureRecord {
            tenant_id: tenant(),
            account_id: account(),
            posture: steward_core::Posture::Expand,
            momentum: steward_core::Momentum::Up,
            risks: Vec::new(),
            opportunities: Vec::new(),
            unknowns: Vec::new(),
            evidence_signal_ids: Vec::new(),
            evidence_refs: Vec::new(),
            active_signals_hash: steward_core::HashDigest {
                algorithm: steward_core::HashAlgorithm::Sha256,
                value: "00".to_string(),
            },
            inputs_hash: steward_core::HashDigest {
                algorithm: steward_core::HashAlgorithm::Sha256,
                value: "01".to_string(),
            },
            lifecycle_state: steward_core::LifecycleState::Customer,
            ruleset_version: steward_core::RulesetVersion::new("v1"),
            rule_id: steward_core::RuleId::new("expand"),
            evaluated_at: now,
            ttl_days: None,
        })
        .unwrap();

    let state = scorer.score_account(&tenant(), &account()).unwrap();
    assert_eq!(state.heat_tier, HeatTier::Hot);
}

// ============================================================================
// SECTION: Bulk Scoring
// ============================================================================

/// Tests that bulk scoring computes all accounts without aborting peers.
#[test]
fn test_bulk_scoring_collects_results() {
    let harness = harness(0);
    let heat = Arc::new(InMemoryHeatStore::new());
    harness.clock.set(Timestamp::from_unix_millis(0).plus_days(10));

    let accounts = vec![
        AccountId::new("acct-1"),
        AccountId::new("acct-2"),
        AccountId::new("acct-3"),
    ];
    let result = scorer(&harness, heat).score_accounts(&TenantId::new("tenant-1"), &accounts);
    assert_eq!(result.computed.len(), 3);
    assert!(result.errors.is_empty());
}
