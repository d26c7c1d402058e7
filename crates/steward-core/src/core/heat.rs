// crates/steward-core/src/core/heat.rs
// ============================================================================
// Module: Steward Heat Model
// Description: Heat scores, tiers, factor breakdowns, and tier policy.
// Purpose: Provide the cadence-governing heat state for pull scheduling.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Heat state is a per-account row combining a weighted score with a tier
//! classification. Tiers govern pull cadence and default depth; demotions to
//! a cooler tier are delayed by a per-tier cooldown while promotions apply
//! immediately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AccountId;
use crate::core::identifiers::TenantId;
use crate::core::pull::PullDepth;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Heat Tiers
// ============================================================================

/// Cadence class governing how often an account is polled.
///
/// # Invariants
/// - Ordering is by warmth: `Cold < Warm < Hot`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeatTier {
    /// Slowest cadence.
    Cold,
    /// Intermediate cadence.
    Warm,
    /// Fastest cadence.
    Hot,
}

impl HeatTier {
    /// Returns the stable wire label for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "HOT",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
        }
    }

    /// Returns true when `self` is strictly cooler than `other`.
    #[must_use]
    pub fn is_cooler_than(self, other: Self) -> bool {
        self < other
    }
}

// ============================================================================
// SECTION: Heat State
// ============================================================================

/// Factor breakdown behind a heat score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatFactors {
    /// Posture contribution before weighting.
    pub posture: f64,
    /// Signal recency contribution before weighting.
    pub recency: f64,
    /// Signal volume contribution before weighting.
    pub volume: f64,
}

/// Latest heat row for an account.
///
/// # Invariants
/// - `heat_score` is in `[0, 1]`.
/// - `computed_at` is the evaluation time used for hysteresis comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatState {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Weighted heat score in `[0, 1]`.
    pub heat_score: f64,
    /// Tier classification after hysteresis.
    pub heat_tier: HeatTier,
    /// Factor breakdown.
    pub factors: HeatFactors,
    /// Evaluation timestamp.
    pub computed_at: Timestamp,
    /// Row update timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Heat Weights
// ============================================================================

/// Linear combiner weights for heat scoring.
///
/// # Invariants
/// - Weights sum to 1.0 (validated at config load).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatWeights {
    /// Weight of the posture component.
    pub posture: f64,
    /// Weight of the recency component.
    pub recency: f64,
    /// Weight of the volume component.
    pub volume: f64,
}

impl Default for HeatWeights {
    fn default() -> Self {
        Self {
            posture: 0.5,
            recency: 0.3,
            volume: 0.2,
        }
    }
}

// ============================================================================
// SECTION: Tier Policy
// ============================================================================

/// Per-tier scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Pull cadence in hours.
    pub cadence_hours: u32,
    /// Default pull depth at this tier.
    pub default_depth: PullDepth,
    /// Hours that must elapse before demotion away from this tier.
    pub demotion_cooldown_hours: u32,
}

/// Tier policy table covering every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicyTable {
    /// Policy for `HOT`.
    pub hot: TierPolicy,
    /// Policy for `WARM`.
    pub warm: TierPolicy,
    /// Policy for `COLD`.
    pub cold: TierPolicy,
}

impl TierPolicyTable {
    /// Returns the policy row for a tier.
    #[must_use]
    pub const fn policy(&self, tier: HeatTier) -> TierPolicy {
        match tier {
            HeatTier::Hot => self.hot,
            HeatTier::Warm => self.warm,
            HeatTier::Cold => self.cold,
        }
    }
}

impl Default for TierPolicyTable {
    fn default() -> Self {
        Self {
            hot: TierPolicy {
                cadence_hours: 1,
                default_depth: PullDepth::Deep,
                demotion_cooldown_hours: 4,
            },
            warm: TierPolicy {
                cadence_hours: 6,
                default_depth: PullDepth::Shallow,
                demotion_cooldown_hours: 24,
            },
            cold: TierPolicy {
                cadence_hours: 72,
                default_depth: PullDepth::Shallow,
                demotion_cooldown_hours: 48,
            },
        }
    }
}
