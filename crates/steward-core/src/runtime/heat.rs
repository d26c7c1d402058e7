// crates/steward-core/src/runtime/heat.rs
// ============================================================================
// Module: Steward Heat Scorer
// Description: Weighted heat scoring with tier hysteresis.
// Purpose: Derive the cadence tier that paces evidence collection.
// Dependencies: crate::{core, interfaces, runtime::signals}
// ============================================================================

//! ## Overview
//! The heat score is a weighted combination of the posture component, the
//! recency of the most recent active signal, and active-signal volume. Raw
//! scores map to tiers; a demotion to a cooler tier is retained only after
//! the previous tier's cooldown has elapsed, while promotions apply
//! immediately. Bulk scoring reports per-account errors without aborting
//! peers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::AccountId;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::ErrorKind;
use crate::core::HeatFactors;
use crate::core::HeatState;
use crate::core::HeatTier;
use crate::core::HeatWeights;
use crate::core::MILLIS_PER_DAY;
use crate::core::MILLIS_PER_HOUR;
use crate::core::Posture;
use crate::core::TenantId;
use crate::core::TierPolicyTable;
use crate::core::Timestamp;
use crate::interfaces::HeatStore;
use crate::interfaces::PostureStore;
use crate::interfaces::StoreError;
use crate::runtime::signals::SignalFilter;
use crate::runtime::signals::SignalReader;
use crate::runtime::signals::SignalServiceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Raw score at which an account is hot.
const HOT_THRESHOLD: f64 = 0.7;
/// Raw score at which an account is warm.
const WARM_THRESHOLD: f64 = 0.4;
/// Posture component used when no posture record exists yet.
const DEFAULT_POSTURE_COMPONENT: f64 = 0.2;
/// Active-signal count at which the volume component saturates.
const VOLUME_SATURATION: f64 = 10.0;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Heat scoring errors.
#[derive(Debug, Error)]
pub enum HeatError {
    /// Signal read failed.
    #[error(transparent)]
    Signal(#[from] SignalServiceError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classified for HeatError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Signal(inner) => inner.kind(),
            Self::Store(inner) => inner.kind(),
        }
    }
}

// ============================================================================
// SECTION: Bulk Results
// ============================================================================

/// Bulk scoring result reporting per-account failures.
#[derive(Debug, Clone)]
pub struct BulkHeatResult {
    /// Successfully computed heat rows.
    pub computed: Vec<HeatState>,
    /// Per-account errors, tagged with the taxonomy kind.
    pub errors: Vec<BulkHeatError>,
}

/// One failed account in a bulk scoring run.
#[derive(Debug, Clone)]
pub struct BulkHeatError {
    /// Account that failed.
    pub account_id: AccountId,
    /// Taxonomy classification.
    pub kind: ErrorKind,
    /// Failure description.
    pub error: String,
}

// ============================================================================
// SECTION: Heat Scorer
// ============================================================================

/// Weighted heat scorer with tier hysteresis.
#[derive(Clone)]
pub struct HeatScorer {
    /// Posture store.
    postures: Arc<dyn PostureStore + Send + Sync>,
    /// Signal reader.
    signals: Arc<dyn SignalReader + Send + Sync>,
    /// Heat store.
    heat: Arc<dyn HeatStore + Send + Sync>,
    /// Combiner weights.
    weights: HeatWeights,
    /// Tier policy table.
    policy: TierPolicyTable,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl HeatScorer {
    /// Creates a heat scorer from its collaborators.
    #[must_use]
    pub fn new(
        postures: Arc<dyn PostureStore + Send + Sync>,
        signals: Arc<dyn SignalReader + Send + Sync>,
        heat: Arc<dyn HeatStore + Send + Sync>,
        weights: HeatWeights,
        policy: TierPolicyTable,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            postures,
            signals,
            heat,
            weights,
            policy,
            clock,
        }
    }

    /// Returns the configured tier policy table.
    #[must_use]
    pub const fn policy(&self) -> &TierPolicyTable {
        &self.policy
    }

    /// Scores one account and persists the resulting heat row.
    ///
    /// # Errors
    ///
    /// Returns [`HeatError`] when loading inputs or saving the row fails.
    pub fn score_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<HeatState, HeatError> {
        let now = self.clock.now();
        let posture = self.postures.load_posture(tenant_id, account_id)?;
        let active =
            self.signals.signals_for_account(tenant_id, account_id, &SignalFilter::default())?;

        let factors = HeatFactors {
            posture: posture
                .as_ref()
                .map_or(DEFAULT_POSTURE_COMPONENT, |record| posture_component(record.posture)),
            recency: recency_component(
                active.iter().map(|signal| signal.created_at).max(),
                now,
            ),
            volume: (active.len() as f64 / VOLUME_SATURATION).min(1.0),
        };
        let raw = self.weights.posture * factors.posture
            + self.weights.recency * factors.recency
            + self.weights.volume * factors.volume;
        let raw_tier = tier_for_score(raw);

        let previous = self.heat.load_heat(tenant_id, account_id)?;
        let heat_tier = previous
            .as_ref()
            .map_or(raw_tier, |prev| self.apply_hysteresis(prev, raw_tier, now));

        let state = HeatState {
            tenant_id: tenant_id.clone(),
            account_id: account_id.clone(),
            heat_score: raw,
            heat_tier,
            factors,
            computed_at: now,
            updated_at: now,
        };
        self.heat.save_heat(&state)?;
        Ok(state)
    }

    /// Scores many accounts, collecting per-account errors.
    #[must_use]
    pub fn score_accounts(&self, tenant_id: &TenantId, accounts: &[AccountId]) -> BulkHeatResult {
        let mut computed = Vec::new();
        let mut errors = Vec::new();
        for account_id in accounts {
            match self.score_account(tenant_id, account_id) {
                Ok(state) => computed.push(state),
                Err(err) => errors.push(BulkHeatError {
                    account_id: account_id.clone(),
                    kind: err.kind(),
                    error: err.to_string(),
                }),
            }
        }
        BulkHeatResult {
            computed,
            errors,
        }
    }

    /// Retains the previous tier when a demotion is inside the cooldown.
    fn apply_hysteresis(&self, previous: &HeatState, raw_tier: HeatTier, now: Timestamp) -> HeatTier {
        if !raw_tier.is_cooler_than(previous.heat_tier) {
            return raw_tier;
        }
        let cooldown = self.policy.policy(previous.heat_tier).demotion_cooldown_hours;
        if now.hours_since(previous.computed_at) < i64::from(cooldown) {
            previous.heat_tier
        } else {
            raw_tier
        }
    }
}

// ============================================================================
// SECTION: Score Components
// ============================================================================

/// Maps a posture to its heat component.
#[must_use]
pub const fn posture_component(posture: Posture) -> f64 {
    match posture {
        Posture::Ok => 0.2,
        Posture::Watch => 0.5,
        Posture::AtRisk => 0.8,
        Posture::Expand => 0.9,
        Posture::Dormant => 0.05,
    }
}

/// Discretizes the age of the most recent active signal.
#[must_use]
pub fn recency_component(most_recent: Option<Timestamp>, now: Timestamp) -> f64 {
    let Some(at) = most_recent else {
        return 0.0;
    };
    let age_millis = now.millis_since(at);
    if age_millis <= MILLIS_PER_HOUR {
        1.0
    } else if age_millis <= 6 * MILLIS_PER_HOUR {
        0.7
    } else if age_millis <= MILLIS_PER_DAY {
        0.4
    } else if age_millis <= 7 * MILLIS_PER_DAY {
        0.1
    } else {
        0.0
    }
}

/// Maps a raw score to its tier.
#[must_use]
pub fn tier_for_score(raw: f64) -> HeatTier {
    if raw >= HOT_THRESHOLD {
        HeatTier::Hot
    } else if raw >= WARM_THRESHOLD {
        HeatTier::Warm
    } else {
        HeatTier::Cold
    }
}
