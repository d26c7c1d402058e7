// crates/steward-core/src/core/account.rs
// ============================================================================
// Module: Steward Lifecycle Read-Model
// Description: Per-account lifecycle state and active-signal index.
// Purpose: Provide the read-model updated atomically with signal writes.
// Dependencies: crate::core::{identifiers, signal, time}, serde
// ============================================================================

//! ## Overview
//! The lifecycle read-model is derived from signals and updated in the same
//! transaction as every signal write, so readers observe the signal row and
//! the active-signal index together or neither. Lifecycle inference consumes
//! the index, never the signal table directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AccountId;
use crate::core::identifiers::RulesetVersion;
use crate::core::identifiers::SignalId;
use crate::core::identifiers::TenantId;
use crate::core::signal::SignalType;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lifecycle States
// ============================================================================

/// Account lifecycle states inferred from signals.
///
/// # Invariants
/// - Variants are stable for serialization and suppression-rule matching.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Account is a prospect with no qualifying engagement.
    #[default]
    Prospect,
    /// Account shows engagement but no contract.
    Suspect,
    /// Account holds an active contract.
    Customer,
}

impl LifecycleState {
    /// Returns the stable wire label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prospect => "PROSPECT",
            Self::Suspect => "SUSPECT",
            Self::Customer => "CUSTOMER",
        }
    }
}

// ============================================================================
// SECTION: Account State
// ============================================================================

/// Per-account lifecycle read-model.
///
/// # Invariants
/// - `active_signal_index` reflects exactly the `Active` signals in the store.
/// - Updated atomically with signal writes; never mutated independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Current inferred lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Active signal ids indexed by type, in insertion order.
    pub active_signal_index: BTreeMap<SignalType, Vec<SignalId>>,
    /// Timestamp of the most recent observed engagement, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_engagement_at: Option<Timestamp>,
    /// Whether the account holds an active contract.
    pub has_active_contract: bool,
    /// Timestamp of the last lifecycle inference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inference_at: Option<Timestamp>,
    /// Ruleset version used for the last inference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_rule_version: Option<RulesetVersion>,
}

impl AccountState {
    /// Creates an empty read-model for an account defaulting to `Prospect`.
    #[must_use]
    pub fn new(tenant_id: TenantId, account_id: AccountId) -> Self {
        Self {
            tenant_id,
            account_id,
            lifecycle_state: LifecycleState::Prospect,
            active_signal_index: BTreeMap::new(),
            last_engagement_at: None,
            has_active_contract: false,
            last_inference_at: None,
            inference_rule_version: None,
        }
    }

    /// Inserts a signal id into the active index for its type.
    ///
    /// Insertion is idempotent; an id already present is not duplicated.
    pub fn index_signal(&mut self, signal_type: SignalType, signal_id: &SignalId) {
        let entries = self.active_signal_index.entry(signal_type).or_default();
        if !entries.contains(signal_id) {
            entries.push(signal_id.clone());
        }
    }

    /// Removes a signal id from the active index for its type.
    pub fn unindex_signal(&mut self, signal_type: SignalType, signal_id: &SignalId) {
        if let Some(entries) = self.active_signal_index.get_mut(&signal_type) {
            entries.retain(|entry| entry != signal_id);
            if entries.is_empty() {
                self.active_signal_index.remove(&signal_type);
            }
        }
    }

    /// Returns true when the index holds at least one signal of the type.
    #[must_use]
    pub fn has_active(&self, signal_type: SignalType) -> bool {
        self.active_signal_index.get(&signal_type).is_some_and(|entries| !entries.is_empty())
    }

    /// Returns all indexed active signal ids in deterministic order.
    #[must_use]
    pub fn active_signal_ids(&self) -> Vec<SignalId> {
        let mut ids: Vec<SignalId> =
            self.active_signal_index.values().flatten().cloned().collect();
        ids.sort();
        ids
    }
}

// ============================================================================
// SECTION: Lifecycle Transitions
// ============================================================================

/// Observed lifecycle transition, produced by inference.
///
/// # Invariants
/// - `from` is the stored state before the triggering signal write; `to` is
///   the result of one re-inference against the updated active-signal index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    /// State before the write.
    pub from: LifecycleState,
    /// State after re-inference.
    pub to: LifecycleState,
}

impl LifecycleTransition {
    /// Returns true when the transition changes state.
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(
            (self.from, self.to),
            (LifecycleState::Prospect, LifecycleState::Prospect)
                | (LifecycleState::Suspect, LifecycleState::Suspect)
                | (LifecycleState::Customer, LifecycleState::Customer)
        )
    }
}

/// Infers the lifecycle state from the current read-model.
///
/// Contract presence dominates; engagement promotes a prospect to suspect.
/// Suppressed signals never reach the index, so they cannot influence the
/// result.
#[must_use]
pub fn infer_lifecycle_state(state: &AccountState) -> LifecycleState {
    if state.has_active_contract {
        return LifecycleState::Customer;
    }
    if state.last_engagement_at.is_some()
        || state.has_active(SignalType::FirstEngagementOccurred)
    {
        return LifecycleState::Suspect;
    }
    LifecycleState::Prospect
}
