// crates/steward-core/src/runtime/suppression.rs
// ============================================================================
// Module: Steward Suppression Engine
// Description: Single deterministic path for suppressing signals.
// Purpose: Suppress signals invalidated by lifecycle transitions.
// Dependencies: crate::{core, interfaces, runtime::signals}, serde_json
// ============================================================================

//! ## Overview
//! Suppression is table-driven: each lifecycle transition names the signal
//! types it invalidates. The engine computes the suppression set from the
//! account's active signals, applies it through the signal writer (the only
//! path that can mark a signal suppressed), and logs one validation ledger
//! entry per batch. Precedence: an active FIRST_ENGAGEMENT_OCCURRED always
//! forces NO_ENGAGEMENT_PRESENT into the set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::ErrorKind;
use crate::core::LedgerEntry;
use crate::core::LedgerEventType;
use crate::core::LifecycleState;
use crate::core::Signal;
use crate::core::SignalId;
use crate::core::SignalStatus;
use crate::core::SignalType;
use crate::core::TenantId;
use crate::core::TraceId;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::runtime::signals::SignalServiceError;
use crate::runtime::signals::SignalWriter;

// ============================================================================
// SECTION: Suppression Rules
// ============================================================================

/// Table row mapping a lifecycle transition to invalidated signal types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionRule {
    /// Transition source state.
    pub from: LifecycleState,
    /// Transition target state.
    pub to: LifecycleState,
    /// Signal types invalidated by the transition.
    pub suppress: Vec<SignalType>,
}

/// Returns the default suppression rule table.
#[must_use]
pub fn default_rules() -> Vec<SuppressionRule> {
    vec![
        SuppressionRule {
            from: LifecycleState::Prospect,
            to: LifecycleState::Suspect,
            suppress: vec![
                SignalType::AccountActivationDetected,
                SignalType::NoEngagementPresent,
            ],
        },
        SuppressionRule {
            from: LifecycleState::Prospect,
            to: LifecycleState::Customer,
            suppress: vec![
                SignalType::AccountActivationDetected,
                SignalType::NoEngagementPresent,
                SignalType::DiscoveryProgressStalled,
            ],
        },
        SuppressionRule {
            from: LifecycleState::Suspect,
            to: LifecycleState::Customer,
            suppress: vec![
                SignalType::NoEngagementPresent,
                SignalType::DiscoveryProgressStalled,
            ],
        },
    ]
}

// ============================================================================
// SECTION: Suppression Sets
// ============================================================================

/// Computed batch of signals to suppress for one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SuppressionSet {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Account identifier.
    pub account_id: AccountId,
    /// Transition source state.
    pub from: LifecycleState,
    /// Transition target state.
    pub to: LifecycleState,
    /// Signals selected for suppression.
    pub entries: Vec<(SignalId, SignalType)>,
    /// Stable suppression reason label.
    pub reason: String,
}

impl SuppressionSet {
    /// Returns true when nothing needs suppressing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Suppression engine errors.
#[derive(Debug, Error)]
pub enum SuppressionError {
    /// Applying a status update failed.
    #[error(transparent)]
    Signal(#[from] SignalServiceError),
    /// Batch ledger write failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Classified for SuppressionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Signal(inner) => inner.kind(),
            Self::Ledger(inner) => inner.kind(),
        }
    }
}

// ============================================================================
// SECTION: Suppression Engine
// ============================================================================

/// Sole path for suppressing signals.
#[derive(Clone)]
pub struct SuppressionEngine {
    /// Suppression rule table.
    rules: Vec<SuppressionRule>,
    /// Signal writer applying status updates.
    writer: Arc<dyn SignalWriter + Send + Sync>,
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SuppressionEngine {
    /// Creates a suppression engine with the default rule table.
    #[must_use]
    pub fn new(
        writer: Arc<dyn SignalWriter + Send + Sync>,
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            rules: default_rules(),
            writer,
            ledger,
            clock,
        }
    }

    /// Replaces the rule table.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<SuppressionRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Computes the suppression set for a lifecycle transition.
    #[must_use]
    pub fn compute(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        from: LifecycleState,
        to: LifecycleState,
        active_signals: &[Signal],
    ) -> SuppressionSet {
        let mut types: Vec<SignalType> = self
            .rules
            .iter()
            .find(|rule| rule.from == from && rule.to == to)
            .map(|rule| rule.suppress.clone())
            .unwrap_or_default();

        let first_engagement_present = active_signals.iter().any(|signal| {
            signal.signal_type == SignalType::FirstEngagementOccurred
                && signal.status == SignalStatus::Active
        });
        if first_engagement_present && !types.contains(&SignalType::NoEngagementPresent) {
            types.push(SignalType::NoEngagementPresent);
        }

        let entries = active_signals
            .iter()
            .filter(|signal| {
                signal.status == SignalStatus::Active && types.contains(&signal.signal_type)
            })
            .map(|signal| (signal.signal_id.clone(), signal.signal_type))
            .collect();

        SuppressionSet {
            tenant_id: tenant_id.clone(),
            account_id: account_id.clone(),
            from,
            to,
            entries,
            reason: format!("lifecycle_transition:{}->{}", from.as_str(), to.as_str()),
        }
    }

    /// Applies the suppression set through the signal writer.
    ///
    /// # Errors
    ///
    /// Returns [`SuppressionError::Signal`] when a status update fails.
    pub fn apply(&self, set: &SuppressionSet) -> Result<(), SuppressionError> {
        for (signal_id, _) in &set.entries {
            self.writer.update_status(
                &set.tenant_id,
                signal_id,
                SignalStatus::Suppressed,
                Some(&set.reason),
            )?;
        }
        Ok(())
    }

    /// Appends a single validation ledger entry for the batch.
    ///
    /// # Errors
    ///
    /// Returns [`SuppressionError::Ledger`] when the write fails.
    pub fn log(&self, set: &SuppressionSet, trace_id: &TraceId) -> Result<(), SuppressionError> {
        let entry = LedgerEntry::for_trace(
            set.tenant_id.clone(),
            set.account_id.clone(),
            trace_id.clone(),
            LedgerEventType::Validation,
            self.clock.now(),
            &format!("suppression-{}-{}", set.from.as_str(), set.to.as_str()),
            json!({
                "reason": set.reason,
                "from": set.from.as_str(),
                "to": set.to.as_str(),
                "suppressed": set
                    .entries
                    .iter()
                    .map(|(id, signal_type)| json!({
                        "signal_id": id.as_str(),
                        "signal_type": signal_type.as_str(),
                    }))
                    .collect::<Vec<_>>(),
            }),
        );
        self.ledger.append(&entry)?;
        Ok(())
    }

    /// Computes, applies, and logs suppression for a transition.
    ///
    /// # Errors
    ///
    /// Returns [`SuppressionError`] when any step fails.
    pub fn run(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        from: LifecycleState,
        to: LifecycleState,
        active_signals: &[Signal],
        trace_id: &TraceId,
    ) -> Result<SuppressionSet, SuppressionError> {
        let set = self.compute(tenant_id, account_id, from, to, active_signals);
        if !set.is_empty() {
            self.apply(&set)?;
            self.log(&set, trace_id)?;
        }
        Ok(set)
    }
}
