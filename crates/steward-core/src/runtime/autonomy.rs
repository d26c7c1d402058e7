// crates/steward-core/src/runtime/autonomy.rs
// ============================================================================
// Module: Steward Autonomy Gate
// Description: Auto-approval policy for proposed action intents.
// Purpose: Approve allowlisted actions under a daily autonomy budget.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! The autonomy gate decides whether a proposed action executes without a
//! human. Approval requires the action type to be allowlisted for the tenant
//! and a unit of the daily autonomy budget, consumed atomically. Approval
//! emits `ACTION_APPROVED` with the autonomy source marker; everything else
//! defers to human approval.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::ActionIntent;
use crate::core::ActionType;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::ErrorKind;
use crate::core::EventEnvelope;
use crate::core::EventKind;
use crate::interfaces::BudgetConsume;
use crate::interfaces::BudgetScope;
use crate::interfaces::BudgetStore;
use crate::interfaces::BusError;
use crate::interfaces::EventBus;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Tenant autonomy policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutonomyPolicy {
    /// Action types eligible for auto-approval.
    pub auto_approve_types: Vec<ActionType>,
    /// Daily auto-approved action cap (0 disables auto-approval).
    pub max_auto_actions_per_day: u32,
}

/// Autonomy decision for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutonomyDecision {
    /// Intent auto-approved and released for execution.
    AutoApproved,
    /// Intent requires human approval.
    RequiresHuman {
        /// Stable reason label.
        reason: String,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Autonomy gate errors.
#[derive(Debug, Error)]
pub enum AutonomyError {
    /// Budget store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl Classified for AutonomyError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(inner) => inner.kind(),
            Self::Bus(inner) => inner.kind(),
        }
    }
}

// ============================================================================
// SECTION: Autonomy Gate
// ============================================================================

/// Auto-approval gate for action intents.
#[derive(Clone)]
pub struct AutonomyGate {
    /// Tenant policy.
    policy: AutonomyPolicy,
    /// Budget store.
    budgets: Arc<dyn BudgetStore + Send + Sync>,
    /// Event bus.
    bus: Arc<dyn EventBus + Send + Sync>,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl AutonomyGate {
    /// Creates an autonomy gate from its collaborators.
    #[must_use]
    pub fn new(
        policy: AutonomyPolicy,
        budgets: Arc<dyn BudgetStore + Send + Sync>,
        bus: Arc<dyn EventBus + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            policy,
            budgets,
            bus,
            clock,
        }
    }

    /// Evaluates an intent against the autonomy policy.
    ///
    /// # Errors
    ///
    /// Returns [`AutonomyError`] when budget consumption or event emission
    /// fails outside the conditional guard.
    pub fn evaluate(&self, intent: &ActionIntent) -> Result<AutonomyDecision, AutonomyError> {
        if self.policy.max_auto_actions_per_day == 0 {
            return Ok(AutonomyDecision::RequiresHuman {
                reason: "autonomy_disabled".to_string(),
            });
        }
        if !self.policy.auto_approve_types.contains(&intent.action_type) {
            return Ok(AutonomyDecision::RequiresHuman {
                reason: "action_type_not_allowlisted".to_string(),
            });
        }

        let now = self.clock.now();
        let consume = self.budgets.consume(
            BudgetScope::Autonomy,
            &intent.tenant_id,
            now.day_key(),
            1,
            self.policy.max_auto_actions_per_day,
            None,
        )?;
        if consume == BudgetConsume::Exceeded {
            return Ok(AutonomyDecision::RequiresHuman {
                reason: "autonomy_budget_exceeded".to_string(),
            });
        }

        self.bus.emit(&EventEnvelope::new(
            EventKind::ActionApproved,
            now,
            json!({
                "data": {
                    "action_intent_id": intent.action_intent_id.as_str(),
                    "tenant_id": intent.tenant_id.as_str(),
                    "account_id": intent.account_id.as_str(),
                    "approval_source": "autonomy_policy",
                    "auto_executed": true,
                }
            }),
        ))?;
        Ok(AutonomyDecision::AutoApproved)
    }
}
