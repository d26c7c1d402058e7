// crates/steward-core/src/core/ruleset.rs
// ============================================================================
// Module: Steward Posture Ruleset
// Description: Versioned posture rules with signal conditions and predicates.
// Purpose: Define canonical synthesis rules with load-time validation.
// Dependencies: crate::core::{account, hashing, identifiers, posture, signal}, serde
// ============================================================================

//! ## Overview
//! A ruleset collapses the active-signal set and lifecycle state into a
//! posture. Rules are matched in `(priority asc, rule_id asc)` order and the
//! first match wins; when no rule matches, synthesis fails loudly rather than
//! inventing a default posture. Rulesets are validated at load time and fail
//! loudly on malformed rules.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::account::LifecycleState;
use crate::core::error::Classified;
use crate::core::error::ErrorKind;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::RulesetVersion;
use crate::core::posture::Momentum;
use crate::core::posture::Posture;
use crate::core::signal::SignalType;

// ============================================================================
// SECTION: Property Predicates
// ============================================================================

/// Signal property addressed by a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum PredicatePath {
    /// The signal creation timestamp.
    CreatedAt,
    /// A key inside the signal context object.
    Context(String),
    /// A key inside the signal metadata object.
    Metadata(String),
}

/// Operator applied to a signal property.
///
/// # Invariants
/// - Variants are stable for serialization and ruleset authoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    /// Value equality.
    Equals,
    /// Numeric greater-than.
    GreaterThan,
    /// Numeric less-than.
    LessThan,
    /// Numeric less-than-or-equal.
    LessThanOrEqual,
    /// Timestamp within the trailing N-day window.
    WithinLastDays,
    /// Membership in an expected set.
    In,
    /// Property exists.
    Exists,
    /// Property does not exist.
    NotExists,
}

impl PredicateOp {
    /// Returns true when the operator requires an expected value.
    #[must_use]
    pub const fn requires_expected(self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists)
    }
}

/// Predicate over a signal property.
///
/// # Invariants
/// - `expected` is present iff the operator requires a comparison value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPredicate {
    /// Property addressed by the predicate.
    pub path: PredicatePath,
    /// Comparison operator.
    pub op: PredicateOp,
    /// Expected value for comparison operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
}

// ============================================================================
// SECTION: Signal Conditions
// ============================================================================

/// Required-signal condition within a rule.
///
/// Each required signal must have at least one active match; when `where`
/// predicates are present, at least one matching signal must satisfy all of
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredSignal {
    /// Required signal type.
    pub signal_type: SignalType,
    /// Predicates a matching signal must satisfy.
    #[serde(default, rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub where_predicates: Vec<PropertyPredicate>,
}

/// Computed predicate evaluated against the engagement window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum ComputedPredicate {
    /// True iff no engagement-class signal exists in the trailing N days.
    NoEngagementInDays(u32),
    /// True iff an engagement-class signal exists in the trailing N days.
    HasEngagementInDays(u32),
}

// ============================================================================
// SECTION: Rule Outcomes
// ============================================================================

/// Finding template expanded into a deterministic finding on match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingTemplate {
    /// Finding sub-type label.
    pub sub_type: String,
    /// Human-stable description.
    pub description: String,
}

/// Posture outputs produced when a rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Posture classification.
    pub posture: Posture,
    /// Momentum direction.
    pub momentum: Momentum,
    /// Risk finding templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<FindingTemplate>,
    /// Opportunity finding templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opportunities: Vec<FindingTemplate>,
    /// Unknown finding templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknowns: Vec<FindingTemplate>,
    /// Optional posture TTL in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_days: Option<u32>,
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// One posture rule.
///
/// # Invariants
/// - `lifecycle_state == None` marks a fallback rule applicable in any state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Rule identifier, unique within the ruleset.
    pub rule_id: RuleId,
    /// Match priority; lower matches first.
    pub priority: u32,
    /// Lifecycle state the rule applies to, or `None` for any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_state: Option<LifecycleState>,
    /// Required-signal conjunction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_signals: Vec<RequiredSignal>,
    /// Excluded-signal disjunction; any active match disqualifies the rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_signals: Vec<SignalType>,
    /// Computed engagement-window predicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub computed: Vec<ComputedPredicate>,
    /// Signal types resolved into posture evidence on match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_signals: Vec<SignalType>,
    /// Outputs produced on match.
    pub outcome: RuleOutcome,
}

// ============================================================================
// SECTION: Ruleset
// ============================================================================

/// Versioned posture ruleset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesetSpec {
    /// Ruleset version identifier.
    pub version: RulesetVersion,
    /// Rules evaluated in `(priority asc, rule_id asc)` order.
    pub rules: Vec<RuleSpec>,
}

impl RulesetSpec {
    /// Computes the canonical hash of the ruleset.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn canonical_hash(&self) -> Result<HashDigest, HashError> {
        crate::core::hashing::hash_canonical_json(DEFAULT_HASH_ALGORITHM, self)
    }

    /// Returns the rules applicable to a lifecycle state, in match order.
    #[must_use]
    pub fn applicable_rules(&self, state: LifecycleState) -> Vec<&RuleSpec> {
        let mut rules: Vec<&RuleSpec> = self
            .rules
            .iter()
            .filter(|rule| rule.lifecycle_state.is_none_or(|scoped| scoped == state))
            .collect();
        rules.sort_by(|a, b| {
            a.priority.cmp(&b.priority).then_with(|| a.rule_id.as_str().cmp(b.rule_id.as_str()))
        });
        rules
    }

    /// Validates the ruleset invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RulesetError`] when validation fails.
    pub fn validate(&self) -> Result<(), RulesetError> {
        if self.rules.is_empty() {
            return Err(RulesetError::Empty);
        }
        ensure_unique_rule_ids(&self.rules)?;
        ensure_predicates_well_formed(&self.rules)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ruleset validation errors.
#[derive(Debug, Error)]
pub enum RulesetError {
    /// Ruleset contains no rules.
    #[error("ruleset contains no rules")]
    Empty,
    /// Duplicate rule identifier.
    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),
    /// Predicate operator and expected value disagree.
    #[error("malformed predicate in rule {rule_id}: {message}")]
    MalformedPredicate {
        /// Rule containing the predicate.
        rule_id: String,
        /// Validation failure description.
        message: String,
    },
}

impl Classified for RulesetError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Ensures rule identifiers are unique.
fn ensure_unique_rule_ids(rules: &[RuleSpec]) -> Result<(), RulesetError> {
    let mut seen = std::collections::BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.rule_id.as_str()) {
            return Err(RulesetError::DuplicateRuleId(rule.rule_id.to_string()));
        }
    }
    Ok(())
}

/// Ensures predicates carry expected values exactly when required.
fn ensure_predicates_well_formed(rules: &[RuleSpec]) -> Result<(), RulesetError> {
    for rule in rules {
        for required in &rule.required_signals {
            for predicate in &required.where_predicates {
                if predicate.op.requires_expected() && predicate.expected.is_none() {
                    return Err(RulesetError::MalformedPredicate {
                        rule_id: rule.rule_id.to_string(),
                        message: "operator requires an expected value".to_string(),
                    });
                }
                if !predicate.op.requires_expected() && predicate.expected.is_some() {
                    return Err(RulesetError::MalformedPredicate {
                        rule_id: rule.rule_id.to_string(),
                        message: "existence operator must not carry an expected value"
                            .to_string(),
                    });
                }
                if matches!(predicate.op, PredicateOp::WithinLastDays)
                    && !predicate.expected.as_ref().is_some_and(Value::is_u64)
                {
                    return Err(RulesetError::MalformedPredicate {
                        rule_id: rule.rule_id.to_string(),
                        message: "within_last_days requires a non-negative integer".to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}
