// crates/steward-core/src/runtime/synthesis.rs
// ============================================================================
// Module: Steward Synthesis Engine
// Description: Priority-ordered rule matching producing posture records.
// Purpose: Collapse active signals and lifecycle state into deterministic posture.
// Dependencies: crate::{core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! Synthesis loads the account's active signals (TTL-filtered at read time),
//! the lifecycle state, and the configured ruleset, then matches rules in
//! `(priority asc, rule_id asc)` order. The first match composes the posture
//! record with deterministic finding ids and cryptographic input fingerprints.
//! An unknown ruleset or an input no rule matches is an invariant failure,
//! never a silent default. The ruleset cache is process-wide and append-only;
//! `clear_ruleset_cache` exists for tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;

use serde_json::json;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::ComputedPredicate;
use crate::core::ErrorKind;
use crate::core::EvidenceRef;
use crate::core::Finding;
use crate::core::FindingKind;
use crate::core::FindingTemplate;
use crate::hashing::HashError;
use crate::core::LedgerEntry;
use crate::core::LedgerEventType;
use crate::core::LifecycleState;
use crate::core::PostureRecord;
use crate::core::RuleSpec;
use crate::core::RulesetError;
use crate::core::RulesetSpec;
use crate::core::RulesetVersion;
use crate::core::Signal;
use crate::core::SignalId;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::active_signals_hash;
use crate::core::derive_finding_id;
use crate::core::inputs_hash;
use crate::interfaces::AccountStateStore;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::PostureStore;
use crate::interfaces::StoreError;
use crate::runtime::comparator::evaluate_predicate;
use crate::runtime::signals::SignalFilter;
use crate::runtime::signals::SignalReader;
use crate::runtime::signals::SignalServiceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum evidence signal ids carried on a posture record.
const MAX_EVIDENCE_SIGNALS: usize = 10;
/// Maximum evidence signal ids resolved per declared type.
const MAX_EVIDENCE_PER_TYPE: usize = 10;
/// Maximum evidence snapshot refs carried on a posture record.
const MAX_EVIDENCE_REFS: usize = 10;

// ============================================================================
// SECTION: Ruleset Source and Cache
// ============================================================================

/// Source resolving ruleset versions to specifications.
pub trait RulesetSource: Send + Sync {
    /// Fetches a ruleset by version.
    ///
    /// # Errors
    ///
    /// Returns [`RulesetError`] when the ruleset exists but fails validation.
    fn fetch(&self, version: &RulesetVersion) -> Result<Option<RulesetSpec>, RulesetError>;
}

/// In-memory ruleset source for tests and embedded rulesets.
#[derive(Debug, Default, Clone)]
pub struct StaticRulesetSource {
    /// Registered rulesets by version.
    rulesets: BTreeMap<String, RulesetSpec>,
}

impl StaticRulesetSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ruleset under its version.
    #[must_use]
    pub fn with(mut self, ruleset: RulesetSpec) -> Self {
        self.rulesets.insert(ruleset.version.as_str().to_string(), ruleset);
        self
    }
}

impl RulesetSource for StaticRulesetSource {
    fn fetch(&self, version: &RulesetVersion) -> Result<Option<RulesetSpec>, RulesetError> {
        Ok(self.rulesets.get(version.as_str()).cloned())
    }
}

/// Returns the process-wide ruleset cache.
fn ruleset_cache() -> &'static Mutex<BTreeMap<String, Arc<RulesetSpec>>> {
    static CACHE: OnceLock<Mutex<BTreeMap<String, Arc<RulesetSpec>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(BTreeMap::new()))
}

/// Loads a ruleset through the process-wide cache, validating on first load.
///
/// # Errors
///
/// Returns [`SynthesisError::UnknownRuleset`] when the version is not
/// registered and [`SynthesisError::Ruleset`] when validation fails.
pub fn load_ruleset(
    source: &dyn RulesetSource,
    version: &RulesetVersion,
) -> Result<Arc<RulesetSpec>, SynthesisError> {
    if let Ok(cache) = ruleset_cache().lock() {
        if let Some(ruleset) = cache.get(version.as_str()) {
            return Ok(Arc::clone(ruleset));
        }
    }

    let ruleset = source
        .fetch(version)?
        .ok_or_else(|| SynthesisError::UnknownRuleset(version.to_string()))?;
    ruleset.validate()?;
    let ruleset = Arc::new(ruleset);

    if let Ok(mut cache) = ruleset_cache().lock() {
        let entry = cache
            .entry(version.as_str().to_string())
            .or_insert_with(|| Arc::clone(&ruleset));
        return Ok(Arc::clone(entry));
    }
    Ok(ruleset)
}

/// Clears the process-wide ruleset cache. Test use only.
pub fn clear_ruleset_cache() {
    if let Ok(mut cache) = ruleset_cache().lock() {
        cache.clear();
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Synthesis errors.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The configured ruleset version is not registered.
    #[error("unknown ruleset version: {0}")]
    UnknownRuleset(String),
    /// No rule matched the synthesis inputs.
    #[error("no rule matched for account {0}")]
    NoRuleMatched(String),
    /// Ruleset failed validation.
    #[error(transparent)]
    Ruleset(#[from] RulesetError),
    /// Signal read failed.
    #[error(transparent)]
    Signal(#[from] SignalServiceError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Hashing failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for SynthesisError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownRuleset(_) | Self::NoRuleMatched(_) => ErrorKind::Invariant,
            Self::Ruleset(inner) => inner.kind(),
            Self::Signal(inner) => inner.kind(),
            Self::Store(inner) => inner.kind(),
            Self::Ledger(inner) => inner.kind(),
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// SECTION: Synthesis Engine
// ============================================================================

/// Deterministic posture synthesis engine.
#[derive(Clone)]
pub struct SynthesisEngine {
    /// Signal reader.
    signals: Arc<dyn SignalReader + Send + Sync>,
    /// Account state store.
    accounts: Arc<dyn AccountStateStore + Send + Sync>,
    /// Posture store.
    postures: Arc<dyn PostureStore + Send + Sync>,
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Ruleset source.
    source: Arc<dyn RulesetSource>,
    /// Configured ruleset version.
    version: RulesetVersion,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SynthesisEngine {
    /// Creates a synthesis engine from its collaborators.
    #[must_use]
    pub fn new(
        signals: Arc<dyn SignalReader + Send + Sync>,
        accounts: Arc<dyn AccountStateStore + Send + Sync>,
        postures: Arc<dyn PostureStore + Send + Sync>,
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        source: Arc<dyn RulesetSource>,
        version: RulesetVersion,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            signals,
            accounts,
            postures,
            ledger,
            source,
            version,
            clock,
        }
    }

    /// Synthesizes the posture for an account at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError`] on unknown rulesets, unmatched inputs, or
    /// collaborator failures. Invariant failures are ledgered before return.
    pub fn synthesize(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        trace_id: &TraceId,
    ) -> Result<PostureRecord, SynthesisError> {
        let now = self.clock.now();
        let active = self.signals.signals_for_account(
            tenant_id,
            account_id,
            &SignalFilter::default(),
        )?;
        let lifecycle = self
            .accounts
            .load_account(tenant_id, account_id)?
            .map_or(LifecycleState::Prospect, |state| state.lifecycle_state);
        let ruleset = load_ruleset(self.source.as_ref(), &self.version)?;

        let matched = ruleset
            .applicable_rules(lifecycle)
            .into_iter()
            .find(|rule| rule_matches(rule, &active, now));
        let Some(rule) = matched else {
            self.ledger_invariant(tenant_id, account_id, trace_id, &active, lifecycle, now)?;
            return Err(SynthesisError::NoRuleMatched(account_id.to_string()));
        };

        let record =
            self.compose(tenant_id, account_id, rule, &active, lifecycle, now)?;
        self.postures.save_posture(&record)?;

        let entry = LedgerEntry::for_trace(
            tenant_id.clone(),
            account_id.clone(),
            trace_id.clone(),
            LedgerEventType::Synthesis,
            now,
            &format!("synthesis-{}", record.inputs_hash.value),
            json!({
                "posture": record.posture.as_str(),
                "rule_id": record.rule_id.as_str(),
                "ruleset_version": record.ruleset_version.as_str(),
                "inputs_hash": record.inputs_hash.value,
                "active_signals_hash": record.active_signals_hash.value,
            }),
        );
        self.ledger.append(&entry)?;
        Ok(record)
    }

    /// Composes the posture record for a matched rule.
    fn compose(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        rule: &RuleSpec,
        active: &[Signal],
        lifecycle: LifecycleState,
        now: Timestamp,
    ) -> Result<PostureRecord, SynthesisError> {
        let evidence_signal_ids = select_evidence_signals(rule, active);
        let evidence_refs = select_evidence_refs(&evidence_signal_ids, active);
        let all_active_ids: Vec<SignalId> =
            active.iter().map(|signal| signal.signal_id.clone()).collect();
        let signals_hash = active_signals_hash(&all_active_ids)?;
        let inputs = inputs_hash(&signals_hash, lifecycle, &self.version)?;

        let expand = |templates: &[FindingTemplate], kind: FindingKind| {
            templates
                .iter()
                .map(|template| {
                    derive_finding_id(
                        tenant_id,
                        account_id,
                        &self.version,
                        kind,
                        &template.sub_type,
                        &rule.rule_id,
                    )
                    .map(|finding_id| Finding {
                        finding_id,
                        kind,
                        sub_type: template.sub_type.clone(),
                        rule_id: rule.rule_id.clone(),
                        description: template.description.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(PostureRecord {
            tenant_id: tenant_id.clone(),
            account_id: account_id.clone(),
            posture: rule.outcome.posture,
            momentum: rule.outcome.momentum,
            risks: expand(&rule.outcome.risks, FindingKind::Risk)?,
            opportunities: expand(&rule.outcome.opportunities, FindingKind::Opportunity)?,
            unknowns: expand(&rule.outcome.unknowns, FindingKind::Unknown)?,
            evidence_signal_ids,
            evidence_refs,
            active_signals_hash: signals_hash,
            inputs_hash: inputs,
            lifecycle_state: lifecycle,
            ruleset_version: self.version.clone(),
            rule_id: rule.rule_id.clone(),
            evaluated_at: now,
            ttl_days: rule.outcome.ttl_days,
        })
    }

    /// Appends a validation ledger entry for an unmatched input set.
    fn ledger_invariant(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        trace_id: &TraceId,
        active: &[Signal],
        lifecycle: LifecycleState,
        now: Timestamp,
    ) -> Result<(), SynthesisError> {
        let entry = LedgerEntry::for_trace(
            tenant_id.clone(),
            account_id.clone(),
            trace_id.clone(),
            LedgerEventType::Validation,
            now,
            "synthesis-no-rule",
            json!({
                "error": "NO_RULE_MATCHED",
                "lifecycle_state": lifecycle.as_str(),
                "ruleset_version": self.version.as_str(),
                "active_signal_types": active
                    .iter()
                    .map(|signal| signal.signal_type.as_str())
                    .collect::<Vec<_>>(),
            }),
        );
        self.ledger.append(&entry)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Rule Matching
// ============================================================================

/// Returns true when a rule matches the active signals at `now`.
#[must_use]
pub fn rule_matches(rule: &RuleSpec, active: &[Signal], now: Timestamp) -> bool {
    for required in &rule.required_signals {
        let candidates: Vec<&Signal> = active
            .iter()
            .filter(|signal| signal.signal_type == required.signal_type)
            .collect();
        if candidates.is_empty() {
            return false;
        }
        if !required.where_predicates.is_empty() {
            let satisfied = candidates.iter().any(|signal| {
                required
                    .where_predicates
                    .iter()
                    .all(|predicate| evaluate_predicate(predicate, signal, now))
            });
            if !satisfied {
                return false;
            }
        }
    }

    if rule
        .excluded_signals
        .iter()
        .any(|excluded| active.iter().any(|signal| signal.signal_type == *excluded))
    {
        return false;
    }

    rule.computed.iter().all(|computed| computed_holds(*computed, active, now))
}

/// Evaluates a computed engagement-window predicate.
fn computed_holds(predicate: ComputedPredicate, active: &[Signal], now: Timestamp) -> bool {
    match predicate {
        ComputedPredicate::NoEngagementInDays(days) => !engagement_within(active, now, days),
        ComputedPredicate::HasEngagementInDays(days) => engagement_within(active, now, days),
    }
}

/// Returns true when an engagement-class signal falls inside the window.
fn engagement_within(active: &[Signal], now: Timestamp, days: u32) -> bool {
    let floor = now.minus_days(i64::from(days));
    active.iter().any(|signal| {
        signal.signal_type.is_engagement_class()
            && signal.created_at >= floor
            && signal.created_at <= now
    })
}

// ============================================================================
// SECTION: Evidence Selection
// ============================================================================

/// Resolves declared evidence signal types to sorted, capped signal ids.
fn select_evidence_signals(rule: &RuleSpec, active: &[Signal]) -> Vec<SignalId> {
    let mut selected: Vec<SignalId> = Vec::new();
    for signal_type in &rule.evidence_signals {
        let mut of_type: Vec<&Signal> =
            active.iter().filter(|signal| signal.signal_type == *signal_type).collect();
        of_type.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for signal in of_type.into_iter().take(MAX_EVIDENCE_PER_TYPE) {
            if !selected.contains(&signal.signal_id) {
                selected.push(signal.signal_id.clone());
            }
        }
    }
    selected.sort();
    selected.truncate(MAX_EVIDENCE_SIGNALS);
    selected
}

/// Resolves evidence refs for selected signals, deduplicated by digest.
fn select_evidence_refs(
    selected: &[SignalId],
    active: &[Signal],
) -> Vec<EvidenceRef> {
    let mut seen = std::collections::BTreeSet::new();
    let mut refs = Vec::new();
    for signal_id in selected {
        let Some(signal) = active.iter().find(|signal| &signal.signal_id == signal_id) else {
            continue;
        };
        if seen.insert(signal.evidence.sha256.value.clone()) {
            refs.push(signal.evidence.clone());
            if refs.len() >= MAX_EVIDENCE_REFS {
                break;
            }
        }
    }
    refs
}
