// crates/steward-core/src/runtime/mod.rs
// ============================================================================
// Module: Steward Runtime
// Description: Core runtimes for perception, synthesis, scheduling, execution.
// Purpose: Provide the canonical handlers behind every Steward surface.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime modules implement the four cores: perception (detectors,
//! signal service, suppression), synthesis (rule engine), scheduling (heat,
//! pull, decision), and execution (pipeline, emitter), plus the audit
//! exporter, the autonomy gate, and in-memory reference stores.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod autonomy;
pub mod comparator;
pub mod decision;
pub mod detectors;
pub mod emitter;
pub mod execution;
pub mod heat;
pub mod pull;
pub mod signals;
pub mod stores;
pub mod suppression;
pub mod synthesis;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditExportError;
pub use audit::AuditExporter;
pub use autonomy::AutonomyDecision;
pub use autonomy::AutonomyError;
pub use autonomy::AutonomyGate;
pub use autonomy::AutonomyPolicy;
pub use comparator::evaluate_predicate;
pub use decision::CostGateConfig;
pub use decision::DecisionError;
pub use decision::DecisionScheduler;
pub use detectors::Detector;
pub use detectors::DetectorContext;
pub use detectors::DetectorError;
pub use detectors::DetectorRegistry;
pub use detectors::SignalDraft;
pub use detectors::build_signal;
pub use detectors::run_detector;
pub use emitter::EmitterError;
pub use emitter::ExecutionSignalEmitter;
pub use execution::ExecutionConfig;
pub use execution::ExecutionError;
pub use execution::ExecutionPipeline;
pub use execution::ExecutionResult;
pub use execution::merge_params;
pub use heat::BulkHeatError;
pub use heat::BulkHeatResult;
pub use heat::HeatError;
pub use heat::HeatScorer;
pub use heat::posture_component;
pub use heat::recency_component;
pub use heat::tier_for_score;
pub use pull::OpenRateGate;
pub use pull::PullError;
pub use pull::PullOrchestrator;
pub use pull::PullRequest;
pub use pull::RateGate;
pub use signals::CreateSignalResult;
pub use signals::ExecutionSignalWriter;
pub use signals::ReplayReport;
pub use signals::SignalFilter;
pub use signals::SignalReader;
pub use signals::SignalReplayer;
pub use signals::SignalService;
pub use signals::SignalServiceError;
pub use signals::SignalWriter;
pub use stores::InMemoryArtifactStore;
pub use stores::InMemoryAttemptStore;
pub use stores::InMemoryAuditExportStore;
pub use stores::InMemoryBudgetStore;
pub use stores::InMemoryDecisionRunStore;
pub use stores::InMemoryDedupeStore;
pub use stores::InMemoryEvidenceStore;
pub use stores::InMemoryHeatStore;
pub use stores::InMemoryIdempotencyStore;
pub use stores::InMemoryIntentStore;
pub use stores::InMemoryLedgerStore;
pub use stores::InMemoryOutcomeStore;
pub use stores::InMemoryPerceptionStore;
pub use stores::InMemoryPostureStore;
pub use stores::RecordingEventBus;
pub use suppression::SuppressionEngine;
pub use suppression::SuppressionError;
pub use suppression::SuppressionRule;
pub use suppression::SuppressionSet;
pub use suppression::default_rules;
pub use synthesis::RulesetSource;
pub use synthesis::StaticRulesetSource;
pub use synthesis::SynthesisEngine;
pub use synthesis::SynthesisError;
pub use synthesis::clear_ruleset_cache;
pub use synthesis::load_ruleset;
pub use synthesis::rule_matches;
