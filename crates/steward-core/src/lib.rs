// crates/steward-core/src/lib.rs
// ============================================================================
// Module: Steward Core Library
// Description: Public API surface for the Steward core.
// Purpose: Expose core types, interfaces, and runtime engines.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Steward core provides deterministic account-lifecycle perception,
//! synthesis, scheduling, and execution for multi-tenant accounts. It is
//! backend-agnostic and integrates through explicit interfaces rather than
//! embedding store or transport details.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use interfaces::AccountStateStore;
pub use interfaces::ArtifactStore;
pub use interfaces::AttemptLock;
pub use interfaces::AttemptStore;
pub use interfaces::AuditExportStore;
pub use interfaces::BudgetConsume;
pub use interfaces::BudgetScope;
pub use interfaces::BudgetStore;
pub use interfaces::BusError;
pub use interfaces::DecisionRunStore;
pub use interfaces::DedupeReservation;
pub use interfaces::DedupeStore;
pub use interfaces::EventBus;
pub use interfaces::EvidenceStore;
pub use interfaces::EvidenceStoreError;
pub use interfaces::GatewayError;
pub use interfaces::IdempotencyStore;
pub use interfaces::IntentStore;
pub use interfaces::LedgerError;
pub use interfaces::LedgerStore;
pub use interfaces::NoopSleeper;
pub use interfaces::OutcomeStore;
pub use interfaces::PostureStore;
pub use interfaces::Reservation;
pub use interfaces::SignalStore;
pub use interfaces::SignalWrite;
pub use interfaces::Sleeper;
pub use interfaces::StoreError;
pub use interfaces::ThreadSleeper;
pub use interfaces::ToolGateway;
pub use runtime::AuditExporter;
pub use runtime::AutonomyDecision;
pub use runtime::AutonomyGate;
pub use runtime::AutonomyPolicy;
pub use runtime::CostGateConfig;
pub use runtime::CreateSignalResult;
pub use runtime::DecisionScheduler;
pub use runtime::Detector;
pub use runtime::DetectorContext;
pub use runtime::DetectorRegistry;
pub use runtime::ExecutionConfig;
pub use runtime::ExecutionPipeline;
pub use runtime::ExecutionResult;
pub use runtime::ExecutionSignalEmitter;
pub use runtime::ExecutionSignalWriter;
pub use runtime::HeatScorer;
pub use runtime::PullOrchestrator;
pub use runtime::PullRequest;
pub use runtime::SignalFilter;
pub use runtime::SignalReader;
pub use runtime::SignalReplayer;
pub use runtime::SignalService;
pub use runtime::SignalWriter;
pub use runtime::SuppressionEngine;
pub use runtime::SynthesisEngine;

