// crates/steward-connectors/src/lib.rs
// ============================================================================
// Module: Steward Connectors Library
// Description: Connector contract, rate limiting, and pull runtime.
// Purpose: Capture content-addressed evidence from external systems.
// Dependencies: steward-core, serde_json
// ============================================================================

//! ## Overview
//! Steward Connectors defines the connector capability set (sync modes,
//! connect/poll/disconnect), a clock-injected token-bucket rate limiter, and
//! the pull runtime that turns polled records into immutable evidence
//! snapshots with atomic sync-state advancement.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connector;
pub mod rate_limit;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use connector::Connector;
pub use connector::ConnectorError;
pub use connector::ConnectorRecord;
pub use connector::PollBatch;
pub use connector::SyncMode;
pub use connector::SyncPrecedence;
pub use connector::SyncState;
pub use connector::SyncStateStore;
pub use rate_limit::TokenBucket;
pub use runtime::ConnectorRuntime;
pub use runtime::InMemorySyncStateStore;
pub use runtime::RuntimeError;
