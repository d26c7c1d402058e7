// crates/steward-connectors/src/connector.rs
// ============================================================================
// Module: Steward Connector Contract
// Description: Connector capability set, sync modes, and sync state.
// Purpose: Define how external systems are polled for evidence.
// Dependencies: steward-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A connector advertises its sync mode and exposes `connect`, `poll`, and
//! `disconnect`. Polling returns a finite batch of external records together
//! with the sync state that becomes current once the batch is fully emitted;
//! the runtime never advances sync state for a partially emitted batch.
//! Hybrid connectors persist both a timestamp and a cursor and declare which
//! one wins on disagreement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use steward_core::AccountId;
use steward_core::Classified;
use steward_core::ConnectorId;
use steward_core::EntityRef;
use steward_core::ErrorKind;
use steward_core::PullDepth;
use steward_core::TenantId;
use steward_core::Timestamp;
use steward_core::interfaces::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Sync Modes
// ============================================================================

/// Field that wins when hybrid sync state disagrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPrecedence {
    /// The last-sync timestamp wins.
    Timestamp,
    /// The pagination cursor wins.
    Cursor,
}

/// Connector sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncMode {
    /// Incremental sync by last-sync timestamp.
    Timestamp,
    /// Incremental sync by pagination cursor.
    Cursor,
    /// Both timestamp and cursor, with declared precedence.
    Hybrid {
        /// Field that wins on disagreement.
        precedence: SyncPrecedence,
    },
}

// ============================================================================
// SECTION: Sync State
// ============================================================================

/// Persisted sync state for a (tenant, connector, account) scope.
///
/// # Invariants
/// - Advanced only after the corresponding batch was fully emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncState {
    /// Last successful sync timestamp, for timestamp and hybrid modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<Timestamp>,
    /// Pagination cursor, for cursor and hybrid modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Persistence seam for connector sync state.
pub trait SyncStateStore: Send + Sync {
    /// Loads the sync state for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_sync_state(
        &self,
        tenant_id: &TenantId,
        connector_id: &ConnectorId,
        account_id: &AccountId,
    ) -> Result<Option<SyncState>, StoreError>;

    /// Saves the sync state for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save_sync_state(
        &self,
        tenant_id: &TenantId,
        connector_id: &ConnectorId,
        account_id: &AccountId,
        state: &SyncState,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Poll Results
// ============================================================================

/// One external record considered new by a connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorRecord {
    /// Observed external entity.
    pub entity: EntityRef,
    /// Payload schema version.
    pub schema_version: u32,
    /// Detector input contract version.
    pub detector_input_version: u32,
    /// Observation payload.
    pub payload: Value,
}

/// Finite batch returned by one poll.
///
/// # Invariants
/// - `next_state` becomes current only after every record was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PollBatch {
    /// Records considered new since the prior sync state.
    pub records: Vec<ConnectorRecord>,
    /// Sync state to persist after full emission.
    pub next_state: SyncState,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Typed connector errors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Connection establishment failed.
    #[error("connector connect failed ({code}): {message}")]
    Connect {
        /// Stable error code.
        code: String,
        /// Failure description.
        message: String,
        /// Retryability classification.
        transient: bool,
    },
    /// Polling failed.
    #[error("connector poll failed ({code}): {message}")]
    Poll {
        /// Stable error code.
        code: String,
        /// Failure description.
        message: String,
        /// Retryability classification.
        transient: bool,
    },
    /// Authentication failed.
    #[error("connector auth failed: {0}")]
    Auth(String),
    /// The local rate limit refused the outward call.
    #[error("connector rate limited: {0}")]
    RateLimited(String),
}

impl Classified for ConnectorError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { transient, .. } | Self::Poll { transient, .. } => {
                if *transient {
                    ErrorKind::TransientUpstream
                } else {
                    ErrorKind::PermanentUpstream
                }
            }
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimited(_) => ErrorKind::RateLimit,
        }
    }
}

// ============================================================================
// SECTION: Connector Capability
// ============================================================================

/// Connector capability set.
pub trait Connector: Send + Sync {
    /// Returns the connector identifier.
    fn connector_id(&self) -> ConnectorId;

    /// Returns the advertised sync mode.
    fn sync_mode(&self) -> SyncMode;

    /// Establishes the connection for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the connection cannot be established.
    fn connect(&self, tenant_id: &TenantId) -> Result<(), ConnectorError>;

    /// Polls for records newer than the provided sync state.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when polling fails; partial batches are
    /// discarded by the runtime.
    fn poll(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        depth: PullDepth,
        state: &SyncState,
    ) -> Result<PollBatch, ConnectorError>;

    /// Releases the connection for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when teardown fails.
    fn disconnect(&self, tenant_id: &TenantId) -> Result<(), ConnectorError>;
}
