// crates/steward-core/src/runtime/audit.rs
// ============================================================================
// Module: Steward Audit Exporter
// Description: Assembles ledger ranges into hashed export artifacts.
// Purpose: Serve audit export requests from the append-only ledger.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! An audit export collects the ledger entries for an account and time
//! range, writes them as one canonical-JSON artifact under the export job
//! id, and records an export row carrying the artifact digest so the export
//! can be verified offline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::AccountId;
use crate::core::AuditExportRecord;
use crate::core::Classified;
use crate::core::Clock;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::ErrorKind;
use crate::core::ExportJobId;
use crate::hashing::HashError;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_bytes;
use crate::interfaces::ArtifactStore;
use crate::interfaces::AuditExportStore;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit export errors.
#[derive(Debug, Error)]
pub enum AuditExportError {
    /// Ledger query failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Artifact serialization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl Classified for AuditExportError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(inner) => inner.kind(),
            Self::Store(inner) => inner.kind(),
            Self::Hash(_) => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// SECTION: Audit Exporter
// ============================================================================

/// Audit export worker.
#[derive(Clone)]
pub struct AuditExporter {
    /// Append-only ledger.
    ledger: Arc<dyn LedgerStore + Send + Sync>,
    /// Artifact object store.
    artifacts: Arc<dyn ArtifactStore + Send + Sync>,
    /// Export record store.
    exports: Arc<dyn AuditExportStore + Send + Sync>,
    /// Injected clock.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl AuditExporter {
    /// Creates an audit exporter from its collaborators.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore + Send + Sync>,
        artifacts: Arc<dyn ArtifactStore + Send + Sync>,
        exports: Arc<dyn AuditExportStore + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            ledger,
            artifacts,
            exports,
            clock,
        }
    }

    /// Exports the ledger range for an account into one artifact.
    ///
    /// # Errors
    ///
    /// Returns [`AuditExportError`] when the query, write, or record fails.
    pub fn export(
        &self,
        export_job_id: &ExportJobId,
        tenant_id: &TenantId,
        account_id: &AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<AuditExportRecord, AuditExportError> {
        let entries = self.ledger.by_account_time_range(tenant_id, account_id, from, to)?;

        let artifact = json!({
            "export_job_id": export_job_id.as_str(),
            "tenant_id": tenant_id.as_str(),
            "account_id": account_id.as_str(),
            "from": from.as_unix_millis(),
            "to": to.as_unix_millis(),
            "entries": entries,
        });
        let bytes = canonical_json_bytes(&artifact)?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        let key = format!("{export_job_id}/ledger-export.json");
        let uri = self.artifacts.put_artifact(&key, &bytes)?;

        let record = AuditExportRecord {
            export_job_id: export_job_id.clone(),
            tenant_id: tenant_id.clone(),
            account_id: account_id.clone(),
            from,
            to,
            artifact_uri: uri,
            artifact_sha256: digest,
            entry_count: entries.len() as u64,
            completed_at: self.clock.now(),
        };
        self.exports.save_export(&record)?;
        Ok(record)
    }
}
