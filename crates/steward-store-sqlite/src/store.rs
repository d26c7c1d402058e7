// crates/steward-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Steward Store
// Description: Durable store for every Steward persistence seam.
// Purpose: Persist signals, state, budgets, locks, and the ledger with SQLite WAL.
// Dependencies: steward-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One SQLite database backs every Steward store seam. Conditional writes use
//! `INSERT ... ON CONFLICT DO NOTHING` with change counting, so idempotency
//! guards behave exactly like the in-memory reference stores. The signal
//! write couples the signal row and the lifecycle read-model inside one
//! transaction; budget consumption checks and increments both scoped rows
//! inside one transaction. Rows store canonical JSON snapshots of the core
//! types.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use steward_core::AccountId;
use steward_core::AccountState;
use steward_core::ActionIntent;
use steward_core::ActionIntentId;
use steward_core::ActionOutcome;
use steward_core::AuditExportRecord;
use steward_core::CompensationStatus;
use steward_core::ConnectorId;
use steward_core::DecisionRunState;
use steward_core::ExecutionAttempt;
use steward_core::ExportJobId;
use steward_core::HashDigest;
use steward_core::HeatState;
use steward_core::LedgerEntry;
use steward_core::PostureRecord;
use steward_core::Signal;
use steward_core::SignalId;
use steward_core::SignalStatus;
use steward_core::SuppressionMeta;
use steward_core::TenantId;
use steward_core::Timestamp;
use steward_core::ToolInvocationResponse;
use steward_core::TraceId;
use steward_core::hashing::canonical_json_bytes;
use steward_core::interfaces::AccountStateStore;
use steward_core::interfaces::ArtifactStore;
use steward_core::interfaces::AttemptLock;
use steward_core::interfaces::AttemptStore;
use steward_core::interfaces::AuditExportStore;
use steward_core::interfaces::BudgetConsume;
use steward_core::interfaces::BudgetScope;
use steward_core::interfaces::BudgetStore;
use steward_core::interfaces::DecisionRunStore;
use steward_core::interfaces::DedupeReservation;
use steward_core::interfaces::DedupeStore;
use steward_core::interfaces::HeatStore;
use steward_core::interfaces::IdempotencyStore;
use steward_core::interfaces::IntentStore;
use steward_core::interfaces::LedgerError;
use steward_core::interfaces::LedgerStore;
use steward_core::interfaces::OutcomeStore;
use steward_core::interfaces::PostureStore;
use steward_core::interfaces::Reservation;
use steward_core::interfaces::SignalStore;
use steward_core::interfaces::SignalWrite;
use steward_core::interfaces::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQLite schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// SQLite journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the SQLite pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Configuration for the SQLite store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// SQLite journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
}

/// Returns the default busy timeout for SQLite connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLite store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// SQLite engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable Steward store backed by SQLite.
#[derive(Clone)]
pub struct SqliteStewardStore {
    /// Shared connection protected by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStewardStore {
    /// Opens (and migrates) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or the
    /// schema version is incompatible.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open(&config.path)?;
        Self::initialize(connection, config)
    }

    /// Opens an in-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let config = SqliteStoreConfig {
            path: Path::new(":memory:").to_path_buf(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::Delete,
        };
        let connection = Connection::open_in_memory()?;
        Self::initialize(connection, &config)
    }

    /// Applies pragmas and migrations to a fresh connection.
    fn initialize(
        connection: Connection,
        config: &SqliteStoreConfig,
    ) -> Result<Self, SqliteStoreError> {
        connection.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
        connection.pragma_update(None, "synchronous", "full")?;
        connection.pragma_update(None, "foreign_keys", "on")?;
        connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;

        let version: i64 =
            connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            migrate(&connection)?;
            connection.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if version != SCHEMA_VERSION {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "expected {SCHEMA_VERSION}, found {version}"
            )));
        }

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }
}

/// Creates the full schema.
fn migrate(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS signals (
             tenant TEXT NOT NULL,
             signal_id TEXT NOT NULL,
             account_id TEXT NOT NULL,
             dedupe_key TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             signal_json TEXT NOT NULL,
             PRIMARY KEY (tenant, signal_id)
         );
         CREATE UNIQUE INDEX IF NOT EXISTS signals_dedupe
             ON signals (tenant, dedupe_key);
         CREATE INDEX IF NOT EXISTS signals_account
             ON signals (tenant, account_id, created_at);
         CREATE TABLE IF NOT EXISTS accounts (
             tenant TEXT NOT NULL,
             account_id TEXT NOT NULL,
             state_json TEXT NOT NULL,
             PRIMARY KEY (tenant, account_id)
         );
         CREATE TABLE IF NOT EXISTS account_posture_state (
             tenant TEXT NOT NULL,
             account_id TEXT NOT NULL,
             record_json TEXT NOT NULL,
             PRIMARY KEY (tenant, account_id)
         );
         CREATE TABLE IF NOT EXISTS perception_scheduler (
             tenant TEXT NOT NULL,
             account_id TEXT NOT NULL,
             state_json TEXT NOT NULL,
             PRIMARY KEY (tenant, account_id)
         );
         CREATE TABLE IF NOT EXISTS budget_state (
             scope TEXT NOT NULL,
             tenant TEXT NOT NULL,
             day_key INTEGER NOT NULL,
             connector TEXT NOT NULL DEFAULT '',
             units_consumed INTEGER NOT NULL DEFAULT 0,
             consume_count INTEGER NOT NULL DEFAULT 0,
             PRIMARY KEY (scope, tenant, day_key, connector)
         );
         CREATE TABLE IF NOT EXISTS pull_idempotency_store (
             key TEXT PRIMARY KEY,
             reserved_at INTEGER NOT NULL,
             ttl_hours INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS execution_attempts (
             tenant TEXT NOT NULL,
             action_intent_id TEXT NOT NULL,
             attempt_count INTEGER NOT NULL,
             started_at INTEGER NOT NULL,
             expires_at INTEGER NOT NULL,
             PRIMARY KEY (tenant, action_intent_id)
         );
         CREATE TABLE IF NOT EXISTS external_write_dedupe (
             tenant TEXT NOT NULL,
             idempotency_key TEXT NOT NULL,
             response_json TEXT,
             PRIMARY KEY (tenant, idempotency_key)
         );
         CREATE TABLE IF NOT EXISTS action_intent (
             tenant TEXT NOT NULL,
             action_intent_id TEXT NOT NULL,
             intent_json TEXT NOT NULL,
             PRIMARY KEY (tenant, action_intent_id)
         );
         CREATE TABLE IF NOT EXISTS execution_outcomes (
             tenant TEXT NOT NULL,
             action_intent_id TEXT NOT NULL,
             outcome_json TEXT NOT NULL,
             PRIMARY KEY (tenant, action_intent_id)
         );
         CREATE TABLE IF NOT EXISTS decision_run_state (
             tenant TEXT NOT NULL,
             account_id TEXT NOT NULL,
             day_key INTEGER NOT NULL,
             state_json TEXT NOT NULL,
             PRIMARY KEY (tenant, account_id, day_key)
         );
         CREATE TABLE IF NOT EXISTS ledger (
             partition_key TEXT NOT NULL,
             sort_key TEXT NOT NULL,
             tenant TEXT NOT NULL,
             account_id TEXT NOT NULL,
             event_time INTEGER NOT NULL,
             entry_json TEXT NOT NULL,
             PRIMARY KEY (partition_key, sort_key)
         );
         CREATE INDEX IF NOT EXISTS ledger_account
             ON ledger (tenant, account_id, event_time);
         CREATE TABLE IF NOT EXISTS audit_export (
             export_job_id TEXT PRIMARY KEY,
             record_json TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS artifacts (
             key TEXT PRIMARY KEY,
             bytes BLOB NOT NULL
         );",
    )?;
    Ok(())
}

// ============================================================================
// SECTION: JSON Helpers
// ============================================================================

/// Serializes a value as canonical JSON text.
fn to_canonical_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| StoreError::Invalid(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Deserializes a stored JSON snapshot.
fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|err| StoreError::Corrupt(err.to_string()))
}

/// Maps a rusqlite error into a store error.
fn db_err(error: &rusqlite::Error) -> StoreError {
    StoreError::Store(error.to_string())
}

// ============================================================================
// SECTION: Signal Store
// ============================================================================

impl SignalStore for SqliteStewardStore {
    fn insert_signal_with_state(
        &self,
        signal: &Signal,
        state: &AccountState,
    ) -> Result<SignalWrite, StoreError> {
        let signal_json = to_canonical_json(signal)?;
        let state_json = to_canonical_json(state)?;
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;

        let inserted = tx
            .execute(
                "INSERT INTO signals
                     (tenant, signal_id, account_id, dedupe_key, created_at, signal_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
                params![
                    signal.tenant_id.as_str(),
                    signal.signal_id.as_str(),
                    signal.account_id.as_str(),
                    signal.dedupe_key.value,
                    signal.created_at.as_unix_millis(),
                    signal_json,
                ],
            )
            .map_err(|err| db_err(&err))?;
        if inserted == 0 {
            let existing: String = tx
                .query_row(
                    "SELECT signal_json FROM signals WHERE tenant = ?1 AND signal_id = ?2",
                    params![signal.tenant_id.as_str(), signal.signal_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| db_err(&err))?;
            tx.commit().map_err(|err| db_err(&err))?;
            return Ok(SignalWrite::Duplicate(Box::new(from_json(&existing)?)));
        }

        tx.execute(
            "INSERT INTO accounts (tenant, account_id, state_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (tenant, account_id) DO UPDATE SET state_json = excluded.state_json",
            params![state.tenant_id.as_str(), state.account_id.as_str(), state_json],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok(SignalWrite::Inserted)
    }

    fn insert_execution_signal(&self, signal: &Signal) -> Result<SignalWrite, StoreError> {
        let signal_json = to_canonical_json(signal)?;
        let guard = self.lock().map_err(StoreError::from)?;
        let inserted = guard
            .execute(
                "INSERT INTO signals
                     (tenant, signal_id, account_id, dedupe_key, created_at, signal_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
                params![
                    signal.tenant_id.as_str(),
                    signal.signal_id.as_str(),
                    signal.account_id.as_str(),
                    signal.dedupe_key.value,
                    signal.created_at.as_unix_millis(),
                    signal_json,
                ],
            )
            .map_err(|err| db_err(&err))?;
        if inserted == 0 {
            let existing: String = guard
                .query_row(
                    "SELECT signal_json FROM signals WHERE tenant = ?1 AND signal_id = ?2",
                    params![signal.tenant_id.as_str(), signal.signal_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| db_err(&err))?;
            return Ok(SignalWrite::Duplicate(Box::new(from_json(&existing)?)));
        }
        Ok(SignalWrite::Inserted)
    }

    fn update_status_with_state(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
        status: SignalStatus,
        suppression: Option<&SuppressionMeta>,
        state: &AccountState,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT signal_json FROM signals WHERE tenant = ?1 AND signal_id = ?2",
                params![tenant_id.as_str(), signal_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        let Some(existing) = existing else {
            return Err(StoreError::Invalid(format!("signal not found: {signal_id}")));
        };
        let mut signal: Signal = from_json(&existing)?;
        signal.status = status;
        signal.suppression = suppression.cloned();
        let signal_json = to_canonical_json(&signal)?;

        tx.execute(
            "UPDATE signals SET signal_json = ?3 WHERE tenant = ?1 AND signal_id = ?2",
            params![tenant_id.as_str(), signal_id.as_str(), signal_json],
        )
        .map_err(|err| db_err(&err))?;
        let state_json = to_canonical_json(state)?;
        tx.execute(
            "INSERT INTO accounts (tenant, account_id, state_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (tenant, account_id) DO UPDATE SET state_json = excluded.state_json",
            params![state.tenant_id.as_str(), state.account_id.as_str(), state_json],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn get_signal(
        &self,
        tenant_id: &TenantId,
        signal_id: &SignalId,
    ) -> Result<Option<Signal>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT signal_json FROM signals WHERE tenant = ?1 AND signal_id = ?2",
                params![tenant_id.as_str(), signal_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }

    fn find_by_dedupe_key(
        &self,
        tenant_id: &TenantId,
        dedupe_key: &HashDigest,
    ) -> Result<Option<Signal>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT signal_json FROM signals WHERE tenant = ?1 AND dedupe_key = ?2",
                params![tenant_id.as_str(), dedupe_key.value],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }

    fn signals_for_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Vec<Signal>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT signal_json FROM signals
                 WHERE tenant = ?1 AND account_id = ?2
                 ORDER BY created_at DESC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![tenant_id.as_str(), account_id.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| db_err(&err))?;
        let mut signals = Vec::new();
        for row in rows {
            let text = row.map_err(|err| db_err(&err))?;
            signals.push(from_json(&text)?);
        }
        Ok(signals)
    }
}

// ============================================================================
// SECTION: Account State Store
// ============================================================================

impl AccountStateStore for SqliteStewardStore {
    fn load_account(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<AccountState>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT state_json FROM accounts WHERE tenant = ?1 AND account_id = ?2",
                params![tenant_id.as_str(), account_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }

    fn save_account(&self, state: &AccountState) -> Result<(), StoreError> {
        let state_json = to_canonical_json(state)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO accounts (tenant, account_id, state_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant, account_id) DO UPDATE SET state_json = excluded.state_json",
                params![state.tenant_id.as_str(), state.account_id.as_str(), state_json],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Posture and Heat Stores
// ============================================================================

impl PostureStore for SqliteStewardStore {
    fn save_posture(&self, record: &PostureRecord) -> Result<(), StoreError> {
        let record_json = to_canonical_json(record)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO account_posture_state (tenant, account_id, record_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant, account_id) DO UPDATE SET record_json = excluded.record_json",
                params![record.tenant_id.as_str(), record.account_id.as_str(), record_json],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn load_posture(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<PostureRecord>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT record_json FROM account_posture_state
                 WHERE tenant = ?1 AND account_id = ?2",
                params![tenant_id.as_str(), account_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }
}

impl HeatStore for SqliteStewardStore {
    fn save_heat(&self, state: &HeatState) -> Result<(), StoreError> {
        let state_json = to_canonical_json(state)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO perception_scheduler (tenant, account_id, state_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant, account_id) DO UPDATE SET state_json = excluded.state_json",
                params![state.tenant_id.as_str(), state.account_id.as_str(), state_json],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn load_heat(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> Result<Option<HeatState>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT state_json FROM perception_scheduler
                 WHERE tenant = ?1 AND account_id = ?2",
                params![tenant_id.as_str(), account_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }
}

// ============================================================================
// SECTION: Budget Store
// ============================================================================

impl BudgetStore for SqliteStewardStore {
    fn consume(
        &self,
        scope: BudgetScope,
        tenant_id: &TenantId,
        day_key: i64,
        units: u32,
        tenant_cap: u32,
        connector: Option<(&ConnectorId, u32)>,
    ) -> Result<BudgetConsume, StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;

        let consumed_in = |tx: &rusqlite::Transaction<'_>, connector: &str| {
            tx.query_row(
                "SELECT units_consumed FROM budget_state
                 WHERE scope = ?1 AND tenant = ?2 AND day_key = ?3 AND connector = ?4",
                params![scope.as_str(), tenant_id.as_str(), day_key, connector],
                |row| row.get::<_, i64>(0),
            )
            .optional()
        };

        // Per-connector row first (cheaper, more constraining), then tenant.
        if let Some((connector_id, cap)) = connector {
            let consumed =
                consumed_in(&tx, connector_id.as_str()).map_err(|err| db_err(&err))?.unwrap_or(0);
            if cap > 0 && consumed + i64::from(units) > i64::from(cap) {
                return Ok(BudgetConsume::Exceeded);
            }
        }
        let tenant_consumed = consumed_in(&tx, "").map_err(|err| db_err(&err))?.unwrap_or(0);
        if tenant_cap > 0 && tenant_consumed + i64::from(units) > i64::from(tenant_cap) {
            return Ok(BudgetConsume::Exceeded);
        }

        let upsert = |connector: &str| {
            tx.execute(
                "INSERT INTO budget_state
                     (scope, tenant, day_key, connector, units_consumed, consume_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)
                 ON CONFLICT (scope, tenant, day_key, connector) DO UPDATE SET
                     units_consumed = units_consumed + excluded.units_consumed,
                     consume_count = consume_count + 1",
                params![scope.as_str(), tenant_id.as_str(), day_key, connector, units],
            )
        };
        if let Some((connector_id, _)) = connector {
            upsert(connector_id.as_str()).map_err(|err| db_err(&err))?;
        }
        upsert("").map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;

        let remaining = (tenant_cap > 0).then(|| {
            let total = tenant_consumed + i64::from(units);
            u32::try_from(i64::from(tenant_cap) - total).unwrap_or(0)
        });
        Ok(BudgetConsume::Consumed {
            tenant_remaining: remaining,
        })
    }

    fn consumed(
        &self,
        scope: BudgetScope,
        tenant_id: &TenantId,
        day_key: i64,
    ) -> Result<u32, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let consumed: Option<i64> = guard
            .query_row(
                "SELECT units_consumed FROM budget_state
                 WHERE scope = ?1 AND tenant = ?2 AND day_key = ?3 AND connector = ''",
                params![scope.as_str(), tenant_id.as_str(), day_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        Ok(u32::try_from(consumed.unwrap_or(0)).unwrap_or(u32::MAX))
    }
}

// ============================================================================
// SECTION: Idempotency Store
// ============================================================================

impl IdempotencyStore for SqliteStewardStore {
    fn reserve(
        &self,
        key: &str,
        now: Timestamp,
        ttl_hours: u32,
    ) -> Result<Reservation, StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT reserved_at, ttl_hours FROM pull_idempotency_store WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        if let Some((reserved_at, ttl)) = existing {
            let expires_at = Timestamp::from_unix_millis(reserved_at).plus_hours(ttl);
            if now < expires_at {
                return Ok(Reservation::Duplicate);
            }
        }
        tx.execute(
            "INSERT INTO pull_idempotency_store (key, reserved_at, ttl_hours)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET
                 reserved_at = excluded.reserved_at,
                 ttl_hours = excluded.ttl_hours",
            params![key, now.as_unix_millis(), ttl_hours],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok(Reservation::Reserved)
    }
}

// ============================================================================
// SECTION: Attempt Store
// ============================================================================

impl AttemptStore for SqliteStewardStore {
    fn acquire(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<AttemptLock, StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let existing: Option<(i64, i64, i64)> = tx
            .query_row(
                "SELECT attempt_count, started_at, expires_at FROM execution_attempts
                 WHERE tenant = ?1 AND action_intent_id = ?2",
                params![tenant_id.as_str(), action_intent_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|err| db_err(&err))?;

        let attempt_count = match existing {
            Some((attempt_count, started_at, held_expires_at))
                if now < Timestamp::from_unix_millis(held_expires_at) =>
            {
                return Ok(AttemptLock::Held(ExecutionAttempt {
                    action_intent_id: action_intent_id.clone(),
                    tenant_id: tenant_id.clone(),
                    attempt_count: u32::try_from(attempt_count).unwrap_or(u32::MAX),
                    started_at: Timestamp::from_unix_millis(started_at),
                    expires_at: Timestamp::from_unix_millis(held_expires_at),
                }));
            }
            Some((attempt_count, _, _)) => u32::try_from(attempt_count).unwrap_or(0) + 1,
            None => 1,
        };

        tx.execute(
            "INSERT INTO execution_attempts
                 (tenant, action_intent_id, attempt_count, started_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (tenant, action_intent_id) DO UPDATE SET
                 attempt_count = excluded.attempt_count,
                 started_at = excluded.started_at,
                 expires_at = excluded.expires_at",
            params![
                tenant_id.as_str(),
                action_intent_id.as_str(),
                attempt_count,
                now.as_unix_millis(),
                expires_at.as_unix_millis(),
            ],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;

        Ok(AttemptLock::Acquired(ExecutionAttempt {
            action_intent_id: action_intent_id.clone(),
            tenant_id: tenant_id.clone(),
            attempt_count,
            started_at: now,
            expires_at,
        }))
    }

    fn release(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<(), StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "UPDATE execution_attempts SET expires_at = started_at
                 WHERE tenant = ?1 AND action_intent_id = ?2",
                params![tenant_id.as_str(), action_intent_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: External-Write Dedupe Store
// ============================================================================

impl DedupeStore for SqliteStewardStore {
    fn reserve_write(
        &self,
        tenant_id: &TenantId,
        idempotency_key: &HashDigest,
    ) -> Result<DedupeReservation, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let cached: Option<Option<String>> = guard
            .query_row(
                "SELECT response_json FROM external_write_dedupe
                 WHERE tenant = ?1 AND idempotency_key = ?2",
                params![tenant_id.as_str(), idempotency_key.value],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        if let Some(Some(response_json)) = cached {
            let response: ToolInvocationResponse = from_json(&response_json)?;
            return Ok(DedupeReservation::Prior(Box::new(response)));
        }
        guard
            .execute(
                "INSERT INTO external_write_dedupe (tenant, idempotency_key, response_json)
                 VALUES (?1, ?2, NULL)
                 ON CONFLICT DO NOTHING",
                params![tenant_id.as_str(), idempotency_key.value],
            )
            .map_err(|err| db_err(&err))?;
        Ok(DedupeReservation::Reserved)
    }

    fn record_write(
        &self,
        tenant_id: &TenantId,
        idempotency_key: &HashDigest,
        response: &ToolInvocationResponse,
    ) -> Result<(), StoreError> {
        let response_json = to_canonical_json(response)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO external_write_dedupe (tenant, idempotency_key, response_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant, idempotency_key) DO UPDATE SET
                     response_json = excluded.response_json",
                params![tenant_id.as_str(), idempotency_key.value, response_json],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Intent, Outcome, and Decision Stores
// ============================================================================

impl IntentStore for SqliteStewardStore {
    fn load_intent(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<Option<ActionIntent>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT intent_json FROM action_intent
                 WHERE tenant = ?1 AND action_intent_id = ?2",
                params![tenant_id.as_str(), action_intent_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }

    fn save_intent(&self, intent: &ActionIntent) -> Result<(), StoreError> {
        let intent_json = to_canonical_json(intent)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO action_intent (tenant, action_intent_id, intent_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant, action_intent_id) DO UPDATE SET
                     intent_json = excluded.intent_json",
                params![
                    intent.tenant_id.as_str(),
                    intent.action_intent_id.as_str(),
                    intent_json,
                ],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }
}

impl OutcomeStore for SqliteStewardStore {
    fn save_outcome(&self, outcome: &ActionOutcome) -> Result<(), StoreError> {
        let outcome_json = to_canonical_json(outcome)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO execution_outcomes (tenant, action_intent_id, outcome_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant, action_intent_id) DO UPDATE SET
                     outcome_json = excluded.outcome_json",
                params![
                    outcome.tenant_id.as_str(),
                    outcome.action_intent_id.as_str(),
                    outcome_json,
                ],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn load_outcome(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
    ) -> Result<Option<ActionOutcome>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT outcome_json FROM execution_outcomes
                 WHERE tenant = ?1 AND action_intent_id = ?2",
                params![tenant_id.as_str(), action_intent_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }

    fn update_compensation(
        &self,
        tenant_id: &TenantId,
        action_intent_id: &ActionIntentId,
        status: CompensationStatus,
    ) -> Result<(), StoreError> {
        let Some(mut outcome) = self.load_outcome(tenant_id, action_intent_id)? else {
            return Err(StoreError::Invalid(format!("outcome not found: {action_intent_id}")));
        };
        outcome.compensation_status = status;
        self.save_outcome(&outcome)
    }
}

impl DecisionRunStore for SqliteStewardStore {
    fn load_run_state(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        day_key: i64,
    ) -> Result<Option<DecisionRunState>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT state_json FROM decision_run_state
                 WHERE tenant = ?1 AND account_id = ?2 AND day_key = ?3",
                params![tenant_id.as_str(), account_id.as_str(), day_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }

    fn save_run_state(&self, state: &DecisionRunState) -> Result<(), StoreError> {
        let state_json = to_canonical_json(state)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO decision_run_state (tenant, account_id, day_key, state_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant, account_id, day_key) DO UPDATE SET
                     state_json = excluded.state_json",
                params![
                    state.tenant_id.as_str(),
                    state.account_id.as_str(),
                    state.day_key,
                    state_json,
                ],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Ledger Store
// ============================================================================

impl LedgerStore for SqliteStewardStore {
    fn append(&self, entry: &LedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let entry_json = to_canonical_json(entry)
            .map_err(|err| LedgerError::WriteFailed(err.to_string()))?;
        let guard = self.lock().map_err(|err| LedgerError::WriteFailed(err.to_string()))?;
        let inserted = guard
            .execute(
                "INSERT INTO ledger
                     (partition_key, sort_key, tenant, account_id, event_time, entry_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
                params![
                    entry.partition_key,
                    entry.sort_key,
                    entry.tenant_id.as_str(),
                    entry.account_id.as_str(),
                    entry.event_time.as_unix_millis(),
                    entry_json,
                ],
            )
            .map_err(|err| LedgerError::WriteFailed(err.to_string()))?;
        if inserted == 0 {
            // Duplicate sort key: return the existing entry, not an error.
            let existing: String = guard
                .query_row(
                    "SELECT entry_json FROM ledger
                     WHERE partition_key = ?1 AND sort_key = ?2",
                    params![entry.partition_key, entry.sort_key],
                    |row| row.get(0),
                )
                .map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
            return serde_json::from_str(&existing)
                .map_err(|err| LedgerError::ReadFailed(err.to_string()));
        }
        Ok(entry.clone())
    }

    fn by_trace(&self, trace_id: &TraceId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.by_plan(trace_id.as_str())
    }

    fn by_account_time_range(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let guard = self.lock().map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        let mut statement = guard
            .prepare(
                "SELECT entry_json FROM ledger
                 WHERE tenant = ?1 AND account_id = ?2
                     AND event_time >= ?3 AND event_time <= ?4
                 ORDER BY event_time ASC, sort_key ASC",
            )
            .map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        let rows = statement
            .query_map(
                params![
                    tenant_id.as_str(),
                    account_id.as_str(),
                    from.as_unix_millis(),
                    to.as_unix_millis(),
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        collect_ledger_rows(rows)
    }

    fn by_plan(&self, plan_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let guard = self.lock().map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        let mut statement = guard
            .prepare(
                "SELECT entry_json FROM ledger
                 WHERE partition_key = ?1
                 ORDER BY sort_key ASC",
            )
            .map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        let rows = statement
            .query_map(params![plan_id], |row| row.get::<_, String>(0))
            .map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        collect_ledger_rows(rows)
    }
}

/// Collects ledger rows from a query, failing closed on corrupt entries.
fn collect_ledger_rows(
    rows: impl Iterator<Item = Result<String, rusqlite::Error>>,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut entries = Vec::new();
    for row in rows {
        let text = row.map_err(|err| LedgerError::ReadFailed(err.to_string()))?;
        entries.push(
            serde_json::from_str(&text)
                .map_err(|err| LedgerError::ReadFailed(err.to_string()))?,
        );
    }
    Ok(entries)
}

// ============================================================================
// SECTION: Audit Export and Artifact Stores
// ============================================================================

impl AuditExportStore for SqliteStewardStore {
    fn save_export(&self, record: &AuditExportRecord) -> Result<(), StoreError> {
        let record_json = to_canonical_json(record)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO audit_export (export_job_id, record_json)
                 VALUES (?1, ?2)
                 ON CONFLICT (export_job_id) DO UPDATE SET
                     record_json = excluded.record_json",
                params![record.export_job_id.as_str(), record_json],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn load_export(
        &self,
        export_job_id: &ExportJobId,
    ) -> Result<Option<AuditExportRecord>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT record_json FROM audit_export WHERE export_job_id = ?1",
                params![export_job_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|text| from_json(&text)).transpose()
    }
}

impl ArtifactStore for SqliteStewardStore {
    fn put_artifact(&self, key: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO artifacts (key, bytes)
                 VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET bytes = excluded.bytes",
                params![key, bytes],
            )
            .map_err(|err| db_err(&err))?;
        Ok(format!("sqlite://artifacts/{key}"))
    }

    fn get_artifact(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .query_row("SELECT bytes FROM artifacts WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| db_err(&err))?
            .ok_or_else(|| StoreError::Invalid(format!("artifact not found: {key}")))
    }
}
