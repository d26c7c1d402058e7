// crates/steward-config/src/config.rs
// ============================================================================
// Module: Steward Configuration
// Description: Configuration loading and validation for Steward.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: steward-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits and
//! unknown-field rejection. Cross-field validation fails closed: heat
//! weights must sum to one, cadences and retry policy must be positive, and
//! TTL overrides must name known signal types. A validated configuration
//! converts losslessly into the core policy types.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use steward_core::ActionType;
use steward_core::Classified;
use steward_core::DepthUnits;
use steward_core::ErrorKind;
use steward_core::HeatWeights;
use steward_core::PullBudgetConfig;
use steward_core::PullDepth;
use steward_core::RetryPolicy;
use steward_core::RulesetVersion;
use steward_core::SignalTtl;
use steward_core::SignalType;
use steward_core::TierPolicy;
use steward_core::TierPolicyTable;
use steward_core::runtime::AutonomyPolicy;
use steward_core::runtime::CostGateConfig;
use steward_core::runtime::ExecutionConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "steward.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "STEWARD_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Tolerance for the heat-weight sum check.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

// ============================================================================
// SECTION: Raw Configuration
// ============================================================================

/// Top-level Steward configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StewardConfig {
    /// Ruleset version selecting the posture rule file.
    pub ruleset_version: String,
    /// Heat combiner weights.
    #[serde(default)]
    pub heat_weights: HeatWeightsConfig,
    /// Budget units per pull depth.
    #[serde(default)]
    pub depth_units: DepthUnitsConfig,
    /// Daily pull budget caps.
    #[serde(default)]
    pub pull_budget: PullBudgetSection,
    /// Per-tier cadence policy.
    #[serde(default)]
    pub tier_policy: TierPolicySection,
    /// Per-type signal TTL overrides in days (0 means permanent).
    #[serde(default)]
    pub signal_ttl_days: BTreeMap<String, u32>,
    /// Decision cost-gate settings.
    #[serde(default)]
    pub decision: DecisionSection,
    /// Execution pipeline settings.
    #[serde(default)]
    pub execution: ExecutionSection,
    /// Transient retry policy.
    #[serde(default)]
    pub retry: RetrySection,
    /// Autonomy gate settings.
    #[serde(default)]
    pub autonomy: AutonomySection,
}

/// Heat weight settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeatWeightsConfig {
    /// Posture component weight.
    pub posture: f64,
    /// Recency component weight.
    pub recency: f64,
    /// Volume component weight.
    pub volume: f64,
}

impl Default for HeatWeightsConfig {
    fn default() -> Self {
        let defaults = HeatWeights::default();
        Self {
            posture: defaults.posture,
            recency: defaults.recency,
            volume: defaults.volume,
        }
    }
}

/// Depth unit settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepthUnitsConfig {
    /// Units for a shallow pull.
    pub shallow: u32,
    /// Units for a deep pull.
    pub deep: u32,
}

impl Default for DepthUnitsConfig {
    fn default() -> Self {
        let defaults = DepthUnits::default();
        Self {
            shallow: defaults.shallow,
            deep: defaults.deep,
        }
    }
}

/// Pull budget settings (0 disables a cap).
#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PullBudgetSection {
    /// Tenant-wide daily unit cap.
    #[serde(default)]
    pub max_units_per_day: u32,
    /// Per-connector daily unit cap.
    #[serde(default)]
    pub max_units_per_connector_per_day: u32,
}

/// One tier policy row.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierPolicyRow {
    /// Pull cadence in hours.
    pub cadence_hours: u32,
    /// Default pull depth.
    pub default_depth: PullDepth,
    /// Demotion cooldown in hours.
    pub demotion_cooldown_hours: u32,
}

/// Tier policy settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierPolicySection {
    /// Policy for `HOT`.
    pub hot: TierPolicyRow,
    /// Policy for `WARM`.
    pub warm: TierPolicyRow,
    /// Policy for `COLD`.
    pub cold: TierPolicyRow,
}

impl Default for TierPolicySection {
    fn default() -> Self {
        let defaults = TierPolicyTable::default();
        let row = |policy: TierPolicy| TierPolicyRow {
            cadence_hours: policy.cadence_hours,
            default_depth: policy.default_depth,
            demotion_cooldown_hours: policy.demotion_cooldown_hours,
        };
        Self {
            hot: row(defaults.hot),
            warm: row(defaults.warm),
            cold: row(defaults.cold),
        }
    }
}

/// Decision cost-gate settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionSection {
    /// Maximum decision runs per account per day (0 disables).
    pub max_runs_per_day: u32,
    /// Minimum hours between runs for one account.
    pub min_hours_between_runs: u32,
    /// Delay applied to deferred runs, in hours.
    pub defer_retry_hours: u32,
}

impl Default for DecisionSection {
    fn default() -> Self {
        let defaults = CostGateConfig::default();
        Self {
            max_runs_per_day: defaults.max_runs_per_day,
            min_hours_between_runs: defaults.min_hours_between_runs,
            defer_retry_hours: defaults.defer_retry_hours,
        }
    }
}

/// Execution pipeline settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    /// State-machine timeout in hours.
    pub state_machine_timeout_hours: u32,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            state_machine_timeout_hours: ExecutionConfig::default().timeout_hours,
        }
    }
}

/// Transient retry settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Maximum attempts including the first.
    pub attempts: u32,
    /// Initial backoff in milliseconds.
    pub initial_backoff_millis: u64,
    /// Multiplicative backoff factor.
    pub factor: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            attempts: defaults.attempts,
            initial_backoff_millis: defaults.initial_backoff_millis,
            factor: defaults.factor,
        }
    }
}

/// Autonomy gate settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AutonomySection {
    /// Action types eligible for auto-approval.
    #[serde(default)]
    pub auto_approve_types: Vec<String>,
    /// Daily auto-approved action cap (0 disables).
    #[serde(default)]
    pub max_auto_actions_per_day: u32,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file was not found.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    /// Configuration file could not be read.
    #[error("config io error for {path}: {message}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Failure description.
        message: String,
    },
    /// Configuration file exceeds the size limit.
    #[error("config file too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual file size in bytes.
        actual_bytes: usize,
    },
    /// Configuration failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Configuration failed cross-field validation.
    #[error("config validation failed for {field}: {message}")]
    Validation {
        /// Field that failed.
        field: String,
        /// Validation failure description.
        message: String,
    },
}

impl Classified for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Resolves the configuration path from the argument or environment.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

/// Loads and validates the configuration from a file.
///
/// # Errors
///
/// Returns [`ConfigError`] on missing files, oversized files, parse
/// failures, or validation failures.
pub fn load_config(explicit: Option<&Path>) -> Result<StewardConfig, ConfigError> {
    let path = resolve_config_path(explicit);
    if !path.exists() {
        return Err(ConfigError::NotFound(path));
    }
    let metadata = fs::metadata(&path).map_err(|err| ConfigError::Io {
        path: path.clone(),
        message: err.to_string(),
    })?;
    let actual_bytes = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if actual_bytes > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge {
            max_bytes: MAX_CONFIG_FILE_SIZE,
            actual_bytes,
        });
    }
    let contents = fs::read_to_string(&path).map_err(|err| ConfigError::Io {
        path: path.clone(),
        message: err.to_string(),
    })?;
    parse_config(&contents)
}

/// Parses and validates configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failures.
pub fn parse_config(contents: &str) -> Result<StewardConfig, ConfigError> {
    let config: StewardConfig =
        toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
    config.validate()?;
    Ok(config)
}

// ============================================================================
// SECTION: Validation and Conversion
// ============================================================================

impl StewardConfig {
    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first failing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ruleset_version.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "ruleset_version".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let sum = self.heat_weights.posture + self.heat_weights.recency + self.heat_weights.volume;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::Validation {
                field: "heat_weights".to_string(),
                message: format!("weights must sum to 1.0 (got {sum})"),
            });
        }
        if self.heat_weights.posture < 0.0
            || self.heat_weights.recency < 0.0
            || self.heat_weights.volume < 0.0
        {
            return Err(ConfigError::Validation {
                field: "heat_weights".to_string(),
                message: "weights must be non-negative".to_string(),
            });
        }

        if self.depth_units.shallow == 0 || self.depth_units.deep == 0 {
            return Err(ConfigError::Validation {
                field: "depth_units".to_string(),
                message: "depth units must be positive".to_string(),
            });
        }
        if self.depth_units.deep < self.depth_units.shallow {
            return Err(ConfigError::Validation {
                field: "depth_units".to_string(),
                message: "deep units must be at least shallow units".to_string(),
            });
        }

        for (label, row) in [
            ("tier_policy.hot", self.tier_policy.hot),
            ("tier_policy.warm", self.tier_policy.warm),
            ("tier_policy.cold", self.tier_policy.cold),
        ] {
            if row.cadence_hours == 0 {
                return Err(ConfigError::Validation {
                    field: label.to_string(),
                    message: "cadence_hours must be positive".to_string(),
                });
            }
        }

        for key in self.signal_ttl_days.keys() {
            if parse_signal_type(key).is_none() {
                return Err(ConfigError::Validation {
                    field: "signal_ttl_days".to_string(),
                    message: format!("unknown signal type: {key}"),
                });
            }
        }

        if self.retry.attempts == 0 {
            return Err(ConfigError::Validation {
                field: "retry.attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry.factor == 0 {
            return Err(ConfigError::Validation {
                field: "retry.factor".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.execution.state_machine_timeout_hours == 0 {
            return Err(ConfigError::Validation {
                field: "execution.state_machine_timeout_hours".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.autonomy.max_auto_actions_per_day > 0
            && self.autonomy.auto_approve_types.is_empty()
        {
            return Err(ConfigError::Validation {
                field: "autonomy.auto_approve_types".to_string(),
                message: "autonomy budget configured without an allowlist".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the ruleset version.
    #[must_use]
    pub fn ruleset_version(&self) -> RulesetVersion {
        RulesetVersion::new(self.ruleset_version.as_str())
    }

    /// Returns the heat weights.
    #[must_use]
    pub const fn heat_weights(&self) -> HeatWeights {
        HeatWeights {
            posture: self.heat_weights.posture,
            recency: self.heat_weights.recency,
            volume: self.heat_weights.volume,
        }
    }

    /// Returns the depth units.
    #[must_use]
    pub const fn depth_units(&self) -> DepthUnits {
        DepthUnits {
            shallow: self.depth_units.shallow,
            deep: self.depth_units.deep,
        }
    }

    /// Returns the pull budget caps.
    #[must_use]
    pub const fn pull_budget(&self) -> PullBudgetConfig {
        PullBudgetConfig {
            max_units_per_day: self.pull_budget.max_units_per_day,
            max_units_per_connector_per_day: self.pull_budget.max_units_per_connector_per_day,
        }
    }

    /// Returns the tier policy table.
    #[must_use]
    pub const fn tier_policy(&self) -> TierPolicyTable {
        const fn policy(row: TierPolicyRow) -> TierPolicy {
            TierPolicy {
                cadence_hours: row.cadence_hours,
                default_depth: row.default_depth,
                demotion_cooldown_hours: row.demotion_cooldown_hours,
            }
        }
        TierPolicyTable {
            hot: policy(self.tier_policy.hot),
            warm: policy(self.tier_policy.warm),
            cold: policy(self.tier_policy.cold),
        }
    }

    /// Returns the TTL for a signal type, honoring overrides (0 = permanent).
    #[must_use]
    pub fn ttl_for(&self, signal_type: SignalType) -> SignalTtl {
        match self.signal_ttl_days.get(signal_type.as_str()) {
            Some(0) => SignalTtl::Permanent,
            Some(days) => SignalTtl::Days(*days),
            None => signal_type.default_ttl(),
        }
    }

    /// Returns the decision cost-gate configuration.
    #[must_use]
    pub const fn cost_gate(&self) -> CostGateConfig {
        CostGateConfig {
            max_runs_per_day: self.decision.max_runs_per_day,
            min_hours_between_runs: self.decision.min_hours_between_runs,
            defer_retry_hours: self.decision.defer_retry_hours,
        }
    }

    /// Returns the execution configuration.
    #[must_use]
    pub const fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            timeout_hours: self.execution.state_machine_timeout_hours,
            retry: RetryPolicy {
                attempts: self.retry.attempts,
                initial_backoff_millis: self.retry.initial_backoff_millis,
                factor: self.retry.factor,
            },
        }
    }

    /// Returns the autonomy policy.
    #[must_use]
    pub fn autonomy_policy(&self) -> AutonomyPolicy {
        AutonomyPolicy {
            auto_approve_types: self
                .autonomy
                .auto_approve_types
                .iter()
                .map(|action_type| ActionType::new(action_type.as_str()))
                .collect(),
            max_auto_actions_per_day: self.autonomy.max_auto_actions_per_day,
        }
    }
}

/// Parses a wire-form signal type label.
fn parse_signal_type(label: &str) -> Option<SignalType> {
    [
        SignalType::AccountActivationDetected,
        SignalType::NoEngagementPresent,
        SignalType::FirstEngagementOccurred,
        SignalType::DiscoveryProgressStalled,
        SignalType::StakeholderGapDetected,
        SignalType::UsageTrendChange,
        SignalType::SupportRiskEmerging,
        SignalType::RenewalWindowEntered,
        SignalType::ActionExecuted,
        SignalType::ActionFailed,
    ]
    .into_iter()
    .find(|signal_type| signal_type.as_str() == label)
}
