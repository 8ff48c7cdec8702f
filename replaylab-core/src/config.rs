//! Serializable replay configuration.
//!
//! All knobs for one replay run: allocation, admission limits, execution
//! costs, the two reset policies, and the optional maximum hold duration.
//! Loadable from TOML; a BLAKE3 hash of the canonical JSON form identifies a
//! run for cache lookups and reproducibility checks.

use crate::execution::cost_model::ExecutionProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Unique identifier for a replay configuration (content-addressable hash).
pub type ConfigId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown execution profile: {0}")]
    UnknownProfile(String),
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How the size of a new position is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AllocationConfig {
    /// Percent of the initial balance, constant for the whole run.
    Fixed { percent: f64 },
    /// Percent of the current cash balance at admission time.
    Dynamic { percent: f64 },
}

impl AllocationConfig {
    pub fn percent(&self) -> f64 {
        match self {
            AllocationConfig::Fixed { percent } | AllocationConfig::Dynamic { percent } => *percent,
        }
    }
}

/// Slippage model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlippageConfig {
    /// Legacy flat mode: one rate for entries and every exit reason.
    Flat { rate: f64 },
    /// Reason-keyed profile, resolved by name at model construction.
    Profile { name: String },
}

impl Default for SlippageConfig {
    fn default() -> Self {
        SlippageConfig::Flat { rate: 0.0 }
    }
}

/// Proportional swap fee plus the flat per-transaction network fee.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Fraction of notional deducted per fill.
    pub swap_fee_rate: f64,
    /// Flat SOL charge per transaction, entry and exit alike.
    pub network_fee: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            swap_fee_rate: 0.003,
            network_fee: 0.0005,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutionConfig {
    pub slippage: SlippageConfig,
    pub fees: FeeConfig,
    /// User-defined profiles, checked before the built-in table. Ordered so
    /// the config hash stays deterministic.
    pub profiles: BTreeMap<String, ExecutionProfile>,
}

/// Which tracked value a profit reset compares against its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetBasis {
    /// Peak equity observed within the current cycle vs. cycle start equity.
    EquityPeak,
    /// Realized cash balance vs. cycle start balance.
    RealizedBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitResetConfig {
    pub enabled: bool,
    /// Multiple of the cycle baseline that arms the reset. Values <= 1.0 or
    /// non-finite disable the policy entirely.
    pub multiple: f64,
    pub basis: ResetBasis,
}

impl Default for ProfitResetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            multiple: 2.0,
            basis: ResetBasis::EquityPeak,
        }
    }
}

/// Rolling window over which capacity pressure is measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum WindowConfig {
    Time { hours: f64 },
    Signals { count: usize },
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig::Signals { count: 50 }
    }
}

/// How long the prune policy stays quiet after firing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum CooldownConfig {
    Time { hours: f64 },
    Signals { count: usize },
}

impl Default for CooldownConfig {
    fn default() -> Self {
        CooldownConfig::Signals { count: 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityMode {
    /// Liquidate the whole book, like a profit reset.
    CloseAll,
    /// Liquidate a filtered, ranked subset.
    Prune,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Fraction of the candidate set to close, rounded.
    pub fraction: f64,
    /// Candidates must have been held at least this many days.
    pub min_hold_days: f64,
    /// Candidates must have a market-cap proxy at or below this; positions
    /// without a proxy pass the filter.
    pub max_market_cap: Option<f64>,
    /// Candidates must have a current PnL percent at or below this.
    pub max_current_pnl_pct: f64,
    /// Skip the prune entirely when fewer candidates than this survive the
    /// filters.
    pub min_candidates: usize,
    pub cooldown: CooldownConfig,
    /// Positions whose peak multiple ever reached this are never pruned.
    pub protect_multiple: Option<f64>,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            fraction: 0.5,
            min_hold_days: 1.0,
            max_market_cap: None,
            max_current_pnl_pct: 0.0,
            min_candidates: 3,
            cooldown: CooldownConfig::default(),
            protect_multiple: Some(5.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityResetConfig {
    pub enabled: bool,
    pub mode: CapacityMode,
    pub window: WindowConfig,
    /// Open positions / max open positions at or above this is "full".
    pub open_ratio: f64,
    /// Capacity-blocked signals / signals in window at or above this is
    /// "starved".
    pub blocked_ratio: f64,
    /// Mean open-position age (days) at or above this is "slow-turning".
    pub avg_hold_days: f64,
    pub prune: PruneConfig,
}

impl Default for CapacityResetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: CapacityMode::Prune,
            window: WindowConfig::default(),
            open_ratio: 0.8,
            blocked_ratio: 0.5,
            avg_hold_days: 2.0,
            prune: PruneConfig::default(),
        }
    }
}

/// Full configuration for one replay run, held read-only for its duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub initial_balance: f64,
    pub allocation: AllocationConfig,
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Optional ceiling on open notional as a fraction of equity.
    #[serde(default)]
    pub max_exposure_pct: Option<f64>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub profit_reset: ProfitResetConfig,
    #[serde(default)]
    pub capacity_reset: CapacityResetConfig,
    /// Force-close positions older than this many hours.
    #[serde(default)]
    pub max_hold_hours: Option<f64>,
}

fn default_max_open_positions() -> usize {
    10
}

impl ReplayConfig {
    /// A config with everything optional switched off, for tests and
    /// baseline runs.
    pub fn new(initial_balance: f64, allocation: AllocationConfig) -> Self {
        Self {
            initial_balance,
            allocation,
            max_open_positions: default_max_open_positions(),
            max_exposure_pct: None,
            execution: ExecutionConfig::default(),
            profit_reset: ProfitResetConfig::default(),
            capacity_reset: CapacityResetConfig::default(),
            max_hold_hours: None,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ReplayConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic hash id for this configuration.
    ///
    /// Two runs with identical configs share a ConfigId and can share cached
    /// results downstream.
    pub fn config_id(&self) -> ConfigId {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_balance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "initial_balance",
                message: format!("must be positive, got {}", self.initial_balance),
            });
        }
        let pct = self.allocation.percent();
        if !(pct > 0.0 && pct <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "allocation.percent",
                message: format!("must be in (0, 1], got {pct}"),
            });
        }
        if self.max_open_positions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_open_positions",
                message: "must be at least 1".into(),
            });
        }
        if let SlippageConfig::Flat { rate } = self.execution.slippage {
            if !(0.0..1.0).contains(&rate) {
                return Err(ConfigError::Invalid {
                    field: "execution.slippage.rate",
                    message: format!("must be in [0, 1), got {rate}"),
                });
            }
        }
        if !(0.0..1.0).contains(&self.execution.fees.swap_fee_rate) {
            return Err(ConfigError::Invalid {
                field: "execution.fees.swap_fee_rate",
                message: format!("must be in [0, 1), got {}", self.execution.fees.swap_fee_rate),
            });
        }
        if self.execution.fees.network_fee < 0.0 {
            return Err(ConfigError::Invalid {
                field: "execution.fees.network_fee",
                message: "must be non-negative".into(),
            });
        }
        let prune = &self.capacity_reset.prune;
        if !(0.0..=1.0).contains(&prune.fraction) {
            return Err(ConfigError::Invalid {
                field: "capacity_reset.prune.fraction",
                message: format!("must be in [0, 1], got {}", prune.fraction),
            });
        }
        Ok(())
    }
}
