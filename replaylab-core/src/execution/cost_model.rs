//! Cost model — slippage, swap fees, and network fees.
//!
//! Slippage is directional: entries pay a higher price, exits receive a
//! lower one, applied to price exactly once per side. Swap fees are
//! proportional to notional and applied once per fill. The network fee is a
//! flat per-transaction charge, independent of notional.

use crate::config::{ConfigError, ExecutionConfig, SlippageConfig};
use crate::domain::ExitReason;
use serde::{Deserialize, Serialize};

/// Reason-keyed slippage profile: a base rate plus one multiplier per exit
/// reason. The entry side always uses the base rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionProfile {
    /// Base slippage as a fraction of price.
    pub base: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub timeout: f64,
    pub manual: f64,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            base: 0.0,
            take_profit: 1.0,
            stop_loss: 1.0,
            timeout: 1.0,
            manual: 1.0,
        }
    }
}

impl ExecutionProfile {
    /// Built-in profiles, resolvable by name from config.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "frictionless" => Some(Self::default()),
            "realistic" => Some(Self {
                base: 0.01,
                take_profit: 1.0,
                stop_loss: 1.5,
                timeout: 1.2,
                manual: 1.0,
            }),
            "hostile" => Some(Self {
                base: 0.03,
                take_profit: 1.5,
                stop_loss: 2.5,
                timeout: 2.0,
                manual: 1.5,
            }),
            _ => None,
        }
    }

    fn exit_rate(&self, reason: ExitReason) -> f64 {
        let multiplier = match reason {
            ExitReason::TakeProfit | ExitReason::ScheduleExhausted => self.take_profit,
            ExitReason::StopLoss => self.stop_loss,
            ExitReason::Timeout | ExitReason::MaxHold => self.timeout,
            ExitReason::Manual => self.manual,
        };
        self.base * multiplier
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SlippageMode {
    Flat(f64),
    Profile(ExecutionProfile),
}

/// Execution friction for one replay run.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    slippage: SlippageMode,
    swap_fee_rate: f64,
    network_fee: f64,
}

impl CostModel {
    /// Build from config. Unknown profile names fail here, before the
    /// replay starts; user-defined profiles shadow built-ins.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self, ConfigError> {
        let slippage = match &config.slippage {
            SlippageConfig::Flat { rate } => SlippageMode::Flat(*rate),
            SlippageConfig::Profile { name } => {
                let profile = config
                    .profiles
                    .get(name)
                    .copied()
                    .or_else(|| ExecutionProfile::builtin(name))
                    .ok_or_else(|| ConfigError::UnknownProfile(name.clone()))?;
                SlippageMode::Profile(profile)
            }
        };
        Ok(Self {
            slippage,
            swap_fee_rate: config.fees.swap_fee_rate,
            network_fee: config.fees.network_fee,
        })
    }

    pub fn frictionless() -> Self {
        Self {
            slippage: SlippageMode::Flat(0.0),
            swap_fee_rate: 0.0,
            network_fee: 0.0,
        }
    }

    fn entry_rate(&self) -> f64 {
        match &self.slippage {
            SlippageMode::Flat(rate) => *rate,
            SlippageMode::Profile(profile) => profile.base,
        }
    }

    fn exit_rate(&self, reason: ExitReason) -> f64 {
        match &self.slippage {
            SlippageMode::Flat(rate) => *rate,
            SlippageMode::Profile(profile) => profile.exit_rate(reason),
        }
    }

    /// Executed entry price: the buyer pays more.
    pub fn apply_entry(&self, raw_price: f64) -> f64 {
        raw_price * (1.0 + self.entry_rate())
    }

    /// Executed exit price: the seller receives less, per-reason rate.
    pub fn apply_exit(&self, raw_price: f64, reason: ExitReason) -> f64 {
        raw_price * (1.0 - self.exit_rate(reason))
    }

    /// Notional after the proportional swap/liquidity fee.
    pub fn apply_fees(&self, notional: f64) -> f64 {
        notional * (1.0 - self.swap_fee_rate)
    }

    /// Flat per-transaction charge, once on entry and once per exit.
    pub fn network_fee(&self) -> f64 {
        self.network_fee
    }
}
