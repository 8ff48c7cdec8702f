//! Position — one opened blueprint, tracked through partial exits to close.

use super::event::ResetReason;
use super::ids::PositionId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Execution record — written as fills happen, never rewritten.
///
/// Kept separate from the pending exit schedule, which the replay driver
/// owns and clears as exits fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Slippage-adjusted entry price.
    pub entry_exec_price: f64,
    /// Notional allocated at entry (cost basis).
    pub entry_notional: f64,
    /// Accumulated proportional swap/liquidity fees.
    pub swap_fees: f64,
    /// Accumulated flat per-transaction network fees.
    pub network_fees: f64,
    /// Realized PnL over all fills so far, net of fees.
    pub realized_pnl: f64,
}

/// A single simulated position.
///
/// Invariants: `size >= 0` always; `status == Closed` implies the exit
/// fields are set and `size` is at most dust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub signal_id: String,
    pub strategy: String,
    pub contract_address: String,
    pub entry_time: DateTime<Utc>,
    /// Raw (pre-slippage) entry price.
    pub entry_price: f64,
    /// Remaining notional at cost basis.
    pub size: f64,
    pub status: PositionStatus,
    pub exit_time: Option<DateTime<Utc>>,
    /// Raw price of the closing fill.
    pub exit_price: Option<f64>,
    /// Realized PnL as a percent of the entry notional.
    pub pnl_pct: Option<f64>,
    /// Market-cap proxy copied from the blueprint.
    pub market_cap: Option<f64>,
    pub record: ExecutionRecord,
    /// Highest exit multiple fired so far (1.0 at entry).
    pub peak_multiple: f64,
    /// Last known raw price: entry at open, updated by every fill.
    pub last_price: f64,
    pub closed_by_reset: bool,
    pub reset_reason: Option<ResetReason>,
    /// Zero-economics bookkeeping position that carries reset lineage.
    pub marker: bool,
}

impl Position {
    /// Remaining size below this is treated as fully exited.
    pub const DUST: f64 = 1e-9;

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: PositionId,
        signal_id: String,
        strategy: String,
        contract_address: String,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        market_cap: Option<f64>,
        size: f64,
        entry_exec_price: f64,
        entry_network_fee: f64,
    ) -> Self {
        Self {
            id,
            signal_id,
            strategy,
            contract_address,
            entry_time,
            entry_price,
            size,
            status: PositionStatus::Open,
            exit_time: None,
            exit_price: None,
            pnl_pct: None,
            market_cap,
            record: ExecutionRecord {
                entry_exec_price,
                entry_notional: size,
                swap_fees: 0.0,
                network_fees: entry_network_fee,
                realized_pnl: 0.0,
            },
            peak_multiple: 1.0,
            last_price: entry_price,
            closed_by_reset: false,
            reset_reason: None,
            marker: false,
        }
    }

    /// A closed, zero-economics marker recording which reset fired.
    ///
    /// All monetary fields are exactly zero: no fee, no slippage, no cash
    /// movement.
    pub fn marker(id: PositionId, reason: ResetReason, at: DateTime<Utc>) -> Self {
        Self {
            id,
            signal_id: format!("reset_marker_{}", id.0),
            strategy: "portfolio".into(),
            contract_address: "reset_marker".into(),
            entry_time: at,
            entry_price: 0.0,
            size: 0.0,
            status: PositionStatus::Closed,
            exit_time: Some(at),
            exit_price: Some(0.0),
            pnl_pct: Some(0.0),
            market_cap: None,
            record: ExecutionRecord {
                entry_exec_price: 0.0,
                entry_notional: 0.0,
                swap_fees: 0.0,
                network_fees: 0.0,
                realized_pnl: 0.0,
            },
            peak_multiple: 0.0,
            last_price: 0.0,
            closed_by_reset: false,
            reset_reason: Some(reason),
            marker: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Real position: anything that is not a reset marker.
    pub fn is_real(&self) -> bool {
        !self.marker
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        self.age(now).num_seconds() as f64 / 86_400.0
    }

    /// Last known price as a multiple of entry.
    pub fn current_multiple(&self) -> f64 {
        if self.entry_price > 0.0 {
            self.last_price / self.entry_price
        } else {
            1.0
        }
    }

    /// Unrealized move of the remaining size, percent of entry price.
    pub fn current_pnl_pct(&self) -> f64 {
        (self.current_multiple() - 1.0) * 100.0
    }
}
