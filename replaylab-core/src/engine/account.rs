//! AccountState — the mutable ledger of cash, positions, and cycle trackers.
//!
//! One replay call owns exactly one AccountState; positions live in the
//! open list until they close, then move append-only to the closed list.
//! All fill mechanics (partial exits, closes, forced closes) go through the
//! two methods here so the replay driver and the reset policies price and
//! book positions identically.

use crate::config::WindowConfig;
use crate::domain::{ExitReason, Position, PositionId, PositionStatus, ResetReason};
use crate::engine::result::EquitySample;
use crate::execution::CostModel;
use crate::policy::window::CapacityTracker;
use chrono::{DateTime, Utc};

/// Per-cycle trackers for the profit reset policy. Reset only by a
/// successful profit-reset application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTrackers {
    pub cycle_start_equity: f64,
    pub equity_peak_in_cycle: f64,
    pub cycle_start_balance: f64,
}

/// Result of a partial exit booked against an open position.
#[derive(Debug, Clone)]
pub struct PartialFill {
    pub position_id: PositionId,
    pub signal_id: String,
    pub strategy: String,
    pub contract_address: String,
    pub at: DateTime<Utc>,
    pub raw_price: f64,
    pub exec_price: f64,
    /// Notional sold (cost basis), positive.
    pub qty: f64,
    /// Swap fee + network fee for this fill.
    pub fees: f64,
    pub pnl_delta: f64,
    /// Size left on the position after this fill.
    pub remaining: f64,
}

/// Result of closing an open position.
#[derive(Debug, Clone)]
pub struct ClosedFill {
    pub position_id: PositionId,
    pub signal_id: String,
    pub strategy: String,
    pub contract_address: String,
    pub at: DateTime<Utc>,
    pub raw_price: f64,
    pub exec_price: f64,
    /// Notional closed (cost basis), positive.
    pub qty: f64,
    pub fees: f64,
    pub pnl_delta: f64,
    pub reset: Option<ResetReason>,
}

#[derive(Debug, Clone)]
pub struct AccountState {
    pub cash: f64,
    pub initial_balance: f64,
    /// Highest cash balance ever observed.
    pub peak_balance: f64,
    pub open_positions: Vec<Position>,
    pub closed_positions: Vec<Position>,
    /// Equity samples. Stub in this version: never populated.
    pub equity_curve: Vec<EquitySample>,
    pub cycle: CycleTrackers,
    pub capacity: CapacityTracker,
}

impl AccountState {
    pub fn new(initial_balance: f64, window: WindowConfig) -> Self {
        Self {
            cash: initial_balance,
            initial_balance,
            peak_balance: initial_balance,
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
            equity_curve: Vec::new(),
            cycle: CycleTrackers {
                cycle_start_equity: initial_balance,
                equity_peak_in_cycle: initial_balance,
                cycle_start_balance: initial_balance,
            },
            capacity: CapacityTracker::new(window),
        }
    }

    /// Equity = cash + sum of open position sizes.
    pub fn equity(&self) -> f64 {
        self.cash + self.open_notional()
    }

    pub fn open_notional(&self) -> f64 {
        self.open_positions.iter().map(|p| p.size).sum()
    }

    pub fn open_real(&self) -> impl Iterator<Item = &Position> {
        self.open_positions.iter().filter(|p| p.is_real())
    }

    pub fn open_real_count(&self) -> usize {
        self.open_real().count()
    }

    pub fn find_open(&self, id: PositionId) -> Option<&Position> {
        self.open_positions.iter().find(|p| p.id == id)
    }

    /// Book a freshly opened position, debiting its notional plus the entry
    /// network fee.
    pub fn book_open(&mut self, position: Position, entry_network_fee: f64) {
        self.cash -= position.size + entry_network_fee;
        self.open_positions.push(position);
    }

    fn settle(&mut self, net: f64) {
        self.cash += net;
        if self.cash > self.peak_balance {
            self.peak_balance = self.cash;
        }
    }

    /// Sell `fraction` of the remaining size at `multiple` × entry.
    ///
    /// Returns `None` when `id` is not an open position. Size is reduced
    /// from the *current* remaining size, so it can never go negative.
    pub fn partial_fill(
        &mut self,
        id: PositionId,
        at: DateTime<Utc>,
        multiple: f64,
        fraction: f64,
        cost: &CostModel,
    ) -> Option<PartialFill> {
        let pos = self.open_positions.iter_mut().find(|p| p.id == id)?;

        let raw_price = pos.entry_price * multiple;
        let exec_price = cost.apply_exit(raw_price, ExitReason::TakeProfit);
        let qty = pos.size * fraction.clamp(0.0, 1.0);
        let gross = if pos.record.entry_exec_price > 0.0 {
            qty * exec_price / pos.record.entry_exec_price
        } else {
            0.0
        };
        let after_fees = cost.apply_fees(gross);
        let swap_fee = gross - after_fees;
        let network_fee = cost.network_fee();
        let net = after_fees - network_fee;
        let pnl_delta = net - qty;

        pos.size -= qty;
        pos.record.swap_fees += swap_fee;
        pos.record.network_fees += network_fee;
        pos.record.realized_pnl += pnl_delta;
        pos.last_price = raw_price;
        if multiple > pos.peak_multiple {
            pos.peak_multiple = multiple;
        }

        let fill = PartialFill {
            position_id: pos.id,
            signal_id: pos.signal_id.clone(),
            strategy: pos.strategy.clone(),
            contract_address: pos.contract_address.clone(),
            at,
            raw_price,
            exec_price,
            qty,
            fees: swap_fee + network_fee,
            pnl_delta,
            remaining: pos.size,
        };
        self.settle(net);
        Some(fill)
    }

    /// Close an open position at `raw_price`, selling its whole remaining
    /// size through the cost model.
    ///
    /// A dust-sized remainder closes administratively: no sale, no fees, no
    /// cash movement. `reset` tags the position with its reset lineage.
    pub fn close_position(
        &mut self,
        id: PositionId,
        at: DateTime<Utc>,
        raw_price: f64,
        slip_reason: ExitReason,
        cost: &CostModel,
        reset: Option<ResetReason>,
    ) -> Option<ClosedFill> {
        let idx = self.open_positions.iter().position(|p| p.id == id)?;
        let mut pos = self.open_positions.remove(idx);

        let qty = pos.size;
        let exec_price = cost.apply_exit(raw_price, slip_reason);
        let (swap_fee, network_fee, net) = if qty > Position::DUST {
            let gross = if pos.record.entry_exec_price > 0.0 {
                qty * exec_price / pos.record.entry_exec_price
            } else {
                0.0
            };
            let after_fees = cost.apply_fees(gross);
            (gross - after_fees, cost.network_fee(), after_fees - cost.network_fee())
        } else {
            (0.0, 0.0, 0.0)
        };
        let pnl_delta = net - qty;

        let multiple = if pos.entry_price > 0.0 {
            raw_price / pos.entry_price
        } else {
            1.0
        };
        pos.size = 0.0;
        pos.status = PositionStatus::Closed;
        pos.exit_time = Some(at);
        pos.exit_price = Some(raw_price);
        pos.last_price = raw_price;
        pos.record.swap_fees += swap_fee;
        pos.record.network_fees += network_fee;
        pos.record.realized_pnl += pnl_delta;
        pos.pnl_pct = Some(if pos.record.entry_notional > 0.0 {
            pos.record.realized_pnl / pos.record.entry_notional * 100.0
        } else {
            0.0
        });
        if multiple > pos.peak_multiple {
            pos.peak_multiple = multiple;
        }
        if let Some(reason) = reset {
            pos.closed_by_reset = true;
            pos.reset_reason = Some(reason);
        }

        let fill = ClosedFill {
            position_id: pos.id,
            signal_id: pos.signal_id.clone(),
            strategy: pos.strategy.clone(),
            contract_address: pos.contract_address.clone(),
            at,
            raw_price,
            exec_price,
            qty,
            fees: swap_fee + network_fee,
            pnl_delta,
            reset,
        };
        self.closed_positions.push(pos);
        self.settle(net);
        self.capacity.record_closure(at);
        Some(fill)
    }

    /// Start a new profit-reset cycle at the current (post-reset) cash
    /// balance.
    pub fn reset_cycle_to_cash(&mut self) {
        self.cycle = CycleTrackers {
            cycle_start_equity: self.cash,
            equity_peak_in_cycle: self.cash,
            cycle_start_balance: self.cash,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn account() -> AccountState {
        AccountState::new(10.0, WindowConfig::default())
    }

    fn open(account: &mut AccountState, id: u64, size: f64) {
        let pos = Position::open(
            PositionId(id),
            format!("sig-{id}"),
            "momentum".into(),
            format!("mint-{id}"),
            t0(),
            1.0e-6,
            None,
            size,
            1.0e-6,
            0.0,
        );
        account.book_open(pos, 0.0);
    }

    #[test]
    fn equity_identity() {
        let mut acct = account();
        open(&mut acct, 1, 2.0);
        open(&mut acct, 2, 3.0);
        assert!((acct.cash - 5.0).abs() < 1e-12);
        assert!((acct.equity() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn partial_fill_reduces_remaining_size() {
        let mut acct = account();
        open(&mut acct, 1, 2.0);
        let cost = CostModel::frictionless();

        let fill = acct
            .partial_fill(PositionId(1), t0(), 2.0, 0.4, &cost)
            .unwrap();
        assert!((fill.qty - 0.8).abs() < 1e-12);
        assert!((fill.remaining - 1.2).abs() < 1e-12);
        // sold 0.8 of cost basis at 2x: proceeds 1.6, pnl +0.8
        assert!((fill.pnl_delta - 0.8).abs() < 1e-12);
        assert!((acct.cash - (8.0 + 1.6)).abs() < 1e-12);

        let pos = acct.find_open(PositionId(1)).unwrap();
        assert!((pos.size - 1.2).abs() < 1e-12);
        assert!((pos.peak_multiple - 2.0).abs() < 1e-12);
    }

    #[test]
    fn repeated_fractions_never_drive_size_negative() {
        let mut acct = account();
        open(&mut acct, 1, 1.0);
        let cost = CostModel::frictionless();
        for _ in 0..50 {
            acct.partial_fill(PositionId(1), t0(), 1.5, 0.9, &cost)
                .unwrap();
        }
        let pos = acct.find_open(PositionId(1)).unwrap();
        assert!(pos.size >= 0.0);
    }

    #[test]
    fn close_moves_position_and_realizes_pnl() {
        let mut acct = account();
        open(&mut acct, 1, 2.0);
        let cost = CostModel::frictionless();

        let fill = acct
            .close_position(
                PositionId(1),
                t0(),
                3.0e-6,
                ExitReason::TakeProfit,
                &cost,
                None,
            )
            .unwrap();
        assert!((fill.qty - 2.0).abs() < 1e-12);
        assert!((fill.pnl_delta - 4.0).abs() < 1e-12); // 2.0 at 3x -> 6.0
        assert!(acct.open_positions.is_empty());

        let pos = &acct.closed_positions[0];
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.exit_time, Some(t0()));
        assert!((pos.pnl_pct.unwrap() - 200.0).abs() < 1e-9);
        assert!(pos.size.abs() < Position::DUST);
        assert!((acct.cash - 14.0).abs() < 1e-12);
        assert!((acct.peak_balance - 14.0).abs() < 1e-12);
    }

    #[test]
    fn reset_tag_is_recorded() {
        let mut acct = account();
        open(&mut acct, 1, 2.0);
        let cost = CostModel::frictionless();
        acct.close_position(
            PositionId(1),
            t0(),
            1.0e-6,
            ExitReason::Manual,
            &cost,
            Some(ResetReason::Profit),
        )
        .unwrap();
        let pos = &acct.closed_positions[0];
        assert!(pos.closed_by_reset);
        assert_eq!(pos.reset_reason, Some(ResetReason::Profit));
    }

    #[test]
    fn dust_close_has_no_economics() {
        let mut acct = account();
        open(&mut acct, 1, 1.0);
        let cost = CostModel::frictionless();
        acct.partial_fill(PositionId(1), t0(), 2.0, 1.0, &cost).unwrap();
        let cash_before = acct.cash;
        let fill = acct
            .close_position(
                PositionId(1),
                t0(),
                2.0e-6,
                ExitReason::ScheduleExhausted,
                &cost,
                None,
            )
            .unwrap();
        assert_eq!(fill.qty, 0.0);
        assert_eq!(fill.fees, 0.0);
        assert_eq!(acct.cash, cash_before);
    }

    #[test]
    fn cycle_reset_snapshots_cash() {
        let mut acct = account();
        acct.cash = 23.0;
        acct.reset_cycle_to_cash();
        assert_eq!(acct.cycle.cycle_start_equity, 23.0);
        assert_eq!(acct.cycle.cycle_start_balance, 23.0);
        assert_eq!(acct.cycle.equity_peak_in_cycle, 23.0);
    }
}
