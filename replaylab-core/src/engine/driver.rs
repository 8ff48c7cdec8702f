//! Replay driver — folds a sorted blueprint list through the account state
//! machine into a deterministic, time-ordered event ledger.
//!
//! Per blueprint, strictly in order: advance pending exits up to its entry
//! time, force-close over-aged positions, evaluate the reset policies
//! (profit first, capacity only if profit did not fire), validate the
//! blueprint, run admission control, open. After the last blueprint a flush
//! pass resolves every remaining scheduled exit, then the ledger is sorted
//! by `(timestamp, kind rank)`.

use crate::config::{CapacityMode, ReplayConfig};
use crate::diagnostics::{NoopDiagnostics, ReplayDiagnostics};
use crate::domain::{
    sort_ledger, EventPayload, ExecutionType, ExitReason, FillPayload, IdGen, PartialExitIntent,
    PortfolioEvent, PortfolioEventKind, Position, PositionId, ResetReason, TradeBlueprint,
};
use crate::engine::account::{AccountState, PartialFill};
use crate::engine::admission::{self, AdmissionDecision};
use crate::engine::result::{Ledger, ReplayResult};
use crate::engine::ReplayStats;
use crate::execution::CostModel;
use crate::policy::capacity::CapacityVerdict;
use crate::policy::profit::ProfitVerdict;
use crate::policy::{apply_reset, CapacityGuard, ProfitGuard, ResetContext};
use crate::pricing::{NoPrices, PriceLookup};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Final exit with its replay multiple resolved at open time.
#[derive(Debug, Clone, Copy)]
struct ScheduledFinal {
    at: DateTime<Utc>,
    reason: ExitReason,
    multiple: f64,
}

/// Pending exits for one open position. Owned by the driver, never by the
/// position, and discarded as exits fire.
#[derive(Debug, Clone)]
struct ExitSchedule {
    partials: VecDeque<PartialExitIntent>,
    final_exit: Option<ScheduledFinal>,
}

enum DueExit {
    Partial(PartialExitIntent),
    Final(ScheduledFinal),
}

impl ExitSchedule {
    fn from_blueprint(bp: &TradeBlueprint) -> Self {
        let mut partials: Vec<PartialExitIntent> = bp
            .partial_exits
            .iter()
            .filter(|p| p.multiple.is_finite() && p.multiple > 0.0 && p.fraction > 0.0)
            .copied()
            .collect();
        partials.sort_by_key(|p| p.at);
        Self {
            partials: partials.into(),
            final_exit: bp.final_exit.map(|f| ScheduledFinal {
                at: f.at,
                reason: f.reason,
                multiple: bp.final_multiple(),
            }),
        }
    }

    fn is_empty(&self) -> bool {
        self.partials.is_empty() && self.final_exit.is_none()
    }

    /// Timestamp of the next exit to fire, if any.
    fn next_due(&self) -> Option<DateTime<Utc>> {
        let partial = self.partials.front().map(|p| p.at);
        let final_at = self.final_exit.as_ref().map(|f| f.at);
        match (partial, final_at) {
            (Some(p), Some(f)) => Some(p.min(f)),
            (Some(p), None) => Some(p),
            (None, Some(f)) => Some(f),
            (None, None) => None,
        }
    }

    /// Remove and return the next due exit; partials win ties against the
    /// final exit.
    fn pop_due(&mut self) -> Option<DueExit> {
        let partial_at = self.partials.front().map(|p| p.at);
        let final_at = self.final_exit.as_ref().map(|f| f.at);
        match (partial_at, final_at) {
            (None, None) => None,
            (Some(_), None) => self.partials.pop_front().map(DueExit::Partial),
            (None, Some(_)) => self.final_exit.take().map(DueExit::Final),
            (Some(p), Some(f)) => {
                if f < p {
                    self.final_exit.take().map(DueExit::Final)
                } else {
                    self.partials.pop_front().map(DueExit::Partial)
                }
            }
        }
    }
}

/// Replay a blueprint list with default collaborators: no external price
/// table, no diagnostics sink.
pub fn replay(
    blueprints: &[TradeBlueprint],
    config: &ReplayConfig,
) -> Result<ReplayResult, ReplayError> {
    replay_with(blueprints, config, &NoPrices, &NoopDiagnostics)
}

/// Replay a blueprint list with injected collaborators.
///
/// The blueprint slice is consumed read-only; ordering in the input does
/// not matter (a stable sort by entry time happens first).
pub fn replay_with(
    blueprints: &[TradeBlueprint],
    config: &ReplayConfig,
    prices: &dyn PriceLookup,
    diagnostics: &dyn ReplayDiagnostics,
) -> Result<ReplayResult, ReplayError> {
    config.validate()?;
    let cost = CostModel::from_config(&config.execution)?;
    let mut driver = Driver {
        config,
        cost,
        account: AccountState::new(config.initial_balance, config.capacity_reset.window),
        ids: IdGen::new(),
        events: Vec::new(),
        stats: ReplayStats::default(),
        schedules: HashMap::new(),
        prices,
        diagnostics,
    };

    let mut order: Vec<&TradeBlueprint> = blueprints.iter().collect();
    order.sort_by_key(|b| b.entry_time);
    for bp in order {
        driver.step(bp);
    }
    Ok(driver.finish())
}

struct Driver<'a> {
    config: &'a ReplayConfig,
    cost: CostModel,
    account: AccountState,
    ids: IdGen,
    events: Vec<PortfolioEvent>,
    stats: ReplayStats,
    schedules: HashMap<PositionId, ExitSchedule>,
    prices: &'a dyn PriceLookup,
    diagnostics: &'a dyn ReplayDiagnostics,
}

impl Driver<'_> {
    fn step(&mut self, bp: &TradeBlueprint) {
        let now = bp.entry_time;
        self.advance_exits(now);
        self.sweep_max_hold(now);
        self.evaluate_resets(now);

        if bp.is_no_entry() {
            self.stats.skipped_invalid += 1;
            trace!(signal = %bp.signal_id, "blueprint skipped: no entry");
            return;
        }

        self.account.capacity.record_signal(now);
        match admission::can_open(&self.account, self.config) {
            AdmissionDecision::Reject(why) => {
                self.stats.skipped_admission += 1;
                if why.is_capacity_block() {
                    self.account.capacity.record_blocked(now);
                }
                self.diagnostics
                    .admission_rejected(now, &bp.signal_id, why.as_str());
                trace!(signal = %bp.signal_id, why = why.as_str(), "blueprint rejected");
            }
            AdmissionDecision::Admit { size } => self.open_position(bp, size),
        }
    }

    /// Fire every pending exit scheduled at or before `until`, globally
    /// oldest first, so admission and reset checks never see a stale book.
    fn advance_exits(&mut self, until: DateTime<Utc>) {
        loop {
            let mut next: Option<(DateTime<Utc>, PositionId)> = None;
            for pos in &self.account.open_positions {
                if !pos.is_real() {
                    continue;
                }
                let Some(schedule) = self.schedules.get(&pos.id) else {
                    continue;
                };
                let Some(due) = schedule.next_due() else {
                    continue;
                };
                if due > until {
                    continue;
                }
                if next.map_or(true, |best| (due, pos.id) < best) {
                    next = Some((due, pos.id));
                }
            }
            let Some((_, id)) = next else {
                break;
            };
            self.fire_next_exit(id);
        }
    }

    fn fire_next_exit(&mut self, id: PositionId) {
        let due = self.schedules.get_mut(&id).and_then(|s| s.pop_due());
        let Some(due) = due else {
            self.schedules.remove(&id);
            return;
        };
        match due {
            DueExit::Partial(intent) => {
                let Some(fill) = self.account.partial_fill(
                    id,
                    intent.at,
                    intent.multiple,
                    intent.fraction,
                    &self.cost,
                ) else {
                    self.schedules.remove(&id);
                    return;
                };
                self.push_partial_event(&fill);
                let exhausted = self.schedules.get(&id).map_or(true, |s| s.is_empty());
                if exhausted {
                    // Nothing left on the schedule and no final exit: the
                    // remainder is sold where the last exit fired.
                    self.close_position(
                        id,
                        intent.at,
                        fill.raw_price,
                        ExitReason::ScheduleExhausted,
                        ExecutionType::FinalExit,
                    );
                }
            }
            DueExit::Final(final_exit) => {
                let Some(raw_price) = self
                    .account
                    .find_open(id)
                    .map(|p| p.entry_price * final_exit.multiple)
                else {
                    self.schedules.remove(&id);
                    return;
                };
                self.close_position(
                    id,
                    final_exit.at,
                    raw_price,
                    final_exit.reason,
                    ExecutionType::FinalExit,
                );
            }
        }
    }

    /// Force-close positions whose age exceeds the configured maximum hold.
    fn sweep_max_hold(&mut self, now: DateTime<Utc>) {
        let Some(hours) = self.config.max_hold_hours else {
            return;
        };
        let max_age = Duration::milliseconds((hours * 3_600_000.0) as i64);
        let expired: Vec<(PositionId, String, f64)> = self
            .account
            .open_positions
            .iter()
            .filter(|p| p.is_real() && now - p.entry_time > max_age)
            .map(|p| (p.id, p.contract_address.clone(), p.entry_price))
            .collect();
        for (id, contract, entry_price) in expired {
            let raw_price = self
                .prices
                .price_at(&contract, now)
                .unwrap_or(entry_price);
            self.close_position(
                id,
                now,
                raw_price,
                ExitReason::MaxHold,
                ExecutionType::ForcedClose,
            );
        }
    }

    /// At most one reset per evaluated instant; profit takes priority and
    /// leaves the capacity counters untouched when it fires.
    fn evaluate_resets(&mut self, now: DateTime<Utc>) {
        match crate::policy::profit::evaluate(&self.config.profit_reset, &mut self.account) {
            ProfitVerdict::Eligible => {
                self.apply_profit_reset(now);
                return;
            }
            ProfitVerdict::Suppressed(guard) => {
                if guard != ProfitGuard::Disabled {
                    self.diagnostics
                        .reset_suppressed(now, ResetReason::Profit, guard.as_str());
                }
            }
        }

        let verdict = crate::policy::capacity::evaluate(
            &self.config.capacity_reset,
            self.config.max_open_positions,
            &self.account,
            now,
        );
        match verdict {
            CapacityVerdict::CloseAll(ids) => {
                self.apply_capacity_reset(now, ResetReason::CloseAll, ids)
            }
            CapacityVerdict::Prune(ids) => {
                self.apply_capacity_reset(now, ResetReason::CapacityPrune, ids)
            }
            CapacityVerdict::Suppressed(guard) => {
                if guard != CapacityGuard::Disabled {
                    let reason = match self.config.capacity_reset.mode {
                        CapacityMode::CloseAll => ResetReason::CloseAll,
                        CapacityMode::Prune => ResetReason::CapacityPrune,
                    };
                    self.diagnostics.reset_suppressed(now, reason, guard.as_str());
                }
            }
        }
    }

    fn apply_profit_reset(&mut self, now: DateTime<Utc>) {
        let force_close: Vec<PositionId> = self.account.open_real().map(|p| p.id).collect();
        let marker = Position::marker(self.ids.next_position(), ResetReason::Profit, now);
        let ctx = ResetContext::new(ResetReason::Profit, now, marker, force_close);
        let outcome = apply_reset(
            ctx,
            &mut self.account,
            &self.cost,
            &mut self.ids,
            &mut self.events,
        );
        for id in &outcome.closed {
            self.schedules.remove(id);
        }
        self.account.reset_cycle_to_cash();
        self.stats.profit_resets += 1;
        self.diagnostics
            .reset_applied(now, ResetReason::Profit, outcome.closed.len());
        debug!(closed = outcome.closed.len(), cash = self.account.cash, "profit reset");
    }

    fn apply_capacity_reset(
        &mut self,
        now: DateTime<Utc>,
        reason: ResetReason,
        force_close: Vec<PositionId>,
    ) {
        let marker = Position::marker(self.ids.next_position(), reason, now);
        let ctx = ResetContext::new(reason, now, marker, force_close);
        let outcome = apply_reset(
            ctx,
            &mut self.account,
            &self.cost,
            &mut self.ids,
            &mut self.events,
        );
        for id in &outcome.closed {
            self.schedules.remove(id);
        }
        self.account.capacity.note_reset(now);
        self.stats.capacity_resets += 1;
        self.diagnostics
            .reset_applied(now, reason, outcome.closed.len());
        debug!(
            reason = reason.as_str(),
            closed = outcome.closed.len(),
            "capacity reset"
        );
    }

    fn open_position(&mut self, bp: &TradeBlueprint, size: f64) {
        let exec_price = self.cost.apply_entry(bp.entry_price);
        let network_fee = self.cost.network_fee();
        let id = self.ids.next_position();
        let position = Position::open(
            id,
            bp.signal_id.clone(),
            bp.strategy.clone(),
            bp.contract_address.clone(),
            bp.entry_time,
            bp.entry_price,
            bp.market_cap,
            size,
            exec_price,
            network_fee,
        );
        self.account.book_open(position, network_fee);

        let schedule = ExitSchedule::from_blueprint(bp);
        if !schedule.is_empty() {
            self.schedules.insert(id, schedule);
        }

        self.events.push(PortfolioEvent {
            id: self.ids.next_event(),
            at: bp.entry_time,
            kind: PortfolioEventKind::Opened,
            strategy: bp.strategy.clone(),
            signal_id: bp.signal_id.clone(),
            contract_address: bp.contract_address.clone(),
            position_id: id,
            reason: None,
            payload: EventPayload::Fill(FillPayload {
                execution_type: ExecutionType::Entry,
                raw_price: bp.entry_price,
                exec_price,
                qty_delta: size,
                fees_sol: network_fee,
                pnl_sol_delta: 0.0,
                extra: BTreeMap::new(),
            }),
        });
        self.stats.opened += 1;
        debug!(signal = %bp.signal_id, size, "position opened");
    }

    fn push_partial_event(&mut self, fill: &PartialFill) {
        self.events.push(PortfolioEvent {
            id: self.ids.next_event(),
            at: fill.at,
            kind: PortfolioEventKind::PartialExit,
            strategy: fill.strategy.clone(),
            signal_id: fill.signal_id.clone(),
            contract_address: fill.contract_address.clone(),
            position_id: fill.position_id,
            reason: Some(ExitReason::TakeProfit.as_str().into()),
            payload: EventPayload::Fill(FillPayload {
                execution_type: ExecutionType::PartialExit,
                raw_price: fill.raw_price,
                exec_price: fill.exec_price,
                qty_delta: -fill.qty,
                fees_sol: fill.fees,
                pnl_sol_delta: fill.pnl_delta,
                extra: BTreeMap::new(),
            }),
        });
    }

    fn close_position(
        &mut self,
        id: PositionId,
        at: DateTime<Utc>,
        raw_price: f64,
        reason: ExitReason,
        execution_type: ExecutionType,
    ) {
        self.schedules.remove(&id);
        let Some(fill) =
            self.account
                .close_position(id, at, raw_price, reason, &self.cost, None)
        else {
            return;
        };
        self.events.push(PortfolioEvent {
            id: self.ids.next_event(),
            at: fill.at,
            kind: PortfolioEventKind::Closed,
            strategy: fill.strategy.clone(),
            signal_id: fill.signal_id.clone(),
            contract_address: fill.contract_address.clone(),
            position_id: fill.position_id,
            reason: Some(reason.as_str().into()),
            payload: EventPayload::Fill(FillPayload {
                execution_type,
                raw_price: fill.raw_price,
                exec_price: fill.exec_price,
                qty_delta: -fill.qty,
                fees_sol: fill.fees,
                pnl_sol_delta: fill.pnl_delta,
                extra: BTreeMap::new(),
            }),
        });
    }

    fn finish(mut self) -> ReplayResult {
        // Flush: advance far past every scheduled exit so positions with a
        // schedule resolve even with no further blueprints.
        self.advance_exits(DateTime::<Utc>::MAX_UTC);
        sort_ledger(&mut self.events);

        let AccountState {
            cash,
            peak_balance,
            open_positions,
            closed_positions,
            equity_curve,
            ..
        } = self.account;
        let mut positions = closed_positions;
        positions.extend(open_positions);
        positions.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.id.cmp(&b.id)));

        ReplayResult {
            positions,
            equity_curve,
            ledger: Ledger {
                stats: self.stats,
                events: self.events,
            },
            final_balance: cash,
            peak_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationConfig;
    use chrono::TimeZone;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    fn blueprint(signal: &str, at: DateTime<Utc>) -> TradeBlueprint {
        TradeBlueprint {
            signal_id: signal.into(),
            strategy: "momentum".into(),
            contract_address: format!("mint-{signal}"),
            entry_time: at,
            entry_price: 1.0e-6,
            market_cap: None,
            partial_exits: vec![],
            final_exit: None,
            realized_multiple: 1.0,
            max_multiple: 1.0,
            outcome: None,
        }
    }

    fn config() -> ReplayConfig {
        let mut config = ReplayConfig::new(10.0, AllocationConfig::Fixed { percent: 0.1 });
        config.execution.fees = crate::config::FeeConfig {
            swap_fee_rate: 0.0,
            network_fee: 0.0,
        };
        config
    }

    #[test]
    fn schedule_pops_partials_before_final_on_ties() {
        let mut bp = blueprint("a", ts(12, 0));
        bp.partial_exits = vec![PartialExitIntent {
            at: ts(13, 0),
            multiple: 2.0,
            fraction: 0.5,
        }];
        bp.final_exit = Some(crate::domain::FinalExitIntent {
            at: ts(13, 0),
            reason: ExitReason::Timeout,
        });
        let mut schedule = ExitSchedule::from_blueprint(&bp);
        assert!(matches!(schedule.pop_due(), Some(DueExit::Partial(_))));
        assert!(matches!(schedule.pop_due(), Some(DueExit::Final(_))));
        assert!(schedule.pop_due().is_none());
    }

    #[test]
    fn schedule_drops_garbage_partials() {
        let mut bp = blueprint("a", ts(12, 0));
        bp.partial_exits = vec![
            PartialExitIntent {
                at: ts(13, 0),
                multiple: f64::NAN,
                fraction: 0.5,
            },
            PartialExitIntent {
                at: ts(14, 0),
                multiple: 2.0,
                fraction: 0.0,
            },
        ];
        let schedule = ExitSchedule::from_blueprint(&bp);
        assert!(schedule.is_empty());
    }

    #[test]
    fn open_only_replay_keeps_position_open() {
        let result = replay(&[blueprint("a", ts(12, 0))], &config()).unwrap();
        assert_eq!(result.ledger.stats.opened, 1);
        assert_eq!(result.open_positions().count(), 1);
        assert_eq!(result.ledger.events.len(), 1);
        assert_eq!(result.ledger.events[0].kind, PortfolioEventKind::Opened);
        assert!((result.final_balance - 9.0).abs() < 1e-12);
    }

    #[test]
    fn corrupt_blueprints_are_counted_not_raised() {
        let mut bad_price = blueprint("bad", ts(12, 0));
        bad_price.entry_price = -1.0;
        let mut no_entry = blueprint("skip", ts(12, 30));
        no_entry.outcome = Some(crate::domain::BlueprintOutcome::NoEntry);

        let result = replay(&[bad_price, no_entry, blueprint("ok", ts(13, 0))], &config()).unwrap();
        assert_eq!(result.ledger.stats.skipped_invalid, 2);
        assert_eq!(result.ledger.stats.opened, 1);
        assert_eq!(result.ledger.events.len(), 1);
    }

    #[test]
    fn blueprints_replay_in_time_order_regardless_of_input_order() {
        let late = blueprint("late", ts(15, 0));
        let early = blueprint("early", ts(9, 0));
        let result = replay(&[late, early], &config()).unwrap();
        let signals: Vec<_> = result
            .ledger
            .events
            .iter()
            .map(|e| e.signal_id.clone())
            .collect();
        assert_eq!(signals, vec!["early", "late"]);
    }

    #[test]
    fn flush_resolves_scheduled_exits_after_last_blueprint() {
        let mut bp = blueprint("a", ts(12, 0));
        bp.final_exit = Some(crate::domain::FinalExitIntent {
            at: ts(18, 0),
            reason: ExitReason::StopLoss,
        });
        bp.realized_multiple = 0.5;

        let result = replay(&[bp], &config()).unwrap();
        assert_eq!(result.open_positions().count(), 0);
        let closed = result.ledger.events.last().unwrap();
        assert_eq!(closed.kind, PortfolioEventKind::Closed);
        assert_eq!(closed.at, ts(18, 0));
        assert_eq!(closed.reason.as_deref(), Some("stop_loss"));
        // 1.0 at 0.5x comes back as 0.5: half the allocation lost
        assert!((result.final_balance - 9.5).abs() < 1e-12);
    }

    #[test]
    fn max_hold_closes_through_price_lookup() {
        use crate::pricing::PriceTable;
        let mut cfg = config();
        cfg.max_hold_hours = Some(24.0);

        let first = blueprint("old", ts(0, 0));
        let mut second = blueprint("next", ts(12, 0));
        second.entry_time = ts(0, 0) + Duration::hours(30);

        let mut table = PriceTable::new();
        table.insert("mint-old", ts(0, 0) + Duration::hours(25), 4.0e-6);

        let result = replay_with(
            &[first, second],
            &cfg,
            &table,
            &NoopDiagnostics,
        )
        .unwrap();
        let closed = result
            .ledger
            .events
            .iter()
            .find(|e| e.kind == PortfolioEventKind::Closed)
            .unwrap();
        assert_eq!(closed.reason.as_deref(), Some("max_hold"));
        let fill = closed.fill().unwrap();
        assert_eq!(fill.execution_type, ExecutionType::ForcedClose);
        assert!((fill.raw_price - 4.0e-6).abs() < 1e-18);
    }
}
