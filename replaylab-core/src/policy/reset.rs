//! Shared reset application: force-close a set of positions and record the
//! reset lineage through a zero-economics marker position.
//!
//! Both the profit reset and the capacity reset/prune go through
//! [`apply_reset`]; they differ only in how they pick the force-close set
//! and in what they do to their own trackers afterwards.

use crate::domain::{
    EventPayload, ExecutionType, ExitReason, FillPayload, IdGen, PortfolioEvent,
    PortfolioEventKind, Position, PositionId, ResetPayload, ResetReason,
};
use crate::engine::account::AccountState;
use crate::execution::CostModel;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// One reset about to be applied: the reason, the instant, the marker that
/// will carry lineage, and the real positions to force-close.
///
/// Construction strips the marker from the force-close set, so the marker
/// can never be force-closed as if it were a real position.
#[derive(Debug)]
pub struct ResetContext {
    pub reason: ResetReason,
    pub at: DateTime<Utc>,
    marker: Position,
    force_close: Vec<PositionId>,
}

impl ResetContext {
    pub fn new(
        reason: ResetReason,
        at: DateTime<Utc>,
        marker: Position,
        force_close: Vec<PositionId>,
    ) -> Self {
        let marker_id = marker.id;
        let force_close: Vec<PositionId> = force_close
            .into_iter()
            .filter(|&id| id != marker_id)
            .collect();
        debug_assert!(marker.marker, "reset marker must be a marker position");
        Self {
            reason,
            at,
            marker,
            force_close,
        }
    }

    pub fn force_close(&self) -> &[PositionId] {
        &self.force_close
    }

    pub fn marker_id(&self) -> PositionId {
        self.marker.id
    }
}

/// What a reset actually did.
#[derive(Debug, Clone)]
pub struct ResetOutcome {
    pub marker_id: PositionId,
    pub closed: Vec<PositionId>,
}

/// Force-close every listed position at its last known raw price, close the
/// marker with zero economic effect, and append the CLOSED events followed
/// by the single RESET_TRIGGERED event — all stamped with the exact reset
/// timestamp.
pub fn apply_reset(
    ctx: ResetContext,
    account: &mut AccountState,
    cost: &CostModel,
    ids: &mut IdGen,
    events: &mut Vec<PortfolioEvent>,
) -> ResetOutcome {
    let ResetContext {
        reason,
        at,
        marker,
        force_close,
    } = ctx;

    let mut closed = Vec::with_capacity(force_close.len());
    for id in force_close {
        // Market price: last known exit/raw price, which starts at entry.
        let Some(raw_price) = account.find_open(id).map(|p| p.last_price) else {
            continue;
        };
        let Some(fill) = account.close_position(
            id,
            at,
            raw_price,
            ExitReason::Manual,
            cost,
            Some(reason),
        ) else {
            continue;
        };
        events.push(PortfolioEvent {
            id: ids.next_event(),
            at,
            kind: PortfolioEventKind::Closed,
            strategy: fill.strategy,
            signal_id: fill.signal_id,
            contract_address: fill.contract_address,
            position_id: fill.position_id,
            reason: Some(reason.as_str().into()),
            payload: EventPayload::Fill(FillPayload {
                execution_type: ExecutionType::ForcedClose,
                raw_price: fill.raw_price,
                exec_price: fill.exec_price,
                qty_delta: -fill.qty,
                fees_sol: fill.fees,
                pnl_sol_delta: fill.pnl_delta,
                extra: BTreeMap::new(),
            }),
        });
        closed.push(fill.position_id);
    }

    let marker_id = marker.id;
    events.push(PortfolioEvent {
        id: ids.next_event(),
        at,
        kind: PortfolioEventKind::ResetTriggered,
        strategy: marker.strategy.clone(),
        signal_id: marker.signal_id.clone(),
        contract_address: marker.contract_address.clone(),
        position_id: marker_id,
        reason: Some(reason.as_str().into()),
        payload: EventPayload::Reset(ResetPayload {
            reset_reason: reason,
            closed_positions_count: closed.len(),
            extra: BTreeMap::new(),
        }),
    });
    // Marker closes with no fee, no slippage, no cash movement; it exists
    // only to carry lineage.
    account.closed_positions.push(marker);

    debug!(
        reason = reason.as_str(),
        closed = closed.len(),
        "reset applied"
    );

    ResetOutcome { marker_id, closed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn open_position(id: u64, size: f64, last_multiple: f64) -> Position {
        let mut pos = Position::open(
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
        pos.last_price = pos.entry_price * last_multiple;
        pos
    }

    #[test]
    fn construction_strips_marker_from_force_close_set() {
        let marker = Position::marker(PositionId(9), ResetReason::Profit, t0());
        let ctx = ResetContext::new(
            ResetReason::Profit,
            t0(),
            marker,
            vec![PositionId(1), PositionId(9), PositionId(2)],
        );
        assert_eq!(ctx.force_close(), &[PositionId(1), PositionId(2)]);
    }

    #[test]
    fn apply_closes_positions_at_market_then_emits_reset_event() {
        let mut account = AccountState::new(10.0, WindowConfig::default());
        account.book_open(open_position(1, 2.0, 3.0), 0.0);
        account.book_open(open_position(2, 1.0, 1.0), 0.0);
        let cost = CostModel::frictionless();
        let mut ids = IdGen::new();
        let marker = Position::marker(PositionId(99), ResetReason::Profit, t0());
        let mut events = Vec::new();

        let ctx = ResetContext::new(
            ResetReason::Profit,
            t0(),
            marker,
            vec![PositionId(1), PositionId(2)],
        );
        let outcome = apply_reset(ctx, &mut account, &cost, &mut ids, &mut events);

        assert_eq!(outcome.closed.len(), 2);
        assert_eq!(outcome.marker_id, PositionId(99));
        assert!(account.open_positions.is_empty());
        // position 1 sold at 3x market, not at entry and not at zero PnL
        assert!((account.cash - (7.0 + 6.0 + 1.0)).abs() < 1e-12);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, PortfolioEventKind::Closed);
        assert_eq!(events[1].kind, PortfolioEventKind::Closed);
        assert_eq!(events[2].kind, PortfolioEventKind::ResetTriggered);
        assert_eq!(events[2].position_id, PositionId(99));
        let payload = events[2].reset().unwrap();
        assert_eq!(payload.closed_positions_count, 2);
        assert_eq!(payload.reset_reason, ResetReason::Profit);
        assert!(events.iter().all(|e| e.at == t0()));
        assert!(events[..2]
            .iter()
            .all(|e| e.reason.as_deref() == Some("profit_reset")));
    }

    #[test]
    fn marker_lands_in_closed_list_with_zero_economics() {
        let mut account = AccountState::new(10.0, WindowConfig::default());
        account.book_open(open_position(1, 2.0, 1.0), 0.0);
        let cost = CostModel::frictionless();
        let mut ids = IdGen::new();
        let mut events = Vec::new();
        let cash_before = account.cash;

        let ctx = ResetContext::new(
            ResetReason::CapacityPrune,
            t0(),
            Position::marker(PositionId(50), ResetReason::CapacityPrune, t0()),
            vec![PositionId(1)],
        );
        apply_reset(ctx, &mut account, &cost, &mut ids, &mut events);

        let marker = account
            .closed_positions
            .iter()
            .find(|p| p.marker)
            .unwrap();
        assert_eq!(marker.size, 0.0);
        assert_eq!(marker.record.swap_fees, 0.0);
        assert_eq!(marker.record.network_fees, 0.0);
        assert_eq!(marker.record.realized_pnl, 0.0);
        // marker contributed nothing to cash beyond the real closure
        assert!((account.cash - (cash_before + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn unknown_ids_are_skipped_and_not_counted() {
        let mut account = AccountState::new(10.0, WindowConfig::default());
        account.book_open(open_position(1, 1.0, 1.0), 0.0);
        let cost = CostModel::frictionless();
        let mut ids = IdGen::new();
        let mut events = Vec::new();

        let ctx = ResetContext::new(
            ResetReason::CloseAll,
            t0(),
            Position::marker(PositionId(50), ResetReason::CloseAll, t0()),
            vec![PositionId(1), PositionId(77)],
        );
        let outcome = apply_reset(ctx, &mut account, &cost, &mut ids, &mut events);
        assert_eq!(outcome.closed, vec![PositionId(1)]);
        assert_eq!(events.last().unwrap().reset().unwrap().closed_positions_count, 1);
    }
}
