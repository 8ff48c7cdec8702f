//! Capacity reset/prune — relieve a saturated, slow-turning book.
//!
//! Triggered by window pressure, never by profitability, and it never
//! touches the profit-reset cycle trackers. `close_all` mode liquidates the
//! whole book; `prune` mode liquidates a filtered, oldest-first subset.

use crate::config::{CapacityMode, CapacityResetConfig};
use crate::domain::{Position, PositionId};
use crate::engine::account::AccountState;
use chrono::{DateTime, Utc};

/// Why the capacity policy did not fire this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityGuard {
    Disabled,
    /// No real open positions; nothing to relieve.
    EmptyBook,
    /// One or more pressure conditions not met.
    NotPressured,
    /// A previous capacity reset is still cooling down.
    CooldownActive,
    /// Fewer candidates than the configured minimum survived the filters,
    /// or the prune fraction rounded to zero.
    TooFewCandidates,
}

impl CapacityGuard {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityGuard::Disabled => "disabled",
            CapacityGuard::EmptyBook => "empty_book",
            CapacityGuard::NotPressured => "not_pressured",
            CapacityGuard::CooldownActive => "cooldown_active",
            CapacityGuard::TooFewCandidates => "too_few_candidates",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityVerdict {
    /// Force-close the whole book.
    CloseAll(Vec<PositionId>),
    /// Force-close the listed subset, oldest first.
    Prune(Vec<PositionId>),
    Suppressed(CapacityGuard),
}

fn mean_open_age_days(account: &AccountState, now: DateTime<Utc>) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for pos in account.open_real() {
        total += pos.age_days(now);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn is_pressured(
    config: &CapacityResetConfig,
    max_open_positions: usize,
    account: &AccountState,
    now: DateTime<Utc>,
) -> bool {
    if max_open_positions == 0 {
        return false;
    }
    let open_ratio = account.open_real_count() as f64 / max_open_positions as f64;
    if open_ratio < config.open_ratio {
        return false;
    }
    if account.capacity.signals_in_window() == 0 {
        return false;
    }
    if account.capacity.blocked_ratio() < config.blocked_ratio {
        return false;
    }
    mean_open_age_days(account, now) >= config.avg_hold_days
}

fn prune_candidate(pos: &Position, config: &CapacityResetConfig, now: DateTime<Utc>) -> bool {
    let prune = &config.prune;
    if pos.age_days(now) < prune.min_hold_days {
        return false;
    }
    // Positions without a market-cap proxy pass the valuation filter.
    if let (Some(cap), Some(mcap)) = (prune.max_market_cap, pos.market_cap) {
        if mcap > cap {
            return false;
        }
    }
    if pos.current_pnl_pct() > prune.max_current_pnl_pct {
        return false;
    }
    if let Some(protect) = prune.protect_multiple {
        if pos.peak_multiple >= protect {
            return false;
        }
    }
    true
}

/// Evaluate the capacity policy at the current instant.
///
/// Read-only: applying the verdict (and marking the cooldown) is the
/// driver's job, after the profit reset has had priority.
pub fn evaluate(
    config: &CapacityResetConfig,
    max_open_positions: usize,
    account: &AccountState,
    now: DateTime<Utc>,
) -> CapacityVerdict {
    if !config.enabled {
        return CapacityVerdict::Suppressed(CapacityGuard::Disabled);
    }
    if account.open_real_count() == 0 {
        return CapacityVerdict::Suppressed(CapacityGuard::EmptyBook);
    }
    if !is_pressured(config, max_open_positions, account, now) {
        return CapacityVerdict::Suppressed(CapacityGuard::NotPressured);
    }

    match config.mode {
        CapacityMode::CloseAll => {
            CapacityVerdict::CloseAll(account.open_real().map(|p| p.id).collect())
        }
        CapacityMode::Prune => {
            if !account
                .capacity
                .cooldown_elapsed(&config.prune.cooldown, now)
            {
                return CapacityVerdict::Suppressed(CapacityGuard::CooldownActive);
            }

            let mut candidates: Vec<&Position> = account
                .open_real()
                .filter(|p| prune_candidate(p, config, now))
                .collect();
            if candidates.len() < config.prune.min_candidates {
                return CapacityVerdict::Suppressed(CapacityGuard::TooFewCandidates);
            }

            let take = (candidates.len() as f64 * config.prune.fraction).round() as usize;
            if take == 0 {
                return CapacityVerdict::Suppressed(CapacityGuard::TooFewCandidates);
            }
            candidates.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.id.cmp(&b.id)));
            CapacityVerdict::Prune(candidates.into_iter().take(take).map(|p| p.id).collect())
        }
    }
}
