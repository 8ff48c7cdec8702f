//! Profit reset — liquidate the whole book once equity (or realized
//! balance) multiplies enough, then start a fresh cycle from the post-reset
//! balance.

use crate::config::{ProfitResetConfig, ResetBasis};
use crate::engine::account::AccountState;

/// Why the profit reset did not fire this step. Guard suppressions are not
/// errors; eligibility is simply re-evaluated on the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfitGuard {
    /// Policy off, or multiple <= 1.0 / non-finite.
    Disabled,
    /// Cycle baseline is non-positive; a ruined cycle can never re-arm.
    BaselineNonPositive,
    BelowThreshold,
    /// Eligible, but there are no real open positions to close.
    EmptyBook,
}

impl ProfitGuard {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitGuard::Disabled => "disabled",
            ProfitGuard::BaselineNonPositive => "baseline_non_positive",
            ProfitGuard::BelowThreshold => "below_threshold",
            ProfitGuard::EmptyBook => "empty_book",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfitVerdict {
    Eligible,
    Suppressed(ProfitGuard),
}

/// Evaluate profit-reset eligibility at the current instant.
///
/// Always refreshes the cycle's running equity peak as a side effect, so
/// the equity-peak basis sees highs even on steps where a guard fires.
pub fn evaluate(config: &ProfitResetConfig, account: &mut AccountState) -> ProfitVerdict {
    let equity = account.equity();
    if equity > account.cycle.equity_peak_in_cycle {
        account.cycle.equity_peak_in_cycle = equity;
    }

    if !config.enabled || !config.multiple.is_finite() || config.multiple <= 1.0 {
        return ProfitVerdict::Suppressed(ProfitGuard::Disabled);
    }

    let baseline = match config.basis {
        ResetBasis::EquityPeak => account.cycle.cycle_start_equity,
        ResetBasis::RealizedBalance => account.cycle.cycle_start_balance,
    };
    if baseline <= 0.0 {
        return ProfitVerdict::Suppressed(ProfitGuard::BaselineNonPositive);
    }

    let threshold = baseline * config.multiple;
    let tracked = match config.basis {
        ResetBasis::EquityPeak => account.cycle.equity_peak_in_cycle,
        ResetBasis::RealizedBalance => account.cash,
    };
    if tracked < threshold {
        return ProfitVerdict::Suppressed(ProfitGuard::BelowThreshold);
    }

    if account.open_real_count() == 0 {
        return ProfitVerdict::Suppressed(ProfitGuard::EmptyBook);
    }

    ProfitVerdict::Eligible
}
