//! Admission control — the capacity/exposure gate for opening positions.
//!
//! A blueprint is admitted in full or not at all; there is no partial
//! admission.

use crate::config::{AllocationConfig, ReplayConfig};
use crate::engine::account::AccountState;

/// Why admission control turned a blueprint away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionReject {
    /// Open-position count is already at the configured maximum.
    BookFull,
    /// Candidate size exceeds current cash.
    InsufficientCash,
    /// Open notional plus the candidate would exceed the exposure ceiling.
    ExposureCeiling,
}

impl AdmissionReject {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionReject::BookFull => "book_full",
            AdmissionReject::InsufficientCash => "insufficient_cash",
            AdmissionReject::ExposureCeiling => "exposure_ceiling",
        }
    }

    /// Whether this rejection counts toward the capacity-blocked window.
    pub fn is_capacity_block(&self) -> bool {
        matches!(
            self,
            AdmissionReject::BookFull | AdmissionReject::ExposureCeiling
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionDecision {
    Admit { size: f64 },
    Reject(AdmissionReject),
}

/// Size a candidate position from the configured allocation mode.
pub fn candidate_size(account: &AccountState, config: &ReplayConfig) -> f64 {
    match config.allocation {
        AllocationConfig::Fixed { percent } => percent * account.initial_balance,
        AllocationConfig::Dynamic { percent } => percent * account.cash,
    }
}

/// Decide whether a new position may open right now.
pub fn can_open(account: &AccountState, config: &ReplayConfig) -> AdmissionDecision {
    if account.open_real_count() >= config.max_open_positions {
        return AdmissionDecision::Reject(AdmissionReject::BookFull);
    }

    let size = candidate_size(account, config);
    if size > account.cash {
        return AdmissionDecision::Reject(AdmissionReject::InsufficientCash);
    }

    if let Some(cap) = config.max_exposure_pct {
        let equity = account.equity();
        if equity > 0.0 && account.open_notional() + size > cap * equity {
            return AdmissionDecision::Reject(AdmissionReject::ExposureCeiling);
        }
    }

    AdmissionDecision::Admit { size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::domain::{Position, PositionId};
    use chrono::{TimeZone, Utc};

    fn config(allocation: AllocationConfig) -> ReplayConfig {
        ReplayConfig::new(10.0, allocation)
    }

    fn account_with_open(count: u64, size_each: f64) -> AccountState {
        let mut acct = AccountState::new(10.0, WindowConfig::default());
        for id in 0..count {
            let pos = Position::open(
                PositionId(id + 1),
                format!("sig-{id}"),
                "momentum".into(),
                format!("mint-{id}"),
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                1.0e-6,
                None,
                size_each,
                1.0e-6,
                0.0,
            );
            acct.book_open(pos, 0.0);
        }
        acct
    }

    #[test]
    fn fixed_mode_sizes_from_initial_balance() {
        let mut cfg = config(AllocationConfig::Fixed { percent: 0.5 });
        cfg.max_open_positions = 10;
        let acct = account_with_open(1, 2.0); // cash now 8.0
        assert_eq!(candidate_size(&acct, &cfg), 5.0);
    }

    #[test]
    fn dynamic_mode_sizes_from_current_balance() {
        let cfg = config(AllocationConfig::Dynamic { percent: 0.5 });
        let acct = account_with_open(1, 2.0); // cash now 8.0
        assert_eq!(candidate_size(&acct, &cfg), 4.0);
    }

    #[test]
    fn rejects_when_book_is_full() {
        let mut cfg = config(AllocationConfig::Fixed { percent: 0.1 });
        cfg.max_open_positions = 2;
        let acct = account_with_open(2, 1.0);
        assert_eq!(
            can_open(&acct, &cfg),
            AdmissionDecision::Reject(AdmissionReject::BookFull)
        );
    }

    #[test]
    fn rejects_when_size_exceeds_cash() {
        let cfg = config(AllocationConfig::Fixed { percent: 0.9 });
        let acct = account_with_open(2, 4.0); // cash now 2.0, candidate 9.0
        assert_eq!(
            can_open(&acct, &cfg),
            AdmissionDecision::Reject(AdmissionReject::InsufficientCash)
        );
    }

    #[test]
    fn rejects_on_exposure_ceiling() {
        let mut cfg = config(AllocationConfig::Fixed { percent: 0.3 });
        cfg.max_exposure_pct = Some(0.5);
        let acct = account_with_open(1, 4.0); // open 4.0 of equity 10.0
        // candidate 3.0 would take exposure to 7.0 > 5.0
        assert_eq!(
            can_open(&acct, &cfg),
            AdmissionDecision::Reject(AdmissionReject::ExposureCeiling)
        );
    }

    #[test]
    fn admits_with_computed_size() {
        let cfg = config(AllocationConfig::Fixed { percent: 0.5 });
        let acct = account_with_open(0, 0.0);
        assert_eq!(can_open(&acct, &cfg), AdmissionDecision::Admit { size: 5.0 });
    }

    #[test]
    fn capacity_block_classification() {
        assert!(AdmissionReject::BookFull.is_capacity_block());
        assert!(AdmissionReject::ExposureCeiling.is_capacity_block());
        assert!(!AdmissionReject::InsufficientCash.is_capacity_block());
    }
}
