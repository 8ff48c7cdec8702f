//! Result bundle for a complete replay run.

use crate::domain::{PortfolioEvent, Position};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One equity observation. The sampler is a stub in this version: replays
/// return an empty curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub at: DateTime<Utc>,
    pub equity: f64,
}

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    /// Blueprints admitted and opened.
    pub opened: u64,
    /// Blueprints skipped for corrupt input (non-positive price, no-entry).
    pub skipped_invalid: u64,
    /// Blueprints rejected by admission control.
    pub skipped_admission: u64,
    pub profit_resets: u64,
    pub capacity_resets: u64,
}

/// Counters plus the ordered event ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub stats: ReplayStats,
    pub events: Vec<PortfolioEvent>,
}

/// Everything a replay produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    /// All positions, open and closed, ordered by entry time.
    pub positions: Vec<Position>,
    /// Always empty in this version.
    pub equity_curve: Vec<EquitySample>,
    pub ledger: Ledger,
    /// Cash at the end of the run.
    pub final_balance: f64,
    /// Highest cash balance observed during the run.
    pub peak_balance: f64,
}

impl ReplayResult {
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| !p.is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_default_to_zero() {
        let stats = ReplayStats::default();
        assert_eq!(stats.opened, 0);
        assert_eq!(stats.skipped_invalid, 0);
        assert_eq!(stats.skipped_admission, 0);
        assert_eq!(stats.profit_resets, 0);
        assert_eq!(stats.capacity_resets, 0);
    }
}
