//! TradeBlueprint — an upstream-computed, immutable description of one
//! intended trade: entry plus the scheduled partial/final exits, independent
//! of portfolio sizing or execution cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a scheduled exit (or forced close) happened.
///
/// This is the only place exit reasons are defined; events serialize the
/// canonical snake_case string from [`ExitReason::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Timeout,
    Manual,
    /// Position age exceeded the configured maximum hold duration.
    MaxHold,
    /// Partial-exit schedule ran dry with no final exit; remainder sold.
    ScheduleExhausted,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Timeout => "timeout",
            ExitReason::Manual => "manual",
            ExitReason::MaxHold => "max_hold",
            ExitReason::ScheduleExhausted => "schedule_exhausted",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall outcome the upstream strategy recorded for a blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintOutcome {
    TakeProfit,
    StopLoss,
    Timeout,
    Manual,
    /// Upstream decided the signal never becomes a trade. The replay driver
    /// skips these without touching the ledger.
    NoEntry,
}

/// One scheduled partial exit: at `at`, sell `fraction` of the *remaining*
/// size once price reaches `multiple` × entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialExitIntent {
    pub at: DateTime<Utc>,
    /// Multiple of the raw entry price at which this exit fires.
    pub multiple: f64,
    /// Fraction of the remaining size to sell, in [0, 1].
    pub fraction: f64,
}

/// The scheduled final exit, if the upstream strategy recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalExitIntent {
    pub at: DateTime<Utc>,
    pub reason: ExitReason,
}

/// Strategy-computed trade intent, consumed read-only by the replay driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeBlueprint {
    pub signal_id: String,
    pub strategy: String,
    pub contract_address: String,
    pub entry_time: DateTime<Utc>,
    /// Raw (pre-slippage) entry price. Non-positive values mark a corrupt
    /// blueprint; the driver skips and counts them.
    pub entry_price: f64,
    /// Market-cap proxy at entry, when the upstream pipeline had one.
    pub market_cap: Option<f64>,
    /// Ordered partial-exit schedule.
    #[serde(default)]
    pub partial_exits: Vec<PartialExitIntent>,
    pub final_exit: Option<FinalExitIntent>,
    /// Multiple of entry realized at the final exit.
    pub realized_multiple: f64,
    /// Highest multiple of entry the trade ever reached.
    pub max_multiple: f64,
    pub outcome: Option<BlueprintOutcome>,
}

impl TradeBlueprint {
    /// Whether the driver should skip this blueprint without ledger entries.
    pub fn is_no_entry(&self) -> bool {
        self.entry_price <= 0.0 || self.outcome == Some(BlueprintOutcome::NoEntry)
    }

    /// Final-exit multiple to replay, falling back to 1.0 when the upstream
    /// summary is unusable.
    pub fn final_multiple(&self) -> f64 {
        if self.realized_multiple.is_finite() && self.realized_multiple > 0.0 {
            self.realized_multiple
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bp(price: f64, outcome: Option<BlueprintOutcome>) -> TradeBlueprint {
        TradeBlueprint {
            signal_id: "sig-1".into(),
            strategy: "momentum".into(),
            contract_address: "So11111111111111111111111111111111111111112".into(),
            entry_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            entry_price: price,
            market_cap: Some(250_000.0),
            partial_exits: vec![],
            final_exit: None,
            realized_multiple: 2.0,
            max_multiple: 3.5,
            outcome,
        }
    }

    #[test]
    fn no_entry_detection() {
        assert!(!bp(1.0e-6, Some(BlueprintOutcome::TakeProfit)).is_no_entry());
        assert!(bp(0.0, Some(BlueprintOutcome::TakeProfit)).is_no_entry());
        assert!(bp(-1.0, None).is_no_entry());
        assert!(bp(1.0e-6, Some(BlueprintOutcome::NoEntry)).is_no_entry());
    }

    #[test]
    fn final_multiple_falls_back_on_garbage() {
        let mut b = bp(1.0e-6, None);
        assert_eq!(b.final_multiple(), 2.0);
        b.realized_multiple = f64::NAN;
        assert_eq!(b.final_multiple(), 1.0);
        b.realized_multiple = -0.5;
        assert_eq!(b.final_multiple(), 1.0);
    }

    #[test]
    fn exit_reason_canonical_strings() {
        assert_eq!(ExitReason::TakeProfit.as_str(), "take_profit");
        assert_eq!(ExitReason::MaxHold.as_str(), "max_hold");
        assert_eq!(ExitReason::ScheduleExhausted.to_string(), "schedule_exhausted");
    }

    #[test]
    fn blueprint_serialization_roundtrip() {
        let b = bp(2.5e-7, Some(BlueprintOutcome::StopLoss));
        let json = serde_json::to_string(&b).unwrap();
        let back: TradeBlueprint = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
