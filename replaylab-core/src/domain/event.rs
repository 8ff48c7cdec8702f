//! PortfolioEvent — the append-only, strictly ordered ledger of what the
//! simulated portfolio did.
//!
//! This module is the single source of the event-type enum and its
//! intra-timestamp rank; no other module defines event kinds or reset
//! reasons.

use super::ids::{EventId, PositionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which portfolio-level policy forced a set of closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    Profit,
    CapacityPrune,
    CloseAll,
    Manual,
}

impl ResetReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetReason::Profit => "profit_reset",
            ResetReason::CapacityPrune => "capacity_prune",
            ResetReason::CloseAll => "close_all",
            ResetReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioEventKind {
    Opened,
    PartialExit,
    Closed,
    ResetTriggered,
}

impl PortfolioEventKind {
    /// Intra-timestamp ordering rank. Within one instant, closures are
    /// recorded before the reset that caused them, and an open is never seen
    /// after its own same-instant exit.
    pub fn rank(&self) -> u8 {
        match self {
            PortfolioEventKind::Opened => 0,
            PortfolioEventKind::PartialExit => 1,
            PortfolioEventKind::Closed => 2,
            PortfolioEventKind::ResetTriggered => 3,
        }
    }
}

/// What kind of transaction a fill payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Entry,
    PartialExit,
    FinalExit,
    /// Close not scheduled by the blueprint: max-hold or reset.
    ForcedClose,
}

/// Execution detail attached to OPENED / PARTIAL_EXIT / CLOSED events.
///
/// Field names are the wire contract with the downstream report/audit
/// consumers; do not rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillPayload {
    pub execution_type: ExecutionType,
    pub raw_price: f64,
    pub exec_price: f64,
    /// Signed notional delta: positive on entry, negative on exits.
    pub qty_delta: f64,
    pub fees_sol: f64,
    pub pnl_sol_delta: f64,
    /// Forward-compatible extension fields.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Detail attached to RESET_TRIGGERED events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetPayload {
    pub reset_reason: ResetReason,
    pub closed_positions_count: usize,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Tagged payload union; serializes to the bare meta object the CSV layer
/// embeds as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Fill(FillPayload),
    Reset(ResetPayload),
}

/// One immutable ledger entry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEvent {
    #[serde(rename = "event_id")]
    pub id: EventId,
    #[serde(rename = "timestamp")]
    pub at: DateTime<Utc>,
    #[serde(rename = "event_type")]
    pub kind: PortfolioEventKind,
    pub strategy: String,
    pub signal_id: String,
    pub contract_address: String,
    pub position_id: PositionId,
    /// Canonical reason string (exit reason or reset reason), when one
    /// applies.
    pub reason: Option<String>,
    #[serde(rename = "meta")]
    pub payload: EventPayload,
}

impl PortfolioEvent {
    pub fn fill(&self) -> Option<&FillPayload> {
        match &self.payload {
            EventPayload::Fill(p) => Some(p),
            EventPayload::Reset(_) => None,
        }
    }

    pub fn reset(&self) -> Option<&ResetPayload> {
        match &self.payload {
            EventPayload::Reset(p) => Some(p),
            EventPayload::Fill(_) => None,
        }
    }
}

/// Sort the ledger by `(timestamp, kind rank)`, stable otherwise.
pub fn sort_ledger(events: &mut [PortfolioEvent]) {
    events.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.kind.rank().cmp(&b.kind.rank())));
}
