//! Domain types: blueprints, positions, the event ledger, and ids.

pub mod blueprint;
pub mod event;
pub mod ids;
pub mod position;

pub use blueprint::{
    BlueprintOutcome, ExitReason, FinalExitIntent, PartialExitIntent, TradeBlueprint,
};
pub use event::{
    sort_ledger, EventPayload, ExecutionType, FillPayload, PortfolioEvent, PortfolioEventKind,
    ResetPayload, ResetReason,
};
pub use ids::{EventId, IdGen, PositionId};
pub use position::{ExecutionRecord, Position, PositionStatus};
