//! ReplayLab Core — portfolio replay simulation engine.
//!
//! Replays independently-computed strategy trade intents (entry, partial
//! exits, final exit) through a simulated capital account, producing a
//! deterministic, time-ordered ledger of portfolio events and resulting
//! positions. Models execution costs (slippage, swap fees, network fees),
//! enforces admission control, and implements two self-correcting
//! portfolio-level policies:
//! - profit reset: liquidate the whole book once equity multiplies enough
//! - capacity reset/prune: liquidate or trim a saturated, slow-turning book
//!
//! The engine is single-threaded and synchronous: a pure in-memory fold
//! over a sorted blueprint sequence, with no I/O inside the replay loop.
//! Independent replays may run in parallel at the call site, one account
//! state each.

pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod policy;
pub mod pricing;

pub use config::{AllocationConfig, ConfigError, ReplayConfig};
pub use diagnostics::{NoopDiagnostics, ReplayDiagnostics};
pub use domain::{PortfolioEvent, PortfolioEventKind, Position, TradeBlueprint};
pub use engine::{replay, replay_with, ReplayError, ReplayResult};
pub use execution::CostModel;
pub use pricing::{NoPrices, PriceLookup, PriceTable};
