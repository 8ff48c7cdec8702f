//! Execution friction: slippage and fee pricing.

pub mod cost_model;

pub use cost_model::{CostModel, ExecutionProfile};
