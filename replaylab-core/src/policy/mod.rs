//! Portfolio-level reset policies and their shared apply mechanism.

pub mod capacity;
pub mod profit;
pub mod reset;
pub mod window;

pub use capacity::{CapacityGuard, CapacityVerdict};
pub use profit::{ProfitGuard, ProfitVerdict};
pub use reset::{apply_reset, ResetContext, ResetOutcome};
pub use window::CapacityTracker;
