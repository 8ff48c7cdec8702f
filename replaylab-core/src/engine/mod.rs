//! Replay engine — account state, admission control, the replay driver,
//! and the result bundle.

pub mod account;
pub mod admission;
pub mod driver;
pub mod result;

pub use account::{AccountState, ClosedFill, CycleTrackers, PartialFill};
pub use admission::{can_open, candidate_size, AdmissionDecision, AdmissionReject};
pub use driver::{replay, replay_with, ReplayError};
pub use result::{EquitySample, Ledger, ReplayResult, ReplayStats};
