//! Injected diagnostics sink for replay decisions.
//!
//! The reset policies and admission control report their verdicts here
//! instead of printing behind environment-variable toggles. The default
//! sink drops everything.

use crate::domain::ResetReason;
use chrono::{DateTime, Utc};

/// Observer for replay-internal decisions. All methods default to no-ops so
/// implementors override only what they care about.
pub trait ReplayDiagnostics {
    /// A reset policy was eligible to run but a guard suppressed it.
    fn reset_suppressed(&self, _at: DateTime<Utc>, _reason: ResetReason, _guard: &str) {}

    /// A reset fired and force-closed `closed` positions.
    fn reset_applied(&self, _at: DateTime<Utc>, _reason: ResetReason, _closed: usize) {}

    /// Admission control rejected a blueprint.
    fn admission_rejected(&self, _at: DateTime<Utc>, _signal_id: &str, _why: &str) {}
}

/// Default sink: ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl ReplayDiagnostics for NoopDiagnostics {}
