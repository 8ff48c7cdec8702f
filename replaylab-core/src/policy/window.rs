//! Sliding-window bookkeeping for the capacity policy.
//!
//! Tracks three timestamp streams — admissible signals, capacity-blocked
//! signals, and closures — over either an elapsed-time window or a
//! last-N-signals window, plus the cooldown mark left by the previous
//! capacity reset.

use crate::config::{CooldownConfig, WindowConfig};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0) as i64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResetMark {
    at: DateTime<Utc>,
    signal_seq: u64,
}

/// Rolling capacity counters feeding the capacity reset/prune policy.
#[derive(Debug, Clone)]
pub struct CapacityTracker {
    window: WindowConfig,
    signals: VecDeque<DateTime<Utc>>,
    blocked: VecDeque<DateTime<Utc>>,
    closures: VecDeque<DateTime<Utc>>,
    /// Signals ever recorded, monotonic across the whole run.
    total_signals: u64,
    last_reset: Option<ResetMark>,
}

impl CapacityTracker {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            signals: VecDeque::new(),
            blocked: VecDeque::new(),
            closures: VecDeque::new(),
            total_signals: 0,
            last_reset: None,
        }
    }

    /// Record a signal that made it past input validation.
    pub fn record_signal(&mut self, at: DateTime<Utc>) {
        self.signals.push_back(at);
        self.total_signals += 1;
        self.trim(at);
    }

    /// Record a capacity-blocked signal (book full / exposure ceiling).
    pub fn record_blocked(&mut self, at: DateTime<Utc>) {
        self.blocked.push_back(at);
        self.trim(at);
    }

    /// Record a real position closing, however it closed.
    pub fn record_closure(&mut self, at: DateTime<Utc>) {
        self.closures.push_back(at);
        self.trim(at);
    }

    /// Mark a capacity reset, arming the cooldown.
    pub fn note_reset(&mut self, at: DateTime<Utc>) {
        self.last_reset = Some(ResetMark {
            at,
            signal_seq: self.total_signals,
        });
    }

    pub fn signals_in_window(&self) -> usize {
        self.signals.len()
    }

    pub fn blocked_in_window(&self) -> usize {
        self.blocked.len()
    }

    pub fn closures_in_window(&self) -> usize {
        self.closures.len()
    }

    /// Capacity-blocked fraction of signals in the window; 0 when the
    /// window holds no signals.
    pub fn blocked_ratio(&self) -> f64 {
        if self.signals.is_empty() {
            0.0
        } else {
            self.blocked.len() as f64 / self.signals.len() as f64
        }
    }

    /// Whether the configured cooldown since the last capacity reset has
    /// passed. Always true before the first reset.
    pub fn cooldown_elapsed(&self, cooldown: &CooldownConfig, now: DateTime<Utc>) -> bool {
        let Some(mark) = self.last_reset else {
            return true;
        };
        match cooldown {
            CooldownConfig::Time { hours } => now - mark.at >= hours_to_duration(*hours),
            CooldownConfig::Signals { count } => {
                self.total_signals - mark.signal_seq >= *count as u64
            }
        }
    }

    fn trim(&mut self, now: DateTime<Utc>) {
        match self.window {
            WindowConfig::Time { hours } => {
                let cutoff = now - hours_to_duration(hours);
                Self::drop_before(&mut self.signals, cutoff);
                Self::drop_before(&mut self.blocked, cutoff);
                Self::drop_before(&mut self.closures, cutoff);
            }
            WindowConfig::Signals { count } => {
                while self.signals.len() > count {
                    self.signals.pop_front();
                }
                match self.signals.front().copied() {
                    Some(start) => {
                        Self::drop_before(&mut self.blocked, start);
                        Self::drop_before(&mut self.closures, start);
                    }
                    None => {
                        self.blocked.clear();
                        self.closures.clear();
                    }
                }
            }
        }
    }

    fn drop_before(deque: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while deque.front().is_some_and(|&at| at < cutoff) {
            deque.pop_front();
        }
    }
}
