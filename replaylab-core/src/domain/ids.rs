use serde::{Deserialize, Serialize};
use std::fmt;

/// Position identifier, unique within one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos-{}", self.0)
    }
}

/// Ledger event identifier, unique within one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Monotonic id source for one replay run.
///
/// Plain counters, no wall clock and no RNG, so two replays over identical
/// inputs assign identical ids.
#[derive(Debug, Default)]
pub struct IdGen {
    next_position: u64,
    next_event: u64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_position(&mut self) -> PositionId {
        self.next_position += 1;
        PositionId(self.next_position)
    }

    pub fn next_event(&mut self) -> EventId {
        self.next_event += 1;
        EventId(self.next_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let mut ids = IdGen::new();
        assert_eq!(ids.next_position(), PositionId(1));
        assert_eq!(ids.next_position(), PositionId(2));
        assert_eq!(ids.next_event(), EventId(1));
        assert_eq!(ids.next_event(), EventId(2));
    }

    #[test]
    fn display_forms() {
        assert_eq!(PositionId(7).to_string(), "pos-7");
        assert_eq!(EventId(12).to_string(), "evt-12");
    }

    #[test]
    fn two_generators_assign_identical_sequences() {
        let mut a = IdGen::new();
        let mut b = IdGen::new();
        for _ in 0..10 {
            assert_eq!(a.next_position(), b.next_position());
            assert_eq!(a.next_event(), b.next_event());
        }
    }
}
