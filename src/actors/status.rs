//! Availability state machine
//!
//! Pure classification of probe values and the UP/DOWN transition rule, kept
//! free of I/O so it can be tested exhaustively.

use serde::{Deserialize, Serialize};

use crate::storage::MonitorStatus;

/// Classification of one probe value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Up(i64),
    Down(i64),
    /// Exactly zero: neither confirms nor refutes availability
    Inconclusive,
}

impl Outcome {
    pub fn from_value(value: i64) -> Self {
        match value {
            v if v < 0 => Outcome::Down(v),
            v if v > 0 => Outcome::Up(v),
            _ => Outcome::Inconclusive,
        }
    }

    /// The value persisted as a sample
    pub fn value(&self) -> i64 {
        match self {
            Outcome::Up(v) | Outcome::Down(v) => *v,
            Outcome::Inconclusive => 0,
        }
    }
}

/// Tracks the last known status of one monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTracker {
    current: MonitorStatus,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(MonitorStatus::Up)
    }
}

impl StatusTracker {
    pub fn new(initial: MonitorStatus) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> MonitorStatus {
        self.current
    }

    /// Feed one outcome, returning the new status if it changed
    pub fn observe(&mut self, outcome: Outcome) -> Option<MonitorStatus> {
        let next = match (outcome, self.current) {
            (Outcome::Down(_), MonitorStatus::Up) => MonitorStatus::Down,
            (Outcome::Up(_), MonitorStatus::Down) => MonitorStatus::Up,
            _ => return None,
        };
        self.current = next;
        Some(next)
    }
}
