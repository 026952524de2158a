//! Dwell-Time Debounce

use crate::{MotionState, MotionStateTransition};

/// Commits a raw state only after it has been observed continuously for the
/// dwell time. Any different raw state in between restarts the clock.
#[derive(Debug, Clone)]
pub struct StateDebouncer {
    dwell_ms: i64,
    current: MotionState,
    candidate: Option<(MotionState, i64)>,
}

impl StateDebouncer {
    pub fn new(dwell_ms: i64) -> Self {
        Self {
            dwell_ms: dwell_ms.max(0),
            current: MotionState::Unknown,
            candidate: None,
        }
    }

    /// Committed state
    pub fn current(&self) -> MotionState {
        self.current
    }

    /// Pending state and the timestamp it was first seen
    pub fn candidate(&self) -> Option<(MotionState, i64)> {
        self.candidate
    }

    /// Feed one raw classification
    pub fn feed(&mut self, raw: MotionState, timestamp_ms: i64) -> Option<MotionStateTransition> {
        if raw == self.current {
            self.candidate = None;
            return None;
        }

        let since = match self.candidate {
            Some((state, since)) if state == raw => since,
            _ => {
                self.candidate = Some((raw, timestamp_ms));
                timestamp_ms
            }
        };

        if timestamp_ms.saturating_sub(since) < self.dwell_ms {
            return None;
        }

        let transition = MotionStateTransition {
            from: self.current,
            to: raw,
            timestamp_ms,
        };
        self.current = raw;
        self.candidate = None;
        Some(transition)
    }
}
