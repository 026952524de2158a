//! Per-type Re-arm and Cooldown

use crate::BehaviourType;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct GateState {
    armed: bool,
    last_fired_ms: Option<i64>,
}

impl Default for GateState {
    fn default() -> Self {
        Self {
            armed: true,
            last_fired_ms: None,
        }
    }
}

/// Suppresses repeated events while a condition stays true.
///
/// A type fires once when its condition becomes true, then stays disarmed
/// until the condition clears. Re-armed types are still held back until
/// their cooldown (in sample time) has elapsed.
#[derive(Debug, Clone, Default)]
pub struct EventGate {
    cooldowns_ms: HashMap<BehaviourType, i64>,
    states: HashMap<BehaviourType, GateState>,
}

impl EventGate {
    pub fn new(cooldowns_ms: HashMap<BehaviourType, i64>) -> Self {
        Self {
            cooldowns_ms,
            states: HashMap::new(),
        }
    }

    /// Report the condition for a type; returns true when an event should fire
    pub fn evaluate(&mut self, behaviour: BehaviourType, triggered: bool, timestamp_ms: i64) -> bool {
        let cooldown = self.cooldowns_ms.get(&behaviour).copied().unwrap_or(0);
        let state = self.states.entry(behaviour).or_default();

        if !triggered {
            state.armed = true;
            return false;
        }
        if !state.armed {
            return false;
        }
        if let Some(last) = state.last_fired_ms {
            if timestamp_ms.saturating_sub(last) < cooldown {
                debug!("{} suppressed: in cooldown", behaviour);
                return false;
            }
        }

        state.armed = false;
        state.last_fired_ms = Some(timestamp_ms);
        true
    }

    /// Forget all firing history
    pub fn clear(&mut self) {
        self.states.clear();
    }
}
