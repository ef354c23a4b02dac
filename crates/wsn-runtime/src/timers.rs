//! One-shot timer table

use std::collections::HashMap;

use tokio::time::Instant;

use wsn_core::TimerId;

/// Pending deadlines, at most one per timer
#[derive(Clone, Debug, Default)]
pub struct TimerTable {
    deadlines: HashMap<TimerId, Instant>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `timer` for `at`, superseding any pending deadline
    pub fn arm(&mut self, timer: TimerId, at: Instant) {
        if let Some(previous) = self.deadlines.insert(timer, at) {
            tracing::trace!(?timer, ?previous, "timer re-armed");
        }
    }

    /// Earliest pending deadline. Ties go to the lower timer id.
    pub fn next(&self) -> Option<(TimerId, Instant)> {
        self.deadlines
            .iter()
            .map(|(timer, at)| (*timer, *at))
            .min_by_key(|(timer, at)| (*at, *timer))
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(TimerId, Instant)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(timer, at)| (*timer, *at))
            .collect();
        due.sort_by_key(|(timer, at)| (*at, *timer));

        for (timer, _) in &due {
            self.deadlines.remove(timer);
        }
        due.into_iter().map(|(timer, _)| timer).collect()
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.deadlines.contains_key(&timer)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
