use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::event::{CrashEvent, CrashType};

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Bounded, append-only crash history. Oldest insertion is evicted first.
#[derive(Debug, Clone)]
pub struct CrashEventLog {
    events: VecDeque<CrashEvent>,
    capacity: usize,
}

impl CrashEventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        CrashEventLog {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, returning the evicted one if the log was full
    pub fn append(&mut self, event: CrashEvent) -> Option<CrashEvent> {
        let evicted = if self.events.len() >= self.capacity {
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &CrashEvent> {
        self.events.iter()
    }

    /// Newest first, as shown in the history dialog
    pub fn recent(&self) -> impl Iterator<Item = &CrashEvent> {
        self.events.iter().rev()
    }

    pub fn latest(&self) -> Option<&CrashEvent> {
        self.events.back()
    }

    pub fn to_vec(&self) -> Vec<CrashEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn summary(&self) -> HistorySummary {
        let mut summary = HistorySummary::default();
        for event in &self.events {
            match event.crash_type {
                CrashType::Minor => summary.minor += 1,
                CrashType::Moderate => summary.moderate += 1,
                CrashType::Severe => summary.severe += 1,
            }
            if event.reported {
                summary.reported += 1;
            } else if event.crash_type != CrashType::Minor {
                summary.cancelled += 1;
            }
        }
        summary.total = self.events.len();
        summary
    }
}

impl Default for CrashEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Counts over the retained history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: usize,
    pub minor: usize,
    pub moderate: usize,
    pub severe: usize,
    pub reported: usize,
    /// Escalated events the rider cancelled
    pub cancelled: usize,
}
