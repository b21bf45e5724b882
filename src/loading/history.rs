//! Bounded record of settled operations, used for statistics only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Number of entries returned in [`OperationStats::recent`].
pub const RECENT_OPERATIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Error,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHistoryEntry {
    pub key: String,
    pub message: String,
    pub status: OperationStatus,
    /// Wall-clock duration, successes only.
    pub duration: Option<Duration>,
    /// Internal failure message, failures only; the user-facing text lives
    /// on the enhanced error.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
}

/// Read-only snapshot derived from the history.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Most recent entries, newest last.
    pub recent: Vec<OperationHistoryEntry>,
}

/// Ring buffer; the oldest entry is evicted once capacity is reached.
#[derive(Debug, Clone)]
pub struct OperationHistory {
    entries: VecDeque<OperationHistoryEntry>,
    capacity: usize,
}

impl OperationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: OperationHistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &OperationHistoryEntry> {
        self.entries.iter()
    }

    pub fn stats(&self) -> OperationStats {
        let count = |status: OperationStatus| self.entries.iter().filter(|e| e.status == status).count();
        let skip = self.entries.len().saturating_sub(RECENT_OPERATIONS);

        OperationStats {
            total: self.entries.len(),
            successful: count(OperationStatus::Success),
            failed: count(OperationStatus::Error),
            aborted: count(OperationStatus::Aborted),
            recent: self.entries.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
