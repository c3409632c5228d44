use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::analyzer::{AnalysisResult, Severity};

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub date: DateTime<Utc>,
    pub processed_image_preview: String,
    pub detected_class: String,
    pub severity: Severity,
    pub dominant_condition: String,
}

impl HistoryEntry {
    pub fn new(analysis: &AnalysisResult, processed_image_preview: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date: Utc::now(),
            processed_image_preview,
            detected_class: analysis.detected_class.clone(),
            severity: analysis.severity,
            dominant_condition: analysis.dominant_condition.clone(),
        }
    }
}

/// Bounded in-memory log of recent analyses, newest first.
///
/// Entries are only ever added; the oldest falls off once `capacity` is reached.
pub struct AnalysisHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl AnalysisHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.lock().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for AnalysisHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
