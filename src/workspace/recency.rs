//! Recently-opened path tracking.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Bounds for [`RecencyRecords`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyConfig {
    /// Records kept, most recent first.
    pub max_records: usize,
    /// Timestamps kept per record, newest last.
    pub max_timestamps: usize,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            max_records: 64,
            max_timestamps: 10,
        }
    }
}

/// One opened path and when it was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyRecord {
    pub key: String,
    /// Open times in ms, oldest first.
    pub timestamps: Vec<u64>,
}

impl RecencyRecord {
    pub fn latest(&self) -> u64 {
        self.timestamps.last().copied().unwrap_or(0)
    }
}

/// Open history, most recently touched record first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecencyRecords {
    records: Vec<RecencyRecord>,
}

impl RecencyRecords {
    pub fn new(records: Vec<RecencyRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RecencyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record an open of `key` at `timestamp`. An existing record gains a
    /// timestamp and moves to the front; both bounds of `config` are then
    /// enforced.
    pub fn update_record(&self, key: &str, timestamp: u64, config: &RecencyConfig) -> Self {
        let mut records = self.records.clone();
        let mut record = match records.iter().position(|r| r.key == key) {
            Some(i) => records.remove(i),
            None => RecencyRecord {
                key: key.to_owned(),
                timestamps: Vec::new(),
            },
        };
        record.timestamps.push(timestamp);
        let excess = record.timestamps.len().saturating_sub(config.max_timestamps);
        record.timestamps.drain(..excess);

        records.insert(0, record);
        records.truncate(config.max_records);
        Self { records }
    }

    /// Keys present in `known`, by latest timestamp, newest first.
    pub fn recent_keys<'a>(&self, known: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let known: HashSet<&str> = known.into_iter().collect();
        let mut present: Vec<&RecencyRecord> = self
            .records
            .iter()
            .filter(|r| known.contains(r.key.as_str()))
            .collect();
        // Stable: ties keep front-of-list order.
        present.sort_by(|a, b| b.latest().cmp(&a.latest()));
        present.into_iter().map(|r| r.key.clone()).collect()
    }
}
