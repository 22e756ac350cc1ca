//! Bounded retained history for one log channel

use super::{LogEntry, LogFilter};
use crate::types::LogLevel;
use std::collections::VecDeque;

/// Per-level entry counts (the statistics tiles of the log viewer)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

impl LevelCounts {
    pub fn get(&self, level: LogLevel) -> usize {
        match level {
            LogLevel::Debug => self.debug,
            LogLevel::Info => self.info,
            LogLevel::Warn => self.warn,
            LogLevel::Error => self.error,
        }
    }

    pub fn total(&self) -> usize {
        self.debug + self.info + self.warn + self.error
    }
}

/// Ring of the most recent entries. Never holds more than `capacity`.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full. Returns the evicted entry.
    pub fn push(&mut self, entry: LogEntry) -> Option<LogEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn filtered(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> LevelCounts {
        let mut counts = LevelCounts::default();
        for entry in &self.entries {
            match entry.level {
                LogLevel::Debug => counts.debug += 1,
                LogLevel::Info => counts.info += 1,
                LogLevel::Warn => counts.warn += 1,
                LogLevel::Error => counts.error += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogChannel;
    use chrono::Local;

    fn entry(id: u64, level: LogLevel) -> LogEntry {
        LogEntry {
            id,
            timestamp: Local::now(),
            level,
            source: "test".to_string(),
            channel: LogChannel::Services,
            message: format!("message {}", id),
        }
    }

    #[test]
    fn test_push_evicts_oldest_beyond_capacity() {
        let mut buffer = LogBuffer::new(3);
        for id in 0..5 {
            buffer.push(entry(id, LogLevel::Info));
        }
        assert_eq!(buffer.len(), 3);
        let ids: Vec<u64> = buffer.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_push_returns_evicted_entry() {
        let mut buffer = LogBuffer::new(1);
        assert!(buffer.push(entry(1, LogLevel::Info)).is_none());
        let evicted = buffer.push(entry(2, LogLevel::Info));
        assert_eq!(evicted.map(|e| e.id), Some(1));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = LogBuffer::new(0);
        buffer.push(entry(1, LogLevel::Info));
        buffer.push(entry(2, LogLevel::Info));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_counts_per_level() {
        let mut buffer = LogBuffer::new(10);
        buffer.push(entry(1, LogLevel::Error));
        buffer.push(entry(2, LogLevel::Error));
        buffer.push(entry(3, LogLevel::Debug));
        let counts = buffer.counts();
        assert_eq!(counts.error, 2);
        assert_eq!(counts.debug, 1);
        assert_eq!(counts.get(LogLevel::Info), 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_clear() {
        let mut buffer = LogBuffer::new(10);
        buffer.push(entry(1, LogLevel::Info));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
