//! Log aggregation
//!
//! Collects lines from supervised services, dispatched actions and tailed
//! files, tags them with level, source and timestamp, and keeps a bounded
//! per-channel history for the log viewer.
//!
//! # Module Structure
//! - `buffer` - bounded retained history for one channel
//! - `filter` - level and substring filtering
//! - `aggregator` - shared publish/subscribe hub
//! - `pipe` - readers turning child stdout/stderr into entries
//! - `tail` - file follower source
//! - `synthetic` - demo source that fabricates entries
//! - `stream` - the streaming toggle that runs sources for a channel

pub mod aggregator;
pub mod buffer;
pub mod filter;
pub mod pipe;
pub mod stream;
pub mod synthetic;
pub mod tail;

pub use aggregator::{LogAggregator, Subscription};
pub use buffer::{LevelCounts, LogBuffer};
pub use filter::LogFilter;
pub use stream::{LogSource, LogStream};
pub use synthetic::SyntheticSource;
pub use tail::FileTailer;

use crate::types::{LogChannel, LogLevel};
use chrono::{DateTime, Local};

/// Default number of entries retained per channel
pub const DEFAULT_RETENTION: usize = 100;

/// A single tagged log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Strictly increasing across the aggregator
    pub id: u64,
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub source: String,
    pub channel: LogChannel,
    pub message: String,
}

impl LogEntry {
    /// Wall-clock time shown in the viewer and in exports
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    /// Export format: `[timestamp] [LEVEL] [source] message`, always one
    /// line. Embedded CR/LF are written as `\r` / `\n`.
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.time_label(),
            self.level.label(),
            self.source,
            self.message.replace('\r', "\\r").replace('\n', "\\n")
        )
    }
}
