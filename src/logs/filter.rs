//! Level and substring filtering for the log viewer

use super::LogEntry;
use crate::types::LogLevel;

/// Filter applied to a channel's retained entries.
///
/// `level: None` means "all levels". Text matching is case-insensitive and
/// checks both the message and the source; empty text matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub text: String,
}

impl LogFilter {
    pub fn new(level: Option<LogLevel>, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    /// True when neither level nor text narrows the view
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.text.is_empty()
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if self.text.is_empty() {
            return true;
        }
        let needle = self.text.to_lowercase();
        entry.message.to_lowercase().contains(&needle)
            || entry.source.to_lowercase().contains(&needle)
    }

    /// Cycle all -> debug -> info -> warn -> error -> all
    pub fn cycle_level(&mut self) {
        self.level = match self.level {
            None => Some(LogLevel::Debug),
            Some(LogLevel::Debug) => Some(LogLevel::Info),
            Some(LogLevel::Info) => Some(LogLevel::Warn),
            Some(LogLevel::Warn) => Some(LogLevel::Error),
            Some(LogLevel::Error) => None,
        };
    }

    /// Label for the level selector
    pub fn level_label(&self) -> String {
        self.level
            .map(|l| l.to_string())
            .unwrap_or_else(|| "all".to_string())
    }
}
