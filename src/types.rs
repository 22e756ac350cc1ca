//! Type-safe domain enums for opsdeck
//!
//! Service status, log level, log channel and action status are proper enums
//! rather than strings, so configuration files, CLI flags and UI state are all
//! validated at the boundary.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Observed state of a supervised service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ServiceStatus {
    Online,
    #[default]
    Stopped,
    Error,
}

impl ServiceStatus {
    /// True when the service has a live process
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Upper-case label used in exported log lines (`INFO`, `WARN`, ...)
    pub fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Infer a level from an explicit marker near the start of a raw line.
    ///
    /// Looks at the first four whitespace-separated tokens, ignoring brackets
    /// and a trailing colon, so `[ERROR] x`, `WARN: y` and
    /// `2024-05-01 10:00:00 UTC [42] FATAL:  z` are all recognised.
    pub fn infer(line: &str) -> Option<Self> {
        line.split_whitespace().take(4).find_map(|token| {
            let word = token.trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | ':'));
            match word.to_ascii_uppercase().as_str() {
                "ERROR" | "ERR" | "FATAL" | "PANIC" | "CRITICAL" => Some(Self::Error),
                "WARN" | "WARNING" => Some(Self::Warn),
                "INFO" | "LOG" | "NOTICE" => Some(Self::Info),
                "DEBUG" | "TRACE" => Some(Self::Debug),
                _ => None,
            }
        })
    }
}

/// One of the three log views of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogChannel {
    #[default]
    Services,
    Database,
    Errors,
}

impl LogChannel {
    /// Source name used for entries fabricated by the demo generator
    pub fn default_source(self) -> &'static str {
        match self {
            Self::Services => "api-gateway",
            Self::Database => "postgres",
            Self::Errors => "system",
        }
    }

    /// Panel title
    pub fn title(self) -> &'static str {
        match self {
            Self::Services => "Service Logs",
            Self::Database => "Database Logs",
            Self::Errors => "Error Logs",
        }
    }

    /// All channels in display order
    pub const ALL: [LogChannel; 3] = [Self::Services, Self::Database, Self::Errors];
}

/// UI-facing status of a dispatched action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// Which pipe of a child process a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Level used when a line carries no explicit marker
    pub fn default_level(self) -> LogLevel {
        match self {
            Self::Stdout => LogLevel::Info,
            Self::Stderr => LogLevel::Warn,
        }
    }

    /// Level for a line read from this stream
    pub fn level_for(self, line: &str) -> LogLevel {
        LogLevel::infer(line).unwrap_or_else(|| self.default_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_status_parse_and_display() {
        assert_eq!("online".parse::<ServiceStatus>().ok(), Some(ServiceStatus::Online));
        assert_eq!("ERROR".parse::<ServiceStatus>().ok(), Some(ServiceStatus::Error));
        assert_eq!(ServiceStatus::Stopped.to_string(), "stopped");
        assert!("paused".parse::<ServiceStatus>().is_err());
    }

    #[test]
    fn test_log_level_labels() {
        assert_eq!(LogLevel::Warn.label(), "WARN");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn test_infer_bracketed_and_colon_markers() {
        assert_eq!(LogLevel::infer("[ERROR] disk full"), Some(LogLevel::Error));
        assert_eq!(LogLevel::infer("WARN: slow query"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::infer("debug cache miss"), Some(LogLevel::Debug));
        assert_eq!(
            LogLevel::infer("2024-05-01 10:00:00 UTC [42] FATAL:  role does not exist"),
            Some(LogLevel::Error)
        );
    }

    #[test]
    fn test_infer_ignores_markers_deep_in_message() {
        assert_eq!(
            LogLevel::infer("request handled fine, no error here at all"),
            None
        );
        assert_eq!(LogLevel::infer(""), None);
    }

    #[test]
    fn test_stream_default_levels() {
        assert_eq!(OutputStream::Stdout.level_for("hello"), LogLevel::Info);
        assert_eq!(OutputStream::Stderr.level_for("hello"), LogLevel::Warn);
        assert_eq!(OutputStream::Stderr.level_for("[DEBUG] x"), LogLevel::Debug);
    }

    #[test]
    fn test_channel_defaults() {
        assert_eq!(LogChannel::Database.default_source(), "postgres");
        assert_eq!("errors".parse::<LogChannel>().ok(), Some(LogChannel::Errors));
        assert_eq!(LogChannel::ALL.len(), 3);
    }

    #[test]
    fn test_channel_all_lists_every_variant_once() {
        for channel in LogChannel::ALL {
            let position = match channel {
                LogChannel::Services => 0,
                LogChannel::Database => 1,
                LogChannel::Errors => 2,
            };
            assert_eq!(LogChannel::ALL[position], channel);
            assert_eq!(channel.to_string().parse::<LogChannel>().ok(), Some(channel));
        }
    }
}
