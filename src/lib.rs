//! opsdeck Library
//!
//! Engines behind the operations console: the command dispatcher for
//! database/service scripts, the process supervisor for long-running services
//! and the log aggregator, plus the terminal dashboard built on top of them.

pub mod app;
pub mod cli;
pub mod command_executor;
pub mod components;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logs;
pub mod process_guard;
pub mod supervisor;
pub mod theme;
pub mod types;
pub mod ui;

// Re-export main types for convenience
pub use config::{ActionSpec, DeckConfig, ServiceSpec};
pub use dispatcher::{ActionOutcome, Dispatcher, ExecEvent, Execution};
pub use error::{DeckError, Result};
pub use logs::{LogAggregator, LogEntry, LogFilter, LogStream};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use supervisor::{ServiceSnapshot, StatusSummary, Supervisor};
pub use types::{ActionStatus, LogChannel, LogLevel, OutputStream, ServiceStatus};
