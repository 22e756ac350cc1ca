//! Demo log source
//!
//! Fabricates entries at irregular intervals from a fixed message pool per
//! channel. Used by `opsdeck tui --demo` to exercise the viewer without real
//! services or log files.

use super::stream::{sleep_unless_stopped, LogSource};
use super::LogAggregator;
use crate::types::{LogChannel, LogLevel};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

const SERVICE_MESSAGES: &[&str] = &[
    "Request processed successfully",
    "User authentication completed",
    "Database connection established",
    "Cache updated",
    "API endpoint called: /api/users",
    "Service health check passed",
    "Memory usage: 45.2MB",
];

const DATABASE_MESSAGES: &[&str] = &[
    "Query executed in 23ms",
    "Connection pool size: 10/20",
    "Backup completed successfully",
    "Index rebuild started",
    "Transaction committed",
    "Deadlock detected and resolved",
    "Table maintenance completed",
];

const ERROR_MESSAGES: &[&str] = &[
    "Connection timeout to external service",
    "Invalid request format received",
    "Authentication failed for user",
    "Database constraint violation",
    "Memory limit exceeded",
    "File not found: config.json",
    "Network error: Connection refused",
];

const LEVELS: [LogLevel; 4] = [LogLevel::Info, LogLevel::Warn, LogLevel::Error, LogLevel::Debug];

/// Message pool for a channel
pub fn message_pool(channel: LogChannel) -> &'static [&'static str] {
    match channel {
        LogChannel::Services => SERVICE_MESSAGES,
        LogChannel::Database => DATABASE_MESSAGES,
        LogChannel::Errors => ERROR_MESSAGES,
    }
}

/// Random entries every 1-3 seconds
pub struct SyntheticSource {
    channel: LogChannel,
    min_interval: Duration,
    max_interval: Duration,
}

impl SyntheticSource {
    pub fn new(channel: LogChannel) -> Self {
        Self {
            channel,
            min_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(3000),
        }
    }

    /// Override the delay range between entries
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max.max(min);
        self
    }

    fn next_delay(&self, rng: &mut impl Rng) -> Duration {
        if self.max_interval == self.min_interval {
            return self.min_interval;
        }
        rng.gen_range(self.min_interval..=self.max_interval)
    }
}

impl LogSource for SyntheticSource {
    fn name(&self) -> &str {
        self.channel.default_source()
    }

    fn channel(&self) -> LogChannel {
        self.channel
    }

    fn run(&mut self, logs: &LogAggregator, stop: &AtomicBool) {
        let mut rng = rand::thread_rng();
        let pool = message_pool(self.channel);
        loop {
            let delay = self.next_delay(&mut rng);
            if sleep_unless_stopped(stop, delay) {
                break;
            }
            let level = LEVELS.choose(&mut rng).copied().unwrap_or_default();
            let message = pool.choose(&mut rng).copied().unwrap_or("heartbeat");
            logs.publish(self.channel, level, self.channel.default_source(), message);
        }
    }
}
