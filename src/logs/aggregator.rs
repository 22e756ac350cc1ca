//! Shared publish/subscribe hub for log entries
//!
//! The aggregator is cheap to clone; every clone shares the same buffers and
//! subscriber list. Publishing never blocks: each subscriber owns a bounded
//! queue and entries that do not fit are counted as dropped for that
//! subscriber only.

use super::{LevelCounts, LogBuffer, LogEntry, LogFilter, DEFAULT_RETENTION};
use crate::error::Result;
use crate::types::{LogChannel, LogLevel};
use chrono::{Local, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Default queue depth of a subscription
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct SubscriberSlot {
    channel: LogChannel,
    tx: SyncSender<LogEntry>,
    dropped: Arc<AtomicU64>,
}

struct AggregatorState {
    buffers: HashMap<LogChannel, LogBuffer>,
    subscribers: Vec<SubscriberSlot>,
    next_id: u64,
}

/// Handle to the shared log hub
#[derive(Clone)]
pub struct LogAggregator {
    state: Arc<Mutex<AggregatorState>>,
    subscriber_capacity: usize,
}

impl Default for LogAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl LogAggregator {
    /// Create an aggregator retaining `retention` entries per channel
    pub fn new(retention: usize) -> Self {
        Self::with_capacity(retention, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(retention: usize, subscriber_capacity: usize) -> Self {
        let buffers = LogChannel::ALL
            .iter()
            .map(|&channel| (channel, LogBuffer::new(retention)))
            .collect();
        Self {
            state: Arc::new(Mutex::new(AggregatorState {
                buffers,
                subscribers: Vec::new(),
                next_id: 1,
            })),
            subscriber_capacity: subscriber_capacity.max(1),
        }
    }

    // A panic while holding the lock cannot leave the buffers half-written,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tag and append a line, fanning it out to live subscribers.
    ///
    /// Error entries published on `services` or `database` are mirrored into
    /// the `errors` channel.
    pub fn publish(
        &self,
        channel: LogChannel,
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> LogEntry {
        let mut state = self.lock();
        let entry = LogEntry {
            id: state.next_id,
            timestamp: Local::now(),
            level,
            source: source.into(),
            channel,
            message: message.into(),
        };
        state.next_id += 1;

        let mirrored = level == LogLevel::Error && channel != LogChannel::Errors;
        if let Some(buffer) = state.buffers.get_mut(&channel) {
            buffer.push(entry.clone());
        }
        if mirrored {
            if let Some(buffer) = state.buffers.get_mut(&LogChannel::Errors) {
                buffer.push(entry.clone());
            }
        }

        state.subscribers.retain(|slot| {
            let wanted = slot.channel == channel
                || (mirrored && slot.channel == LogChannel::Errors);
            if !wanted {
                return true;
            }
            match slot.tx.try_send(entry.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    slot.dropped.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Pruning disconnected {} log subscriber", slot.channel);
                    false
                }
            }
        });

        entry
    }

    /// Receive every entry published on `channel` from now on
    pub fn subscribe(&self, channel: LogChannel) -> Subscription {
        let (tx, rx) = mpsc::sync_channel(self.subscriber_capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.lock().subscribers.push(SubscriberSlot {
            channel,
            tx,
            dropped: Arc::clone(&dropped),
        });
        debug!("New {} log subscriber", channel);
        Subscription {
            channel,
            rx,
            dropped,
        }
    }

    /// Number of live subscriptions (disconnected ones are pruned lazily)
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// All retained entries of a channel, oldest first
    pub fn snapshot(&self, channel: LogChannel) -> Vec<LogEntry> {
        self.lock()
            .buffers
            .get(&channel)
            .map(LogBuffer::to_vec)
            .unwrap_or_default()
    }

    pub fn filtered(&self, channel: LogChannel, filter: &LogFilter) -> Vec<LogEntry> {
        self.lock()
            .buffers
            .get(&channel)
            .map(|b| b.filtered(filter))
            .unwrap_or_default()
    }

    pub fn len(&self, channel: LogChannel) -> usize {
        self.lock().buffers.get(&channel).map_or(0, LogBuffer::len)
    }

    pub fn is_empty(&self, channel: LogChannel) -> bool {
        self.len(channel) == 0
    }

    pub fn counts(&self, channel: LogChannel) -> LevelCounts {
        self.lock()
            .buffers
            .get(&channel)
            .map(LogBuffer::counts)
            .unwrap_or_default()
    }

    pub fn clear(&self, channel: LogChannel) {
        if let Some(buffer) = self.lock().buffers.get_mut(&channel) {
            buffer.clear();
        }
        info!("Cleared {} logs", channel);
    }

    /// Every retained entry (not just a filtered view), one formatted line each
    pub fn export(&self, channel: LogChannel) -> String {
        self.lock()
            .buffers
            .get(&channel)
            .map(|b| {
                b.iter()
                    .map(LogEntry::format_line)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    /// Write the export to `dir/logs-<channel>-<YYYY-MM-DD>.txt`
    pub fn export_to_dir(&self, channel: LogChannel, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(export_file_name(channel));
        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, self.export(channel))?;
        info!("Exported {} logs to {}", channel, path.display());
        Ok(path)
    }
}

/// File name used for exports made today
pub fn export_file_name(channel: LogChannel) -> String {
    // Date is UTC, entry times inside the file are local
    format!("logs-{}-{}.txt", channel, Utc::now().format("%Y-%m-%d"))
}

/// Live feed of one channel
pub struct Subscription {
    channel: LogChannel,
    rx: Receiver<LogEntry>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub fn channel(&self) -> LogChannel {
        self.channel
    }

    /// Entries lost because this subscriber's queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn try_recv(&self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next entry
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LogEntry> {
        match self.rx.recv_timeout(timeout) {
            Ok(entry) => Some(entry),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued right now, without blocking
    pub fn drain(&self) -> Vec<LogEntry> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let logs = LogAggregator::new(10);
        let a = logs.publish(LogChannel::Services, LogLevel::Info, "a", "one");
        let b = logs.publish(LogChannel::Database, LogLevel::Info, "b", "two");
        let c = logs.publish(LogChannel::Services, LogLevel::Info, "a", "three");
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn test_retention_is_per_channel() {
        let logs = LogAggregator::new(2);
        for i in 0..5 {
            logs.publish(LogChannel::Services, LogLevel::Info, "svc", format!("{}", i));
        }
        logs.publish(LogChannel::Database, LogLevel::Info, "db", "only");
        assert_eq!(logs.len(LogChannel::Services), 2);
        assert_eq!(logs.len(LogChannel::Database), 1);
    }

    #[test]
    fn test_errors_are_mirrored() {
        let logs = LogAggregator::new(10);
        logs.publish(LogChannel::Database, LogLevel::Error, "postgres", "deadlock");
        logs.publish(LogChannel::Database, LogLevel::Info, "postgres", "ok");
        let errors = logs.snapshot(LogChannel::Errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "deadlock");
        assert_eq!(errors[0].channel, LogChannel::Database);
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let logs = LogAggregator::new(10);
        let sub = logs.subscribe(LogChannel::Services);
        logs.publish(LogChannel::Services, LogLevel::Info, "s", "first");
        logs.publish(LogChannel::Database, LogLevel::Info, "d", "other channel");
        logs.publish(LogChannel::Services, LogLevel::Info, "s", "second");
        let messages: Vec<String> = sub.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_full_subscriber_counts_drops_without_blocking() {
        let logs = LogAggregator::with_capacity(100, 2);
        let sub = logs.subscribe(LogChannel::Services);
        for i in 0..5 {
            logs.publish(LogChannel::Services, LogLevel::Info, "s", format!("{}", i));
        }
        assert_eq!(sub.drain().len(), 2);
        assert_eq!(sub.dropped(), 3);
        assert_eq!(logs.len(LogChannel::Services), 5);
    }

    #[test]
    fn test_disconnected_subscribers_are_pruned() {
        let logs = LogAggregator::new(10);
        let sub = logs.subscribe(LogChannel::Services);
        assert_eq!(logs.subscriber_count(), 1);
        drop(sub);
        logs.publish(LogChannel::Services, LogLevel::Info, "s", "x");
        assert_eq!(logs.subscriber_count(), 0);
    }

    #[test]
    fn test_export_covers_all_retained_entries() {
        let logs = LogAggregator::new(10);
        logs.publish(LogChannel::Services, LogLevel::Info, "api", "up");
        logs.publish(LogChannel::Services, LogLevel::Debug, "api", "tick");
        let text = logs.export(LogChannel::Services);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] [api] up"));
        assert!(lines[1].ends_with("[DEBUG] [api] tick"));
    }

    #[test]
    fn test_export_file_name() {
        let name = export_file_name(LogChannel::Database);
        assert!(name.starts_with("logs-database-"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_export_file_name_uses_utc_date() {
        let before = Utc::now().format("%Y-%m-%d").to_string();
        let name = export_file_name(LogChannel::Services);
        let after = Utc::now().format("%Y-%m-%d").to_string();
        assert!(
            name == format!("logs-services-{}.txt", before)
                || name == format!("logs-services-{}.txt", after),
            "unexpected name {}",
            name
        );
    }

    #[test]
    fn test_export_keeps_multiline_message_on_one_line() {
        let logs = LogAggregator::new(10);
        logs.publish(LogChannel::Services, LogLevel::Error, "api", "first\nsecond\r\nthird");
        logs.publish(LogChannel::Services, LogLevel::Info, "api", "next");

        let exported = logs.export(LogChannel::Services);
        let lines: Vec<&str> = exported.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[ERROR] [api] first\\nsecond\\r\\nthird"));
        assert!(lines[1].ends_with("[INFO] [api] next"));
        assert_eq!(logs.snapshot(LogChannel::Services)[0].message, "first\nsecond\r\nthird");
    }
}
