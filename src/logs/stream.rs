//! The streaming toggle
//!
//! A `LogStream` runs the log sources configured for one channel, each on its
//! own thread, until it is stopped, switched to another channel or dropped.

use super::{FileTailer, LogAggregator, SyntheticSource};
use crate::config::LogSettings;
use crate::types::LogChannel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest a source may go without checking its stop flag
pub const STOP_POLL: Duration = Duration::from_millis(50);

/// A named producer of log entries bound to one channel.
///
/// `run` is called on a dedicated thread and must return promptly once
/// `stop` becomes true; use [`sleep_unless_stopped`] for waits.
pub trait LogSource: Send {
    fn name(&self) -> &str;
    fn channel(&self) -> LogChannel;
    fn run(&mut self, logs: &LogAggregator, stop: &AtomicBool);
}

/// Sleep for `duration` in small slices. Returns true if a stop was requested.
pub fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}

type SourceFactory = Box<dyn Fn(LogChannel) -> Vec<Box<dyn LogSource>> + Send>;

struct ActiveStream {
    channel: LogChannel,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

/// Owner of the running sources for the active channel
pub struct LogStream {
    logs: LogAggregator,
    factory: SourceFactory,
    active: Option<ActiveStream>,
}

impl LogStream {
    /// `factory` builds fresh sources each time a channel starts streaming
    pub fn new<F>(logs: LogAggregator, factory: F) -> Self
    where
        F: Fn(LogChannel) -> Vec<Box<dyn LogSource>> + Send + 'static,
    {
        Self {
            logs,
            factory: Box::new(factory),
            active: None,
        }
    }

    /// Sources from configuration: file tailers per channel, plus the
    /// synthetic generator when demo mode is on.
    pub fn from_settings(logs: LogAggregator, settings: &LogSettings) -> Self {
        let files = settings.sources.clone();
        let demo = settings.demo;
        let poll = Duration::from_millis(settings.poll_interval_ms.max(1));
        Self::new(logs, move |channel| {
            let mut sources: Vec<Box<dyn LogSource>> = files
                .iter()
                .filter(|spec| spec.channel == channel)
                .map(|spec| {
                    Box::new(
                        FileTailer::new(&spec.path, channel, spec.source_name())
                            .with_poll_interval(poll),
                    ) as Box<dyn LogSource>
                })
                .collect();
            if demo {
                sources.push(Box::new(SyntheticSource::new(channel)));
            }
            sources
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Channel currently streaming, if any
    pub fn channel(&self) -> Option<LogChannel> {
        self.active.as_ref().map(|a| a.channel)
    }

    /// Start the sources of `channel`. Restarts when a different channel is
    /// active; no-op when `channel` is already streaming. Returns the number
    /// of sources running.
    pub fn start(&mut self, channel: LogChannel) -> usize {
        if let Some(active) = &self.active {
            if active.channel == channel {
                return active.handles.len();
            }
            self.stop();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();
        for mut source in (self.factory)(channel) {
            let logs = self.logs.clone();
            let flag = Arc::clone(&stop);
            let name = source.name().to_string();
            let spawned = thread::Builder::new()
                .name(format!("log-source-{}", name))
                .spawn(move || source.run(&logs, &flag));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to start log source {}: {}", name, e),
            }
        }

        info!("Streaming {} logs from {} source(s)", channel, handles.len());
        let count = handles.len();
        self.active = Some(ActiveStream {
            channel,
            stop,
            handles,
        });
        count
    }

    /// Signal every source and wait for its thread to finish
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Relaxed);
            for handle in active.handles {
                if handle.join().is_err() {
                    warn!("A {} log source panicked", active.channel);
                }
            }
            info!("Stopped streaming {} logs", active.channel);
        }
    }

    /// Flip streaming for `channel`. Returns whether it is now streaming.
    pub fn toggle(&mut self, channel: LogChannel) -> bool {
        if self.is_streaming() {
            self.stop();
            false
        } else {
            self.start(channel);
            true
        }
    }

    /// Follow a channel change; restarts sources only while streaming
    pub fn switch_channel(&mut self, channel: LogChannel) {
        if self.is_streaming() && self.channel() != Some(channel) {
            debug!("Switching log stream to {}", channel);
            self.start(channel);
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    /// Emits one entry every 10ms
    struct Ticker {
        channel: LogChannel,
    }

    impl LogSource for Ticker {
        fn name(&self) -> &str {
            "ticker"
        }

        fn channel(&self) -> LogChannel {
            self.channel
        }

        fn run(&mut self, logs: &LogAggregator, stop: &AtomicBool) {
            let mut n = 0;
            while !sleep_unless_stopped(stop, Duration::from_millis(10)) {
                logs.publish(self.channel, LogLevel::Info, "ticker", format!("tick {}", n));
                n += 1;
            }
        }
    }

    fn ticker_stream(logs: &LogAggregator) -> LogStream {
        LogStream::new(logs.clone(), |channel| {
            vec![Box::new(Ticker { channel }) as Box<dyn LogSource>]
        })
    }

    #[test]
    fn test_toggle_produces_entries_until_off() {
        let logs = LogAggregator::new(1000);
        let mut stream = ticker_stream(&logs);

        assert!(stream.toggle(LogChannel::Services));
        thread::sleep(Duration::from_millis(120));
        assert!(!stream.toggle(LogChannel::Services));

        let produced = logs.len(LogChannel::Services);
        assert!(produced > 0);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(logs.len(LogChannel::Services), produced);
    }

    #[test]
    fn test_switch_channel_restarts_sources() {
        let logs = LogAggregator::new(1000);
        let mut stream = ticker_stream(&logs);

        stream.start(LogChannel::Services);
        stream.switch_channel(LogChannel::Database);
        assert_eq!(stream.channel(), Some(LogChannel::Database));
        thread::sleep(Duration::from_millis(80));
        stream.stop();
        assert!(logs.len(LogChannel::Database) > 0);
    }

    #[test]
    fn test_switch_channel_while_stopped_does_nothing() {
        let logs = LogAggregator::new(10);
        let mut stream = ticker_stream(&logs);
        stream.switch_channel(LogChannel::Errors);
        assert!(!stream.is_streaming());
    }

    #[test]
    fn test_sleep_unless_stopped_returns_early() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(sleep_unless_stopped(&stop, Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
