//! File follower
//!
//! Polls a log file for appended bytes and publishes every complete line.
//! Starts at the current end of the file (like `tail -F`), waits for the file
//! to appear if it does not exist yet, and starts over when the file is
//! truncated or replaced.

use super::stream::{sleep_unless_stopped, LogSource};
use super::LogAggregator;
use crate::types::{LogChannel, OutputStream};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{debug, info, warn};

struct OpenFile {
    reader: BufReader<File>,
    inode: u64,
    position: u64,
}

/// Follows one file into one channel
pub struct FileTailer {
    path: PathBuf,
    channel: LogChannel,
    source: String,
    poll_interval: Duration,
    from_start: bool,
    open: Option<OpenFile>,
    partial: Vec<u8>,
}

impl FileTailer {
    pub fn new(path: impl AsRef<Path>, channel: LogChannel, source: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            channel,
            source: source.into(),
            poll_interval: Duration::from_millis(250),
            from_start: false,
            open: None,
            partial: Vec::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Publish the existing contents too, not just what is appended later
    pub fn from_start(mut self) -> Self {
        self.from_start = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self, at_end: bool) {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return,
        };
        let meta = match file.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot stat {}: {}", self.path.display(), e);
                return;
            }
        };
        let mut reader = BufReader::new(file);
        let position = if at_end { meta.len() } else { 0 };
        if let Err(e) = reader.seek(SeekFrom::Start(position)) {
            warn!("Cannot seek {}: {}", self.path.display(), e);
            return;
        }
        debug!("Tailing {} from byte {}", self.path.display(), position);
        self.partial.clear();
        self.open = Some(OpenFile {
            reader,
            inode: meta.ino(),
            position,
        });
    }

    /// Detect truncation or replacement of the followed path
    fn check_rotation(&mut self) {
        let Some(open) = &self.open else { return };
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.ino() != open.inode => {
                info!("{} was replaced, reopening", self.path.display());
                self.open(false);
            }
            Ok(meta) if meta.len() < open.position => {
                info!("{} was truncated, restarting from the top", self.path.display());
                self.open(false);
            }
            Ok(_) => {}
            Err(_) => {
                debug!("{} disappeared, waiting for it to return", self.path.display());
                self.open = None;
            }
        }
    }

    /// Read everything appended since the last poll and publish full lines
    pub fn poll(&mut self, logs: &LogAggregator) -> usize {
        if self.open.is_none() {
            let at_end = !self.from_start;
            self.open(at_end);
            // Later reopens (file created after we started) read from the top
            self.from_start = true;
        } else {
            self.check_rotation();
        }

        let Some(open) = self.open.as_mut() else {
            return 0;
        };

        let mut published = 0;
        let mut chunk = Vec::new();
        loop {
            chunk.clear();
            match open.reader.read_until(b'\n', &mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    open.position += n as u64;
                    self.partial.extend_from_slice(&chunk);
                    if self.partial.last() != Some(&b'\n') {
                        // Incomplete line; wait for the rest
                        continue;
                    }
                    let raw = String::from_utf8_lossy(&self.partial);
                    let line = raw.trim_end_matches(['\n', '\r']);
                    if !line.is_empty() {
                        let level = OutputStream::Stdout.level_for(line);
                        logs.publish(self.channel, level, self.source.as_str(), line);
                        published += 1;
                    }
                    self.partial.clear();
                }
                Err(e) => {
                    warn!("Error reading {}: {}", self.path.display(), e);
                    self.open = None;
                    break;
                }
            }
        }
        published
    }
}

impl LogSource for FileTailer {
    fn name(&self) -> &str {
        &self.source
    }

    fn channel(&self) -> LogChannel {
        self.channel
    }

    fn run(&mut self, logs: &LogAggregator, stop: &AtomicBool) {
        info!("Following {} into {} logs", self.path.display(), self.channel);
        loop {
            self.poll(logs);
            if sleep_unless_stopped(stop, self.poll_interval) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_starts_at_end_and_reads_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old line\n");

        let logs = LogAggregator::new(100);
        let mut tailer = FileTailer::new(&path, LogChannel::Database, "postgres");
        assert_eq!(tailer.poll(&logs), 0);

        append(&path, "first\nERROR: second\n");
        assert_eq!(tailer.poll(&logs), 2);

        let entries = logs.snapshot(LogChannel::Database);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(entries[1].source, "postgres");
    }

    #[test]
    fn test_partial_lines_wait_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "");

        let logs = LogAggregator::new(100);
        let mut tailer = FileTailer::new(&path, LogChannel::Services, "svc");
        tailer.poll(&logs);

        append(&path, "half");
        assert_eq!(tailer.poll(&logs), 0);
        append(&path, " done\n");
        assert_eq!(tailer.poll(&logs), 1);
        assert_eq!(logs.snapshot(LogChannel::Services)[0].message, "half done");
    }

    #[test]
    fn test_truncation_restarts_from_top() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "a long line that sets the position\n");

        let logs = LogAggregator::new(100);
        let mut tailer = FileTailer::new(&path, LogChannel::Services, "svc");
        tailer.poll(&logs);

        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(tailer.poll(&logs), 1);
        assert_eq!(logs.snapshot(LogChannel::Services)[0].message, "new");
    }

    #[test]
    fn test_missing_file_is_picked_up_from_the_top() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.log");

        let logs = LogAggregator::new(100);
        let mut tailer = FileTailer::new(&path, LogChannel::Services, "svc");
        assert_eq!(tailer.poll(&logs), 0);

        append(&path, "hello\n");
        assert_eq!(tailer.poll(&logs), 1);
    }
}
