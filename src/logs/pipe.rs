//! Child pipe readers

use super::LogAggregator;
use crate::types::{LogChannel, OutputStream};
use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Call `on_line` for every line read from `reader` until EOF.
///
/// Invalid UTF-8 is replaced rather than ending the read, so a child writing
/// binary garbage can never fill its pipe and stall.
pub fn forward_lines<R, F>(reader: R, mut on_line: F)
where
    R: Read,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                warn!("Pipe read failed: {}", e);
                break;
            }
        }
    }
}

/// Spawn a reader thread publishing each line of a child pipe to `logs`.
/// `extra` sees every line after it was published.
pub fn spawn_publisher<R, F>(
    pipe: R,
    stream: OutputStream,
    logs: LogAggregator,
    channel: LogChannel,
    source: String,
    mut extra: F,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
    F: FnMut(OutputStream, &str) + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}-{}", source, stream))
        .spawn(move || {
            forward_lines(pipe, |line| {
                logs.publish(channel, stream.level_for(&line), source.as_str(), line.as_str());
                extra(stream, &line);
            });
        })
}
