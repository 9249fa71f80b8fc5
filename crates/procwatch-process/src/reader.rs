//! Reader threads draining child pipes
//!
//! One thread per stream. Each chunk is appended to the stream's
//! [`StreamBuffer`] and re-split into lines for the [`LogSink`]. Any read
//! error other than an interrupted call ends the thread; the buffer is closed
//! on every exit path so waiters are never left hanging.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::buffer::StreamBuffer;
use crate::sink::{format_line, LogSink, StreamKind};

/// Reassembles newline-terminated lines from arbitrary chunks
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(Self::decode(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = Self::decode(&self.pending);
        self.pending.clear();
        Some(line)
    }

    fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Identity and destination of the relayed output
#[derive(Clone)]
pub struct RelayTarget {
    pub label: String,
    pub pid: u32,
    pub stream: StreamKind,
    pub sink: Arc<dyn LogSink>,
}

impl RelayTarget {
    fn relay(&self, line: &str) {
        self.sink
            .write_line(self.stream, &format_line(&self.label, self.pid, line));
    }
}

struct CloseOnExit<'a>(&'a StreamBuffer);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Start the reader thread for one child stream
pub fn spawn_reader<R>(
    source: R,
    buffer: Arc<StreamBuffer>,
    target: RelayTarget,
    chunk_size: usize,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("procwatch-{}-{}", target.stream, target.pid))
        .spawn(move || drain(source, &buffer, &target, chunk_size))
}

fn drain<R: Read>(mut source: R, buffer: &StreamBuffer, target: &RelayTarget, chunk_size: usize) {
    let _close = CloseOnExit(buffer);
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut lines = LineSplitter::new();

    loop {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.append(&chunk[..n]);
                for line in lines.push(&chunk[..n]) {
                    target.relay(&line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(pid = %target.pid, stream = %target.stream, error = %e, "Stream read failed");
                break;
            }
        }
    }

    if let Some(line) = lines.finish() {
        target.relay(&line);
    }
    debug!(pid = %target.pid, stream = %target.stream, bytes = buffer.len(), "Stream closed");
}
