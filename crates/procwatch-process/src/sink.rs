//! Destinations for relayed child output
//!
//! Every supervised process forwards its output line by line, tagged with
//! `[label pid]`, to a [`LogSink`] handed to it at spawn time.

use std::fmt;
use std::io::Write;

use parking_lot::Mutex;

/// Which child stream a relayed line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared destination for prefixed output lines
///
/// Implementations must write each line atomically; lines from different
/// processes may arrive concurrently.
pub trait LogSink: Send + Sync {
    /// Record one complete, already prefixed line (without trailing newline)
    fn write_line(&self, stream: StreamKind, line: &str);
}

/// Build the `[label pid] line` prefix used for relayed output
pub fn format_line(label: &str, pid: u32, line: &str) -> String {
    format!("[{label:<12} {pid:>6}] {line}")
}

/// Mirrors child stdout to our stdout and child stderr to our stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl LogSink for StdioSink {
    fn write_line(&self, stream: StreamKind, line: &str) {
        // One locked write per line keeps concurrent relays from interleaving.
        let _ = match stream {
            StreamKind::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            StreamKind::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }
}

/// Emits relayed lines as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, stream: StreamKind, line: &str) {
        tracing::info!(target: "procwatch::output", stream = %stream, "{}", line);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_line(&self, _stream: StreamKind, _line: &str) {}
}

/// Keeps relayed lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(StreamKind, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line recorded so far
    pub fn lines(&self) -> Vec<(StreamKind, String)> {
        self.lines.lock().clone()
    }

    /// Lines recorded for one stream
    pub fn lines_for(&self, stream: StreamKind) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == stream)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, stream: StreamKind, line: &str) {
        self.lines.lock().push((stream, line.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_pads_label_and_pid() {
        assert_eq!(format_line("server", 42, "hello"), "[server           42] hello");
        assert_eq!(
            format_line("coordinator1", 123456, "x"),
            "[coordinator1 123456] x"
        );
    }

    #[test]
    fn test_memory_sink_filters_by_stream() {
        let sink = MemorySink::new();
        sink.write_line(StreamKind::Stdout, "out");
        sink.write_line(StreamKind::Stderr, "err");
        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.lines_for(StreamKind::Stderr), vec!["err".to_string()]);
    }
}
