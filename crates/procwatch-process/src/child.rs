//! Locally spawned, supervised child process

use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::{
    buffer::StreamBuffer,
    config::HarnessConfig,
    error::{ProcessError, Result},
    reader::{spawn_reader, RelayTarget},
    reaper::ZombieReaper,
    sink::{LogSink, StreamKind},
    supervised::Supervised,
};

/// Maximum label width in relayed log prefixes
pub const LABEL_WIDTH: usize = 12;

/// Shell used by [`ProcessHandle::spawn_shell`]
const SHELL: &str = "/bin/sh";

/// Derive the display label from a program token: basename of its first word
pub fn label_for(program: &str, width: usize) -> String {
    let word = program.split_whitespace().next().unwrap_or(program);
    let base = Path::new(word)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| word.to_string());
    base.chars().take(width).collect()
}

/// A spawned process with captured output
///
/// Both output streams are drained by dedicated threads into
/// [`StreamBuffer`]s, so callers can wait for patterns while the process
/// runs. Dropping a handle that was never joined terminates the process.
#[derive(Debug)]
pub struct ProcessHandle {
    command_line: Vec<String>,
    label: String,
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Arc<StreamBuffer>,
    stderr: Arc<StreamBuffer>,
    readers: Vec<JoinHandle<()>>,
    status: Option<ExitStatus>,
    default_timeout: Option<Duration>,
    reaper: ZombieReaper,
}

impl ProcessHandle {
    /// Spawn `command_line` (program followed by arguments)
    ///
    /// # Examples
    /// ```no_run
    /// use std::sync::Arc;
    /// use procwatch_process::{HarnessConfig, ProcessHandle, StdioSink, Supervised};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut server = ProcessHandle::spawn(
    ///     ["my-server", "--port", "4000"],
    ///     Arc::new(StdioSink),
    ///     &HarnessConfig::default(),
    /// )?;
    /// server.stdout_join("listening");
    /// server.term()?;
    /// server.join()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn<I, S>(command_line: I, sink: Arc<dyn LogSink>, config: &HarnessConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command_line: Vec<String> = command_line.into_iter().map(Into::into).collect();
        let program = command_line.first().ok_or(ProcessError::EmptyCommand)?;
        let label = label_for(program, LABEL_WIDTH);
        Self::spawn_labeled(command_line, label, sink, config)
    }

    /// Spawn a whitespace-separated command string through `/bin/sh -c`
    pub fn spawn_shell(script: &str, sink: Arc<dyn LogSink>, config: &HarnessConfig) -> Result<Self> {
        if script.trim().is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        let label = label_for(script, LABEL_WIDTH);
        let command_line = vec![SHELL.to_string(), "-c".to_string(), script.to_string()];
        Self::spawn_labeled(command_line, label, sink, config)
    }

    pub(crate) fn spawn_labeled(
        command_line: Vec<String>,
        label: String,
        sink: Arc<dyn LogSink>,
        config: &HarnessConfig,
    ) -> Result<Self> {
        let (program, args) = command_line.split_first().ok_or(ProcessError::EmptyCommand)?;

        debug!(command = %program, args = ?args, "Spawning process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: program.clone(),
                source,
            })?;
        let pid = child.id();

        // Armed before anything else can fail so an early return still reaps.
        let reaper = ZombieReaper::arm(pid, config.reaper_retries, config.reaper_interval());

        let stdin = child.stdin.take();
        let stdout = Arc::new(StreamBuffer::new());
        let stderr = Arc::new(StreamBuffer::new());

        let mut readers = Vec::with_capacity(2);
        for (stream, buffer) in [(StreamKind::Stdout, &stdout), (StreamKind::Stderr, &stderr)] {
            let target = RelayTarget {
                label: label.clone(),
                pid,
                stream,
                sink: Arc::clone(&sink),
            };
            let handle = match stream {
                StreamKind::Stdout => child
                    .stdout
                    .take()
                    .map(|pipe| spawn_reader(pipe, Arc::clone(buffer), target, config.read_chunk_size)),
                StreamKind::Stderr => child
                    .stderr
                    .take()
                    .map(|pipe| spawn_reader(pipe, Arc::clone(buffer), target, config.read_chunk_size)),
            };
            match handle {
                Some(handle) => readers.push(handle?),
                None => buffer.close(),
            }
        }

        info!(pid = %pid, label = %label, "Process spawned");

        Ok(Self {
            command_line,
            label,
            pid,
            child,
            stdin,
            stdout,
            stderr,
            readers,
            status: None,
            default_timeout: config.timeout(),
            reaper,
        })
    }

    /// Command line the process was started with
    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    /// Exit status, once joined
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Check if process is still running
    pub fn is_running(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {
                // Collected by try_wait; the PID may be recycled from here on.
                self.reaper.disarm();
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Input pipe, until closed
    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Write raw bytes to the process input
    pub fn write_stdin(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed")
        })?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(())
    }

    /// Write `line` followed by a newline to the process input
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write_stdin(&data)
    }

    /// Close the input pipe so the process sees end-of-file
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Whether the reaper would still act on drop
    pub fn is_armed(&self) -> bool {
        self.reaper.is_armed()
    }
}

impl Supervised for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stdout(&self) -> &Arc<StreamBuffer> {
        &self.stdout
    }

    fn stderr(&self) -> &Arc<StreamBuffer> {
        &self.stderr
    }

    fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    fn signal(&mut self, signal: Signal) -> Result<&mut Self> {
        if !self.reaper.is_armed() {
            debug!(pid = %self.pid, signal = %signal, "Process already collected; signal skipped");
            return Ok(self);
        }
        match kill(Pid::from_raw(self.pid as i32), signal) {
            Ok(()) => debug!(pid = %self.pid, signal = %signal, "Sent signal"),
            Err(Errno::ESRCH) => debug!(pid = %self.pid, signal = %signal, "Process already gone"),
            Err(source) => {
                return Err(ProcessError::Signal {
                    pid: self.pid,
                    signal: signal.to_string(),
                    source,
                })
            }
        }
        Ok(self)
    }

    fn join(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        self.stdin.take();
        let status = self.child.wait().map_err(|source| ProcessError::Wait {
            pid: self.pid,
            source,
        })?;
        self.reaper.disarm();

        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                warn!(pid = %self.pid, "Reader thread panicked");
            }
        }

        info!(pid = %self.pid, label = %self.label, status = %status, "Process joined");
        self.status = Some(status);
        Ok(status)
    }
}
