//! Processes started on another host over ssh
//!
//! The ssh client is supervised like any local process: its stdout and
//! stderr carry the remote command's output. The wrapped command first
//! prints the remote shell's PID and then `exec`s the real program, so that
//! PID identifies the remote process for later `kill` invocations.

use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::{
    buffer::StreamBuffer,
    child::{label_for, ProcessHandle},
    config::HarnessConfig,
    error::{ProcessError, Result},
    pattern::Pattern,
    sink::LogSink,
    supervised::Supervised,
};

/// Label width of the command part for remote processes
const REMOTE_COMMAND_WIDTH: usize = 7;
/// Label width of the host part for remote processes
const REMOTE_HOST_WIDTH: usize = 5;

/// Tokens that make the remote shell report its PID before running the command
const PID_PREAMBLE: [&str; 4] = ["echo", "$$", "&&", "exec"];

/// An ssh target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    host: String,
    user: Option<String>,
    key: Option<PathBuf>,
    dir: Option<String>,
    ssh_program: String,
}

impl RemoteHost {
    /// Target `host` with the default ssh client
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            key: None,
            dir: None,
            ssh_program: HarnessConfig::default().ssh_program,
        }
    }

    /// Log in as `user`
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Authenticate with this identity file
    pub fn key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Run commands from `dir` on the remote host
    pub fn cd(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Use a different ssh client binary
    pub fn ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Wrap `command_line` in a non-interactive ssh invocation
    pub fn command<I, S>(&self, command_line: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = vec![
            self.ssh_program.clone(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(key) = &self.key {
            cmd.push("-i".to_string());
            cmd.push(key.to_string_lossy().into_owned());
        }
        match &self.user {
            Some(user) => cmd.push(format!("{user}@{}", self.host)),
            None => cmd.push(self.host.clone()),
        }
        if let Some(dir) = &self.dir {
            cmd.extend(["cd".to_string(), dir.clone(), "&&".to_string()]);
        }
        cmd.extend(command_line.into_iter().map(Into::into));
        cmd
    }

    /// Start `command_line` on this host
    pub fn spawn<I, S>(
        &self,
        command_line: I,
        sink: Arc<dyn LogSink>,
        config: &HarnessConfig,
    ) -> Result<RemoteProcess>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RemoteProcess::spawn(self, command_line, sink, config)
    }
}

/// A command running on a [`RemoteHost`]
#[derive(Debug)]
pub struct RemoteProcess {
    local: ProcessHandle,
    remote: RemoteHost,
    remote_pid: u32,
}

impl RemoteProcess {
    /// Launch the ssh client and read the remote PID from its first output line
    pub fn spawn<I, S>(
        remote: &RemoteHost,
        command_line: I,
        sink: Arc<dyn LogSink>,
        config: &HarnessConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command_line: Vec<String> = command_line.into_iter().map(Into::into).collect();
        let program = command_line.first().ok_or(ProcessError::EmptyCommand)?;
        let label = format!(
            "{}@{}",
            label_for(program, REMOTE_COMMAND_WIDTH),
            remote.host.chars().take(REMOTE_HOST_WIDTH).collect::<String>()
        );

        let wrapped = PID_PREAMBLE
            .iter()
            .map(|token| token.to_string())
            .chain(command_line);
        let local = ProcessHandle::spawn_labeled(remote.command(wrapped), label, sink, config)?;

        let remote_pid = read_remote_pid(local.stdout(), config.timeout())?.ok_or_else(|| {
            ProcessError::RemotePid {
                host: remote.host.clone(),
            }
        })?;

        info!(host = %remote.host, pid = %local.pid(), remote_pid = %remote_pid, "Remote process spawned");

        Ok(Self {
            local,
            remote: remote.clone(),
            remote_pid,
        })
    }

    /// PID of the command on the remote host
    pub fn remote_pid(&self) -> u32 {
        self.remote_pid
    }

    pub fn remote(&self) -> &RemoteHost {
        &self.remote
    }

    /// The local ssh client process
    pub fn local(&mut self) -> &mut ProcessHandle {
        &mut self.local
    }

    fn send_remote(&self, signal: Signal) {
        let name = signal.as_str().trim_start_matches("SIG");
        let cmd = self.remote.command([
            "kill".to_string(),
            format!("-{name}"),
            self.remote_pid.to_string(),
        ]);

        let outcome = Command::new(&cmd[0])
            .args(&cmd[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match outcome {
            Ok(status) if status.success() => {
                debug!(host = %self.remote.host, remote_pid = %self.remote_pid, signal = %signal, "Sent remote signal")
            }
            Ok(status) => {
                warn!(host = %self.remote.host, remote_pid = %self.remote_pid, signal = %signal, status = %status, "Remote kill failed")
            }
            Err(e) => {
                warn!(host = %self.remote.host, remote_pid = %self.remote_pid, signal = %signal, error = %e, "Could not launch remote kill")
            }
        }
    }
}

/// Reaping the ssh client alone can leave the remote command running, so an
/// unjoined remote process is terminated on its host first.
impl Drop for RemoteProcess {
    fn drop(&mut self) {
        if self.local.is_running() {
            debug!(host = %self.remote.host, remote_pid = %self.remote_pid, "Remote process dropped without join");
            self.send_remote(Signal::SIGTERM);
        }
    }
}

/// The PID has to be the very first line; anything else means the preamble
/// never ran (a login banner, a shell error) and the spawn is rejected.
fn read_remote_pid(stdout: &StreamBuffer, timeout: Option<Duration>) -> Result<Option<u32>> {
    let pattern = Pattern::regex(r"\A\s*[^\n]*\n")?;
    let line = match timeout {
        Some(timeout) => stdout.wait_for_timeout(&pattern, timeout)?,
        None => stdout.wait_for(&pattern),
    };
    Ok(line.and_then(|line| line.trim().parse().ok()))
}

impl Supervised for RemoteProcess {
    fn pid(&self) -> u32 {
        self.local.pid()
    }

    fn label(&self) -> &str {
        self.local.label()
    }

    fn stdout(&self) -> &Arc<StreamBuffer> {
        self.local.stdout()
    }

    fn stderr(&self) -> &Arc<StreamBuffer> {
        self.local.stderr()
    }

    fn default_timeout(&self) -> Option<Duration> {
        self.local.default_timeout()
    }

    /// Runs `kill -<SIG> <remote pid>` over a second ssh connection
    ///
    /// Delivery is not confirmed; launch failures are only logged.
    fn signal(&mut self, signal: Signal) -> Result<&mut Self> {
        if self.local.status().is_some() {
            debug!(remote_pid = %self.remote_pid, signal = %signal, "Remote process already joined; signal skipped");
            return Ok(self);
        }
        self.send_remote(signal);
        Ok(self)
    }

    fn join(&mut self) -> Result<ExitStatus> {
        self.local.join()
    }
}
