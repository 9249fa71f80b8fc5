//! Process manager - shared sink and settings for spawned processes

use std::fmt;
use std::sync::Arc;

use crate::{
    child::ProcessHandle,
    config::HarnessConfig,
    error::Result,
    remote::{RemoteHost, RemoteProcess},
    sink::{LogSink, StdioSink},
};

/// Spawns supervised processes that share one log sink and configuration
#[derive(Clone)]
pub struct ProcessManager {
    sink: Arc<dyn LogSink>,
    config: HarnessConfig,
}

impl ProcessManager {
    /// Create a manager relaying output to our own stdout/stderr
    pub fn new() -> Self {
        Self::with_sink(Arc::new(StdioSink))
    }

    /// Create a manager relaying output to `sink`
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            config: HarnessConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Spawn a local process
    ///
    /// # Examples
    /// ```no_run
    /// use procwatch_process::{ProcessManager, Supervised};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let manager = ProcessManager::new();
    /// let mut srv = manager.spawn(["server", "-arg1", "-arg2"])?;
    /// srv.stdout_join("started");
    ///
    /// let mut cli = manager.spawn(["client", "-arg1"])?;
    /// srv.stdout_join("connected");
    /// cli.kill()?;
    /// cli.join()?;
    /// srv.stderr_join(procwatch_process::Pattern::regex("disconnected")?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn<I, S>(&self, command_line: I) -> Result<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessHandle::spawn(command_line, Arc::clone(&self.sink), &self.config)
    }

    /// Spawn a command string through `/bin/sh -c`
    pub fn spawn_shell(&self, script: &str) -> Result<ProcessHandle> {
        ProcessHandle::spawn_shell(script, Arc::clone(&self.sink), &self.config)
    }

    /// A remote host using the configured ssh client
    pub fn remote(&self, host: impl Into<String>) -> RemoteHost {
        RemoteHost::new(host).ssh_program(self.config.ssh_program.clone())
    }

    /// Spawn a process on `host`
    pub fn spawn_remote<I, S>(&self, host: &RemoteHost, command_line: I) -> Result<RemoteProcess>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RemoteProcess::spawn(host, command_line, Arc::clone(&self.sink), &self.config)
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
