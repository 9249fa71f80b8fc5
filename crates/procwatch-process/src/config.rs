//! Harness configuration

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ProcessError, Result};

/// Environment prefix for harness settings (`PROCWATCH_SSH_PROGRAM`, ...)
pub const ENV_PREFIX: &str = "PROCWATCH";

/// Legacy override for the secure-shell binary
const LEGACY_SSH_VAR: &str = "SSH";

/// Tunables shared by every process spawned through a [`crate::ProcessManager`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Secure-shell client used for remote processes
    pub ssh_program: String,
    /// Exit polls per escalation step when reaping an abandoned process
    pub reaper_retries: u32,
    /// Delay between exit polls, in milliseconds
    pub reaper_interval_ms: u64,
    /// Bytes requested per pipe read
    pub read_chunk_size: usize,
    /// Timeout used by the `*_join_default` helpers (None = wait forever)
    pub default_timeout_ms: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            reaper_retries: 10,
            reaper_interval_ms: 100,
            read_chunk_size: 1024,
            default_timeout_ms: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from the environment only
    pub fn load() -> Result<Self> {
        Self::build(None)
    }

    /// Load configuration from an optional file, then the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let mut config: HarnessConfig = settings.try_deserialize()?;

        let prefixed = format!("{ENV_PREFIX}_SSH_PROGRAM");
        if std::env::var_os(&prefixed).is_none() {
            if let Ok(ssh) = std::env::var(LEGACY_SSH_VAR) {
                if !ssh.is_empty() {
                    config.ssh_program = ssh;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the harness spin or hang
    pub fn validate(&self) -> Result<()> {
        if self.ssh_program.trim().is_empty() {
            return Err(ProcessError::Config("ssh_program must not be empty".to_string()));
        }
        if self.reaper_retries == 0 {
            return Err(ProcessError::Config(
                "reaper_retries must be greater than 0".to_string(),
            ));
        }
        if self.reaper_interval_ms == 0 {
            return Err(ProcessError::Config(
                "reaper_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(ProcessError::Config(
                "read_chunk_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the secure-shell client
    pub fn ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Set the reaper's poll budget
    pub fn reaper(mut self, retries: u32, interval: Duration) -> Self {
        self.reaper_retries = retries;
        self.reaper_interval_ms = saturating_millis(interval);
        self
    }

    /// Set the default pattern wait timeout
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(saturating_millis(timeout));
        self
    }

    /// Reaper poll interval
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Default pattern wait timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
