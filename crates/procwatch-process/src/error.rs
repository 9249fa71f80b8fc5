//! Error types for process supervision

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Process supervision errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Failed to create pipes, fork, or exec the command
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Command line has no program token
    #[error("Command line is empty")]
    EmptyCommand,

    /// Signal delivery failed for a reason other than the target being gone
    #[error("Failed to send {signal} to PID {pid}: {source}")]
    Signal {
        pid: u32,
        signal: String,
        #[source]
        source: nix::Error,
    },

    /// Signal name could not be resolved
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    /// Waiting for the process to exit failed
    #[error("Failed to wait for PID {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// Pattern did not appear before the deadline
    #[error("Timed out after {timeout:?} waiting for {pattern}")]
    PatternTimeout { pattern: String, timeout: Duration },

    /// Remote preamble never reported the remote process id
    #[error("Remote process on {host} did not report its PID")]
    RemotePid { host: String },

    /// Invalid regular expression
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Invalid configuration
    #[error("Invalid harness configuration: {0}")]
    Config(String),

    /// I/O failure on the input pipe or while starting reader threads
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<config::ConfigError> for ProcessError {
    fn from(err: config::ConfigError) -> Self {
        ProcessError::Config(err.to_string())
    }
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
