//! Operations shared by local and remote supervised processes

use std::process::ExitStatus;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::buffer::StreamBuffer;
use crate::error::{ProcessError, Result};
use crate::pattern::Pattern;

/// Resolve `"TERM"`, `"SIGTERM"`, `"term"` or `"15"` to a signal
pub fn parse_signal(name: &str) -> Result<Signal> {
    let trimmed = name.trim();
    if let Ok(number) = trimmed.parse::<i32>() {
        return Signal::try_from(number).map_err(|_| ProcessError::UnknownSignal(name.to_string()));
    }
    let upper = trimmed.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&full).map_err(|_| ProcessError::UnknownSignal(name.to_string()))
}

/// A process whose output can be awaited and whose lifetime can be controlled
pub trait Supervised {
    /// PID used in relayed log prefixes
    fn pid(&self) -> u32;

    /// Short display tag
    fn label(&self) -> &str;

    /// Captured standard output
    fn stdout(&self) -> &Arc<StreamBuffer>;

    /// Captured standard error
    fn stderr(&self) -> &Arc<StreamBuffer>;

    /// Timeout applied by the `*_join_default` helpers
    fn default_timeout(&self) -> Option<Duration> {
        None
    }

    /// Deliver `signal` to the process. A target that is already gone is not an error.
    fn signal(&mut self, signal: Signal) -> Result<&mut Self>;

    /// Wait for exit and for both streams to drain, then disarm the reaper
    fn join(&mut self) -> Result<ExitStatus>;

    /// Block until `pattern` shows up on stdout; `None` once stdout is closed
    fn stdout_join(&self, pattern: impl Into<Pattern>) -> Option<String>
    where
        Self: Sized,
    {
        self.stdout().wait_for(&pattern.into())
    }

    /// Block until `pattern` shows up on stderr; `None` once stderr is closed
    fn stderr_join(&self, pattern: impl Into<Pattern>) -> Option<String>
    where
        Self: Sized,
    {
        self.stderr().wait_for(&pattern.into())
    }

    fn stdout_join_timeout(&self, pattern: impl Into<Pattern>, timeout: Duration) -> Result<Option<String>>
    where
        Self: Sized,
    {
        self.stdout().wait_for_timeout(&pattern.into(), timeout)
    }

    fn stderr_join_timeout(&self, pattern: impl Into<Pattern>, timeout: Duration) -> Result<Option<String>>
    where
        Self: Sized,
    {
        self.stderr().wait_for_timeout(&pattern.into(), timeout)
    }

    /// Stdout wait bounded by [`default_timeout`](Self::default_timeout), if any
    fn stdout_join_default(&self, pattern: impl Into<Pattern>) -> Result<Option<String>>
    where
        Self: Sized,
    {
        let pattern = pattern.into();
        match self.default_timeout() {
            Some(timeout) => self.stdout().wait_for_timeout(&pattern, timeout),
            None => Ok(self.stdout().wait_for(&pattern)),
        }
    }

    /// Stderr wait bounded by [`default_timeout`](Self::default_timeout), if any
    fn stderr_join_default(&self, pattern: impl Into<Pattern>) -> Result<Option<String>>
    where
        Self: Sized,
    {
        let pattern = pattern.into();
        match self.default_timeout() {
            Some(timeout) => self.stderr().wait_for_timeout(&pattern, timeout),
            None => Ok(self.stderr().wait_for(&pattern)),
        }
    }

    /// Send a signal given by name or number
    fn signal_named(&mut self, name: &str) -> Result<&mut Self> {
        let signal = parse_signal(name)?;
        self.signal(signal)
    }

    fn kill(&mut self) -> Result<&mut Self> {
        self.signal(Signal::SIGKILL)
    }

    fn term(&mut self) -> Result<&mut Self> {
        self.signal(Signal::SIGTERM)
    }

    fn hup(&mut self) -> Result<&mut Self> {
        self.signal(Signal::SIGHUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_forms() {
        assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("sigkill").unwrap(), Signal::SIGKILL);
        assert_eq!(parse_signal(" hup ").unwrap(), Signal::SIGHUP);
        assert_eq!(parse_signal("9").unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn test_parse_signal_unknown() {
        assert!(matches!(
            parse_signal("NOPE"),
            Err(ProcessError::UnknownSignal(name)) if name == "NOPE"
        ));
        assert!(parse_signal("999").is_err());
    }
}
