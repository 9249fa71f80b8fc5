//! Scoped guard that reaps abandoned child processes
//!
//! Armed at spawn with the child's PID and disarmed by a successful join.
//! If the owning handle is dropped while still armed, the guard escalates
//! SIGTERM then SIGKILL, polling for exit between steps, so a test that bails
//! out early never leaks a running child into later runs.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Last-resort cleanup for a spawned process
#[derive(Debug)]
pub struct ZombieReaper {
    pid: Option<Pid>,
    retries: u32,
    interval: Duration,
}

impl ZombieReaper {
    /// Arm a reaper for `pid` with a per-signal poll budget
    pub fn arm(pid: u32, retries: u32, interval: Duration) -> Self {
        Self {
            pid: Some(Pid::from_raw(pid as i32)),
            retries,
            interval,
        }
    }

    /// Forget the PID; a later drop does nothing
    pub fn disarm(&mut self) {
        self.pid = None;
    }

    /// Whether dropping this guard would signal the process
    pub fn is_armed(&self) -> bool {
        self.pid.is_some()
    }

    /// Terminate and collect the process now
    ///
    /// Runs at most once. Returns `true` when the process is known to be gone.
    pub fn reap(&mut self) -> bool {
        let Some(pid) = self.pid.take() else {
            return true;
        };

        debug!(pid = %pid, "Reaping abandoned process");
        for signal in [Signal::SIGTERM, Signal::SIGKILL] {
            match kill(pid, signal) {
                Ok(()) => debug!(pid = %pid, signal = %signal, "Sent signal"),
                Err(Errno::ESRCH) => return true,
                Err(e) => warn!(pid = %pid, signal = %signal, error = %e, "Failed to signal process"),
            }
            if self.poll_exit(pid) {
                return true;
            }
        }

        warn!(pid = %pid, "Process survived SIGKILL; giving up");
        false
    }

    fn poll_exit(&self, pid: Pid) -> bool {
        for _ in 0..self.retries {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => std::thread::sleep(self.interval),
                Ok(status) => {
                    debug!(pid = %pid, status = ?status, "Reaped process");
                    return true;
                }
                // ECHILD: already collected elsewhere.
                Err(_) => return true,
            }
        }
        false
    }
}

impl Drop for ZombieReaper {
    fn drop(&mut self) {
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn sleeper() -> std::process::Child {
        Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[test]
    fn test_drop_reaps_running_process() {
        let child = sleeper();
        let pid = Pid::from_raw(child.id() as i32);
        {
            let _reaper = ZombieReaper::arm(child.id(), 10, Duration::from_millis(20));
        }
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    fn test_disarmed_reaper_leaves_process_alone() {
        let mut child = sleeper();
        let pid = Pid::from_raw(child.id() as i32);
        {
            let mut reaper = ZombieReaper::arm(child.id(), 10, Duration::from_millis(20));
            reaper.disarm();
            assert!(!reaper.is_armed());
        }
        assert!(kill(pid, None).is_ok());
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_reap_runs_once() {
        let child = sleeper();
        let mut reaper = ZombieReaper::arm(child.id(), 10, Duration::from_millis(20));
        assert!(reaper.reap());
        assert!(!reaper.is_armed());
        assert!(reaper.reap());
    }
}
