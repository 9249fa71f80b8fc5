//! # procwatch-process
//!
//! **Purpose**: Supervise external processes during automated tests and wait
//! for their output
//!
//! Spawns local or ssh-wrapped remote commands, captures stdout/stderr into
//! shared transcripts, relays every output line to a log sink, and lets the
//! test thread block until a literal or regex shows up.
//!
//! ## Features
//!
//! - **Pattern Waits**: Block on stdout/stderr until a pattern appears, with
//!   a persistent cursor so sequential waits never re-match old output
//! - **Output Relay**: `[label pid] line` copies of child output to an injected sink
//! - **Signals**: TERM/KILL/HUP shorthands plus signal-by-name
//! - **Zombie Reaping**: Dropping an un-joined handle escalates SIGTERM→SIGKILL
//! - **Remote Processes**: ssh-wrapped commands signalled via remote `kill`
//! - **Async Adapters**: Run waits on tokio's blocking pool
//!
//! ## Usage
//!
//! ```rust,no_run
//! use procwatch_process::{ProcessManager, Supervised};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ProcessManager::new();
//!
//! let mut server = manager.spawn(["server", "-arg1"])?;
//! server.stdout_join("started");
//!
//! server.send_line("status")?;
//! server.stdout_join("done");
//!
//! server.term()?;
//! let status = server.join()?;
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

pub mod async_wait;
pub mod buffer;
pub mod child;
pub mod config;
pub mod error;
pub mod manager;
pub mod pattern;
pub mod reader;
pub mod reaper;
pub mod remote;
pub mod sink;
pub mod supervised;

pub use buffer::StreamBuffer;
pub use child::ProcessHandle;
pub use config::HarnessConfig;
pub use error::{ProcessError, Result};
pub use manager::ProcessManager;
pub use nix::sys::signal::Signal;
pub use pattern::Pattern;
pub use reaper::ZombieReaper;
pub use remote::{RemoteHost, RemoteProcess};
pub use sink::{LogSink, MemorySink, NullSink, StdioSink, StreamKind, TracingSink};
pub use supervised::{parse_signal, Supervised};
