//! End-to-end scenarios for ssh-wrapped processes
//!
//! A stand-in ssh client runs the wrapped command with the local shell, so the
//! remote code path is exercised without a network.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use procwatch_process::{
    HarnessConfig, LogSink, MemorySink, ProcessManager, RemoteHost, StreamKind, Supervised,
};

const FAKE_SSH: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
    case "$1" in
        -o|-i) shift 2 ;;
        *) break ;;
    esac
done
shift
exec /bin/sh -c "$*"
"#;

fn fake_ssh(dir: &Path) -> PathBuf {
    write_script(dir, "fake-ssh", FAKE_SSH)
}

/// Like `fake_ssh`, but the client stays a separate process from the
/// command it runs, the way a real ssh client does.
fn forking_ssh(dir: &Path) -> PathBuf {
    write_script(dir, "forking-ssh", &FAKE_SSH.replace("exec /bin/sh", "/bin/sh"))
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn wait_until_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if kill(Pid::from_raw(pid as i32), None) == Err(Errno::ESRCH) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_command_starts_with_ssh_batch_mode() {
    let host = RemoteHost::new("mymac.local");
    let cmd = host.command(["echo", "hi"]);

    assert_eq!(cmd[0], "ssh");
    assert_eq!(&cmd[1..3], ["-o", "BatchMode=yes"]);
    assert_eq!(&cmd[cmd.len() - 2..], ["echo", "hi"]);
}

#[test]
fn test_remote_spawn_wait_and_signal() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let manager = ProcessManager::with_sink(Arc::clone(&sink) as Arc<dyn LogSink>).config(
        HarnessConfig::default()
            .ssh_program(fake_ssh(dir.path()).to_string_lossy())
            .default_timeout(Duration::from_secs(5)),
    );

    let host = manager.remote("testhost.example").cd(dir.path().to_string_lossy());
    let mut remote = manager
        .spawn_remote(&host, ["sh", "-c", "'echo remote-ready; exec sleep 30'"])
        .unwrap();

    assert!(remote.remote_pid() > 0);
    assert_eq!(remote.label(), "sh@testh");
    assert_eq!(
        remote.stdout_join_default("remote-ready").unwrap(),
        Some("remote-ready".to_string())
    );

    remote.term().unwrap();
    let status = remote.join().unwrap();
    assert!(!status.success());

    let relayed = sink.lines_for(StreamKind::Stdout);
    assert!(relayed.iter().any(|line| line.starts_with("[sh@testh") && line.ends_with("remote-ready")));
}

#[test]
fn test_remote_spawn_without_pid_line_fails() {
    let dir = tempfile::tempdir().unwrap();
    // A client that never runs the preamble.
    let silent = dir.path().join("silent-ssh");
    fs::write(&silent, "#!/bin/sh\necho 'Permission denied' >&2\nexit 255\n").unwrap();
    fs::set_permissions(&silent, fs::Permissions::from_mode(0o755)).unwrap();

    let manager = ProcessManager::with_sink(Arc::new(MemorySink::new()) as Arc<dyn LogSink>)
        .config(HarnessConfig::default().ssh_program(silent.to_string_lossy()));
    let host = manager.remote("unreachable");

    let result = manager.spawn_remote(&host, ["true"]);
    assert!(matches!(
        result,
        Err(procwatch_process::ProcessError::RemotePid { host }) if host == "unreachable"
    ));
}

#[test]
fn test_dropped_remote_process_is_terminated_on_host() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ProcessManager::with_sink(Arc::new(MemorySink::new()) as Arc<dyn LogSink>).config(
        HarnessConfig::default()
            .ssh_program(forking_ssh(dir.path()).to_string_lossy())
            .default_timeout(Duration::from_secs(5)),
    );
    let host = manager.remote("testhost.example");

    let remote = manager.spawn_remote(&host, ["sleep", "30"]).unwrap();
    let remote_pid = remote.remote_pid();
    assert_ne!(remote_pid, remote.pid());

    drop(remote);
    assert!(wait_until_gone(remote_pid, Duration::from_secs(5)));
}
