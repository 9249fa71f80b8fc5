//! Tokio adapters for the blocking waiters
//!
//! Pattern waits and joins park an OS thread. These helpers move them onto
//! tokio's blocking pool so async test suites keep their runtime responsive.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::task;

use crate::{
    buffer::StreamBuffer,
    error::{ProcessError, Result},
    pattern::Pattern,
    supervised::Supervised,
};

fn join_error(err: task::JoinError) -> ProcessError {
    ProcessError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
}

/// Wait for `pattern` in `buffer` without blocking the runtime
pub async fn wait_for(
    buffer: Arc<StreamBuffer>,
    pattern: impl Into<Pattern>,
    timeout: Option<Duration>,
) -> Result<Option<String>> {
    let pattern = pattern.into();
    task::spawn_blocking(move || match timeout {
        Some(timeout) => buffer.wait_for_timeout(&pattern, timeout),
        None => Ok(buffer.wait_for(&pattern)),
    })
    .await
    .map_err(join_error)?
}

/// Join `process` on the blocking pool, handing it back with its exit status
pub async fn join<P>(mut process: P) -> Result<(P, ExitStatus)>
where
    P: Supervised + Send + 'static,
{
    task::spawn_blocking(move || -> Result<(P, ExitStatus)> {
        let status = process.join()?;
        Ok((process, status))
    })
    .await
    .map_err(join_error)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::ProcessHandle;
    use crate::config::HarnessConfig;
    use crate::sink::NullSink;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_for_async() {
        let buffer = Arc::new(StreamBuffer::new());
        let waiter = tokio::spawn(wait_for(Arc::clone(&buffer), "token", None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        buffer.append(b"the token arrives");
        assert_eq!(waiter.await.unwrap().unwrap(), Some("token".to_string()));
    }

    #[tokio::test]
    async fn test_wait_for_async_timeout() {
        let buffer = Arc::new(StreamBuffer::new());
        let result = wait_for(buffer, "never", Some(Duration::from_millis(20))).await;
        assert!(matches!(result, Err(ProcessError::PatternTimeout { .. })));
    }

    #[tokio::test]
    async fn test_join_async() {
        let child = ProcessHandle::spawn(
            ["sh", "-c", "echo async; exit 4"],
            Arc::new(NullSink),
            &HarnessConfig::default(),
        )
        .unwrap();
        let (child, status) = join(child).await.unwrap();
        assert_eq!(status.code(), Some(4));
        assert_eq!(child.stdout().text(), "async\n");
    }
}
