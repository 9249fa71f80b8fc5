//! Growable stream transcript with a persistent scan cursor
//!
//! A [`StreamBuffer`] is fed by exactly one reader thread and consumed by the
//! thread orchestrating the test. Content is only ever appended, so the whole
//! transcript stays readable after a match; the cursor records where the last
//! successful match ended and the next wait resumes from there.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{ProcessError, Result};
use crate::pattern::Pattern;

#[derive(Default)]
struct BufferState {
    content: Vec<u8>,
    cursor: usize,
    closed: bool,
    last_match_end: Option<usize>,
}

impl BufferState {
    /// `scanned_to` is private to one wait call: bytes below it have already
    /// been searched without success, so a literal retry only rescans the tail.
    fn take_match(&mut self, pattern: &Pattern, scanned_to: &mut usize) -> Option<String> {
        let from = pattern.resume_from(self.cursor, *scanned_to);
        let found = match pattern.find_at(&self.content, from) {
            // An empty match where the previous match ended would pin the cursor.
            Some((start, end)) if start == end && self.last_match_end == Some(start) => {
                pattern.find_at(&self.content, start + 1)
            }
            found => found,
        };
        let Some((start, end)) = found else {
            *scanned_to = self.content.len();
            return None;
        };
        self.cursor = end;
        self.last_match_end = Some(end);
        Some(String::from_utf8_lossy(&self.content[start..end]).into_owned())
    }
}

/// Append-only byte accumulator shared between a reader thread and waiters
#[derive(Default)]
pub struct StreamBuffer {
    state: Mutex<BufferState>,
    changed: Condvar,
}

impl StreamBuffer {
    /// Create an empty, open buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and wake every waiter
    ///
    /// Appends after [`close`](Self::close) are dropped.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.content.extend_from_slice(bytes);
        drop(state);
        self.changed.notify_all();
    }

    /// Mark the stream as finished and release all waiters. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.changed.notify_all();
    }

    /// Block until `pattern` appears past the cursor
    ///
    /// Returns the matched text and moves the cursor past it, or `None` once
    /// the buffer is closed without a further match. A pattern that matches
    /// the empty string never matches twice at the same offset.
    pub fn wait_for(&self, pattern: &Pattern) -> Option<String> {
        let mut scanned_to = 0;
        let mut state = self.state.lock();
        loop {
            if let Some(matched) = state.take_match(pattern, &mut scanned_to) {
                return Some(matched);
            }
            if state.closed {
                return None;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Like [`wait_for`](Self::wait_for), giving up after `timeout`
    ///
    /// On expiry the cursor is left where it was. A timeout too large to
    /// represent as a deadline waits without limit.
    pub fn wait_for_timeout(&self, pattern: &Pattern, timeout: Duration) -> Result<Option<String>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Ok(self.wait_for(pattern));
        };
        let mut scanned_to = 0;
        let mut state = self.state.lock();
        loop {
            if let Some(matched) = state.take_match(pattern, &mut scanned_to) {
                return Ok(Some(matched));
            }
            if state.closed {
                return Ok(None);
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                if let Some(matched) = state.take_match(pattern, &mut scanned_to) {
                    return Ok(Some(matched));
                }
                if state.closed {
                    return Ok(None);
                }
                return Err(ProcessError::PatternTimeout {
                    pattern: pattern.to_string(),
                    timeout,
                });
            }
        }
    }

    /// Block until the producer closes the buffer; `false` on timeout
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while !state.closed {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        return state.closed;
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
        true
    }

    /// Whether the producer has seen end-of-stream
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Total bytes captured so far
    pub fn len(&self) -> usize {
        self.state.lock().content.len()
    }

    /// Whether nothing has been captured yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset just past the last successful match
    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Copy of the raw transcript
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().content.clone()
    }

    /// Whole transcript as text (invalid UTF-8 replaced)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().content).into_owned()
    }

    /// Transcript from the cursor to the end
    pub fn unread_text(&self) -> String {
        let state = self.state.lock();
        String::from_utf8_lossy(&state.content[state.cursor..]).into_owned()
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StreamBuffer")
            .field("len", &state.content.len())
            .field("cursor", &state.cursor)
            .field("closed", &state.closed)
            .finish()
    }
}
