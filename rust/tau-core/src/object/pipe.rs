//! Pipes: thread-safe FIFO queues connecting execution units.

use crate::object::Object;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipeError {
    #[error("closed pipe")]
    Closed,
    #[error("pipe already closed")]
    AlreadyClosed,
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

struct State {
    queue: VecDeque<Object>,
    cap: usize,
    closed: bool,
}

/// FIFO object queue guarded by one mutex and two condition variables.
///
/// An unbuffered pipe starts with capacity 1 and doubles its capacity
/// whenever a send finds it full, so senders never block. A buffered pipe
/// has a fixed capacity and `send` waits on `not_full` while it is full.
/// `recv` waits on `not_empty` while the pipe is empty and open.
pub struct Pipe {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    buffered: bool,
}

impl Pipe {
    pub fn unbuffered() -> Self {
        Self::with_state(1, false)
    }

    /// A pipe holding at most `cap` values. A zero capacity could never
    /// accept a value, so it yields an unbuffered pipe instead.
    pub fn buffered(cap: usize) -> Self {
        if cap == 0 {
            return Self::unbuffered();
        }
        Self::with_state(cap, true)
    }

    fn with_state(cap: usize, buffered: bool) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(cap),
                cap,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            buffered,
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Enqueue `value`. The value becomes shared with every unit that can
    /// reach the pipe.
    pub fn send(&self, value: Object) -> Result<(), PipeError> {
        value.share();
        let mut state = self.state.lock();
        if state.closed {
            return Err(PipeError::Closed);
        }
        if self.buffered {
            while state.queue.len() >= state.cap && !state.closed {
                self.not_full.wait(&mut state);
            }
            if state.closed {
                return Err(PipeError::Closed);
            }
        } else if state.queue.len() == state.cap {
            state.cap *= 2;
            let additional = state.cap - state.queue.len();
            state.queue.reserve(additional);
        }
        state.queue.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest value, waiting while the pipe is empty and open.
    /// Once the pipe is closed every receive yields `null`.
    pub fn recv(&self) -> Object {
        let mut state = self.state.lock();
        while state.queue.is_empty() && !state.closed {
            self.not_empty.wait(&mut state);
        }
        if state.closed {
            return Object::Null;
        }
        match state.queue.pop_front() {
            Some(v) => {
                self.not_full.notify_one();
                v
            }
            None => Object::Null,
        }
    }

    /// Close the pipe, waking every waiting receiver and sender.
    pub fn close(&self) -> Result<(), PipeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PipeError::AlreadyClosed);
        }
        state.closed = true;
        state.queue.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().cap
    }

    pub(crate) fn queued(&self) -> Vec<Object> {
        self.state.lock().queue.iter().cloned().collect()
    }

    pub(crate) fn clear(&self) {
        self.state.lock().queue.clear();
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("buffered", &self.buffered)
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
