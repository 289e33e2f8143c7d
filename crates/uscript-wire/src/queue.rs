use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Outgoing message queue shared between the threads that produce messages
/// and the single I/O task that writes them to the socket.
///
/// The queue owns its messages; the writer borrows the front element (as a
/// cheap refcounted handle) for the duration of one send and removes it only
/// after the send completes. The contract that keeps exactly one send in
/// flight:
///
/// - `push` returns whether the queue was empty beforehand. If it was, the
///   pusher must wake the writer (and must not if it wasn't; a send is
///   already pending).
/// - after a send completes, the writer calls `pop`; if the queue is still
///   non-empty it immediately sends the new front without waiting for
///   another wake-up.
///
/// The empty-test happens under the same lock as the size change, so the
/// "exactly one pending send iff non-empty" invariant holds at every instant.
#[derive(Default)]
pub struct SendQueue {
    inner: Mutex<VecDeque<Arc<[u8]>>>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message; returns true when the queue was empty before, i.e.
    /// when the caller is responsible for waking the writer.
    pub fn push(&self, msg: Vec<u8>) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let was_empty = inner.is_empty();
        inner.push_back(msg.into());
        was_empty
    }

    /// Remove the front message after its send completed; returns true when
    /// the queue is now empty and the writer should go back to waiting.
    pub fn pop(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pop_front();
        inner.is_empty()
    }

    /// The message currently at the front, if any. Only the writer calls
    /// this, and only the writer removes elements, so the returned handle
    /// stays the front until the matching `pop`.
    pub fn front(&self) -> Option<Arc<[u8]>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.front().cloned()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.is_empty()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.len()
    }
}
