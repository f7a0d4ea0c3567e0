//! Outgoing textual diagnostics queue.

use crossbeam_queue::ArrayQueue;

use crate::event::{Event, EventQueue};

/// Soft cap on queued lines.
pub const NETCONSOLE_CAPACITY: usize = 1024;

/// FIFO of outgoing NetConsole lines bounded by [`NETCONSOLE_CAPACITY`].
/// On overflow, the oldest queued line is discarded in favor of the new
/// one.
pub struct NetConsoleBuffer {
    queue: ArrayQueue<String>,
}

impl NetConsoleBuffer {
    pub fn new() -> Self {
        NetConsoleBuffer {
            queue: ArrayQueue::new(NETCONSOLE_CAPACITY),
        }
    }

    /// Enqueues `line`, emitting a `NetConsoleLineAppended` event and
    /// discarding the oldest line if the buffer is full. `force_push`
    /// evicts and inserts atomically, so a concurrent appender can't slip
    /// into the gap between a failed push and a manual retry.
    pub fn append(&self, line: impl Into<String>, events: &EventQueue) {
        let line = line.into();
        let _ = self.queue.force_push(line.clone());
        events.push(Event::NetConsoleLineAppended(line));
    }

    /// Drains every currently queued line as one batch, or `None` if
    /// empty. The engine calls this at most once per tick.
    pub fn drain_batch(&self) -> Option<Vec<String>> {
        if self.queue.is_empty() {
            return None;
        }
        let mut batch = Vec::with_capacity(self.queue.len());
        while let Some(line) = self.queue.pop() {
            batch.push(line);
        }
        Some(batch)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for NetConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
