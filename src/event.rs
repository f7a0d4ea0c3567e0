//! State-change notifications delivered to upstream consumers.

use crossbeam_queue::ArrayQueue;

use crate::config::{Alliance, ControlMode};

/// Which of the three peer roles an event or comms transition concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    Fms,
    Radio,
    Robot,
}

/// A tagged notification describing one observable state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CommsStateChanged { peer: Peer, connected: bool },
    EnabledChanged(bool),
    ModeChanged(ControlMode),
    AllianceChanged(Alliance),
    PositionChanged(u8),
    VoltageChanged(f32),
    UsageChanged { cpu: u8, ram: u8, disk: u8 },
    EStopChanged(bool),
    CodeChanged(bool),
    StatusStringChanged(String),
    NetConsoleLineAppended(String),
}

/// Bounded FIFO of `Event`s. Producers never block: on overflow the
/// oldest event is silently dropped in favor of the new one.
pub struct EventQueue {
    queue: ArrayQueue<Event>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        EventQueue {
            queue: ArrayQueue::new(capacity),
        }
    }

    /// Pushes an event, discarding the oldest queued event if full.
    /// `force_push` does the evict-and-insert atomically, so a concurrent
    /// producer can't land in the gap between a failed `push` and the
    /// retry and have its own event silently dropped.
    pub fn push(&self, event: Event) {
        let _ = self.queue.force_push(event);
    }

    /// Removes the oldest event, or returns `None` if empty.
    pub fn poll(&self) -> Option<Event> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
