//! The periodic send/receive loop, per-endpoint watchdogs, and the
//! protocol-dispatch indirection that lets alternative wire protocols
//! plug in at runtime.
//!
//! Single-threaded cooperative: one driver calls `tick(elapsed_ms)` at a
//! cadence finer than the smallest protocol interval. No component here
//! spawns its own threads or suspends mid-tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::ConfigStore;
use crate::event::{Event, EventQueue};
use crate::netconsole::NetConsoleBuffer;
use crate::protocol::Protocol;
use crate::socket::MAX_DATAGRAM_SIZE;
use crate::timer::Timer;

/// Receive watchdogs run at 50x the matching send interval: roughly a
/// second of slack at a 20ms send cadence, enough to absorb transient
/// loss without masking a genuinely dead peer for long.
const WATCHDOG_MULTIPLIER: u32 = 50;

/// The event engine. Owns the `ConfigStore`, `EventQueue`, and
/// `NetConsoleBuffer` for the process and exposes `Arc` handles to each so
/// an upstream UI can read/mutate them independently of the tick cadence.
pub struct Engine {
    config: Arc<ConfigStore>,
    events: Arc<EventQueue>,
    netconsole: Arc<NetConsoleBuffer>,

    protocol_slot: ArcSwapOption<dyn Protocol>,
    cached_protocol: Option<Arc<dyn Protocol>>,

    running: AtomicBool,

    fms_send: Timer,
    radio_send: Timer,
    robot_send: Timer,
    fms_recv: Timer,
    radio_recv: Timer,
    robot_recv: Timer,

    fms_read_ok: bool,
    radio_read_ok: bool,
    robot_read_ok: bool,
}

impl Engine {
    pub fn new() -> Self {
        let events = Arc::new(EventQueue::new(1024));
        let config = ConfigStore::new(events.clone());
        let netconsole = Arc::new(NetConsoleBuffer::new());

        Engine {
            config,
            events,
            netconsole,
            protocol_slot: ArcSwapOption::from(None),
            cached_protocol: None,
            running: AtomicBool::new(false),
            fms_send: Timer::new(),
            radio_send: Timer::new(),
            robot_send: Timer::new(),
            fms_recv: Timer::new(),
            radio_recv: Timer::new(),
            robot_recv: Timer::new(),
            fms_read_ok: false,
            radio_read_ok: false,
            robot_read_ok: false,
        }
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventQueue> {
        &self.events
    }

    pub fn netconsole(&self) -> &Arc<NetConsoleBuffer> {
        &self.netconsole
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Installs (or removes, with `None`) the active protocol. Takes
    /// effect atomically for external observers; the engine itself only
    /// picks up the change during the next tick's reconciliation phase.
    pub fn set_current_protocol(&self, protocol: Option<Arc<dyn Protocol>>) {
        self.protocol_slot.store(protocol);
    }

    pub fn current_protocol(&self) -> Option<Arc<dyn Protocol>> {
        self.protocol_slot.load_full()
    }

    /// Initializes all six timers disabled, marks the engine running, and
    /// fires an immediate tick. Idempotent while already running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        for t in [
            &mut self.fms_send,
            &mut self.radio_send,
            &mut self.robot_send,
            &mut self.fms_recv,
            &mut self.radio_recv,
            &mut self.robot_recv,
        ] {
            t.init(0);
        }
        self.tick(0);
    }

    /// Clears `running`; subsequent ticks become no-ops beyond protocol
    /// reconciliation. Sockets remain open until a protocol change or
    /// explicit teardown.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
    }

    /// A single pass through the five tick phases described in the
    /// module doc: protocol reconciliation, send, receive, watchdog
    /// maintenance, event delivery.
    pub fn tick(&mut self, elapsed_ms: u32) {
        self.reconcile_protocol();

        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let protocol = self.cached_protocol.clone();
        self.send_phase(protocol.as_deref(), elapsed_ms);
        self.receive_phase(protocol.as_deref());
        self.watchdog_phase(elapsed_ms);
        // Phase 5, event delivery: no work here. Consumers drain `events()`
        // at their own cadence via `EventQueue::poll`.
    }

    /// Phase 1. Runs whether or not the engine is running: if the active
    /// protocol pointer differs from the cached one, cache it and rewrite
    /// all six timer intervals from its send intervals.
    ///
    /// A newly-installed protocol reporting a non-positive interval is a
    /// programmer-contract violation (spec'd intervals are "positive
    /// integers"), not a runtime condition — it is a fatal assertion, per
    /// the error taxonomy's `protocol-missing`/contract-violation split.
    fn reconcile_protocol(&mut self) {
        let current = self.protocol_slot.load_full();
        let changed = match (&current, &self.cached_protocol) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if !changed {
            return;
        }

        let (fms_ms, radio_ms, robot_ms) = match &current {
            Some(p) => {
                let intervals = (p.fms_interval_ms(), p.radio_interval_ms(), p.robot_interval_ms());
                if intervals.0 == 0 || intervals.1 == 0 || intervals.2 == 0 {
                    panic!(
                        "{}",
                        crate::error::Error::ProtocolContractViolation {
                            detail: "protocol interval_ms must be positive"
                        }
                    );
                }
                intervals
            }
            None => (0, 0, 0),
        };

        self.fms_send.init(fms_ms);
        self.radio_send.init(radio_ms);
        self.robot_send.init(robot_ms);
        self.fms_recv.init(fms_ms.saturating_mul(WATCHDOG_MULTIPLIER));
        self.radio_recv.init(radio_ms.saturating_mul(WATCHDOG_MULTIPLIER));
        self.robot_recv.init(robot_ms.saturating_mul(WATCHDOG_MULTIPLIER));

        self.cached_protocol = current;
    }

    /// Phase 2. No-op if the engine has no active protocol.
    fn send_phase(&mut self, protocol: Option<&dyn Protocol>, elapsed_ms: u32) {
        let Some(protocol) = protocol else { return };

        self.fms_send.update(elapsed_ms);
        self.radio_send.update(elapsed_ms);
        self.robot_send.update(elapsed_ms);

        if self.fms_send.expired() {
            protocol.fms_socket().send(&protocol.build_fms());
            self.fms_send.reset();
        }
        if self.radio_send.expired() {
            protocol.radio_socket().send(&protocol.build_radio());
            self.radio_send.reset();
        }
        if self.robot_send.expired() {
            protocol.robot_socket().send(&protocol.build_robot());
            self.robot_send.reset();
        }

        if let Some(batch) = self.netconsole.drain_batch() {
            let joined = batch.join("\n");
            protocol.netconsole_socket().send(joined.as_bytes());
        }
    }

    /// Phase 3. No-op if the engine has no active protocol; parser-result
    /// flags are left as cleared by the previous watchdog phase.
    fn receive_phase(&mut self, protocol: Option<&dyn Protocol>) {
        let Some(protocol) = protocol else { return };

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        let n = protocol.fms_socket().read(&mut buf);
        self.fms_read_ok = protocol.parse_fms(&buf[..n]);

        let n = protocol.radio_socket().read(&mut buf);
        self.radio_read_ok = protocol.parse_radio(&buf[..n]);

        let n = protocol.robot_socket().read(&mut buf);
        self.robot_read_ok = protocol.parse_robot(&buf[..n]);
    }

    /// Phase 4. Always runs while the engine is running, independent of
    /// whether a protocol is installed — mirrors the peer state machine
    /// OFFLINE -> ONLINE on a successful parse, back to OFFLINE 50
    /// send-intervals after the last one.
    fn watchdog_phase(&mut self, elapsed_ms: u32) {
        if self.fms_read_ok {
            self.fms_recv.reset();
        }
        if self.radio_read_ok {
            self.radio_recv.reset();
        }
        if self.robot_read_ok {
            self.robot_recv.reset();
        }

        let fms_was_expired = self.fms_recv.expired();
        let radio_was_expired = self.radio_recv.expired();
        let robot_was_expired = self.robot_recv.expired();

        self.fms_recv.update(elapsed_ms);
        self.radio_recv.update(elapsed_ms);
        self.robot_recv.update(elapsed_ms);

        if self.fms_read_ok {
            self.config.set_fms_connected(true);
        }
        if self.radio_read_ok {
            self.config.set_radio_connected(true);
        }
        if self.robot_read_ok {
            self.config.set_robot_connected(true);
        }

        if !fms_was_expired && self.fms_recv.expired() {
            self.config.on_fms_watchdog_expired();
        }
        if !radio_was_expired && self.radio_recv.expired() {
            self.config.on_radio_watchdog_expired();
        }
        if !robot_was_expired && self.robot_recv.expired() {
            self.config.on_robot_watchdog_expired();
        }

        self.fms_read_ok = false;
        self.radio_read_ok = false;
        self.robot_read_ok = false;
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains every pending event, returning them in FIFO order. A thin
/// convenience over repeated `poll`, useful in tests and examples.
pub fn drain_events(events: &EventQueue) -> Vec<Event> {
    let mut out = Vec::new();
    while let Some(event) = events.poll() {
        out.push(event);
    }
    out
}
