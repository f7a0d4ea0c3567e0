//! Process-wide observable state: team number, enabled/disabled, control
//! mode, alliance, position, voltages, resource usage, comms flags, and
//! e-stop.
//!
//! Every setter that changes a value atomically writes the new value,
//! enforces the cross-field invariants below, and emits an [`Event`] onto
//! the shared [`EventQueue`] — idempotent writes (new value equals old)
//! emit nothing. A `std::sync::Mutex` guards the whole snapshot so a
//! setter's read-modify-write-emit sequence is atomic with respect to
//! concurrent callers.

use std::sync::{Arc, Mutex};

use crate::event::{Event, EventQueue, Peer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Teleop,
    Autonomous,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alliance {
    Red,
    Blue,
}

bitflags! {
    /// Per-peer comms flags. Bit positions are internal to this crate;
    /// external consumers go through the `fms_connected`/`radio_connected`/
    /// `robot_connected` accessors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommsFlags: u8 {
        const FMS   = 0b0000_0001;
        const RADIO = 0b0000_0010;
        const ROBOT = 0b0000_0100;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub team_number: u32,
    pub control_mode: ControlMode,
    pub alliance: Alliance,
    pub position: u8,
    pub enabled: bool,
    pub e_stopped: bool,
    pub robot_code: bool,
    pub voltage: f32,
    pub cpu_usage: u8,
    pub ram_usage: u8,
    pub disk_usage: u8,
    pub comms: CommsFlags,
    /// The last `status_string()` rendering pushed as a
    /// `StatusStringChanged` event; compared against on every setter that
    /// can move the needle (mode, enabled, e-stop, comms) so the event
    /// fires only when the rendered text actually changes.
    last_status: String,
}

impl ConfigSnapshot {
    fn new() -> Self {
        ConfigSnapshot {
            team_number: 0,
            control_mode: ControlMode::Teleop,
            alliance: Alliance::Red,
            position: 1,
            enabled: false,
            e_stopped: false,
            robot_code: false,
            voltage: 0.0,
            cpu_usage: 0,
            ram_usage: 0,
            disk_usage: 0,
            comms: CommsFlags::empty(),
            last_status: String::new(),
        }
    }
}

/// The Configuration Store. Cheap to clone (it's an `Arc` handle) and
/// safe to share across the engine and any number of external consumers.
pub struct ConfigStore {
    inner: Mutex<ConfigSnapshot>,
    events: Arc<EventQueue>,
}

impl ConfigStore {
    pub fn new(events: Arc<EventQueue>) -> Arc<Self> {
        Arc::new(ConfigStore {
            inner: Mutex::new(ConfigSnapshot::new()),
            events,
        })
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.inner.lock().unwrap().clone()
    }

    // --- getters -----------------------------------------------------

    pub fn team_number(&self) -> u32 {
        self.inner.lock().unwrap().team_number
    }

    pub fn control_mode(&self) -> ControlMode {
        self.inner.lock().unwrap().control_mode
    }

    pub fn alliance(&self) -> Alliance {
        self.inner.lock().unwrap().alliance
    }

    pub fn position(&self) -> u8 {
        self.inner.lock().unwrap().position
    }

    pub fn enabled(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    pub fn e_stopped(&self) -> bool {
        self.inner.lock().unwrap().e_stopped
    }

    pub fn robot_code(&self) -> bool {
        self.inner.lock().unwrap().robot_code
    }

    pub fn voltage(&self) -> f32 {
        self.inner.lock().unwrap().voltage
    }

    pub fn cpu_usage(&self) -> u8 {
        self.inner.lock().unwrap().cpu_usage
    }

    pub fn ram_usage(&self) -> u8 {
        self.inner.lock().unwrap().ram_usage
    }

    pub fn disk_usage(&self) -> u8 {
        self.inner.lock().unwrap().disk_usage
    }

    pub fn fms_connected(&self) -> bool {
        self.inner.lock().unwrap().comms.contains(CommsFlags::FMS)
    }

    pub fn radio_connected(&self) -> bool {
        self.inner.lock().unwrap().comms.contains(CommsFlags::RADIO)
    }

    pub fn robot_connected(&self) -> bool {
        self.inner.lock().unwrap().comms.contains(CommsFlags::ROBOT)
    }

    /// A one-line summary of mode, enable, e-stop, and comms state, for
    /// display by an upstream UI.
    pub fn status_string(&self) -> String {
        Self::render_status(&self.inner.lock().unwrap())
    }

    fn render_status(snap: &ConfigSnapshot) -> String {
        let mode = match snap.control_mode {
            ControlMode::Teleop => "teleop",
            ControlMode::Autonomous => "autonomous",
            ControlMode::Test => "test",
        };
        let enabled = if snap.e_stopped {
            "e-stopped"
        } else if snap.enabled {
            "enabled"
        } else {
            "disabled"
        };
        format!(
            "{mode}/{enabled} fms={} radio={} robot={}",
            snap.comms.contains(CommsFlags::FMS),
            snap.comms.contains(CommsFlags::RADIO),
            snap.comms.contains(CommsFlags::ROBOT),
        )
    }

    /// Re-renders the status string against the current snapshot and, if
    /// it differs from the last one emitted, pushes a `StatusStringChanged`
    /// event. Called at the end of every setter that can move the
    /// rendering (mode, enabled, e-stop, comms) so the event fires exactly
    /// when the visible text changes, never on an unrelated field write.
    fn sync_status_string(&self, snap: &mut ConfigSnapshot) {
        let rendered = Self::render_status(snap);
        if rendered != snap.last_status {
            snap.last_status = rendered.clone();
            self.events.push(Event::StatusStringChanged(rendered));
        }
    }

    // --- setters -------------------------------------------------------
    // Each setter is idempotent: writing an equal value emits no event.

    pub fn set_team_number(&self, team_number: u32) {
        let mut snap = self.inner.lock().unwrap();
        if snap.team_number == team_number {
            return;
        }
        snap.team_number = team_number;
    }

    pub fn set_control_mode(&self, mode: ControlMode) {
        let mut snap = self.inner.lock().unwrap();
        if snap.control_mode == mode {
            return;
        }
        snap.control_mode = mode;
        self.events.push(Event::ModeChanged(mode));
        self.sync_status_string(&mut snap);
    }

    pub fn set_alliance(&self, alliance: Alliance) {
        let mut snap = self.inner.lock().unwrap();
        if snap.alliance == alliance {
            return;
        }
        snap.alliance = alliance;
        self.events.push(Event::AllianceChanged(alliance));
    }

    /// Clamps `position` to `1..=3`.
    pub fn set_position(&self, position: u8) {
        let position = position.clamp(1, 3);
        let mut snap = self.inner.lock().unwrap();
        if snap.position == position {
            return;
        }
        snap.position = position;
        self.events.push(Event::PositionChanged(position));
    }

    /// Enabling is rejected (silently, no event) while e-stopped or while
    /// the robot has no comms, per invariants 1 and 2.
    pub fn set_enabled(&self, enabled: bool) {
        let mut snap = self.inner.lock().unwrap();
        let enabled = enabled && !snap.e_stopped && snap.comms.contains(CommsFlags::ROBOT);
        if snap.enabled == enabled {
            return;
        }
        snap.enabled = enabled;
        self.events.push(Event::EnabledChanged(enabled));
        self.sync_status_string(&mut snap);
    }

    /// Setting e-stop also forces `enabled` false in the same atomic
    /// section (invariant 1), emitting both events in order.
    pub fn set_e_stopped(&self, e_stopped: bool) {
        let mut snap = self.inner.lock().unwrap();
        if snap.e_stopped != e_stopped {
            snap.e_stopped = e_stopped;
            self.events.push(Event::EStopChanged(e_stopped));
        }
        if e_stopped && snap.enabled {
            snap.enabled = false;
            self.events.push(Event::EnabledChanged(false));
        }
        self.sync_status_string(&mut snap);
    }

    pub fn set_robot_code(&self, robot_code: bool) {
        let mut snap = self.inner.lock().unwrap();
        // Robot code cannot be reported present without robot comms
        // (invariant 2).
        let robot_code = robot_code && snap.comms.contains(CommsFlags::ROBOT);
        if snap.robot_code == robot_code {
            return;
        }
        snap.robot_code = robot_code;
        self.events.push(Event::CodeChanged(robot_code));
    }

    /// Clamped to `>= 0.0`.
    pub fn set_voltage(&self, voltage: f32) {
        let voltage = voltage.max(0.0);
        let mut snap = self.inner.lock().unwrap();
        if snap.voltage == voltage {
            return;
        }
        snap.voltage = voltage;
        self.events.push(Event::VoltageChanged(voltage));
    }

    /// Clamped to `0..=100` each.
    pub fn set_usage(&self, cpu: u8, ram: u8, disk: u8) {
        let cpu = cpu.min(100);
        let ram = ram.min(100);
        let disk = disk.min(100);
        let mut snap = self.inner.lock().unwrap();
        if (snap.cpu_usage, snap.ram_usage, snap.disk_usage) == (cpu, ram, disk) {
            return;
        }
        snap.cpu_usage = cpu;
        snap.ram_usage = ram;
        snap.disk_usage = disk;
        self.events.push(Event::UsageChanged { cpu, ram, disk });
    }

    fn set_comms(&self, snap: &mut ConfigSnapshot, peer: Peer, flag: CommsFlags, connected: bool) {
        let was_connected = snap.comms.contains(flag);
        if was_connected == connected {
            return;
        }
        snap.comms.set(flag, connected);
        self.events.push(Event::CommsStateChanged { peer, connected });
    }

    pub fn set_fms_connected(&self, connected: bool) {
        let mut snap = self.inner.lock().unwrap();
        self.set_comms(&mut snap, Peer::Fms, CommsFlags::FMS, connected);
        self.sync_status_string(&mut snap);
    }

    pub fn set_radio_connected(&self, connected: bool) {
        let mut snap = self.inner.lock().unwrap();
        self.set_comms(&mut snap, Peer::Radio, CommsFlags::RADIO, connected);
        self.sync_status_string(&mut snap);
    }

    /// Losing robot comms also forces `robot_code` false and `enabled`
    /// false in the same atomic section (invariant 2); it does not by
    /// itself zero voltage/usage — that is `on_robot_watchdog_expired`'s
    /// job specifically.
    pub fn set_robot_connected(&self, connected: bool) {
        let mut snap = self.inner.lock().unwrap();
        self.set_comms(&mut snap, Peer::Robot, CommsFlags::ROBOT, connected);
        if !connected {
            if snap.robot_code {
                snap.robot_code = false;
                self.events.push(Event::CodeChanged(false));
            }
            if snap.enabled {
                snap.enabled = false;
                self.events.push(Event::EnabledChanged(false));
            }
        }
        self.sync_status_string(&mut snap);
    }

    // --- watchdog-expiry hooks ------------------------------------------
    // The ONLY path that drives the store into the safe state on peer
    // loss. Side-effect-idempotent: calling these repeatedly with comms
    // already false emits nothing further.

    pub fn on_fms_watchdog_expired(&self) {
        self.set_fms_connected(false);
    }

    pub fn on_radio_watchdog_expired(&self) {
        self.set_radio_connected(false);
    }

    pub fn on_robot_watchdog_expired(&self) {
        self.set_robot_connected(false);
        self.set_voltage(0.0);
        self.set_usage(0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<ConfigStore> {
        ConfigStore::new(Arc::new(EventQueue::new(64)))
    }

    #[test]
    fn idempotent_setter_emits_exactly_one_event() {
        let cfg = store();
        cfg.set_position(2);
        cfg.set_position(2);
        let mut count = 0;
        while cfg.events.poll().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn percentages_are_clamped() {
        let cfg = store();
        cfg.set_usage(255, 255, 255);
        assert_eq!(cfg.cpu_usage(), 100);
        assert_eq!(cfg.ram_usage(), 100);
        assert_eq!(cfg.disk_usage(), 100);
    }

    #[test]
    fn voltage_is_nonnegative() {
        let cfg = store();
        cfg.set_voltage(-5.0);
        assert_eq!(cfg.voltage(), 0.0);
    }

    #[test]
    fn position_clamped_to_1_through_3() {
        let cfg = store();
        cfg.set_position(9);
        assert_eq!(cfg.position(), 3);
        cfg.set_position(0);
        assert_eq!(cfg.position(), 1);
    }

    #[test]
    fn estop_forces_disabled_and_emits_in_order() {
        let cfg = store();
        cfg.set_robot_connected(true);
        cfg.set_enabled(true);
        assert!(cfg.enabled());
        while cfg.events.poll().is_some() {}

        cfg.set_e_stopped(true);
        assert!(cfg.e_stopped());
        assert!(!cfg.enabled());

        let first = cfg.events.poll().unwrap();
        let second = cfg.events.poll().unwrap();
        assert_eq!(first, Event::EStopChanged(true));
        assert_eq!(second, Event::EnabledChanged(false));
    }

    #[test]
    fn enabling_without_robot_comms_is_rejected() {
        let cfg = store();
        cfg.set_enabled(true);
        assert!(!cfg.enabled());
    }

    #[test]
    fn losing_robot_comms_clears_code_and_enabled() {
        let cfg = store();
        cfg.set_robot_connected(true);
        cfg.set_robot_code(true);
        cfg.set_enabled(true);
        assert!(cfg.enabled());
        assert!(cfg.robot_code());

        cfg.set_robot_connected(false);
        assert!(!cfg.robot_connected());
        assert!(!cfg.robot_code());
        assert!(!cfg.enabled());
    }

    #[test]
    fn robot_watchdog_expiry_zeroes_resource_fields() {
        let cfg = store();
        cfg.set_robot_connected(true);
        cfg.set_voltage(12.4);
        cfg.set_usage(40, 50, 10);
        cfg.set_robot_code(true);
        cfg.set_enabled(true);

        cfg.on_robot_watchdog_expired();

        assert!(!cfg.robot_connected());
        assert!(!cfg.robot_code());
        assert!(!cfg.enabled());
        assert_eq!(cfg.voltage(), 0.0);
        assert_eq!(cfg.cpu_usage(), 0);
        assert_eq!(cfg.ram_usage(), 0);
        assert_eq!(cfg.disk_usage(), 0);
    }

    #[test]
    fn repeated_watchdog_expiry_is_idempotent() {
        let cfg = store();
        cfg.set_robot_connected(true);
        while cfg.events.poll().is_some() {}

        cfg.on_robot_watchdog_expired();
        let mut transitions = 0;
        while let Some(event) = cfg.events.poll() {
            if matches!(event, Event::CommsStateChanged { peer: Peer::Robot, .. }) {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);

        cfg.on_robot_watchdog_expired();
        let mut transitions_again = 0;
        while let Some(event) = cfg.events.poll() {
            if matches!(event, Event::CommsStateChanged { peer: Peer::Robot, .. }) {
                transitions_again += 1;
            }
        }
        assert_eq!(transitions_again, 0);
    }

    #[test]
    fn status_string_event_fires_once_per_rendered_change() {
        let cfg = store();
        while cfg.events.poll().is_some() {}

        cfg.set_robot_connected(true);
        let mut rendered = None;
        while let Some(event) = cfg.events.poll() {
            if let Event::StatusStringChanged(s) = event {
                rendered = Some(s);
            }
        }
        let rendered = rendered.expect("comms change should render a new status string");
        assert_eq!(rendered, cfg.status_string());

        // Re-asserting the same connectivity is a no-op for the comms
        // flag, so no further StatusStringChanged should follow it.
        cfg.set_robot_connected(true);
        assert!(cfg.events.poll().is_none());

        // A mode change alone also re-renders the status line.
        cfg.set_control_mode(ControlMode::Autonomous);
        let mut saw_status_change = false;
        while let Some(event) = cfg.events.poll() {
            if matches!(event, Event::StatusStringChanged(_)) {
                saw_status_change = true;
            }
        }
        assert!(saw_status_change);
    }
}
