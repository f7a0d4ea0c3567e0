//! Communications core of a driver station library: the periodic
//! send/receive loop, per-endpoint watchdogs, and the protocol-dispatch
//! indirection that lets alternative wire protocols plug in at runtime.
//!
//! This crate owns the event engine only. Concrete wire protocols (the
//! actual FMS/radio/robot packet formats), the terminal UI, joystick
//! input gathering, and CLI/packaging are external collaborators —
//! only their interface contracts (`Protocol`, `Socket`) live here.

#[macro_use]
extern crate bitflags;
extern crate crossbeam_utils;
extern crate tokio;
extern crate tracing;

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod netconsole;
pub mod protocol;
pub mod socket;

pub use config::{Alliance, CommsFlags, ConfigSnapshot, ConfigStore, ControlMode};
pub use engine::Engine;
pub use error::{Error, Result};
pub use event::{Event, EventQueue, Peer};
pub use netconsole::NetConsoleBuffer;
pub use protocol::Protocol;
pub use socket::{Socket, SocketKind, MAX_DATAGRAM_SIZE};
