//! The capability set a pluggable wire protocol must satisfy.
//!
//! The original C implementation expressed this as a struct of function
//! pointers (`DS_Protocol`) installed with `DS_SetProtocol`. Here it's a
//! trait object so alternative protocols (FRC 2014/2015/2016, a test
//! double, whatever) can be swapped in at runtime behind a single
//! `Arc<dyn Protocol>` — dispatched once per tick during protocol
//! reconciliation, never inlined per call.
//!
//! Concrete wire formats are out of scope for this crate; only the
//! contract lives here.

use bytes::Bytes;

use crate::socket::Socket;

/// A value a protocol author populates once and registers with the
/// engine via `Engine::set_current_protocol`.
///
/// Contract: every method here must be non-blocking and return within
/// one tick's budget. Parsers must tolerate arbitrary byte content,
/// including a zero-length slice, and must never panic on malformed
/// input — they return `false` for anything unrecognized. Builders hand
/// back an owned buffer; the engine releases it after the send
/// completes.
pub trait Protocol: Send + Sync {
    /// Builds the next outgoing FMS packet.
    fn build_fms(&self) -> Bytes;
    /// Builds the next outgoing radio packet.
    fn build_radio(&self) -> Bytes;
    /// Builds the next outgoing robot packet.
    fn build_robot(&self) -> Bytes;

    /// Attempts to interpret `bytes` as an FMS packet. Returns whether it
    /// was recognized.
    fn parse_fms(&self, bytes: &[u8]) -> bool;
    /// Attempts to interpret `bytes` as a radio packet. Returns whether it
    /// was recognized.
    fn parse_radio(&self, bytes: &[u8]) -> bool;
    /// Attempts to interpret `bytes` as a robot packet. Returns whether it
    /// was recognized.
    fn parse_robot(&self, bytes: &[u8]) -> bool;

    /// Send period for FMS packets, in milliseconds. Must be positive.
    fn fms_interval_ms(&self) -> u32;
    /// Send period for radio packets, in milliseconds. Must be positive.
    fn radio_interval_ms(&self) -> u32;
    /// Send period for robot packets, in milliseconds. Must be positive.
    fn robot_interval_ms(&self) -> u32;

    fn fms_socket(&self) -> &Socket;
    fn radio_socket(&self) -> &Socket;
    fn robot_socket(&self) -> &Socket;
    fn netconsole_socket(&self) -> &Socket;
}
