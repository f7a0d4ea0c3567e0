//! Socket descriptor and non-blocking datagram I/O.
//!
//! Datagram semantics are the point: bounded-latency robot control wants
//! "send best-effort, let the watchdogs notice loss" rather than a
//! blocking read coupling the liveness of three independent peers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crossbeam_utils::atomic::AtomicCell;
use tokio::net::{TcpStream, UdpSocket};
use tracing::warn;

use crate::error::{Error, Result};

/// The largest datagram the engine will accept on a single `read`.
///
/// The original C implementation allocated a 1-byte receive buffer, which
/// silently truncated any packet larger than a byte on platforms where
/// `read` honors the buffer length. 1500 bytes (the common Ethernet MTU)
/// is a safe upper bound for the UDP/TCP traffic this core carries.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Udp,
    Tcp,
}

enum Transport {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// A socket descriptor: address, kind, port pair, kill switch, and
/// (once opened) an owned OS-level transport handle.
pub struct Socket {
    address: Ipv4Addr,
    kind: SocketKind,
    input_port: u16,
    output_port: u16,
    // Plain `AtomicCell<bool>` rather than a field behind the transport's
    // own lock: the kill switch is meant to be flippable from outside the
    // tick loop (e.g. a UI "network disable" toggle) without contending
    // with socket I/O.
    disabled: AtomicCell<bool>,
    transport: Option<Transport>,
}

impl Socket {
    pub const fn descriptor(
        address: Ipv4Addr,
        kind: SocketKind,
        input_port: u16,
        output_port: u16,
    ) -> Self {
        Socket {
            address,
            kind,
            input_port,
            output_port,
            disabled: AtomicCell::new(false),
            transport: None,
        }
    }

    pub const fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub const fn kind(&self) -> SocketKind {
        self.kind
    }

    pub const fn input_port(&self) -> u16 {
        self.input_port
    }

    pub const fn output_port(&self) -> u16 {
        self.output_port
    }

    pub fn disabled(&self) -> bool {
        self.disabled.load()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled);
    }

    pub const fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Binds `input_port` for receiving and, for UDP, prepares
    /// `(address, output_port)` for sending. Idempotent: calling `open` on
    /// an already-open socket is a no-op.
    ///
    /// The UDP transport is deliberately left unconnected: `connect()`ing
    /// it to `(address, output_port)` would filter `recv` to datagrams
    /// whose *source* address and port match that peer — but
    /// `output_port` is the port we send to, not the port a real FMS/
    /// radio/robot peer sends from, so a connected socket would silently
    /// stop receiving. Sends go out via `send_to`, reads come in via
    /// `recv_from` with the source address discarded, matching the
    /// teacher's own split between an unconnected receive socket and a
    /// separately-connected send socket without needing two OS handles
    /// per peer.
    pub async fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Ok(());
        }

        // Broadcast addresses only make sense for connectionless UDP
        // traffic (e.g. FMS discovery); a TCP peer can't dial one.
        if self.kind == SocketKind::Tcp && self.address.is_broadcast() {
            return Err(Error::AddressInvalid { kind: self.kind });
        }

        match self.kind {
            SocketKind::Udp => {
                let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.input_port);
                let socket = UdpSocket::bind(bind_addr).await.map_err(|source| Error::BindRefused {
                    input_port: self.input_port,
                    source,
                })?;
                self.transport = Some(Transport::Udp(socket));
            }
            SocketKind::Tcp => {
                let peer = SocketAddr::new(IpAddr::V4(self.address), self.output_port);
                let stream = TcpStream::connect(peer).await.map_err(|source| Error::BindRefused {
                    input_port: self.input_port,
                    source,
                })?;
                self.transport = Some(Transport::Tcp(stream));
            }
        }

        Ok(())
    }

    /// Idempotent release of the underlying transport.
    pub fn close(&mut self) {
        self.transport = None;
    }

    /// Enqueues/transmits a datagram. Zero-length input is a no-op.
    /// Failures are non-fatal: they are logged and absorbed here, never
    /// propagated to the caller (the watchdogs will react if loss
    /// persists).
    pub fn send(&self, bytes: &[u8]) -> usize {
        if bytes.is_empty() || self.disabled.load() {
            return 0;
        }

        let Some(transport) = &self.transport else {
            return 0;
        };

        let result = match transport {
            Transport::Udp(socket) => {
                let peer = SocketAddr::new(IpAddr::V4(self.address), self.output_port);
                socket.try_send_to(bytes, peer)
            }
            Transport::Tcp(stream) => stream.try_write(bytes),
        };

        match result {
            Ok(n) => n,
            Err(err) => {
                warn!(port = self.output_port, %err, "socket send failed, ignoring this tick");
                0
            }
        }
    }

    /// Non-blocking read. Returns `0` when no datagram is pending (never
    /// blocks the engine tick); returns the number of bytes copied into
    /// `buf` otherwise. `buf` should be at least `MAX_DATAGRAM_SIZE`.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if self.disabled.load() {
            return 0;
        }

        let Some(transport) = &self.transport else {
            return 0;
        };

        let result = match transport {
            // Source address is intentionally discarded: this socket
            // isn't connected, so any peer can deliver here, and the
            // watchdogs (not a source filter) are what decide whether
            // traffic counts as "alive".
            Transport::Udp(socket) => socket.try_recv_from(buf).map(|(n, _src)| n),
            Transport::Tcp(stream) => stream.try_read(buf),
        };

        match result {
            Ok(n) => n,
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(err) => {
                warn!(port = self.input_port, %err, "socket read failed, ignoring this tick");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_on_unopened_socket_is_a_noop() {
        let socket = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, 0, 0);
        assert_eq!(socket.send(b"hello"), 0);
    }

    #[test]
    fn send_with_empty_buffer_is_a_noop() {
        let socket = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, 0, 0);
        assert_eq!(socket.send(b""), 0);
    }

    #[test]
    fn read_on_unopened_socket_returns_zero() {
        let socket = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, 0, 0);
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        assert_eq!(socket.read(&mut buf), 0);
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let mut socket = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, 0, 0);
        socket.open().await.unwrap();
        assert!(socket.is_open());
        socket.open().await.unwrap();
        assert!(socket.is_open());
    }

    #[tokio::test]
    async fn close_then_read_returns_zero() {
        let mut socket = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, 0, 0);
        socket.open().await.unwrap();
        socket.close();
        assert!(!socket.is_open());
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        assert_eq!(socket.read(&mut buf), 0);
    }

    #[tokio::test]
    async fn tcp_rejects_broadcast_address() {
        let mut socket = Socket::descriptor(Ipv4Addr::BROADCAST, SocketKind::Tcp, 0, 0);
        let err = socket.open().await.unwrap_err();
        assert!(matches!(err, Error::AddressInvalid { kind: SocketKind::Tcp }));
        assert!(!socket.is_open());
    }

    /// Two independently-bound UDP sockets must round-trip a datagram
    /// even when the receiver's configured `output_port` (the port it
    /// would send replies to) does not match the sender's actual bound
    /// source port. A `recv`-side socket `connect()`ed to
    /// `(address, output_port)` would filter on exactly that source port
    /// and silently drop this datagram — which is the bug this test
    /// exists to catch.
    #[tokio::test]
    async fn udp_send_then_read_round_trips_across_distinct_ports() {
        let a_port = 34_000;
        let b_port = 34_001;
        let unrelated_port = 34_002;

        let mut a = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, a_port, b_port);
        // `b`'s `output_port` deliberately does not match `a`'s real bound
        // port: if `b`'s receive socket were `connect()`ed to
        // `(address, output_port)`, it would only accept datagrams from
        // `unrelated_port`, never from `a_port`.
        let mut b = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, b_port, unrelated_port);
        a.open().await.unwrap();
        b.open().await.unwrap();

        assert_eq!(a.send(b"ping"), 4);

        // `try_recv_from` can race the datagram's arrival on a loaded
        // machine; give it a few non-blocking attempts before failing.
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let mut n = 0;
        for _ in 0..100 {
            n = b.read(&mut buf);
            if n > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], b"ping");
    }

    #[tokio::test]
    async fn disabled_socket_does_not_send_or_read() {
        let mut socket = Socket::descriptor(Ipv4Addr::LOCALHOST, SocketKind::Udp, 0, 0);
        socket.open().await.unwrap();
        socket.set_disabled(true);
        assert_eq!(socket.send(b"hi"), 0);
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        assert_eq!(socket.read(&mut buf), 0);
    }
}
