use std::fmt;

use crate::socket::SocketKind;

/// Errors surfaced by the core.
///
/// Transient I/O (send/read failures, parser rejections, a null active
/// protocol) are *not* represented here — per the propagation policy they
/// are absorbed by the engine and never reach the caller. Only the
/// lifecycle-level failures in the table below are.
#[derive(Debug)]
pub enum Error {
    /// `Socket::open` could not bind `input_port`.
    BindRefused { input_port: u16, source: std::io::Error },
    /// `Socket::open` was given an address that cannot be used for `kind`.
    AddressInvalid { kind: SocketKind },
    /// A registered `Protocol` violated its contract (e.g. an interval of
    /// zero reported after activation, a socket kind mismatch). These are
    /// programmer errors, not runtime conditions, and are fatal.
    ProtocolContractViolation { detail: &'static str },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BindRefused { input_port, source } => {
                write!(f, "bind refused on port {input_port}: {source}")
            }
            Error::AddressInvalid { kind } => {
                write!(f, "address invalid for socket kind {kind:?}")
            }
            Error::ProtocolContractViolation { detail } => {
                write!(f, "protocol contract violation: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BindRefused { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
