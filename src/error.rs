//! Socket Error Taxonomy
//!
//! Every failure a socket operation can report, plus the errno each one maps
//! to for callers that speak the C socket ABI.

use thiserror::Error;

use crate::transport::TransportError;

/// Result alias used by every socket operation.
pub type SockResult<T> = Result<T, SockError>;

/// Socket layer error
///
/// Variants are grouped the way callers treat them: local contract
/// violations, wait outcomes, connection-breaking conditions and resource
/// exhaustion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SockError {
    /* Local contract violations */
    #[error("invalid argument")]
    InvalidArgument,
    #[error("socket is not connected")]
    NotConnected,
    #[error("socket is already connected")]
    AlreadyConnected,
    #[error("destination address required")]
    DestinationAddressRequired,
    #[error("message too large")]
    MessageTooLarge,
    #[error("operation not supported")]
    NotSupported,
    #[error("protocol option not available")]
    NoProtocolOption,
    #[error("permission denied")]
    AccessDenied,
    #[error("address already in use")]
    AddressInUse,
    #[error("socket has been released")]
    Released,

    /* Wait outcomes */
    #[error("operation now in progress")]
    InProgress,
    #[error("operation already in progress")]
    Already,
    #[error("operation would block")]
    WouldBlock,
    #[error("timed out")]
    TimedOut,
    #[error("interrupted")]
    Interrupted,

    /* Connection-breaking conditions */
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("no route to host")]
    HostUnreachable,

    /* Resource exhaustion */
    #[error("no free port identity")]
    PortIdsExhausted,
    #[error("dump cursor invalidated, restart the dump")]
    DumpInterrupted,

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl SockError {
    /// Positive errno value for this error
    pub fn errno(&self) -> i32 {
        match self {
            SockError::InvalidArgument => libc::EINVAL,
            SockError::NotConnected => libc::ENOTCONN,
            SockError::AlreadyConnected => libc::EISCONN,
            SockError::DestinationAddressRequired => libc::EDESTADDRREQ,
            SockError::MessageTooLarge => libc::EMSGSIZE,
            SockError::NotSupported => libc::EOPNOTSUPP,
            SockError::NoProtocolOption => libc::ENOPROTOOPT,
            SockError::AccessDenied => libc::EACCES,
            SockError::AddressInUse => libc::EADDRINUSE,
            SockError::Released => libc::EBADF,
            SockError::InProgress => libc::EINPROGRESS,
            SockError::Already => libc::EALREADY,
            SockError::WouldBlock => libc::EAGAIN,
            SockError::TimedOut => libc::ETIMEDOUT,
            SockError::Interrupted => libc::EINTR,
            SockError::ConnectionReset => libc::ECONNRESET,
            SockError::ConnectionRefused => libc::ECONNREFUSED,
            SockError::BrokenPipe => libc::EPIPE,
            SockError::HostUnreachable => libc::EHOSTUNREACH,
            SockError::PortIdsExhausted => libc::EADDRNOTAVAIL,
            SockError::DumpInterrupted => libc::EPIPE,
            SockError::Transport(e) => e.errno(),
        }
    }

    /// Negative return code, as a C shim would hand back
    pub fn to_c(&self) -> i32 {
        -self.errno()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_is_distinct_for_wait_outcomes() {
        assert_eq!(SockError::TimedOut.errno(), libc::ETIMEDOUT);
        assert_eq!(SockError::Interrupted.errno(), libc::EINTR);
        assert_ne!(SockError::WouldBlock.errno(), SockError::TimedOut.errno());
        assert_eq!(SockError::ConnectionReset.to_c(), -libc::ECONNRESET);
    }

    #[test]
    fn transport_errors_convert() {
        let e: SockError = TransportError::LinkDown(7).into();
        assert_eq!(e.errno(), libc::EHOSTUNREACH);
        assert_eq!(e.to_c(), -libc::EHOSTUNREACH);
    }
}
