//! TIPC Common Types
//!
//! Shared types used across the socket layer: addresses, service names,
//! socket types, option values, flag sets and receive-path verdicts.

use std::time::Duration;

use bitflags::bitflags;

use crate::error::SockError;
use crate::tipc_proto::{self, ErrCode};

/// Lowest assignable port identity
pub const TIPC_MIN_PORT: u32 = 1;
/// Highest assignable port identity
pub const TIPC_MAX_PORT: u32 = 0xFFFF_FFFE;

/// Name types below this value are reserved for the stack itself
pub const TIPC_RESERVED_TYPES: u32 = 64;
/// Configuration service type, exempt from the reservation
pub const TIPC_CFG_SRV: u32 = 0;
/// Topology service type, exempt from the reservation
pub const TIPC_TOP_SRV: u32 = 1;

// ============================================================================
// Addresses
// ============================================================================

/// Socket identity: node address plus port identity
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TipcAddr {
    pub node: u32,
    pub port: u32,
}

impl TipcAddr {
    pub const fn new(node: u32, port: u32) -> Self {
        Self { node, port }
    }
}

/// A single service name instance
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAddr {
    pub stype: u32,
    pub instance: u32,
}

impl ServiceAddr {
    pub const fn new(stype: u32, instance: u32) -> Self {
        Self { stype, instance }
    }
}

/// A contiguous range of instances of one service type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRange {
    pub stype: u32,
    pub lower: u32,
    pub upper: u32,
}

impl ServiceRange {
    pub const fn new(stype: u32, lower: u32, upper: u32) -> Self {
        Self { stype, lower, upper }
    }

    pub fn overlaps(&self, other: &ServiceRange) -> bool {
        self.stype == other.stype && self.lower <= other.upper && other.lower <= self.upper
    }

    pub fn contains(&self, stype: u32, instance: u32) -> bool {
        self.stype == stype && self.lower <= instance && instance <= self.upper
    }

    pub fn is_reserved(&self) -> bool {
        self.stype < TIPC_RESERVED_TYPES && self.stype != TIPC_TOP_SRV && self.stype != TIPC_CFG_SRV
    }
}

impl From<ServiceAddr> for ServiceRange {
    fn from(name: ServiceAddr) -> Self {
        Self::new(name.stype, name.instance, name.instance)
    }
}

/// Destination or peer address passed to connect/send
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SockAddr {
    /// Clears an implicit peer
    Unspec,
    /// Direct port identity
    Id(TipcAddr),
    /// Service name, resolved through the name table; domain 0 means any node
    Name { name: ServiceAddr, domain: u32 },
    /// Every socket bound to an overlapping range
    Mcast(ServiceRange),
}

/// Publication scope
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Zone = 1,
    Cluster = 2,
    Node = 3,
}

impl TryFrom<u32> for Scope {
    type Error = SockError;

    fn try_from(val: u32) -> Result<Self, Self::Error> {
        match val {
            1 => Ok(Scope::Zone),
            2 => Ok(Scope::Cluster),
            3 => Ok(Scope::Node),
            _ => Err(SockError::InvalidArgument),
        }
    }
}

/// Argument to bind(): publish, withdraw one range, or withdraw everything
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Binding {
    Publish { range: ServiceRange, scope: Scope },
    Withdraw { range: ServiceRange, scope: Scope },
    WithdrawAll,
}

impl Binding {
    /// Signed-scope form: positive publishes, zero or negative withdraws
    pub fn from_scope(range: ServiceRange, scope: i32) -> Result<Self, SockError> {
        let abs = Scope::try_from(scope.unsigned_abs())?;
        if scope > 0 {
            Ok(Binding::Publish { range, scope: abs })
        } else {
            Ok(Binding::Withdraw { range, scope: abs })
        }
    }
}

// ============================================================================
// Socket Types and Options
// ============================================================================

/// Socket type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SockType {
    Stream,
    SeqPacket,
    Datagram,
    Rdm,
}

impl SockType {
    pub fn is_connectionless(&self) -> bool {
        matches!(self, SockType::Datagram | SockType::Rdm)
    }
}

/// Message importance class
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Importance {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl TryFrom<u32> for Importance {
    type Error = SockError;

    fn try_from(val: u32) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(Importance::Low),
            1 => Ok(Importance::Medium),
            2 => Ok(Importance::High),
            3 => Ok(Importance::Critical),
            _ => Err(SockError::InvalidArgument),
        }
    }
}

/// Multicast delivery method
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct McastMethod {
    pub rcast: bool,      // Replicated unicast instead of broadcast
    pub mandatory: bool,  // Set explicitly, the transport may not override it
}

/// Settable socket options
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SockOpt {
    Importance(Importance),
    SrcDroppable(bool),
    DestDroppable(bool),
    ConnTimeout(u32),
    McastBroadcast,
    McastReplicast,
    RcvBuf(usize),
    RcvTimeout(Option<Duration>),
    SndTimeout(Option<Duration>),
}

/// Readable socket options
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SockOptName {
    Importance,
    SrcDroppable,
    DestDroppable,
    ConnTimeout,
    NodeRecvqDepth,
    SockRecvqDepth,
    RcvBuf,
}

/// Which address getname() reports
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GetNameKind {
    Own,
    Peer,
    /// Peer of a connected socket, or of one that has since disconnected
    PeerIncludingDisconnected,
}

/// Directions passed to shutdown()
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShutdownHow {
    Read,
    Write,
    Both,
}

// ============================================================================
// Flag Sets
// ============================================================================

bitflags! {
    /// Readiness reported by poll()
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PollEvents: u32 {
        const IN = 0x0001;
        const OUT = 0x0004;
        const ERR = 0x0008;
        const HUP = 0x0010;
        const RDNORM = 0x0040;
        const RDHUP = 0x2000;
    }
}

bitflags! {
    /// recv() flags
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct RecvFlags: u32 {
        const PEEK = 0x02;
        const WAITALL = 0x100;
        const DONTWAIT = 0x40;
    }
}

bitflags! {
    /// send() flags
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct SendFlags: u32 {
        const DONTWAIT = 0x40;
    }
}

bitflags! {
    /// Directions already shut down
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ShutdownFlags: u8 {
        const RCV = 0x1;
        const SEND = 0x2;
    }
}

bitflags! {
    /// Capabilities a peer node advertises
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct PeerCaps: u16 {
        const BLOCK_FLOWCTL = 0x4;
    }
}

// ============================================================================
// Receive Results
// ============================================================================

/// Error details of a returned message
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ErrCode,
    pub data_len: usize,
}

/// Ancillary data delivered with a received message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecvMeta {
    pub origin: Option<TipcAddr>,
    pub dest_name: Option<ServiceRange>,
    pub error: Option<ErrorInfo>,
    pub returned: Vec<u8>,     // Payload of a rejected message, capped at the forward limit
}

/// Outcome of a successful recv()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecvInfo {
    pub len: usize,
    pub truncated: bool,
    pub meta: RecvMeta,
}

/// Receive-path decision for one inbound message
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    Reject(ErrCode),
    Drop,  // Consumed without a reply
}

impl FilterVerdict {
    pub(crate) fn no_port() -> Self {
        FilterVerdict::Reject(tipc_proto::TIPC_ERR_NO_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_types_exclude_service_types() {
        assert!(ServiceRange::new(5, 0, 0).is_reserved());
        assert!(!ServiceRange::new(TIPC_TOP_SRV, 0, 0).is_reserved());
        assert!(!ServiceRange::new(TIPC_CFG_SRV, 0, 0).is_reserved());
        assert!(!ServiceRange::new(64, 0, 0).is_reserved());
    }

    #[test]
    fn signed_scope_selects_publish_or_withdraw() {
        let r = ServiceRange::new(1000, 1, 10);
        assert_eq!(
            Binding::from_scope(r, 2).unwrap(),
            Binding::Publish { range: r, scope: Scope::Cluster }
        );
        assert_eq!(
            Binding::from_scope(r, -3).unwrap(),
            Binding::Withdraw { range: r, scope: Scope::Node }
        );
        assert!(Binding::from_scope(r, 0).is_err());
    }

    #[test]
    fn range_overlap() {
        let a = ServiceRange::new(100, 10, 20);
        assert!(a.overlaps(&ServiceRange::new(100, 20, 30)));
        assert!(!a.overlaps(&ServiceRange::new(100, 21, 30)));
        assert!(!a.overlaps(&ServiceRange::new(101, 10, 20)));
        assert!(a.contains(100, 15));
    }
}
