//! Socket State
//!
//! The connection automaton and the complete per-socket state, aggregated
//! from the disjoint components in the components module.

pub use crate::components::{
    ConnectionManagementState,
    FlowControlState,
    CongestionControlState,
    PublicationsState,
    RxQueue,
};

use std::time::Duration;

use crate::config::SockConfig;
use crate::tipc_proto::MAX_PKT_DEFAULT;
use crate::tipc_types::{Importance, McastMethod, SockType};

/// Socket State Machine States
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SockState {
    Open = 0,
    Listen = 1,
    Connecting = 2,
    Established = 3,
    Disconnecting = 4,
}

impl SockState {
    pub fn from_u32(val: u32) -> Option<Self> {
        match val {
            0 => Some(SockState::Open),
            1 => Some(SockState::Listen),
            2 => Some(SockState::Connecting),
            3 => Some(SockState::Established),
            4 => Some(SockState::Disconnecting),
            _ => None,
        }
    }

    /// Legal transitions of the automaton
    ///
    /// OPEN → ESTABLISHED exists only for a child created by accept().
    /// Nothing ever returns to OPEN.
    pub fn can_transition_to(&self, next: SockState) -> bool {
        use SockState::*;
        matches!(
            (*self, next),
            (Open, Listen)
                | (Open, Connecting)
                | (Open, Established)
                | (Connecting, Established)
                | (Connecting, Disconnecting)
                | (Established, Disconnecting)
        )
    }
}

/// Per-socket options
pub struct SockOptions {
    pub importance: Importance,
    pub src_droppable: bool,
    pub dest_droppable: bool,
    pub mc_method: McastMethod,
    pub rcv_timeout: Option<Duration>,
    pub snd_timeout: Option<Duration>,
}

impl SockOptions {
    /// Connectionless sockets do not get their messages returned; datagram
    /// sockets additionally let the network drop them under load.
    pub fn new(ty: SockType, cfg: &SockConfig) -> Self {
        Self {
            importance: Importance::Low,
            src_droppable: ty == SockType::Datagram,
            dest_droppable: ty.is_connectionless(),
            mc_method: McastMethod::default(),
            rcv_timeout: cfg.rcv_timeout_ms.map(Duration::from_millis),
            snd_timeout: cfg.snd_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Complete Socket State
///
/// Everything guarded by the socket lock.
pub struct TipcSockState {
    pub conn_mgmt: ConnectionManagementState,
    pub flow_ctrl: FlowControlState,
    pub cong_ctrl: CongestionControlState,
    pub publ: PublicationsState,
    pub rxq: RxQueue,
    pub opts: SockOptions,
}

impl TipcSockState {
    pub fn new(ty: SockType, cfg: &SockConfig) -> Self {
        Self {
            conn_mgmt: ConnectionManagementState::new(cfg.conn_timeout_ms, MAX_PKT_DEFAULT),
            flow_ctrl: FlowControlState::new(cfg),
            cong_ctrl: CongestionControlState::new(),
            publ: PublicationsState::new(),
            rxq: RxQueue::new(),
            opts: SockOptions::new(ty, cfg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(SockState::Open, SockState::Listen, true)]
    #[test_case(SockState::Open, SockState::Connecting, true)]
    #[test_case(SockState::Connecting, SockState::Established, true)]
    #[test_case(SockState::Established, SockState::Disconnecting, true)]
    #[test_case(SockState::Listen, SockState::Established, false)]
    #[test_case(SockState::Listen, SockState::Disconnecting, false)]
    #[test_case(SockState::Established, SockState::Open, false)]
    #[test_case(SockState::Disconnecting, SockState::Open, false)]
    #[test_case(SockState::Disconnecting, SockState::Established, false)]
    #[test_case(SockState::Open, SockState::Disconnecting, false)]
    fn transitions(from: SockState, to: SockState, legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn defaults_per_type() {
        let cfg = SockConfig::default();
        let dgram = TipcSockState::new(SockType::Datagram, &cfg);
        assert!(dgram.opts.src_droppable && dgram.opts.dest_droppable);
        let rdm = TipcSockState::new(SockType::Rdm, &cfg);
        assert!(!rdm.opts.src_droppable && rdm.opts.dest_droppable);
        let stream = TipcSockState::new(SockType::Stream, &cfg);
        assert!(!stream.opts.dest_droppable);
        assert_eq!(stream.conn_mgmt.state, SockState::Open);
        assert_eq!(SockState::from_u32(3), Some(SockState::Established));
    }
}
