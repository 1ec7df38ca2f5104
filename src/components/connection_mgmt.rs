//! Connection Management Component
//!
//! This component owns the socket state machine and all connection
//! lifecycle data: peer identity, pending socket error, shutdown flags and
//! the keepalive probe flag.

use crate::error::{SockError, SockResult};
use crate::state::SockState;
use crate::tipc_proto::TipcHdr;
use crate::tipc_types::{ServiceAddr, ShutdownFlags, SockAddr, TipcAddr};

/// Connection Management State
///
/// Only the control path and the receive filter write to this state.
pub struct ConnectionManagementState {
    /* Lifecycle State */
    pub state: SockState,
    pub shutdown: ShutdownFlags,
    pub sk_err: Option<SockError>,   // Reported once, then cleared

    /* Peer Identity */
    pub peer: Option<TipcAddr>,           // Kept after disconnect for getname history
    pub pending_peer: Option<TipcAddr>,   // Target of an outstanding SYN
    pub implicit_peer: Option<SockAddr>,  // Connectionless connect() target
    pub conn_name: Option<ServiceAddr>,   // Service the connection was made to

    /* Keep-Alive */
    pub probe_unacked: bool,
    pub conn_timeout_ms: u32,

    /* Path */
    pub max_pkt: usize,
}

impl ConnectionManagementState {
    pub fn new(conn_timeout_ms: u32, max_pkt: usize) -> Self {
        Self {
            state: SockState::Open,
            shutdown: ShutdownFlags::empty(),
            sk_err: None,
            peer: None,
            pending_peer: None,
            implicit_peer: None,
            conn_name: None,
            probe_unacked: false,
            conn_timeout_ms,
            max_pkt,
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == SockState::Established
    }

    /// Move to `next` if the automaton allows it; otherwise leave the state
    /// untouched and fail.
    pub fn set_state(&mut self, next: SockState) -> SockResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(SockError::InvalidArgument);
        }
        log::debug!("socket state {:?} -> {:?}", self.state, next);
        self.state = next;
        if next == SockState::Disconnecting {
            self.shutdown |= ShutdownFlags::RCV;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Connection Setup
    // ------------------------------------------------------------------------

    /// OPEN → LISTEN
    pub fn on_listen(&mut self) -> SockResult<()> {
        self.set_state(SockState::Listen)
    }

    /// OPEN → CONNECTING: SYN handed to the transport
    pub fn on_syn_sent(&mut self, target: TipcAddr) -> SockResult<()> {
        self.set_state(SockState::Connecting)?;
        self.pending_peer = Some(target);
        Ok(())
    }

    /// CONNECTING → ESTABLISHED (client) or OPEN → ESTABLISHED (accepted child)
    pub fn on_established(&mut self, peer: TipcAddr, max_pkt: usize) -> SockResult<()> {
        self.set_state(SockState::Established)?;
        self.peer = Some(peer);
        self.pending_peer = None;
        self.probe_unacked = false;
        self.max_pkt = max_pkt;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Connection Teardown
    // ------------------------------------------------------------------------

    /// CONNECTING/ESTABLISHED → DISCONNECTING, optionally recording an error
    /// for the next blocked or future caller.
    pub fn on_disconnect(&mut self, err: Option<SockError>) -> SockResult<()> {
        self.set_state(SockState::Disconnecting)?;
        if err.is_some() {
            self.sk_err = err;
        }
        Ok(())
    }

    /// Take the pending socket error, if any
    pub fn take_error(&mut self) -> Option<SockError> {
        self.sk_err.take()
    }

    // ------------------------------------------------------------------------
    // Peer Validation
    // ------------------------------------------------------------------------

    /// Whether `hdr` was sent by the connected peer
    ///
    /// A zero node address on either side stands for the own node.
    pub fn is_peer_msg(&self, hdr: &TipcHdr, own_node: u32) -> bool {
        if !self.is_connected() {
            return false;
        }
        let Some(peer) = self.peer else {
            return false;
        };
        if hdr.orig.port != peer.port {
            return false;
        }
        let orig_node = hdr.orig.node;
        orig_node == peer.node
            || (orig_node == 0 && peer.node == own_node)
            || (peer.node == 0 && orig_node == own_node)
    }

    /// Whether `hdr` comes from the target of the outstanding SYN
    pub fn is_pending_peer_msg(&self, hdr: &TipcHdr) -> bool {
        self.pending_peer == Some(hdr.orig)
    }
}
