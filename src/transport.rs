//! Collaborator Interfaces
//!
//! The socket layer sits on a node/link transport and a cluster name table.
//! Both are external; this module states the contract the socket layer
//! relies on.

use thiserror::Error;

use crate::components::Publication;
use crate::tipc_proto::TipcMsg;
use crate::tipc_types::{McastMethod, PeerCaps, Scope, ServiceRange, TipcAddr};

/// Link layer failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no link to node {0:#x}")]
    LinkDown(u32),
    #[error("message of {0} bytes exceeds link capacity")]
    TooLarge(usize),
}

impl TransportError {
    pub fn errno(&self) -> i32 {
        match self {
            TransportError::LinkDown(_) => libc::EHOSTUNREACH,
            TransportError::TooLarge(_) => libc::EMSGSIZE,
        }
    }
}

/// Result of handing a message to a link
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XmitStatus {
    Sent,
    /// Accepted, but the link is now congested; a wakeup follows later
    Congested,
}

/// Nodes hosting at least one destination of a multicast
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeList {
    pub local: bool,
    pub remote: Vec<u32>,
}

impl NodeList {
    pub fn is_empty(&self) -> bool {
        !self.local && self.remote.is_empty()
    }
}

/// Node/link transport
///
/// Delivery is best effort. Implementations must never call back into the
/// sending socket in a way that blocks on its lock; inbound messages enter
/// through `TipcNet::rcv` and `TipcNet::mcast_rcv`.
pub trait Transport: Send + Sync {
    /// Send one message to `dnode`; `selector` picks among parallel links
    fn xmit(&self, msg: TipcMsg, dnode: u32, selector: u32) -> Result<XmitStatus, TransportError>;

    /// Send one message to every node in `dsts`; returns the number of
    /// congested links
    fn mcast_xmit(
        &self,
        msg: TipcMsg,
        method: McastMethod,
        dsts: &NodeList,
        selector: u32,
    ) -> Result<u32, TransportError>;

    /// Largest message the link to `dnode` carries
    fn mtu(&self, dnode: u32, selector: u32) -> usize;

    fn capabilities(&self, dnode: u32) -> PeerCaps;

    /// Register a connection so the node can abort it if the peer goes away
    fn add_conn(&self, dnode: u32, port: u32, peer_port: u32);

    fn remove_conn(&self, dnode: u32, port: u32);
}

/// Cluster name table
pub trait NameTable: Send + Sync {
    fn publish(
        &self,
        range: ServiceRange,
        scope: Scope,
        node: u32,
        port: u32,
        key: u32,
    ) -> Option<Publication>;

    fn withdraw(&self, stype: u32, lower: u32, node: u32, port: u32, key: u32) -> bool;

    /// Resolve one instance to a socket, as seen from `from_node`;
    /// `domain` 0 accepts any node
    fn translate(&self, stype: u32, instance: u32, domain: u32, from_node: u32) -> Option<TipcAddr>;

    fn lookup_dst_nodes(&self, range: &ServiceRange, from_node: u32) -> NodeList;

    /// Ports on `node` bound to a range overlapping `range`
    fn lookup_local_ports(&self, range: &ServiceRange, node: u32) -> Vec<u32>;
}
