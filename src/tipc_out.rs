//! TIPC Message Construction (TX Path)
//!
//! Builds every message a socket sends. Each call produces a fresh header
//! from the sending context, so concurrent sends never share header state.

use crate::state::SockOptions;
use crate::tipc_proto::{
    ErrCode, TipcHdr, TipcMsg, BASIC_H_SIZE, CONN_MANAGER, INT_H_SIZE, MCAST_H_SIZE, NAMED_H_SIZE,
    SHORT_H_SIZE, SOCK_WAKEUP, TIPC_CONN_MSG, TIPC_CRITICAL_IMPORTANCE, TIPC_DIRECT_MSG,
    TIPC_MCAST_MSG, TIPC_NAMED_MSG, TIPC_OK,
};
use crate::tipc_types::{Importance, ServiceAddr, ServiceRange, TipcAddr};

/// TIPC TX Builder
///
/// Carries the sender identity and the per-socket delivery options.
#[derive(Debug, Copy, Clone)]
pub struct SockTx {
    origin: TipcAddr,
    importance: Importance,
    src_droppable: bool,
    dest_droppable: bool,
}

impl SockTx {
    pub fn new(origin: TipcAddr, opts: &SockOptions) -> Self {
        Self {
            origin,
            importance: opts.importance,
            src_droppable: opts.src_droppable,
            dest_droppable: opts.dest_droppable,
        }
    }

    fn data_hdr(&self, mtype: u8, hdr_size: usize, dest: TipcAddr) -> TipcHdr {
        let mut hdr = TipcHdr::new(self.importance as u8, mtype, hdr_size, self.origin, dest);
        hdr.src_droppable = self.src_droppable;
        hdr.dest_droppable = self.dest_droppable;
        hdr
    }

    // ------------------------------------------------------------------------
    // Data Messages
    // ------------------------------------------------------------------------

    /// Message to a service name, already resolved to `dest`
    pub fn named(&self, name: ServiceAddr, domain: u32, dest: TipcAddr, data: Vec<u8>) -> TipcMsg {
        let mut hdr = self.data_hdr(TIPC_NAMED_MSG, NAMED_H_SIZE, dest);
        hdr.name_type = name.stype;
        hdr.name_lower = name.instance;
        hdr.name_upper = name.instance;
        hdr.lookup_domain = domain;
        TipcMsg::new(hdr, data)
    }

    /// Message to a port identity
    pub fn direct(&self, dest: TipcAddr, data: Vec<u8>) -> TipcMsg {
        TipcMsg::new(self.data_hdr(TIPC_DIRECT_MSG, BASIC_H_SIZE, dest), data)
    }

    /// Message to every socket bound to an overlapping range
    pub fn mcast(&self, range: ServiceRange, data: Vec<u8>) -> TipcMsg {
        let mut hdr = self.data_hdr(TIPC_MCAST_MSG, MCAST_H_SIZE, TipcAddr::new(0, 0));
        hdr.name_type = range.stype;
        hdr.name_lower = range.lower;
        hdr.name_upper = range.upper;
        TipcMsg::new(hdr, data)
    }

    /// Message on an established connection
    pub fn conn(&self, peer: TipcAddr, data: Vec<u8>) -> TipcMsg {
        TipcMsg::new(self.data_hdr(TIPC_CONN_MSG, SHORT_H_SIZE, peer), data)
    }

    // ------------------------------------------------------------------------
    // Control Messages
    // ------------------------------------------------------------------------

    /// Connection abort carrying `err`, sent at critical importance
    pub fn conn_abort(origin: TipcAddr, peer: TipcAddr, err: ErrCode) -> TipcMsg {
        let mut hdr = TipcHdr::new(TIPC_CRITICAL_IMPORTANCE, TIPC_CONN_MSG, SHORT_H_SIZE, origin, peer);
        hdr.errcode = err;
        TipcMsg::new(hdr, Vec::new())
    }

    /// Connection manager message (probe, probe reply, ack)
    pub fn conn_mgr(origin: TipcAddr, peer: TipcAddr, mtype: u8) -> TipcMsg {
        TipcMsg::new(TipcHdr::new(CONN_MANAGER, mtype, INT_H_SIZE, origin, peer), Vec::new())
    }

    /// Congestion relief notice from the link to `link_node`, for a local port
    pub fn wakeup(own_node: u32, dport: u32, link_node: u32) -> TipcMsg {
        let mut hdr = TipcHdr::new(
            SOCK_WAKEUP,
            0,
            INT_H_SIZE,
            TipcAddr::new(link_node, 0),
            TipcAddr::new(own_node, dport),
        );
        hdr.errcode = TIPC_OK;
        hdr.prevnode = own_node;
        TipcMsg::new(hdr, Vec::new())
    }
}
