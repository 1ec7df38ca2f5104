//! Per-Node Socket Context
//!
//! `TipcNet` is what one node's socket layer shares: its own address, the
//! configuration, the transport and name table collaborators and the
//! portid table. Inbound messages from the transport enter here.

use std::sync::Arc;

use crate::config::SockConfig;
use crate::error::SockResult;
use crate::table::SockTable;
use crate::tipc_proto::{TipcMsg, TIPC_ERR_NO_NAME, TIPC_ERR_NO_PORT, TIPC_OK};
use crate::tipc_sock::TipcSock;
use crate::tipc_types::TipcAddr;
use crate::transport::{NameTable, Transport};

/// Socket layer of one node
pub struct TipcNet {
    own_node: u32,
    config: SockConfig,
    transport: Arc<dyn Transport>,
    names: Arc<dyn NameTable>,
    pub(crate) table: SockTable<TipcSock>,
}

impl TipcNet {
    pub fn new(
        own_node: u32,
        config: SockConfig,
        transport: Arc<dyn Transport>,
        names: Arc<dyn NameTable>,
    ) -> SockResult<Arc<Self>> {
        config.validate()?;
        let table = SockTable::new(config.table_buckets);
        log::debug!("node {:#x}: socket layer up, {} table buckets", own_node, table.bucket_count());
        Ok(Arc::new(Self {
            own_node,
            config,
            transport,
            names,
            table,
        }))
    }

    #[inline]
    pub fn own_node(&self) -> u32 {
        self.own_node
    }

    #[inline]
    pub fn config(&self) -> &SockConfig {
        &self.config
    }

    #[inline]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    #[inline]
    pub fn names(&self) -> &dyn NameTable {
        self.names.as_ref()
    }

    /// Live socket with portid `portid`
    pub fn lookup(&self, portid: u32) -> Option<Arc<TipcSock>> {
        self.table.lookup(portid)
    }

    pub fn socket_count(&self) -> usize {
        self.table.len()
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Deliver a message addressed to a port on this node
    ///
    /// Never blocks on a socket lock. Rejections, forwarded messages and
    /// protocol replies are transmitted before returning.
    pub fn rcv(&self, msg: TipcMsg) {
        let mut xmitq = Vec::new();
        self.rcv_one(msg, &mut xmitq);
        self.xmit_all(xmitq);
    }

    /// Deliver a multicast message to every local port bound to an
    /// overlapping range
    pub fn mcast_rcv(&self, msg: TipcMsg) {
        let ports = self.names.lookup_local_ports(&msg.hdr.name_range(), self.own_node);
        log::trace!("node {:#x}: multicast to {} local ports", self.own_node, ports.len());
        let mut xmitq = Vec::new();
        for port in ports {
            let mut copy = msg.clone();
            copy.hdr.dest = TipcAddr::new(self.own_node, port);
            self.rcv_one(copy, &mut xmitq);
        }
        self.xmit_all(xmitq);
    }

    fn rcv_one(&self, mut msg: TipcMsg, xmitq: &mut Vec<TipcMsg>) {
        if let Some(sk) = self.table.lookup(msg.hdr.dest.port) {
            sk.enqueue(msg, xmitq);
            return;
        }

        // No such port: a named message may still find another instance
        let mut err = TIPC_ERR_NO_PORT;
        if msg.hdr.is_named() && msg.hdr.errcode == TIPC_OK {
            err = TIPC_ERR_NO_NAME;
            if msg.hdr.reroute_cnt == 0 {
                let hdr = &msg.hdr;
                if let Some(dest) = self
                    .names
                    .translate(hdr.name_type, hdr.name_lower, hdr.lookup_domain, self.own_node)
                {
                    log::trace!(
                        "node {:#x}: rerouting {{{}, {}}} to {:#x}:{}",
                        self.own_node,
                        hdr.name_type,
                        hdr.name_lower,
                        dest.node,
                        dest.port
                    );
                    msg.hdr.reroute_cnt += 1;
                    if dest.node != self.own_node {
                        msg.hdr.prevnode = self.own_node;
                    }
                    msg.hdr.dest = dest;
                    xmitq.push(msg);
                    return;
                }
            }
        }

        log::trace!("node {:#x}: no port {}, error {}", self.own_node, msg.hdr.dest.port, err);
        if let Some(rev) = msg.reverse(self.own_node, err, self.config.max_forward_size) {
            xmitq.push(rev);
        }
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Transmit messages produced while a socket lock was held
    ///
    /// Failures are not reported to anyone: these are replies and
    /// rejections with no caller waiting on them.
    pub(crate) fn xmit_all(&self, xmitq: Vec<TipcMsg>) {
        for msg in xmitq {
            let dnode = msg.hdr.dest.node;
            let selector = msg.hdr.orig.port;
            if let Err(e) = self.transport.xmit(msg, dnode, selector) {
                log::trace!("node {:#x}: dropping reply: {}", self.own_node, e);
            }
        }
    }
}
