//! In-Process Transport Fabric
//!
//! Connects any number of nodes living in one process. Delivery is
//! synchronous: `xmit` hands the message straight to the destination
//! node's receive entry. Congestion, lost links and peer capabilities can
//! be set per node, and every transmitted message can be captured.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::config::SockConfig;
use crate::error::SockResult;
use crate::net::TipcNet;
use crate::tipc_out::SockTx;
use crate::tipc_proto::{TipcMsg, MAX_PKT_DEFAULT};
use crate::tipc_types::{McastMethod, PeerCaps};
use crate::transport::{NameTable, NodeList, Transport, TransportError, XmitStatus};

/// Sender waiting for a congested link to clear
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Waiter {
    node: u32,
    port: u32,
    link: u32,
}

#[derive(Default)]
struct FabricState {
    /* Link conditions */
    lossy: HashSet<u32>,           // Messages to these nodes vanish
    congested: HashSet<u32>,       // Links reporting backpressure
    waiters: Vec<Waiter>,
    caps: HashMap<u32, PeerCaps>,
    mtu: HashMap<u32, usize>,

    /* Connections registered by sockets: (node, port) -> (peer node, peer port) */
    conns: HashMap<(u32, u32), (u32, u32)>,

    /* Counters */
    xmit_cnt: u64,
    mcast_cnt: u64,
    capture: Option<Vec<TipcMsg>>,
}

impl FabricState {
    /// Owe `w` a wakeup once its link clears
    fn add_waiter(&mut self, w: Waiter) {
        if !self.waiters.contains(&w) {
            self.waiters.push(w);
        }
    }
}

/// Multi-node fabric
#[derive(Default)]
pub struct Loopback {
    nodes: RwLock<HashMap<u32, Weak<TipcNet>>>,
    state: Mutex<FabricState>,
}

/// One node's attachment to the fabric
pub struct LoopbackLink {
    fabric: Arc<Loopback>,
    own: u32,
}

impl Loopback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Build the socket layer of node `own` on this fabric
    pub fn add_node(
        self: &Arc<Self>,
        own: u32,
        config: SockConfig,
        names: Arc<dyn NameTable>,
    ) -> SockResult<Arc<TipcNet>> {
        let net = TipcNet::new(own, config, self.link(own), names)?;
        self.attach(&net);
        Ok(net)
    }

    /// Transport handle for node `own`
    pub fn link(self: &Arc<Self>, own: u32) -> Arc<dyn Transport> {
        Arc::new(LoopbackLink {
            fabric: Arc::clone(self),
            own,
        })
    }

    /// Make `net` reachable under its own node address
    pub fn attach(&self, net: &Arc<TipcNet>) {
        self.nodes.write().insert(net.own_node(), Arc::downgrade(net));
    }

    pub fn remove_node(&self, node: u32) {
        self.nodes.write().remove(&node);
    }

    fn node(&self, node: u32) -> Option<Arc<TipcNet>> {
        self.nodes.read().get(&node).and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------------
    // Link Conditions
    // ------------------------------------------------------------------------

    /// Silently lose every message sent to `node` while set
    pub fn set_lossy(&self, node: u32, lossy: bool) {
        let mut st = self.state.lock();
        if lossy {
            st.lossy.insert(node);
        } else {
            st.lossy.remove(&node);
        }
    }

    /// Report backpressure on the link to `node` until relieved
    pub fn set_congested(&self, node: u32) {
        self.state.lock().congested.insert(node);
    }

    /// Clear congestion towards `node` and wake every sender that hit it
    pub fn relieve_congestion(&self, node: u32) {
        let waiters: Vec<Waiter> = {
            let mut st = self.state.lock();
            st.congested.remove(&node);
            let (hit, rest): (Vec<Waiter>, Vec<Waiter>) = st.waiters.drain(..).partition(|w| w.link == node);
            st.waiters = rest;
            hit
        };
        for w in waiters {
            if let Some(net) = self.node(w.node) {
                net.rcv(SockTx::wakeup(w.node, w.port, w.link));
            }
        }
    }

    pub fn set_capabilities(&self, node: u32, caps: PeerCaps) {
        self.state.lock().caps.insert(node, caps);
    }

    pub fn set_mtu(&self, node: u32, mtu: usize) {
        self.state.lock().mtu.insert(node, mtu);
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Unicast messages handed to the fabric
    pub fn xmit_count(&self) -> u64 {
        self.state.lock().xmit_cnt
    }

    /// Multicast messages handed to the fabric
    pub fn mcast_count(&self) -> u64 {
        self.state.lock().mcast_cnt
    }

    /// Start keeping a copy of every unicast message
    pub fn start_capture(&self) {
        self.state.lock().capture = Some(Vec::new());
    }

    /// Messages captured since the last call
    pub fn take_captured(&self) -> Vec<TipcMsg> {
        match self.state.lock().capture.as_mut() {
            Some(msgs) => std::mem::take(msgs),
            None => Vec::new(),
        }
    }

    /// Peer registered by socket `port` on `node`, if connected
    pub fn conn_of(&self, node: u32, port: u32) -> Option<(u32, u32)> {
        self.state.lock().conns.get(&(node, port)).copied()
    }

    pub fn conn_count(&self) -> usize {
        self.state.lock().conns.len()
    }
}

impl Transport for LoopbackLink {
    fn xmit(&self, msg: TipcMsg, dnode: u32, _selector: u32) -> Result<XmitStatus, TransportError> {
        let fabric = &self.fabric;
        let net = fabric.node(dnode).ok_or(TransportError::LinkDown(dnode))?;
        let (lost, status) = {
            let mut st = fabric.state.lock();
            st.xmit_cnt += 1;
            if let Some(capture) = st.capture.as_mut() {
                capture.push(msg.clone());
            }
            let status = if st.congested.contains(&dnode) {
                st.add_waiter(Waiter {
                    node: msg.hdr.orig.node,
                    port: msg.hdr.orig.port,
                    link: dnode,
                });
                XmitStatus::Congested
            } else {
                XmitStatus::Sent
            };
            (st.lossy.contains(&dnode), status)
        };
        if lost {
            log::trace!("loopback: lost message {:#x} -> {:#x}", self.own, dnode);
        } else {
            net.rcv(msg);
        }
        Ok(status)
    }

    fn mcast_xmit(
        &self,
        msg: TipcMsg,
        _method: McastMethod,
        dsts: &NodeList,
        _selector: u32,
    ) -> Result<u32, TransportError> {
        let fabric = &self.fabric;
        let mut targets = Vec::new();
        if dsts.local {
            targets.push(self.own);
        }
        targets.extend(dsts.remote.iter().copied());

        let (deliver, congested) = {
            let mut st = fabric.state.lock();
            st.mcast_cnt += 1;
            let deliver: Vec<u32> = targets.iter().copied().filter(|n| !st.lossy.contains(n)).collect();
            let mut congested = 0;
            let congested_links: Vec<u32> =
                targets.iter().copied().filter(|n| st.congested.contains(n)).collect();
            for link in congested_links {
                st.add_waiter(Waiter {
                    node: msg.hdr.orig.node,
                    port: msg.hdr.orig.port,
                    link,
                });
                congested += 1;
            }
            (deliver, congested)
        };
        for node in deliver {
            if let Some(net) = fabric.node(node) {
                net.mcast_rcv(msg.clone());
            }
        }
        Ok(congested)
    }

    fn mtu(&self, dnode: u32, _selector: u32) -> usize {
        self.fabric.state.lock().mtu.get(&dnode).copied().unwrap_or(MAX_PKT_DEFAULT)
    }

    fn capabilities(&self, dnode: u32) -> PeerCaps {
        self.fabric
            .state
            .lock()
            .caps
            .get(&dnode)
            .copied()
            .unwrap_or(PeerCaps::BLOCK_FLOWCTL)
    }

    fn add_conn(&self, dnode: u32, port: u32, peer_port: u32) {
        self.fabric.state.lock().conns.insert((self.own, port), (dnode, peer_port));
    }

    fn remove_conn(&self, _dnode: u32, port: u32) {
        self.fabric.state.lock().conns.remove(&(self.own, port));
    }
}
