//! TIPC Message Reception (RX Path)
//!
//! Classifies every inbound message against the socket state: protocol
//! messages are consumed inline, data messages are checked against the
//! connection automaton and the receive buffer limit before being queued.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::error::{SockError, SockResult};
use crate::state::{SockState, TipcSockState};
use crate::tipc_proto::{
    self, ErrCode, TipcHdr, TipcMsg, CONN_ACK, CONN_MANAGER, CONN_PROBE, CONN_PROBE_REPLY,
    SOCK_WAKEUP, TIPC_DIRECT_MSG, TIPC_ERR_OVERLOAD, TIPC_OK,
};
use crate::tipc_sock::TipcSock;
use crate::tipc_types::{FilterVerdict, TipcAddr};

/// TIPC RX Path
///
/// All entry points run with the socket lock held.
pub struct SockRx;

impl SockRx {
    /// Entry point for one message taken off the backlog
    pub(crate) fn filter_rcv(sk: &TipcSock, st: &mut TipcSockState, msg: TipcMsg, xmitq: &mut Vec<TipcMsg>) {
        if !msg.hdr.is_data() {
            Self::proto_rcv(sk, st, msg, xmitq);
            return;
        }
        if msg.hdr.mtype > TIPC_DIRECT_MSG {
            log::trace!("port {}: dropping data message of unknown type {}", sk.portid(), msg.hdr.mtype);
            return;
        }

        let limit = Self::rcvbuf_limit(sk, &msg.hdr);
        let verdict = if !sk.is_connectionless() {
            Self::filter_connect(sk, st, &msg)
        } else if msg.hdr.is_connected() {
            FilterVerdict::no_port()
        } else {
            FilterVerdict::Accept
        };

        let verdict = match verdict {
            FilterVerdict::Accept if st.rxq.bytes() + msg.truesize() >= limit => {
                sk.acct.drops.fetch_add(1, Ordering::Relaxed);
                FilterVerdict::Reject(TIPC_ERR_OVERLOAD)
            }
            v => v,
        };

        log::trace!("port {}: {:?} for message from {:?}", sk.portid(), verdict, msg.hdr.orig);
        match verdict {
            FilterVerdict::Accept => {
                st.rxq.push_back(msg);
                sk.wake();
            }
            FilterVerdict::Reject(err) => Self::reject(sk, msg, err, xmitq),
            FilterVerdict::Drop => {}
        }
    }

    /// Receive buffer admission limit for a message
    ///
    /// Connectionless traffic scales with importance; connections are
    /// bounded by the buffer itself for block peers and by a fixed window
    /// of maximum-size messages otherwise.
    pub(crate) fn rcvbuf_limit(sk: &TipcSock, hdr: &TipcHdr) -> usize {
        let rcvbuf = sk.acct.rcvbuf.load(Ordering::Acquire);
        if !hdr.is_connected() {
            return rcvbuf << hdr.importance();
        }
        if sk.acct.peer_block.load(Ordering::Acquire) {
            return rcvbuf;
        }
        let cfg = sk.net().config();
        (cfg.flowctl_msg_win as usize * 2 + 1)
            * tipc_proto::truesize(tipc_proto::MAX_H_SIZE + cfg.max_user_msg_size)
    }

    /// Return `msg` to its sender with `err`, when the message allows it
    pub(crate) fn reject(sk: &TipcSock, msg: TipcMsg, err: ErrCode, xmitq: &mut Vec<TipcMsg>) {
        let net = sk.net();
        match msg.reverse(net.own_node(), err, net.config().max_forward_size) {
            Some(rev) => xmitq.push(rev),
            None => log::trace!("port {}: dropping unreturnable message", sk.portid()),
        }
    }

    // ------------------------------------------------------------------------
    // Connection Filter
    // ------------------------------------------------------------------------

    /// Check a data message against the connection automaton
    pub(crate) fn filter_connect(sk: &TipcSock, st: &mut TipcSockState, msg: &TipcMsg) -> FilterVerdict {
        let hdr = &msg.hdr;
        match st.conn_mgmt.state {
            SockState::Connecting => {
                // Only the answer to our SYN, or a refusal
                if !hdr.is_connected() {
                    if !st.conn_mgmt.is_pending_peer_msg(hdr) {
                        return FilterVerdict::no_port();
                    }
                    Self::refuse(sk, st);
                    return FilterVerdict::Accept;
                }
                if hdr.errcode != TIPC_OK {
                    Self::refuse(sk, st);
                    return FilterVerdict::Accept;
                }
                if Self::finish_conn(sk, st, hdr.orig).is_err() {
                    return FilterVerdict::no_port();
                }
                st.opts.importance = hdr.data_importance();
                if msg.data_len() > 0 {
                    return FilterVerdict::Accept;
                }
                // Empty ACK: wake connect() and consume
                sk.wake();
                FilterVerdict::Drop
            }
            SockState::Open | SockState::Disconnecting => FilterVerdict::no_port(),
            SockState::Listen => {
                if !hdr.is_connected() && hdr.errcode == TIPC_OK {
                    FilterVerdict::Accept
                } else {
                    FilterVerdict::no_port()
                }
            }
            SockState::Established => {
                if !st.conn_mgmt.is_peer_msg(hdr, sk.net().own_node()) {
                    return FilterVerdict::no_port();
                }
                if hdr.errcode != TIPC_OK {
                    // Queued so the reader sees the reason
                    Self::drop_conn(sk, st, None);
                }
                FilterVerdict::Accept
            }
        }
    }

    fn refuse(sk: &TipcSock, st: &mut TipcSockState) {
        if st.conn_mgmt.on_disconnect(Some(SockError::ConnectionRefused)).is_ok() {
            log::debug!("port {}: connection refused", sk.portid());
        }
        sk.wake();
    }

    /// Established connection lost: disconnect and drop the transport's
    /// reverse mapping
    pub(crate) fn drop_conn(sk: &TipcSock, st: &mut TipcSockState, err: Option<SockError>) {
        if st.conn_mgmt.on_disconnect(err).is_err() {
            return;
        }
        if let Some(peer) = st.conn_mgmt.peer {
            sk.net().transport().remove_conn(peer.node, sk.portid());
            log::debug!("port {}: connection to {:#x}:{} lost", sk.portid(), peer.node, peer.port);
        }
        sk.wake();
    }

    /// Complete a connection to `peer`: arm the probe timer, register with
    /// the transport and pick the flow-control scheme the peer supports.
    pub(crate) fn finish_conn(sk: &TipcSock, st: &mut TipcSockState, peer: TipcAddr) -> SockResult<()> {
        let net = sk.net();
        let transport = net.transport();
        let max_pkt = transport.mtu(peer.node, sk.portid());
        st.conn_mgmt.on_established(peer, max_pkt)?;
        sk.arm_timer(Instant::now(), net.config().probe_interval());
        transport.add_conn(peer.node, sk.portid(), peer.port);
        st.flow_ctrl.on_established(transport.capabilities(peer.node));
        sk.acct.peer_block.store(st.flow_ctrl.block_flowctl(), Ordering::Release);
        log::debug!(
            "port {}: connected to {:#x}:{}, block flow control {}",
            sk.portid(),
            peer.node,
            peer.port,
            st.flow_ctrl.block_flowctl()
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Protocol Messages
    // ------------------------------------------------------------------------

    fn proto_rcv(sk: &TipcSock, st: &mut TipcSockState, msg: TipcMsg, xmitq: &mut Vec<TipcMsg>) {
        match msg.hdr.user {
            CONN_MANAGER => Self::conn_proto_rcv(sk, st, msg, xmitq),
            SOCK_WAKEUP => {
                st.cong_ctrl.on_wakeup(msg.hdr.orig.node);
                sk.wake();
            }
            user => log::trace!("port {}: ignoring message of user {}", sk.portid(), user),
        }
    }

    fn conn_proto_rcv(sk: &TipcSock, st: &mut TipcSockState, mut msg: TipcMsg, xmitq: &mut Vec<TipcMsg>) {
        let net = sk.net();
        if !st.conn_mgmt.is_peer_msg(&msg.hdr, net.own_node()) {
            return;
        }
        if msg.hdr.errcode != TIPC_OK {
            Self::drop_conn(sk, st, Some(SockError::ConnectionReset));
            return;
        }
        st.conn_mgmt.probe_unacked = false;

        match msg.hdr.mtype {
            CONN_PROBE => {
                msg.hdr.mtype = CONN_PROBE_REPLY;
                if let Some(reply) = msg.reverse(net.own_node(), TIPC_OK, net.config().max_forward_size) {
                    xmitq.push(reply);
                }
            }
            CONN_ACK => {
                if st.flow_ctrl.on_ack(msg.hdr.conn_ack, msg.hdr.adv_win) {
                    sk.wake();
                }
            }
            CONN_PROBE_REPLY => {}
            mtype => log::warn!("port {}: unknown connection manager message type {}", sk.portid(), mtype),
        }
    }
}
