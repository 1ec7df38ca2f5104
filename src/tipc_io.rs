//! TIPC Socket Data Transfer
//!
//! send() dispatches to one of three send paths by socket type: single
//! messages (connectionless, and the implicit SYN of connection-oriented
//! types), multicast, and the chunked connection stream. recv() reads
//! whole messages, or a byte stream for stream sockets.

use std::sync::atomic::Ordering;

use crate::error::{SockError, SockResult};
use crate::state::SockState;
use crate::tipc_out::SockTx;
use crate::tipc_proto::{
    TipcHdr, TipcMsg, CONN_ACK, MIN_H_SIZE, NAMED_H_SIZE, SHORT_H_SIZE, TIPC_CONN_MSG,
    TIPC_CONN_SHUTDOWN, TIPC_MCAST_MSG, TIPC_NAMED_MSG, TIPC_OK,
};
use crate::tipc_sock::{SockGuard, TipcSock};
use crate::tipc_types::{
    ErrorInfo, RecvFlags, RecvInfo, RecvMeta, SendFlags, ServiceRange, ShutdownFlags, SockAddr,
    SockType,
};
use crate::transport::XmitStatus;
use crate::wait::{wait_for_cond, Deadline};

impl TipcSock {
    // ========================================================================
    // Send
    // ========================================================================

    /// Send `data`, to `dest` or to the connected/implicit peer
    ///
    /// Returns the number of bytes accepted. A congested link does not fail
    /// the send; the socket remembers it and later sends wait for relief.
    pub fn send(&self, dest: Option<&SockAddr>, data: &[u8], flags: SendFlags) -> SockResult<usize> {
        let mut sk = self.lock()?;
        match self.sock_type() {
            SockType::Stream => self.sendstream_locked(&mut sk, dest, data, flags),
            SockType::SeqPacket => self.send_packet_locked(&mut sk, dest, data, flags),
            SockType::Datagram | SockType::Rdm => self.sendmsg_locked(&mut sk, dest, data, flags),
        }
    }

    /// One message to an explicit or implicit destination
    ///
    /// On a connection-oriented socket this is the SYN.
    /// Transition: OPEN -> CONNECTING
    pub(crate) fn sendmsg_locked(
        &self,
        sk: &mut SockGuard<'_>,
        dest: Option<&SockAddr>,
        data: &[u8],
        flags: SendFlags,
    ) -> SockResult<usize> {
        let net = self.net();
        if data.len() > net.config().max_user_msg_size {
            return Err(SockError::MessageTooLarge);
        }

        let syn = !self.is_connectionless();
        let dest = match dest {
            Some(d) => *d,
            None if syn => return Err(SockError::DestinationAddressRequired),
            None => sk.conn_mgmt.implicit_peer.ok_or(SockError::DestinationAddressRequired)?,
        };

        if syn {
            match sk.conn_mgmt.state {
                SockState::Open => {}
                SockState::Listen => return Err(SockError::BrokenPipe),
                _ => return Err(SockError::AlreadyConnected),
            }
            if sk.publ.is_published() {
                return Err(SockError::NotSupported);
            }
            if let SockAddr::Name { name, .. } = dest {
                sk.conn_mgmt.conn_name = Some(name);
            }
        }

        let deadline = Deadline::from_timeout(flags.contains(SendFlags::DONTWAIT), sk.opts.snd_timeout);
        let tx = SockTx::new(self.own_addr(), &sk.opts);
        let msg = match dest {
            SockAddr::Mcast(range) if !syn => {
                return self.sendmcast_locked(sk, range, data, &deadline);
            }
            SockAddr::Name { name, domain } => {
                let addr = net
                    .names()
                    .translate(name.stype, name.instance, domain, net.own_node())
                    .ok_or(SockError::HostUnreachable)?;
                tx.named(name, domain, addr, data.to_vec())
            }
            SockAddr::Id(addr) => tx.direct(addr, data.to_vec()),
            SockAddr::Mcast(_) | SockAddr::Unspec => return Err(SockError::InvalidArgument),
        };

        let target = msg.hdr.dest;
        let dnode = target.node;
        wait_for_cond(sk, &deadline, self.interrupted(), |sk| {
            if !sk.cong_ctrl.is_link_congested(dnode) {
                return Ok(true);
            }
            if syn {
                if let Some(err) = sk.conn_mgmt.take_error() {
                    return Err(err);
                }
            } else {
                sk.sock_err()?;
            }
            Ok(false)
        })?;

        if net.transport().xmit(msg, dnode, self.portid())? == XmitStatus::Congested {
            sk.cong_ctrl.on_link_congested(dnode);
        }
        if syn {
            sk.conn_mgmt.on_syn_sent(target)?;
        }
        Ok(data.len())
    }

    /// One message to every socket bound to an overlapping range
    fn sendmcast_locked(
        &self,
        sk: &mut SockGuard<'_>,
        range: ServiceRange,
        data: &[u8],
        deadline: &Deadline,
    ) -> SockResult<usize> {
        let net = self.net();
        wait_for_cond(sk, deadline, self.interrupted(), |sk| {
            if !sk.cong_ctrl.is_congested() {
                return Ok(true);
            }
            sk.sock_err()?;
            Ok(false)
        })?;

        let dsts = net.names().lookup_dst_nodes(&range, net.own_node());
        if dsts.is_empty() {
            return Err(SockError::HostUnreachable);
        }
        let msg = SockTx::new(self.own_addr(), &sk.opts).mcast(range, data.to_vec());
        let congested = net
            .transport()
            .mcast_xmit(msg, sk.opts.mc_method, &dsts, self.portid())?;
        sk.cong_ctrl.on_mcast_congested(congested);
        Ok(data.len())
    }

    /// Data over the connection; stream sockets cut it into link-sized
    /// messages
    ///
    /// With a destination this is a SYN carrying data. Each chunk waits for
    /// the link and the send window; a zero-length send still emits one
    /// empty message. Returns the bytes sent if any, else the error.
    pub(crate) fn sendstream_locked(
        &self,
        sk: &mut SockGuard<'_>,
        dest: Option<&SockAddr>,
        data: &[u8],
        flags: SendFlags,
    ) -> SockResult<usize> {
        if dest.is_some() {
            let rc = self.sendmsg_locked(sk, dest, data, flags)?;
            if !data.is_empty() && rc == data.len() {
                sk.flow_ctrl.snt_unacked = sk.flow_ctrl.units(data.len() + NAMED_H_SIZE);
            }
            return Ok(rc);
        }

        let net = self.net();
        let max_user = net.config().max_user_msg_size;
        let deadline = Deadline::from_timeout(flags.contains(SendFlags::DONTWAIT), sk.opts.snd_timeout);
        let mut sent = 0;

        let res: SockResult<()> = loop {
            let ready = wait_for_cond(sk, &deadline, self.interrupted(), |sk| {
                if !sk.cong_ctrl.is_congested()
                    && !sk.flow_ctrl.is_conn_congested()
                    && sk.conn_mgmt.is_connected()
                {
                    return Ok(true);
                }
                sk.sock_err()?;
                Ok(false)
            });
            if let Err(e) = ready {
                break Err(e);
            }
            let Some(peer) = sk.conn_mgmt.peer else {
                break Err(SockError::NotConnected);
            };

            // Packets travel whole, only a byte stream is cut at the link MTU
            let room = match self.sock_type() {
                SockType::Stream => sk.conn_mgmt.max_pkt.saturating_sub(SHORT_H_SIZE).max(1),
                _ => max_user,
            };
            let chunk = (data.len() - sent).min(max_user).min(room);
            let msg = SockTx::new(self.own_addr(), &sk.opts).conn(peer, data[sent..sent + chunk].to_vec());
            match net.transport().xmit(msg, peer.node, self.portid()) {
                Ok(XmitStatus::Sent) => {}
                Ok(XmitStatus::Congested) => sk.cong_ctrl.on_conn_link_congested(),
                Err(e) => break Err(e.into()),
            }
            sk.flow_ctrl.on_sent(chunk + MIN_H_SIZE);
            sent += chunk;
            if sent >= data.len() {
                break Ok(());
            }
        };

        match res {
            Ok(()) => Ok(sent),
            Err(_) if sent > 0 => Ok(sent),
            Err(e) => Err(e),
        }
    }

    /// A single bounded message on the connection
    pub(crate) fn send_packet_locked(
        &self,
        sk: &mut SockGuard<'_>,
        dest: Option<&SockAddr>,
        data: &[u8],
        flags: SendFlags,
    ) -> SockResult<usize> {
        if data.len() > self.net().config().max_user_msg_size {
            return Err(SockError::MessageTooLarge);
        }
        self.sendstream_locked(sk, dest, data, flags)
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// Receive into `buf`
    ///
    /// Stream sockets read bytes across message boundaries; every other type
    /// reads one message per call and reports truncation.
    pub fn recv(&self, buf: &mut [u8], flags: RecvFlags) -> SockResult<RecvInfo> {
        if buf.is_empty() {
            return Err(SockError::InvalidArgument);
        }
        let mut sk = self.lock()?;
        match self.sock_type() {
            SockType::Stream => self.recvstream_locked(&mut sk, buf, flags),
            _ => self.recvmsg_locked(&mut sk, buf, flags),
        }
    }

    /// Wait until the queue has something, or the socket can never get more
    fn wait_for_rcvmsg(&self, sk: &mut SockGuard<'_>, deadline: &Deadline) -> SockResult<()> {
        wait_for_cond(sk, deadline, self.interrupted(), |sk| {
            if !sk.rxq.is_empty() {
                return Ok(true);
            }
            if let Some(err) = sk.conn_mgmt.take_error() {
                return Err(err);
            }
            if sk.conn_mgmt.shutdown.contains(ShutdownFlags::RCV) {
                return Err(SockError::NotConnected);
            }
            Ok(false)
        })
    }

    /// Ancillary data for a received message
    fn recv_meta(sk: &SockGuard<'_>, msg: &TipcMsg) -> RecvMeta {
        let hdr = &msg.hdr;
        let error = (hdr.errcode != TIPC_OK).then(|| ErrorInfo {
            code: hdr.errcode,
            data_len: msg.data_len(),
        });
        let returned = if error.is_some() { msg.data.clone() } else { Vec::new() };
        let dest_name = match hdr.mtype {
            TIPC_NAMED_MSG => Some(ServiceRange::new(hdr.name_type, hdr.name_lower, hdr.name_lower)),
            TIPC_MCAST_MSG => Some(hdr.name_range()),
            TIPC_CONN_MSG => sk.conn_mgmt.conn_name.map(ServiceRange::from),
            _ => None,
        };
        RecvMeta {
            origin: Some(hdr.orig),
            dest_name,
            error,
            returned,
        }
    }

    /// Drop empty, error-free messages (SYN- and ACK-) off the queue front
    fn skip_empty(sk: &mut SockGuard<'_>) {
        while let Some(front) = sk.rxq.front() {
            if front.msg.data_len() > 0 || front.msg.hdr.errcode != TIPC_OK {
                break;
            }
            sk.rxq.pop_front();
        }
    }

    /// Account a consumed message and acknowledge when due
    fn consumed(&self, sk: &mut SockGuard<'_>, hdr: &TipcHdr, dlen: usize) {
        if self.is_connectionless() {
            return;
        }
        if sk.flow_ctrl.on_consumed(hdr.hdr_size + dlen) {
            self.send_ack(sk);
        }
    }

    fn recvmsg_locked(&self, sk: &mut SockGuard<'_>, buf: &mut [u8], flags: RecvFlags) -> SockResult<RecvInfo> {
        if !self.is_connectionless() && sk.conn_mgmt.state == SockState::Open {
            return Err(SockError::NotConnected);
        }
        let deadline = Deadline::from_timeout(flags.contains(RecvFlags::DONTWAIT), sk.opts.rcv_timeout);

        loop {
            self.wait_for_rcvmsg(sk, &deadline)?;
            Self::skip_empty(sk);
            if !sk.rxq.is_empty() {
                break;
            }
        }
        let Some(entry) = sk.rxq.front() else {
            return Err(SockError::WouldBlock);
        };
        let msg = &entry.msg;
        let hdr = msg.hdr.clone();
        let meta = Self::recv_meta(sk, msg);
        let dlen = msg.data_len();

        let mut info = RecvInfo {
            meta,
            ..RecvInfo::default()
        };
        let mut res = Ok(());
        if hdr.errcode == TIPC_OK {
            let copy = dlen.min(buf.len());
            buf[..copy].copy_from_slice(&msg.data[..copy]);
            info.len = copy;
            info.truncated = copy < dlen;
        } else if !self.is_connectionless() && hdr.errcode != TIPC_CONN_SHUTDOWN {
            res = Err(SockError::ConnectionReset);
        }

        if !flags.contains(RecvFlags::PEEK) {
            sk.rxq.pop_front();
            self.consumed(sk, &hdr, dlen);
        }
        res.map(|()| info)
    }

    fn recvstream_locked(&self, sk: &mut SockGuard<'_>, buf: &mut [u8], flags: RecvFlags) -> SockResult<RecvInfo> {
        if sk.conn_mgmt.state == SockState::Open {
            return Err(SockError::NotConnected);
        }
        let peek = flags.contains(RecvFlags::PEEK);
        let required = if flags.contains(RecvFlags::WAITALL) { buf.len() } else { 1 };
        let deadline = Deadline::from_timeout(flags.contains(RecvFlags::DONTWAIT), sk.opts.rcv_timeout);

        let mut copied = 0;
        let mut meta = RecvMeta::default();
        let res: SockResult<()> = loop {
            if let Err(e) = self.wait_for_rcvmsg(sk, &deadline) {
                break Err(e);
            }
            Self::skip_empty(sk);
            let Some(entry) = sk.rxq.front() else {
                continue;
            };
            let hdr = entry.msg.hdr.clone();
            let dlen = entry.msg.data_len();
            if copied == 0 {
                meta = Self::recv_meta(sk, &entry.msg);
            }

            let err = hdr.errcode;
            if err == TIPC_OK {
                let Some(entry) = sk.rxq.front_mut() else {
                    continue;
                };
                let start = entry.bytes_read;
                let copy = (dlen - start).min(buf.len() - copied);
                buf[copied..copied + copy].copy_from_slice(&entry.msg.data[start..start + copy]);
                copied += copy;
                let offset = start + copy;
                if offset < dlen {
                    if !peek {
                        entry.bytes_read = offset;
                    }
                    break Ok(());
                }
            } else {
                // Orderly shutdown reads as end of stream; anything else
                // stays queued and keeps resetting the reader
                if err != TIPC_CONN_SHUTDOWN {
                    break if copied > 0 { Ok(()) } else { Err(SockError::ConnectionReset) };
                }
                if copied > 0 {
                    break Ok(());
                }
            }

            if peek {
                break Ok(());
            }
            sk.rxq.pop_front();
            self.consumed(sk, &hdr, dlen);

            if copied == buf.len() || err != TIPC_OK {
                break Ok(());
            }
            if sk.rxq.is_empty() && copied >= required {
                break Ok(());
            }
        };

        match res {
            Ok(()) => Ok(RecvInfo {
                len: copied,
                truncated: false,
                meta,
            }),
            Err(_) if copied > 0 => Ok(RecvInfo {
                len: copied,
                truncated: false,
                meta,
            }),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Flow Control Feedback
    // ------------------------------------------------------------------------

    /// Tell the peer how much was consumed, and the current window
    pub(crate) fn send_ack(&self, sk: &mut SockGuard<'_>) {
        if !sk.conn_mgmt.is_connected() {
            return;
        }
        let Some(peer) = sk.conn_mgmt.peer else {
            return;
        };
        let net = self.net();
        let ack = sk.flow_ctrl.take_ack(net.config(), self.acct.rcvbuf.load(Ordering::Acquire));
        let mut msg = SockTx::conn_mgr(self.own_addr(), peer, CONN_ACK);
        msg.hdr.conn_ack = ack.acked;
        msg.hdr.adv_win = ack.adv_win.unwrap_or(0);
        log::trace!("port {}: ack {} units, window {:?}", self.portid(), ack.acked, ack.adv_win);
        net.xmit_all(vec![msg]);
    }
}
