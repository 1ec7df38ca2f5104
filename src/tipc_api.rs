//! TIPC Socket API
//!
//! Lifecycle and control operations: create, bind, listen, connect, accept,
//! shutdown, release, getname, socket options and poll. Data transfer lives
//! in `tipc_io`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SockError, SockResult};
use crate::net::TipcNet;
use crate::state::SockState;
use crate::tipc_in::SockRx;
use crate::tipc_out::SockTx;
use crate::tipc_proto::{ErrCode, TIPC_CONN_SHUTDOWN, TIPC_ERR_NO_PORT};
use crate::tipc_sock::{SockGuard, TipcSock};
use crate::tipc_types::{
    Binding, GetNameKind, McastMethod, PollEvents, SendFlags, ServiceAddr, ShutdownFlags,
    ShutdownHow, SockAddr, SockOpt, SockOptName, SockType, TipcAddr,
};
use crate::wait::{wait_for_cond, Deadline};

impl TipcSock {
    // ------------------------------------------------------------------------
    // Creation and Naming
    // ------------------------------------------------------------------------

    /// Create a socket of `sock_type` on `net`, with a fresh portid
    ///
    /// Transition: none -> OPEN
    pub fn create(net: &Arc<TipcNet>, sock_type: SockType) -> SockResult<Arc<TipcSock>> {
        let sk = net
            .table
            .insert_with(|portid| Arc::new(TipcSock::new(Arc::clone(net), portid, sock_type)))?;
        log::debug!("node {:#x}: created {:?} socket, port {}", net.own_node(), sock_type, sk.portid());
        Ok(sk)
    }

    /// Publish or withdraw service names for this socket
    pub fn bind(&self, binding: Binding) -> SockResult<()> {
        let mut sk = self.lock()?;
        let net = self.net();

        match binding {
            Binding::Publish { range, scope } => {
                if range.is_reserved() {
                    return Err(SockError::AccessDenied);
                }
                if range.lower > range.upper || sk.conn_mgmt.is_connected() {
                    return Err(SockError::InvalidArgument);
                }
                let key = sk.publ.next_key(self.portid()).ok_or(SockError::AddressInUse)?;
                let publ = net
                    .names()
                    .publish(range, scope, net.own_node(), self.portid(), key)
                    .ok_or(SockError::InvalidArgument)?;
                sk.publ.on_published(publ);
                Ok(())
            }
            Binding::Withdraw { range, scope } => {
                if range.is_reserved() {
                    return Err(SockError::AccessDenied);
                }
                let publ = sk.publ.take_matching(&range, scope).ok_or(SockError::InvalidArgument)?;
                net.names()
                    .withdraw(publ.range.stype, publ.range.lower, publ.node, publ.port, publ.key);
                Ok(())
            }
            Binding::WithdrawAll => {
                if !sk.publ.is_published() {
                    return Err(SockError::InvalidArgument);
                }
                self.withdraw_all(&mut sk);
                Ok(())
            }
        }
    }

    fn withdraw_all(&self, sk: &mut SockGuard<'_>) {
        let names = self.net().names();
        for publ in sk.publ.take_all() {
            names.withdraw(publ.range.stype, publ.range.lower, publ.node, publ.port, publ.key);
        }
    }

    /// Own identity, or the peer's
    pub fn getname(&self, kind: GetNameKind) -> SockResult<TipcAddr> {
        let sk = self.lock()?;
        let peer_visible = match kind {
            GetNameKind::Own => return Ok(self.own_addr()),
            GetNameKind::Peer => sk.conn_mgmt.is_connected(),
            GetNameKind::PeerIncludingDisconnected => matches!(
                sk.conn_mgmt.state,
                SockState::Established | SockState::Disconnecting
            ),
        };
        if !peer_visible {
            return Err(SockError::NotConnected);
        }
        sk.conn_mgmt.peer.ok_or(SockError::NotConnected)
    }

    // ------------------------------------------------------------------------
    // Connection Setup
    // ------------------------------------------------------------------------

    /// Start accepting connections
    ///
    /// Transition: OPEN -> LISTEN
    pub fn listen(&self) -> SockResult<()> {
        if self.is_connectionless() {
            return Err(SockError::NotSupported);
        }
        let mut sk = self.lock()?;
        sk.conn_mgmt.on_listen()
    }

    /// Connect to `dest`
    ///
    /// Connectionless sockets only remember `dest` as the implicit peer.
    /// Connection-oriented sockets send an empty SYN and, unless
    /// `nonblocking`, wait up to the connect timeout for the answer.
    ///
    /// Transition: OPEN -> CONNECTING -> ESTABLISHED
    pub fn connect(&self, dest: &SockAddr, nonblocking: bool) -> SockResult<()> {
        let mut sk = self.lock()?;

        if self.is_connectionless() {
            sk.conn_mgmt.implicit_peer = match dest {
                SockAddr::Unspec => None,
                other => Some(*other),
            };
            return Ok(());
        }
        if matches!(dest, SockAddr::Mcast(_) | SockAddr::Unspec) {
            return Err(SockError::InvalidArgument);
        }

        let timeout_ms = sk.conn_mgmt.conn_timeout_ms;
        let nonblocking = nonblocking || timeout_ms == 0;

        match sk.conn_mgmt.state {
            SockState::Open => {
                let flags = if nonblocking { SendFlags::DONTWAIT } else { SendFlags::empty() };
                match self.sendmsg_locked(&mut sk, Some(dest), &[], flags) {
                    Ok(_) | Err(SockError::WouldBlock) => {}
                    Err(e) => return Err(e),
                }
                if nonblocking {
                    return Err(SockError::InProgress);
                }
            }
            SockState::Connecting => {
                if nonblocking {
                    return Err(SockError::Already);
                }
            }
            SockState::Established => return Err(SockError::AlreadyConnected),
            SockState::Listen | SockState::Disconnecting => return Err(SockError::InvalidArgument),
        }

        let deadline = Deadline::after(Duration::from_millis(timeout_ms as u64));
        wait_for_cond(&mut sk, &deadline, self.interrupted(), |sk| {
            if let Some(err) = sk.conn_mgmt.take_error() {
                return Err(err);
            }
            Ok(sk.conn_mgmt.state != SockState::Connecting)
        })?;
        match sk.conn_mgmt.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Take the oldest pending connection request
    ///
    /// The child is established at once. An empty SYN is answered with an
    /// empty message; a SYN carrying data is moved to the child's queue.
    ///
    /// Transition (child): OPEN -> ESTABLISHED
    pub fn accept(&self, nonblocking: bool) -> SockResult<Arc<TipcSock>> {
        if self.is_connectionless() {
            return Err(SockError::NotSupported);
        }
        let mut sk = self.lock()?;
        if sk.conn_mgmt.state != SockState::Listen {
            return Err(SockError::InvalidArgument);
        }

        let deadline = Deadline::from_timeout(nonblocking, sk.opts.rcv_timeout);
        wait_for_cond(&mut sk, &deadline, self.interrupted(), |sk| Ok(!sk.rxq.is_empty()))?;
        let hdr = match sk.rxq.front() {
            Some(entry) => entry.msg.hdr.clone(),
            None => return Err(SockError::InvalidArgument),
        };

        let child = TipcSock::create(self.net(), self.sock_type())?;
        let setup = (|| -> SockResult<()> {
            let mut ck = child.lock()?;
            SockRx::finish_conn(&child, &mut ck, hdr.orig)?;
            ck.opts.importance = hdr.data_importance();
            if hdr.is_named() {
                ck.conn_mgmt.conn_name = Some(ServiceAddr::new(hdr.name_type, hdr.name_lower));
            }

            if let Some(syn) = sk.rxq.pop_front() {
                if syn.data_len() == 0 {
                    child.sendstream_locked(&mut ck, None, &[], SendFlags::empty())?;
                } else {
                    ck.rxq.push_front(syn);
                }
            }
            Ok(())
        })();
        if let Err(e) = setup {
            child.release()?;
            return Err(e);
        }
        log::debug!(
            "port {}: accepted {:#x}:{} on port {}",
            self.portid(),
            hdr.orig.node,
            hdr.orig.port,
            child.portid()
        );
        Ok(child)
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Shut down a connection; only both directions at once are supported
    ///
    /// Transition: ESTABLISHED/CONNECTING -> DISCONNECTING
    pub fn shutdown(&self, how: ShutdownHow) -> SockResult<()> {
        if how != ShutdownHow::Both {
            return Err(SockError::InvalidArgument);
        }
        let mut sk = self.lock()?;
        self.shutdown_locked(&mut sk, TIPC_CONN_SHUTDOWN);
        sk.conn_mgmt.shutdown |= ShutdownFlags::SEND;

        let res = if sk.conn_mgmt.state == SockState::Disconnecting {
            sk.rxq.purge();
            Ok(())
        } else {
            Err(SockError::NotConnected)
        };
        self.wake();
        res
    }

    /// Reject everything unread and abort the connection, telling the peer
    /// `err`
    pub(crate) fn shutdown_locked(&self, sk: &mut SockGuard<'_>, err: ErrCode) {
        let net = self.net();

        // Let the link and the send window clear so the abort does not
        // overtake queued data
        let deadline = Deadline::after(Duration::from_millis(sk.conn_mgmt.conn_timeout_ms as u64));
        let uncancellable = AtomicBool::new(false);
        let _ = wait_for_cond(sk, &deadline, &uncancellable, |sk| {
            Ok(!sk.cong_ctrl.is_congested() && !sk.flow_ctrl.is_conn_congested())
        });

        let mut xmitq = Vec::new();
        for entry in sk.rxq.drain() {
            if entry.bytes_read > 0 {
                continue;
            }
            if !self.is_connectionless() && sk.conn_mgmt.state != SockState::Disconnecting {
                SockRx::drop_conn(self, sk, None);
            }
            SockRx::reject(self, entry.msg, err, &mut xmitq);
        }

        if !self.is_connectionless() {
            let peer = match sk.conn_mgmt.state {
                SockState::Established => sk.conn_mgmt.peer,
                SockState::Connecting => sk.conn_mgmt.pending_peer,
                _ => None,
            };
            if let Some(peer) = peer {
                xmitq.push(SockTx::conn_abort(self.own_addr(), peer, err));
                SockRx::drop_conn(self, sk, None);
            }
        }
        net.xmit_all(xmitq);
    }

    /// Close the socket: abort any connection, withdraw every name and free
    /// the portid. Calling it again does nothing.
    pub fn release(&self) -> SockResult<()> {
        let mut sk = self.lock_unchecked();
        if self.is_released() {
            return Ok(());
        }

        self.shutdown_locked(&mut sk, TIPC_ERR_NO_PORT);
        sk.conn_mgmt.shutdown = ShutdownFlags::all();
        self.withdraw_all(&mut sk);
        self.stop_timer();
        self.net().table.remove(self.portid());
        self.mark_released();

        // Whatever raced in is returned to its sender
        sk.process_backlog();
        sk.cong_ctrl.purge();
        sk.rxq.purge();
        drop(sk);

        self.wake();
        log::debug!("port {}: released", self.portid());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------------

    pub fn setsockopt(&self, opt: SockOpt) -> SockResult<()> {
        let mut sk = self.lock()?;
        match opt {
            SockOpt::Importance(imp) => sk.opts.importance = imp,
            SockOpt::SrcDroppable(on) => {
                if self.sock_type() == SockType::Stream {
                    return Err(SockError::NoProtocolOption);
                }
                sk.opts.src_droppable = on;
            }
            SockOpt::DestDroppable(on) => sk.opts.dest_droppable = on,
            SockOpt::ConnTimeout(ms) => sk.conn_mgmt.conn_timeout_ms = ms,
            SockOpt::McastBroadcast => sk.opts.mc_method = McastMethod { rcast: false, mandatory: true },
            SockOpt::McastReplicast => sk.opts.mc_method = McastMethod { rcast: true, mandatory: true },
            SockOpt::RcvBuf(size) => {
                if size == 0 {
                    return Err(SockError::InvalidArgument);
                }
                self.acct.rcvbuf.store(size, Ordering::Release);
            }
            SockOpt::RcvTimeout(t) => sk.opts.rcv_timeout = t,
            SockOpt::SndTimeout(t) => sk.opts.snd_timeout = t,
        }
        Ok(())
    }

    pub fn getsockopt(&self, name: SockOptName) -> SockResult<u32> {
        let sk = self.lock()?;
        let value = match name {
            SockOptName::Importance => sk.opts.importance as u32,
            SockOptName::SrcDroppable => sk.opts.src_droppable as u32,
            SockOptName::DestDroppable => sk.opts.dest_droppable as u32,
            SockOptName::ConnTimeout => sk.conn_mgmt.conn_timeout_ms,
            SockOptName::NodeRecvqDepth => 0,
            SockOptName::SockRecvqDepth => sk.rxq.len().min(u32::MAX as usize) as u32,
            SockOptName::RcvBuf => self.acct.rcvbuf.load(Ordering::Acquire).min(u32::MAX as usize) as u32,
        };
        Ok(value)
    }

    // ------------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------------

    /// Current readiness
    pub fn poll(&self) -> PollEvents {
        let sk = self.lock_unchecked();
        let mut revents = PollEvents::empty();
        let shut = sk.conn_mgmt.shutdown;
        if shut.contains(ShutdownFlags::RCV) {
            revents |= PollEvents::RDHUP | PollEvents::IN | PollEvents::RDNORM;
        }
        if shut == ShutdownFlags::all() {
            revents |= PollEvents::HUP;
        }

        let queued = !sk.rxq.is_empty();
        match sk.conn_mgmt.state {
            SockState::Established => {
                if !sk.cong_ctrl.is_congested() && !sk.flow_ctrl.is_conn_congested() {
                    revents |= PollEvents::OUT;
                }
                if queued {
                    revents |= PollEvents::IN | PollEvents::RDNORM;
                }
            }
            SockState::Listen | SockState::Connecting => {
                if queued {
                    revents |= PollEvents::IN | PollEvents::RDNORM;
                }
            }
            SockState::Open => {
                if sk.cong_ctrl.cong_link_cnt == 0 {
                    revents |= PollEvents::OUT;
                }
                if self.is_connectionless() && queued {
                    revents |= PollEvents::IN | PollEvents::RDNORM;
                }
            }
            SockState::Disconnecting => {
                revents = PollEvents::IN | PollEvents::RDNORM | PollEvents::HUP;
            }
        }
        if sk.conn_mgmt.sk_err.is_some() {
            revents |= PollEvents::ERR;
        }
        revents
    }
}
