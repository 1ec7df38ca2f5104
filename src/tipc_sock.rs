//! TIPC Socket Object
//!
//! The socket lock, the receive backlog and the wakeup machinery.
//!
//! Locking rules:
//! - User operations take the socket lock and may block on it.
//! - The receive path never blocks on a socket lock. It appends to the
//!   backlog and then tries the lock; whoever holds the lock drains the
//!   backlog after releasing it.
//! - The backlog lock is a leaf: nothing else is acquired while it is held,
//!   except that a sleeper keeps it across the release of the socket lock so
//!   no wakeup is lost.
//! - Table locks are never held while a socket lock is taken.

use std::collections::VecDeque;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{SockError, SockResult};
use crate::net::TipcNet;
use crate::state::{SockState, TipcSockState};
use crate::tipc_in::SockRx;
use crate::tipc_proto::{TipcMsg, TIPC_ERR_NO_PORT, TIPC_ERR_OVERLOAD};
use crate::tipc_types::{SockType, TipcAddr};
use crate::wait::Sleeper;

/// Receive accounting readable without the socket lock
pub(crate) struct RxAccounting {
    pub rmem_alloc: AtomicUsize,    // Bytes charged by the receive queue
    pub rcvbuf: AtomicUsize,        // Base receive buffer size
    pub peer_block: AtomicBool,     // Peer does block flow control
    pub drops: AtomicU64,           // Messages rejected for overload
    pub dupl_rcvcnt: AtomicUsize,   // Bytes counted both in backlog and queue
}

/// Messages that arrived while the socket lock was taken
#[derive(Default)]
pub(crate) struct Backlog {
    queue: VecDeque<TipcMsg>,
    len: usize,   // Charge of the current backlog run, cleared when it empties
    seq: u64,     // Bumped on every push and every wakeup
}

impl Backlog {
    fn pop(&mut self) -> Option<TipcMsg> {
        let msg = self.queue.pop_front();
        if self.queue.is_empty() {
            self.len = 0;
        }
        msg
    }
}

/// TIPC Socket
pub struct TipcSock {
    portid: u32,
    sock_type: SockType,
    net: Arc<TipcNet>,
    state: Mutex<TipcSockState>,
    backlog: Mutex<Backlog>,
    wakeup: Condvar,
    pub(crate) acct: RxAccounting,
    pub(crate) timer: Mutex<Option<Instant>>,
    interrupted: AtomicBool,
    dead: AtomicBool,
}

impl std::fmt::Debug for TipcSock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TipcSock")
            .field("portid", &self.portid)
            .field("sock_type", &self.sock_type)
            .finish_non_exhaustive()
    }
}

impl TipcSock {
    pub(crate) fn new(net: Arc<TipcNet>, portid: u32, sock_type: SockType) -> Self {
        let state = TipcSockState::new(sock_type, net.config());
        let rcvbuf = net.config().rcvbuf;
        Self {
            portid,
            sock_type,
            net,
            state: Mutex::new(state),
            backlog: Mutex::new(Backlog::default()),
            wakeup: Condvar::new(),
            acct: RxAccounting {
                rmem_alloc: AtomicUsize::new(0),
                rcvbuf: AtomicUsize::new(rcvbuf),
                peer_block: AtomicBool::new(false),
                drops: AtomicU64::new(0),
                dupl_rcvcnt: AtomicUsize::new(0),
            },
            timer: Mutex::new(None),
            interrupted: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn portid(&self) -> u32 {
        self.portid
    }

    #[inline]
    pub fn sock_type(&self) -> SockType {
        self.sock_type
    }

    #[inline]
    pub fn is_connectionless(&self) -> bool {
        self.sock_type.is_connectionless()
    }

    #[inline]
    pub fn net(&self) -> &Arc<TipcNet> {
        &self.net
    }

    /// Own socket identity
    pub fn own_addr(&self) -> TipcAddr {
        TipcAddr::new(self.net.own_node(), self.portid)
    }

    /// Current connection state
    pub fn state(&self) -> SockState {
        self.state.lock().conn_mgmt.state
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) fn mark_released(&self) {
        self.dead.store(true, Ordering::Release);
    }

    /// Cancel the blocking call in progress on this socket, or the next one
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.wake();
    }

    pub(crate) fn interrupted(&self) -> &AtomicBool {
        &self.interrupted
    }

    // ------------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------------

    /// Lock for a user operation
    pub(crate) fn lock(&self) -> SockResult<SockGuard<'_>> {
        if self.is_released() {
            return Err(SockError::Released);
        }
        Ok(self.lock_unchecked())
    }

    /// Lock regardless of the released flag
    pub(crate) fn lock_unchecked(&self) -> SockGuard<'_> {
        SockGuard {
            sock: self,
            inner: ManuallyDrop::new(self.state.lock()),
        }
    }

    /// Wake everything sleeping on this socket
    pub(crate) fn wake(&self) {
        let mut b = self.backlog.lock();
        b.seq = b.seq.wrapping_add(1);
        self.wakeup.notify_all();
    }

    #[inline]
    fn sync_rmem(&self, st: &TipcSockState) {
        self.acct.rmem_alloc.store(st.rxq.bytes(), Ordering::Release);
    }

    // ------------------------------------------------------------------------
    // Receive Entry
    // ------------------------------------------------------------------------

    /// Deliver one inbound message; replies and rejections go to `xmitq`
    ///
    /// Every message passes through the backlog so arrival order is kept
    /// whether or not the lock happens to be free.
    pub(crate) fn enqueue(&self, msg: TipcMsg, xmitq: &mut Vec<TipcMsg>) {
        {
            let mut b = self.backlog.lock();
            if b.queue.is_empty() {
                self.acct.dupl_rcvcnt.store(0, Ordering::Release);
            }
            let limit = SockRx::rcvbuf_limit(self, &msg.hdr) + self.acct.dupl_rcvcnt.load(Ordering::Acquire);
            let qsize = b.len + self.acct.rmem_alloc.load(Ordering::Acquire);
            if qsize > limit {
                drop(b);
                log::trace!("port {}: backlog overload, {} bytes queued", self.portid, qsize);
                self.acct.drops.fetch_add(1, Ordering::Relaxed);
                SockRx::reject(self, msg, TIPC_ERR_OVERLOAD, xmitq);
                return;
            }
            b.len += msg.truesize();
            b.queue.push_back(msg);
            b.seq = b.seq.wrapping_add(1);
        }
        self.flush_backlog();
    }

    /// Run the backlog through the receive filter if the lock is free
    pub(crate) fn flush_backlog(&self) {
        loop {
            if self.backlog.lock().queue.is_empty() {
                return;
            }
            let Some(mut st) = self.state.try_lock() else {
                return;
            };
            let mut xmitq = Vec::new();
            self.drain_backlog(&mut st, &mut xmitq);
            drop(st);
            self.net.xmit_all(xmitq);
        }
    }

    /// Caller holds the socket lock
    pub(crate) fn drain_backlog(&self, st: &mut TipcSockState, xmitq: &mut Vec<TipcMsg>) {
        loop {
            let next = self.backlog.lock().pop();
            let Some(msg) = next else {
                break;
            };
            let before = st.rxq.bytes();
            self.rcv_locked(st, msg, xmitq);
            let added = st.rxq.bytes().saturating_sub(before);
            self.acct.dupl_rcvcnt.fetch_add(added, Ordering::AcqRel);
            self.sync_rmem(st);
        }
    }

    fn rcv_locked(&self, st: &mut TipcSockState, msg: TipcMsg, xmitq: &mut Vec<TipcMsg>) {
        if self.is_released() {
            SockRx::reject(self, msg, TIPC_ERR_NO_PORT, xmitq);
            return;
        }
        SockRx::filter_rcv(self, st, msg, xmitq);
    }

    /// Try the lock without blocking, for timer context
    pub(crate) fn try_lock(&self) -> Option<SockGuard<'_>> {
        self.state.try_lock().map(|g| SockGuard {
            sock: self,
            inner: ManuallyDrop::new(g),
        })
    }
}

/// Held socket lock
///
/// Releasing it drains whatever the receive path queued in the meantime.
pub(crate) struct SockGuard<'a> {
    sock: &'a TipcSock,
    inner: ManuallyDrop<MutexGuard<'a, TipcSockState>>,
}

impl<'a> SockGuard<'a> {
    #[inline]
    pub fn sock(&self) -> &'a TipcSock {
        self.sock
    }

    /// Errors that end any wait on a connection: a pending socket error,
    /// then a broken or missing connection for connection-oriented types.
    pub fn sock_err(&mut self) -> SockResult<()> {
        if let Some(err) = self.conn_mgmt.take_error() {
            return Err(err);
        }
        if !self.sock.is_connectionless() {
            if self.conn_mgmt.state == SockState::Disconnecting {
                return Err(SockError::BrokenPipe);
            }
            if !self.conn_mgmt.is_connected() {
                return Err(SockError::NotConnected);
            }
        }
        Ok(())
    }

    /// Process backlogged messages now, without releasing the lock
    pub fn process_backlog(&mut self) {
        let sock = self.sock;
        let mut xmitq = Vec::new();
        sock.drain_backlog(&mut self.inner, &mut xmitq);
        sock.net.xmit_all(xmitq);
    }
}

impl Deref for SockGuard<'_> {
    type Target = TipcSockState;

    fn deref(&self) -> &TipcSockState {
        &self.inner
    }
}

impl DerefMut for SockGuard<'_> {
    fn deref_mut(&mut self) -> &mut TipcSockState {
        &mut self.inner
    }
}

impl Sleeper for SockGuard<'_> {
    fn sleep(&mut self, until: Option<Instant>) {
        let sock = self.sock;
        let seq = {
            let b = sock.backlog.lock();
            if b.queue.is_empty() {
                Some(b.seq)
            } else {
                None
            }
        };
        let Some(seq) = seq else {
            self.process_backlog();
            return;
        };
        sock.sync_rmem(&self.inner);
        MutexGuard::unlocked(&mut *self.inner, || {
            let mut b = sock.backlog.lock();
            if b.seq != seq {
                return;
            }
            match until {
                Some(t) => {
                    sock.wakeup.wait_until(&mut b, t);
                }
                None => sock.wakeup.wait(&mut b),
            }
        });
    }
}

impl Drop for SockGuard<'_> {
    fn drop(&mut self) {
        self.sock.sync_rmem(&self.inner);
        // SAFETY: `inner` is dropped exactly once and not touched afterwards.
        unsafe { ManuallyDrop::drop(&mut self.inner) };
        self.sock.flush_backlog();
    }
}
