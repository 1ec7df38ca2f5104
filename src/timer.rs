//! Keepalive Probe Timer
//!
//! Each established socket carries one deadline. When it passes with a
//! probe still unanswered the connection is declared dead; otherwise a new
//! probe goes out. The node drives all deadlines through `run_timers`.

use std::time::{Duration, Instant};

use crate::error::SockError;
use crate::net::TipcNet;
use crate::tipc_in::SockRx;
use crate::tipc_out::SockTx;
use crate::tipc_proto::CONN_PROBE;
use crate::tipc_sock::TipcSock;

impl TipcSock {
    /// Arm the timer `after` from `now`; left unarmed if that instant
    /// cannot be represented
    pub(crate) fn arm_timer(&self, now: Instant, after: Duration) {
        *self.timer.lock() = now.checked_add(after);
    }

    pub(crate) fn stop_timer(&self) {
        *self.timer.lock() = None;
    }

    /// When the probe timer fires next, if armed
    pub fn timer_deadline(&self) -> Option<Instant> {
        *self.timer.lock()
    }

    /// Take the deadline if it has passed
    fn take_expired_timer(&self, now: Instant) -> bool {
        let mut timer = self.timer.lock();
        match *timer {
            Some(at) if at <= now => {
                *timer = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn on_timer(&self, now: Instant) {
        let cfg = self.net().config();
        let Some(mut sk) = self.try_lock() else {
            // User context holds the lock: retry shortly
            self.arm_timer(now, cfg.timer_recheck());
            return;
        };
        if !sk.conn_mgmt.is_connected() {
            return;
        }
        let Some(peer) = sk.conn_mgmt.peer else {
            return;
        };

        if sk.conn_mgmt.probe_unacked {
            log::debug!("port {}: probe to {:#x}:{} unanswered", self.portid(), peer.node, peer.port);
            SockRx::drop_conn(self, &mut sk, Some(SockError::ConnectionReset));
            return;
        }

        sk.conn_mgmt.probe_unacked = true;
        self.arm_timer(now, cfg.probe_interval());
        drop(sk);
        self.net().xmit_all(vec![SockTx::conn_mgr(self.own_addr(), peer, CONN_PROBE)]);
    }
}

impl TipcNet {
    /// Fire every socket timer due at `now`; returns how many fired
    pub fn run_timers(&self, now: Instant) -> usize {
        let mut fired = 0;
        for sk in self.table.snapshot() {
            if sk.take_expired_timer(now) {
                sk.on_timer(now);
                fired += 1;
            }
        }
        fired
    }

    /// Earliest armed socket timer
    pub fn next_timer(&self) -> Option<Instant> {
        self.table.snapshot().iter().filter_map(|sk| sk.timer_deadline()).min()
    }
}
