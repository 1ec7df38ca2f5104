//! Flow Control Component
//!
//! Manages the connection windows and the unacknowledged counters on both
//! sides. Units are flow-control blocks when the peer supports block flow
//! control, whole messages otherwise.

use crate::config::SockConfig;
use crate::tipc_types::PeerCaps;

/// Flow Control State
///
/// Only FC event handlers can write to this state.
pub struct FlowControlState {
    /* Send Side */
    pub snd_win: u16,        // Window the peer advertised
    pub snt_unacked: u16,    // Units sent since the peer's last ack

    /* Receive Side */
    pub rcv_win: u16,        // Window we advertise
    pub rcv_unacked: u16,    // Units consumed since our last ack

    /* Peer */
    pub peer_caps: PeerCaps,

    /* Policy */
    blk_sz: usize,
    msg_win: u16,
    ack_rate: u16,
}

/// Acknowledgment to send to the peer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnAck {
    pub acked: u16,
    pub adv_win: Option<u16>,
}

impl FlowControlState {
    /// Safe limits until the peer advertises a window
    pub fn new(cfg: &SockConfig) -> Self {
        let initial = cfg.adv_blocks(cfg.rcvbuf_min);
        Self {
            snd_win: initial,
            snt_unacked: 0,
            rcv_win: initial,
            rcv_unacked: 0,
            peer_caps: PeerCaps::empty(),
            blk_sz: cfg.flowctl_blk_sz,
            msg_win: cfg.flowctl_msg_win,
            ack_rate: cfg.ack_rate,
        }
    }

    #[inline]
    pub fn block_flowctl(&self) -> bool {
        self.peer_caps.contains(PeerCaps::BLOCK_FLOWCTL)
    }

    /// Units charged for a message of `msglen` bytes
    #[inline]
    pub fn units(&self, msglen: usize) -> u16 {
        if self.block_flowctl() {
            (msglen / self.blk_sz + 1).min(u16::MAX as usize) as u16
        } else {
            1
        }
    }

    /// More sent than the peer's window allows
    #[inline]
    pub fn is_conn_congested(&self) -> bool {
        self.snt_unacked > self.snd_win
    }

    // ------------------------------------------------------------------------
    // Connection Setup
    // ------------------------------------------------------------------------

    /// Peer capabilities known: fall back to message windows if needed
    pub fn on_established(&mut self, caps: PeerCaps) {
        self.peer_caps = caps;
        if !self.block_flowctl() {
            self.rcv_win = self.msg_win;
            self.snd_win = self.msg_win;
        }
    }

    // ------------------------------------------------------------------------
    // Data Transfer
    // ------------------------------------------------------------------------

    /// A message of `msglen` bytes went out on the connection
    pub fn on_sent(&mut self, msglen: usize) {
        self.snt_unacked = self.snt_unacked.saturating_add(self.units(msglen));
    }

    /// Peer acknowledged `acked` units; returns whether writers were blocked
    /// before the update and should be woken.
    pub fn on_ack(&mut self, acked: u16, adv_win: u16) -> bool {
        let was_congested = self.is_conn_congested();
        self.snt_unacked = self.snt_unacked.saturating_sub(acked);
        if self.block_flowctl() {
            self.snd_win = adv_win;
        }
        was_congested
    }

    /// The application consumed a message of `msglen` bytes; returns
    /// whether an acknowledgment is due.
    pub fn on_consumed(&mut self, msglen: usize) -> bool {
        self.rcv_unacked = self.rcv_unacked.saturating_add(self.units(msglen));
        self.rcv_unacked >= self.rcv_win / self.ack_rate
    }

    /// Build the acknowledgment and reset the counter; block peers also get
    /// a window refreshed from the current receive buffer.
    pub fn take_ack(&mut self, cfg: &SockConfig, rcvbuf: usize) -> ConnAck {
        let acked = self.rcv_unacked;
        self.rcv_unacked = 0;
        let adv_win = if self.block_flowctl() {
            self.rcv_win = cfg.adv_blocks(rcvbuf);
            Some(self.rcv_win)
        } else {
            None
        };
        ConnAck { acked, adv_win }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_peer() -> FlowControlState {
        let mut fc = FlowControlState::new(&SockConfig::default());
        fc.on_established(PeerCaps::BLOCK_FLOWCTL);
        fc
    }

    #[test]
    fn initial_window_is_the_floor() {
        let fc = FlowControlState::new(&SockConfig::default());
        assert_eq!(fc.snd_win, 128);
        assert_eq!(fc.rcv_win, 128);
    }

    #[test]
    fn legacy_peer_uses_message_window() {
        let mut fc = FlowControlState::new(&SockConfig::default());
        fc.on_established(PeerCaps::empty());
        assert_eq!(fc.snd_win, 512);
        assert_eq!(fc.units(60_000), 1);
    }

    #[test]
    fn ack_only_decreases_unacked() {
        let mut fc = block_peer();
        for _ in 0..200 {
            fc.on_sent(1000);
        }
        assert!(fc.is_conn_congested());
        let before = fc.snt_unacked;
        assert!(fc.on_ack(50, 512));
        assert_eq!(fc.snt_unacked, before - 50);
        assert_eq!(fc.snd_win, 512);
        assert!(!fc.is_conn_congested());
        fc.on_ack(u16::MAX, 512);
        assert_eq!(fc.snt_unacked, 0);
    }

    #[test]
    fn ack_due_at_quarter_window() {
        let cfg = SockConfig::default();
        let mut fc = block_peer();
        // rcv_win 128 -> ack every 32 blocks; 1000 byte messages are one block
        for _ in 0..31 {
            assert!(!fc.on_consumed(1000));
        }
        assert!(fc.on_consumed(1000));
        let ack = fc.take_ack(&cfg, cfg.rcvbuf);
        assert_eq!(ack, ConnAck { acked: 32, adv_win: Some(512) });
        assert_eq!(fc.rcv_unacked, 0);
        assert_eq!(fc.rcv_win, 512);
    }
}
