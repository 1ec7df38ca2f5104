//! Socket Layer Configuration
//!
//! Policy constants of the socket layer, carried as overridable defaults.
//! A node reads one `SockConfig` at construction and every socket created
//! on that node takes its initial values from it.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{SockError, SockResult};

/// Tunables for one node's socket layer
///
/// Any field missing from a JSON document keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SockConfig {
    /* Connection */
    pub conn_timeout_ms: u32,      // Blocking connect() wait
    pub probe_interval_ms: u64,    // Keepalive probe period
    pub timer_recheck_ms: u64,     // Retry delay when the timer finds the socket busy

    /* Receive buffer */
    pub rcvbuf: usize,             // Base receive buffer, scaled per importance
    pub rcvbuf_min: usize,         // Floor used for the initial window

    /* Flow control */
    pub flowctl_blk_sz: usize,     // Bytes per flow-control block
    pub flowctl_msg_win: u16,      // Window for peers without block flow control
    pub ack_rate: u16,             // Acknowledge every rcv_win / ack_rate units

    /* Messages */
    pub max_user_msg_size: usize,  // Largest accepted payload
    pub max_forward_size: usize,   // Data kept in a returned message

    /* Default blocking timeouts, None waits forever */
    pub rcv_timeout_ms: Option<u64>,
    pub snd_timeout_ms: Option<u64>,

    /* Portid table */
    pub table_buckets: usize,
}

impl Default for SockConfig {
    fn default() -> Self {
        Self {
            conn_timeout_ms: 8000,
            probe_interval_ms: 3_600_000,
            timer_recheck_ms: 50,
            rcvbuf: 2 * 1024 * 1024,
            rcvbuf_min: 512 * 1024,
            flowctl_blk_sz: 1024,
            flowctl_msg_win: 512,
            ack_rate: 4,
            max_user_msg_size: 66_000,
            max_forward_size: 1024,
            rcv_timeout_ms: None,
            snd_timeout_ms: None,
            table_buckets: 64,
        }
    }
}

impl SockConfig {
    /// Parse a (possibly partial) JSON document
    pub fn from_json(text: &str) -> SockResult<Self> {
        let cfg: SockConfig = serde_json::from_str(text).map_err(|e| {
            log::warn!("rejecting socket config: {}", e);
            SockError::InvalidArgument
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the flow-control arithmetic cannot work with
    pub fn validate(&self) -> SockResult<()> {
        if self.flowctl_blk_sz == 0
            || self.ack_rate == 0
            || self.flowctl_msg_win == 0
            || self.table_buckets == 0
            || self.rcvbuf == 0
            || self.rcvbuf_min == 0
            || self.max_user_msg_size == 0
        {
            return Err(SockError::InvalidArgument);
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn timer_recheck(&self) -> Duration {
        Duration::from_millis(self.timer_recheck_ms)
    }

    /// Window in blocks advertised for a given buffer size
    ///
    /// The extra division by four covers the allocation overhead of a buffer
    /// relative to its payload.
    pub fn adv_blocks(&self, len: usize) -> u16 {
        let blocks = len / self.flowctl_blk_sz / 4;
        blocks.min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let cfg = SockConfig::default();
        assert_eq!(cfg.conn_timeout_ms, 8000);
        assert_eq!(cfg.probe_interval(), Duration::from_secs(3600));
        assert_eq!(cfg.adv_blocks(cfg.rcvbuf_min), 128);
        assert_eq!(cfg.adv_blocks(cfg.rcvbuf), 512);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SockConfig::from_json(r#"{ "rcvbuf": 65536, "conn_timeout_ms": 100 }"#).unwrap();
        assert_eq!(cfg.rcvbuf, 65536);
        assert_eq!(cfg.conn_timeout_ms, 100);
        assert_eq!(cfg.flowctl_msg_win, 512);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert_eq!(
            SockConfig::from_json(r#"{ "flowctl_blk_sz": 0 }"#),
            Err(SockError::InvalidArgument)
        );
        assert!(SockConfig::from_json("not json").is_err());
    }
}
