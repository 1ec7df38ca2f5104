//! Socket Diagnostics
//!
//! Restartable dumps of the socket table and of one socket's publications.
//! Both are paginated by a caller-held cursor so a dump can span several
//! calls while sockets come and go.

use std::sync::atomic::Ordering;

use crate::components::Publication;
use crate::error::{SockError, SockResult};
use crate::net::TipcNet;
use crate::tipc_sock::TipcSock;
use crate::tipc_types::{ServiceAddr, TipcAddr};

/// Position in a socket table dump
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DumpCursor {
    pub bucket: usize,
    pub last_portid: Option<u32>,   // Last socket emitted from `bucket`
    pub done: bool,
}

/// Position in a publication dump
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PublCursor {
    pub next_key: Option<u32>,   // First publication not yet emitted
    pub done: bool,
}

/// Connection details of a dumped socket
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnInfo {
    pub peer: TipcAddr,
    pub name: Option<ServiceAddr>,
}

/// Per-socket counters
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SockStats {
    /* Receive */
    pub rcvq_len: usize,
    pub rmem: usize,
    pub drops: u64,

    /* Send */
    pub cong_link_cnt: u32,

    /* Flow control */
    pub snd_win: u16,
    pub rcv_win: u16,
    pub snt_unacked: u16,
    pub rcv_unacked: u16,
}

/// One socket in a table dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SockDumpEntry {
    pub portid: u32,
    pub node: u32,
    pub conn: Option<ConnInfo>,
    pub has_publications: bool,
    pub stats: SockStats,
}

impl TipcSock {
    pub fn stats(&self) -> SockStats {
        let sk = self.lock_unchecked();
        SockStats {
            rcvq_len: sk.rxq.len(),
            rmem: sk.rxq.bytes(),
            drops: self.acct.drops.load(Ordering::Relaxed),
            cong_link_cnt: sk.cong_ctrl.cong_link_cnt,
            snd_win: sk.flow_ctrl.snd_win,
            rcv_win: sk.flow_ctrl.rcv_win,
            snt_unacked: sk.flow_ctrl.snt_unacked,
            rcv_unacked: sk.flow_ctrl.rcv_unacked,
        }
    }

    fn dump_entry(&self) -> SockDumpEntry {
        let (conn, has_publications) = {
            let sk = self.lock_unchecked();
            let conn = match sk.conn_mgmt.peer {
                Some(peer) if sk.conn_mgmt.is_connected() => Some(ConnInfo {
                    peer,
                    name: sk.conn_mgmt.conn_name,
                }),
                _ => None,
            };
            (conn, sk.publ.is_published())
        };
        SockDumpEntry {
            portid: self.portid(),
            node: self.net().own_node(),
            conn,
            has_publications,
            stats: self.stats(),
        }
    }
}

impl TipcNet {
    /// Up to `max` live sockets following `cursor`
    ///
    /// Sockets created or released during a dump may or may not appear; no
    /// socket alive for the whole dump is skipped or repeated.
    pub fn dump_sockets(&self, cursor: &mut DumpCursor, max: usize) -> Vec<SockDumpEntry> {
        let mut out = Vec::new();
        if cursor.done {
            return out;
        }
        while cursor.bucket < self.table.bucket_count() {
            for sk in self.table.bucket_after(cursor.bucket, cursor.last_portid) {
                if out.len() >= max {
                    return out;
                }
                cursor.last_portid = Some(sk.portid());
                if sk.is_released() {
                    continue;
                }
                out.push(sk.dump_entry());
            }
            cursor.bucket += 1;
            cursor.last_portid = None;
        }
        cursor.done = true;
        out
    }

    /// Up to `max` publications of socket `portid` following `cursor`
    ///
    /// If the publication the cursor points at was withdrawn meanwhile, the
    /// cursor is reset and the caller must restart.
    pub fn dump_publications(
        &self,
        portid: u32,
        cursor: &mut PublCursor,
        max: usize,
    ) -> SockResult<Vec<Publication>> {
        let sk = self.lookup(portid).ok_or(SockError::InvalidArgument)?;
        if cursor.done {
            return Ok(Vec::new());
        }
        let st = sk.lock_unchecked();
        let start = match cursor.next_key {
            None => 0,
            Some(key) => match st.publ.position_of_key(key) {
                Some(pos) => pos,
                None => {
                    *cursor = PublCursor::default();
                    return Err(SockError::DumpInterrupted);
                }
            },
        };

        let rest = &st.publ.list[start..];
        let take = rest.len().min(max);
        match rest.get(take) {
            Some(next) => cursor.next_key = Some(next.key),
            None => {
                cursor.next_key = None;
                cursor.done = true;
            }
        }
        Ok(rest[..take].to_vec())
    }
}
