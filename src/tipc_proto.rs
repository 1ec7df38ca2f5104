//! TIPC Protocol Definitions
//!
//! Message users, message types, error codes, header sizes and the
//! in-memory message representation exchanged with the transport.

use crate::tipc_types::{Importance, ServiceRange, TipcAddr};

/// Message users (classes)
pub const TIPC_LOW_IMPORTANCE: u8 = 0;
pub const TIPC_MEDIUM_IMPORTANCE: u8 = 1;
pub const TIPC_HIGH_IMPORTANCE: u8 = 2;
pub const TIPC_CRITICAL_IMPORTANCE: u8 = 3;
pub const CONN_MANAGER: u8 = 8;
pub const SOCK_WAKEUP: u8 = 14;

/// Importance reported for anything that is not plain user data
pub const TIPC_SYSTEM_IMPORTANCE: u32 = 4;

/// Data message types
pub const TIPC_CONN_MSG: u8 = 0;
pub const TIPC_MCAST_MSG: u8 = 1;
pub const TIPC_NAMED_MSG: u8 = 2;
pub const TIPC_DIRECT_MSG: u8 = 3;

/// Connection manager message types
pub const CONN_PROBE: u8 = 0;
pub const CONN_PROBE_REPLY: u8 = 1;
pub const CONN_ACK: u8 = 2;

/// Error codes carried in returned messages
pub type ErrCode = u32;
pub const TIPC_OK: ErrCode = 0;
pub const TIPC_ERR_NO_NAME: ErrCode = 1;
pub const TIPC_ERR_NO_PORT: ErrCode = 2;
pub const TIPC_ERR_NO_NODE: ErrCode = 3;
pub const TIPC_ERR_OVERLOAD: ErrCode = 4;
pub const TIPC_CONN_SHUTDOWN: ErrCode = 5;

/// Header sizes
pub const SHORT_H_SIZE: usize = 24;
pub const BASIC_H_SIZE: usize = 32;
pub const NAMED_H_SIZE: usize = 40;
pub const MCAST_H_SIZE: usize = 44;
pub const INT_H_SIZE: usize = 40;
pub const MIN_H_SIZE: usize = 24;
pub const MAX_H_SIZE: usize = 60;

/// Default link packet size before the transport reports one
pub const MAX_PKT_DEFAULT: usize = 1500;

/// Per-buffer bookkeeping charged on top of the message itself
pub const TRUESIZE_OVERHEAD: usize = 256;

/// Buffer charge of a message of `size` bytes (header included)
pub const fn truesize(size: usize) -> usize {
    TRUESIZE_OVERHEAD + size
}

/// TIPC Message Header
///
/// Decoded form of a header; the transport is responsible for any wire
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipcHdr {
    /* Class */
    pub user: u8,
    pub mtype: u8,
    pub hdr_size: usize,
    pub errcode: ErrCode,

    /* Delivery Flags */
    pub src_droppable: bool,
    pub dest_droppable: bool,

    /* Addressing */
    pub orig: TipcAddr,
    pub dest: TipcAddr,
    pub prevnode: u32,

    /* Service Name (named and multicast messages) */
    pub name_type: u32,
    pub name_lower: u32,
    pub name_upper: u32,
    pub lookup_domain: u32,
    pub reroute_cnt: u8,

    /* Connection Manager */
    pub conn_ack: u16,
    pub adv_win: u16,
}

impl TipcHdr {
    pub fn new(user: u8, mtype: u8, hdr_size: usize, orig: TipcAddr, dest: TipcAddr) -> Self {
        Self {
            user,
            mtype,
            hdr_size,
            errcode: TIPC_OK,
            src_droppable: false,
            dest_droppable: false,
            orig,
            dest,
            prevnode: orig.node,
            name_type: 0,
            name_lower: 0,
            name_upper: 0,
            lookup_domain: 0,
            reroute_cnt: 0,
            conn_ack: 0,
            adv_win: 0,
        }
    }

    /// User data as opposed to a protocol message
    #[inline]
    pub fn is_data(&self) -> bool {
        self.user <= TIPC_CRITICAL_IMPORTANCE
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.is_data() && self.mtype == TIPC_CONN_MSG
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        self.is_data() && self.mtype == TIPC_NAMED_MSG
    }

    #[inline]
    pub fn is_mcast(&self) -> bool {
        self.is_data() && self.mtype == TIPC_MCAST_MSG
    }

    /// Importance as used for buffer admission
    ///
    /// Returned and protocol messages count as system importance.
    pub fn importance(&self) -> u32 {
        if self.is_data() && self.errcode == TIPC_OK {
            self.user as u32
        } else {
            TIPC_SYSTEM_IMPORTANCE
        }
    }

    /// Importance of a data message, for copying onto a connection
    pub fn data_importance(&self) -> Importance {
        Importance::try_from(self.user as u32).unwrap_or(Importance::Low)
    }

    pub fn name_range(&self) -> ServiceRange {
        ServiceRange::new(self.name_type, self.name_lower, self.name_upper)
    }
}

/// TIPC Message: header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipcMsg {
    pub hdr: TipcHdr,
    pub data: Vec<u8>,
}

impl TipcMsg {
    pub fn new(hdr: TipcHdr, data: Vec<u8>) -> Self {
        Self { hdr, data }
    }

    #[inline]
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.hdr.hdr_size + self.data.len()
    }

    /// Receive buffer charge of this message
    #[inline]
    pub fn truesize(&self) -> usize {
        truesize(self.size())
    }

    /// Turn this message into a rejection addressed back to its sender
    ///
    /// Returns `None` when the message must not be returned: the sender
    /// marked it destination-droppable, or it already is a returned message.
    /// The returned copy keeps at most `max_forward` bytes of payload.
    pub fn reverse(mut self, own_node: u32, err: ErrCode, max_forward: usize) -> Option<TipcMsg> {
        if self.hdr.dest_droppable || self.hdr.errcode != TIPC_OK {
            return None;
        }
        let ohdr = self.hdr.clone();
        self.hdr.errcode = err;
        self.hdr.orig = TipcAddr::new(own_node, ohdr.dest.port);
        self.hdr.dest = TipcAddr::new(ohdr.prevnode, ohdr.orig.port);
        self.hdr.prevnode = own_node;
        self.data.truncate(max_forward);
        Some(self)
    }
}
