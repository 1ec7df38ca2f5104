//! Receive Queue Component
//!
//! FIFO of delivered messages with a per-message read cursor for partial
//! stream reads, and the byte charge of everything queued.

use std::collections::VecDeque;

use crate::tipc_proto::TipcMsg;

/// A queued message and how much of its payload was already read
#[derive(Debug)]
pub struct RxEntry {
    pub msg: TipcMsg,
    pub bytes_read: usize,
}

/// Receive Queue State
pub struct RxQueue {
    entries: VecDeque<RxEntry>,
    bytes: usize,   // Sum of truesize over queued messages
}

impl RxQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            bytes: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Receive buffer memory currently charged
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn push_back(&mut self, msg: TipcMsg) {
        self.bytes += msg.truesize();
        self.entries.push_back(RxEntry { msg, bytes_read: 0 });
    }

    pub fn push_front(&mut self, msg: TipcMsg) {
        self.bytes += msg.truesize();
        self.entries.push_front(RxEntry { msg, bytes_read: 0 });
    }

    pub fn front(&self) -> Option<&RxEntry> {
        self.entries.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut RxEntry> {
        self.entries.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<TipcMsg> {
        let entry = self.entries.pop_front()?;
        self.bytes -= entry.msg.truesize();
        Some(entry.msg)
    }

    /// Remove everything, oldest first
    pub fn drain(&mut self) -> Vec<RxEntry> {
        self.bytes = 0;
        self.entries.drain(..).collect()
    }

    pub fn purge(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}
