//! Publications Component
//!
//! The name bindings a socket currently owns.

use crate::tipc_types::{Scope, ServiceRange};

/// One name-table binding held by a socket
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Publication {
    pub range: ServiceRange,
    pub scope: Scope,
    pub node: u32,
    pub port: u32,
    pub key: u32,
}

/// Publications State
pub struct PublicationsState {
    pub list: Vec<Publication>,
    pub pub_count: u32,   // Publications ever made, drives key allocation
}

impl PublicationsState {
    pub fn new() -> Self {
        Self {
            list: Vec::new(),
            pub_count: 0,
        }
    }

    #[inline]
    pub fn is_published(&self) -> bool {
        !self.list.is_empty()
    }

    /// Key for the next publication of socket `portid`; `None` once the key
    /// space has wrapped back onto the portid.
    pub fn next_key(&self, portid: u32) -> Option<u32> {
        let key = portid.wrapping_add(self.pub_count).wrapping_add(1);
        (key != portid).then_some(key)
    }

    pub fn on_published(&mut self, publ: Publication) {
        self.list.push(publ);
        self.pub_count = self.pub_count.wrapping_add(1);
    }

    /// Remove the publication matching `range` and `scope` exactly
    pub fn take_matching(&mut self, range: &ServiceRange, scope: Scope) -> Option<Publication> {
        let idx = self
            .list
            .iter()
            .position(|p| p.scope == scope && p.range == *range)?;
        Some(self.list.remove(idx))
    }

    pub fn take_all(&mut self) -> Vec<Publication> {
        std::mem::take(&mut self.list)
    }

    pub fn position_of_key(&self, key: u32) -> Option<usize> {
        self.list.iter().position(|p| p.key == key)
    }
}
