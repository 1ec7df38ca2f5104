//! In-Memory Cluster Name Table
//!
//! A name table shared by every node of an in-process cluster. Node-scope
//! publications are visible only on the publishing node.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::components::Publication;
use crate::transport::{NameTable, NodeList};
use crate::tipc_types::{Scope, ServiceRange, TipcAddr};

pub struct LocalNameTable {
    entries: RwLock<Vec<Publication>>,
    rr: AtomicUsize,   // Round-robin cursor for translate()
}

impl LocalNameTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            rr: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn visible(p: &Publication, from_node: u32) -> bool {
        p.scope != Scope::Node || p.node == from_node
    }
}

impl Default for LocalNameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTable for LocalNameTable {
    fn publish(
        &self,
        range: ServiceRange,
        scope: Scope,
        node: u32,
        port: u32,
        key: u32,
    ) -> Option<Publication> {
        if range.lower > range.upper {
            return None;
        }
        let mut entries = self.entries.write();
        if entries
            .iter()
            .any(|p| p.range == range && p.node == node && p.port == port && p.key == key)
        {
            return None;
        }
        let publ = Publication { range, scope, node, port, key };
        entries.push(publ);
        log::debug!("published {{{}, {}, {}}} on {:#x}:{}", range.stype, range.lower, range.upper, node, port);
        Some(publ)
    }

    fn withdraw(&self, stype: u32, lower: u32, node: u32, port: u32, key: u32) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|p| {
            !(p.range.stype == stype && p.range.lower == lower && p.node == node && p.port == port && p.key == key)
        });
        entries.len() != before
    }

    fn translate(&self, stype: u32, instance: u32, domain: u32, from_node: u32) -> Option<TipcAddr> {
        let entries = self.entries.read();
        let candidates: Vec<&Publication> = entries
            .iter()
            .filter(|p| p.range.contains(stype, instance))
            .filter(|p| Self::visible(p, from_node))
            .filter(|p| domain == 0 || p.node == domain)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let local: Vec<&Publication> = candidates.iter().copied().filter(|p| p.node == from_node).collect();
        let pool = if local.is_empty() { candidates } else { local };
        let idx = self.rr.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(TipcAddr::new(pool[idx].node, pool[idx].port))
    }

    fn lookup_dst_nodes(&self, range: &ServiceRange, from_node: u32) -> NodeList {
        let entries = self.entries.read();
        let mut dsts = NodeList::default();
        for p in entries.iter().filter(|p| p.range.overlaps(range) && Self::visible(p, from_node)) {
            if p.node == from_node {
                dsts.local = true;
            } else if !dsts.remote.contains(&p.node) {
                dsts.remote.push(p.node);
            }
        }
        dsts
    }

    fn lookup_local_ports(&self, range: &ServiceRange, node: u32) -> Vec<u32> {
        let entries = self.entries.read();
        let mut ports = Vec::new();
        for p in entries.iter().filter(|p| p.node == node && p.range.overlaps(range)) {
            if !ports.contains(&p.port) {
                ports.push(p.port);
            }
        }
        ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N1: u32 = 0x1001;
    const N2: u32 = 0x1002;

    #[test]
    fn translate_prefers_local_node() {
        let nt = LocalNameTable::new();
        nt.publish(ServiceRange::new(1000, 0, 10), Scope::Cluster, N2, 20, 21).unwrap();
        nt.publish(ServiceRange::new(1000, 0, 10), Scope::Cluster, N1, 10, 11).unwrap();
        for _ in 0..4 {
            assert_eq!(nt.translate(1000, 5, 0, N1), Some(TipcAddr::new(N1, 10)));
        }
        assert_eq!(nt.translate(1000, 5, N2, N1), Some(TipcAddr::new(N2, 20)));
        assert_eq!(nt.translate(1000, 11, 0, N1), None);
    }

    #[test]
    fn node_scope_is_private() {
        let nt = LocalNameTable::new();
        nt.publish(ServiceRange::new(1000, 1, 1), Scope::Node, N1, 10, 11).unwrap();
        assert_eq!(nt.translate(1000, 1, 0, N2), None);
        assert!(nt.lookup_dst_nodes(&ServiceRange::new(1000, 0, 5), N2).is_empty());
        assert!(nt.lookup_dst_nodes(&ServiceRange::new(1000, 0, 5), N1).local);
    }

    #[test]
    fn withdraw_and_port_lookup() {
        let nt = LocalNameTable::new();
        nt.publish(ServiceRange::new(1000, 1, 3), Scope::Zone, N1, 10, 11).unwrap();
        nt.publish(ServiceRange::new(1000, 5, 5), Scope::Zone, N1, 12, 13).unwrap();
        assert_eq!(nt.lookup_local_ports(&ServiceRange::new(1000, 0, 9), N1), vec![10, 12]);
        assert!(nt.withdraw(1000, 1, N1, 10, 11));
        assert!(!nt.withdraw(1000, 1, N1, 10, 11));
        assert_eq!(nt.len(), 1);
        assert!(nt.publish(ServiceRange::new(1000, 9, 3), Scope::Zone, N1, 10, 14).is_none());
    }
}
