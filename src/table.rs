//! Portid Table
//!
//! Every live socket of a node, keyed by portid. Entries are spread over a
//! fixed number of buckets, each behind its own lock; a bucket lock is held
//! only for the duration of a single insert, remove, lookup or snapshot and
//! never while a socket lock is taken.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;

use crate::error::{SockError, SockResult};
use crate::tipc_types::{TIPC_MAX_PORT, TIPC_MIN_PORT};

pub struct SockTable<T> {
    buckets: Vec<RwLock<BTreeMap<u32, Arc<T>>>>,
    min_port: u32,
    max_port: u32,
}

impl<T> SockTable<T> {
    pub fn new(buckets: usize) -> Self {
        Self::with_port_range(buckets, TIPC_MIN_PORT, TIPC_MAX_PORT)
    }

    pub fn with_port_range(buckets: usize, min_port: u32, max_port: u32) -> Self {
        let buckets = (0..buckets.max(1)).map(|_| RwLock::new(BTreeMap::new())).collect();
        Self { buckets, min_port, max_port }
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, portid: u32) -> usize {
        portid as usize % self.buckets.len()
    }

    /// Allocate a free portid and insert the entry `make` builds for it
    ///
    /// Probing starts at a random portid and walks upward, wrapping at the
    /// end of the range.
    pub fn insert_with<F>(&self, mut make: F) -> SockResult<Arc<T>>
    where
        F: FnMut(u32) -> Arc<T>,
    {
        let span = (self.max_port - self.min_port) as u64 + 1;
        let mut portid = rand::thread_rng().gen_range(self.min_port..=self.max_port);
        for _ in 0..span {
            portid = if portid >= self.max_port { self.min_port } else { portid + 1 };
            let mut bucket = self.buckets[self.bucket_of(portid)].write();
            if bucket.contains_key(&portid) {
                continue;
            }
            let entry = make(portid);
            bucket.insert(portid, Arc::clone(&entry));
            return Ok(entry);
        }
        log::warn!("socket create failed, port identities exhausted");
        Err(SockError::PortIdsExhausted)
    }

    pub fn lookup(&self, portid: u32) -> Option<Arc<T>> {
        self.buckets[self.bucket_of(portid)].read().get(&portid).cloned()
    }

    pub fn remove(&self, portid: u32) -> Option<Arc<T>> {
        self.buckets[self.bucket_of(portid)].write().remove(&portid)
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries of one bucket with portid greater than `after`, in portid order
    pub fn bucket_after(&self, bucket: usize, after: Option<u32>) -> Vec<Arc<T>> {
        let Some(b) = self.buckets.get(bucket) else {
            return Vec::new();
        };
        let b = b.read();
        match after {
            Some(last) => b
                .range((std::ops::Bound::Excluded(last), std::ops::Bound::Unbounded))
                .map(|(_, v)| Arc::clone(v))
                .collect(),
            None => b.values().cloned().collect(),
        }
    }

    /// All entries, collected without holding more than one bucket lock
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.buckets
            .iter()
            .flat_map(|b| b.read().values().cloned().collect::<Vec<_>>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn portids_are_unique_and_in_range() {
        let t: SockTable<u32> = SockTable::new(8);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let e = t.insert_with(Arc::new).unwrap();
            assert!(*e >= TIPC_MIN_PORT && *e <= TIPC_MAX_PORT);
            assert!(seen.insert(*e));
        }
        assert_eq!(t.len(), 500);
    }

    #[test]
    fn small_range_exhausts() {
        let t: SockTable<u32> = SockTable::with_port_range(4, 1, 5);
        for _ in 0..5 {
            t.insert_with(Arc::new).unwrap();
        }
        assert_eq!(t.insert_with(Arc::new).unwrap_err(), SockError::PortIdsExhausted);
        assert!(t.remove(3).is_some());
        assert_eq!(*t.insert_with(Arc::new).unwrap(), 3);
    }

    #[test]
    fn bucket_iteration_resumes_after_cursor() {
        let t: SockTable<u32> = SockTable::with_port_range(1, 1, 10);
        for _ in 0..10 {
            t.insert_with(Arc::new).unwrap();
        }
        let rest: Vec<u32> = t.bucket_after(0, Some(7)).iter().map(|e| **e).collect();
        assert_eq!(rest, vec![8, 9, 10]);
        assert_eq!(t.snapshot().len(), 10);
    }
}
