//! The address pool: an array of leases with an intrusive free list and
//! reuse hash, grown on demand (§4.D).

use std::net::IpAddr;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::lease::Lease;
use crate::metrics;
use crate::range::AddrRange;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("no free address in addresspool")]
    Exhausted,
}

/// An array of leases over one [`AddrRange`], with an intrusive free list
/// and a reuse hash keyed by peer-identity rendering.
#[derive(Debug)]
pub struct Pool {
    range: AddrRange,
    size: u32,
    leases: Vec<Lease>,
    /// `buckets[hash(name) % buckets.len()]` is the head index of that
    /// bucket's reuse chain, or `None`.
    buckets: Vec<Option<usize>>,
    free_head: Option<usize>,
    free_tail: Option<usize>,
    free_count: usize,
    nr_in_use: usize,
    pool_refcount: usize,
}

impl Pool {
    pub(crate) fn new(range: AddrRange) -> Self {
        let size = range.size();
        Self {
            range,
            size,
            leases: Vec::new(),
            buckets: Vec::new(),
            free_head: None,
            free_tail: None,
            free_count: 0,
            nr_in_use: 0,
            pool_refcount: 0,
        }
    }

    pub fn range(&self) -> &AddrRange {
        &self.range
    }

    /// Cardinality of the installed range (saturated to `u32::MAX`).
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Current length of the lease array (`<= size`, grows on demand).
    pub fn nr_leases(&self) -> usize {
        self.leases.len()
    }

    pub fn nr_in_use(&self) -> usize {
        self.nr_in_use
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn pool_refcount(&self) -> usize {
        self.pool_refcount
    }

    pub(crate) fn reference(&mut self) {
        self.pool_refcount += 1;
    }

    /// Decrements the reference count and reports whether it reached zero
    /// (the registry's cue to drop the pool).
    pub(crate) fn unreference(&mut self) -> bool {
        self.pool_refcount = self.pool_refcount.saturating_sub(1);
        self.pool_refcount == 0
    }

    /// Invariant 5: `nr_in_use + free_count == nr_leases`. Exposed for
    /// tests exercising the conservation property directly; debug-asserted
    /// internally after every mutating call.
    pub fn check_conservation(&self) -> bool {
        self.nr_in_use + self.free_count == self.leases.len()
    }

    fn bucket_slot(&self, name: &str) -> Option<usize> {
        if self.buckets.is_empty() {
            return None;
        }
        Some((hash_name(name) as usize) % self.buckets.len())
    }

    fn bucket_insert(&mut self, idx: usize, name: &str) {
        let Some(slot) = self.bucket_slot(name) else {
            return;
        };
        let old_head = self.buckets[slot];
        self.leases[idx].reuse_prev = None;
        self.leases[idx].reuse_next = old_head;
        if let Some(head) = old_head {
            self.leases[head].reuse_prev = Some(idx);
        }
        self.buckets[slot] = Some(idx);
        self.leases[idx].bucket = Some(slot);
    }

    fn bucket_remove(&mut self, idx: usize) {
        let prev = self.leases[idx].reuse_prev;
        let next = self.leases[idx].reuse_next;
        match prev {
            Some(p) => self.leases[p].reuse_next = next,
            None => {
                if let Some(slot) = self.leases[idx].bucket {
                    self.buckets[slot] = next;
                }
            }
        }
        if let Some(n) = next {
            self.leases[n].reuse_prev = prev;
        }
        self.leases[idx].reuse_prev = None;
        self.leases[idx].reuse_next = None;
        self.leases[idx].bucket = None;
    }

    fn recover_lease(&self, name: &str) -> Option<usize> {
        let slot = self.bucket_slot(name)?;
        let mut cur = self.buckets[slot];
        while let Some(idx) = cur {
            if self.leases[idx].reuse_name.as_deref() == Some(name) {
                return Some(idx);
            }
            cur = self.leases[idx].reuse_next;
        }
        None
    }

    fn free_prepend(&mut self, idx: usize) {
        self.leases[idx].free_prev = None;
        self.leases[idx].free_next = self.free_head;
        match self.free_head {
            Some(head) => self.leases[head].free_prev = Some(idx),
            None => self.free_tail = Some(idx),
        }
        self.free_head = Some(idx);
        self.free_count += 1;
    }

    fn free_append(&mut self, idx: usize) {
        self.leases[idx].free_next = None;
        self.leases[idx].free_prev = self.free_tail;
        match self.free_tail {
            Some(tail) => self.leases[tail].free_next = Some(idx),
            None => self.free_head = Some(idx),
        }
        self.free_tail = Some(idx);
        self.free_count += 1;
    }

    fn free_remove(&mut self, idx: usize) {
        let prev = self.leases[idx].free_prev;
        let next = self.leases[idx].free_next;
        match prev {
            Some(p) => self.leases[p].free_next = next,
            None => self.free_head = next,
        }
        match next {
            Some(n) => self.leases[n].free_prev = prev,
            None => self.free_tail = prev,
        }
        self.leases[idx].free_prev = None;
        self.leases[idx].free_next = None;
        self.free_count -= 1;
    }

    fn free_pop_head(&mut self) -> Option<usize> {
        let head = self.free_head?;
        self.free_remove(head);
        Some(head)
    }

    /// Doubles the lease array, capped at `size`. Rebuild of the reuse
    /// hash is total (the bucket modulus changes with `nr_leases`), never
    /// incremental (§4.D "growth policy").
    fn grow(&mut self) {
        let cur_len = self.leases.len() as u32;
        if cur_len >= self.size {
            return;
        }
        let new_len = cur_len.saturating_mul(2).clamp(1, self.size) as usize;
        for _ in self.leases.len()..new_len {
            self.leases.push(Lease::default());
        }
        self.buckets = vec![None; new_len];
        for lease in &mut self.leases {
            lease.reuse_prev = None;
            lease.reuse_next = None;
            lease.bucket = None;
        }
        let named: Vec<(usize, String)> = self
            .leases
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.reuse_name.clone().map(|n| (i, n)))
            .collect();
        for (idx, name) in &named {
            self.bucket_insert(*idx, name);
        }
        // free_prepend makes its argument the new head, so walk the newly
        // created slots highest-index-first: after the loop the free list
        // pops low-index-first, matching sequential acquisition order.
        for idx in ((cur_len as usize)..new_len).rev() {
            self.free_prepend(idx);
        }
        metrics::POOL_GROWTHS.inc();
        debug!(old_len = cur_len, new_len, "grew address pool lease array");
    }

    /// `acquire(conn)` (§4.D). `peer_id` is the rendered identity text;
    /// `reusable` is the caller-computed reusability predicate.
    pub fn acquire(&mut self, peer_id: &str, reusable: bool) -> Result<IpAddr, PoolError> {
        if reusable {
            if let Some(idx) = self.recover_lease(peer_id) {
                if !self.leases[idx].is_in_use() {
                    self.free_remove(idx);
                    self.nr_in_use += 1;
                }
                self.leases[idx].refcount += 1;
                let addr = self.range.address_at(idx as u32);
                debug!(lease_index = idx, refcount = self.leases[idx].refcount, %addr, "reclaimed lease by name");
                metrics::LEASES_ACQUIRED.inc();
                metrics::LEASES_RECLAIMED.inc();
                self.publish_gauges();
                return Ok(addr);
            }
        }

        if self.free_head.is_none() && (self.leases.len() as u32) < self.size {
            self.grow();
        }
        let idx = match self.free_pop_head() {
            Some(idx) => idx,
            None => {
                warn!(size = self.size, "address pool exhausted");
                metrics::POOL_EXHAUSTIONS.inc();
                return Err(PoolError::Exhausted);
            }
        };

        if let Some(old_name) = self.leases[idx].reuse_name.take() {
            self.bucket_remove(idx);
            trace!(lease_index = idx, stolen_name = %old_name, "stealing lingering lease");
            metrics::LEASES_STOLEN.inc();
        }
        if reusable {
            self.leases[idx].reuse_name = Some(peer_id.to_string());
            self.bucket_insert(idx, peer_id);
        }
        self.leases[idx].refcount = 1;
        self.nr_in_use += 1;
        let addr = self.range.address_at(idx as u32);
        debug!(lease_index = idx, %addr, reusable, "acquired fresh lease");
        metrics::LEASES_ACQUIRED.inc();
        self.publish_gauges();
        debug_assert!(self.check_conservation());
        Ok(addr)
    }

    /// `release(conn)` (§4.D). Reusable lingering leases are appended
    /// (consumed last); one-time leases are prepended (consumed first).
    ///
    /// `index < nr_leases` is a caller invariant (§4.D step 2, §7
    /// "programmer error"), not a recoverable condition: a caller only
    /// ever releases an address it was handed by a prior `acquire`, so an
    /// out-of-range `addr` means the caller's own bookkeeping is broken.
    /// `idx` is bounds-checked below via `debug_assert!`; an out-of-range
    /// index still can't corrupt memory, since the subsequent slice index
    /// panics regardless of build profile.
    pub fn release(&mut self, addr: IpAddr) {
        let idx = self.range.index_of(addr).unwrap_or(u32::MAX) as usize;
        debug_assert!(
            idx < self.leases.len(),
            "release of address {addr} outside this pool's lease array (nr_leases={})",
            self.leases.len()
        );
        debug_assert!(self.leases[idx].is_in_use(), "release of a lease with zero refcount");
        self.leases[idx].refcount = self.leases[idx].refcount.saturating_sub(1);
        if !self.leases[idx].is_in_use() {
            self.nr_in_use -= 1;
            if self.leases[idx].reuse_name.is_some() {
                self.free_append(idx);
                trace!(lease_index = idx, "lease lingers, reclaimable by name");
            } else {
                self.free_prepend(idx);
                trace!(lease_index = idx, "lease freed, immediately reusable");
            }
        }
        metrics::LEASES_RELEASED.inc();
        self.publish_gauges();
        debug_assert!(self.check_conservation());
    }

    fn publish_gauges(&self) {
        metrics::record_pool_gauges(self.nr_in_use, self.leases.len(), self.size);
    }
}

/// FNV-1a over the reuse name. Not cryptographic; the table is small and
/// not attacker-controlled (peer identities are authenticated upstream).
fn hash_name(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in name.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn range4(start: [u8; 4], end: [u8; 4]) -> AddrRange {
        AddrRange::new(IpAddr::V4(Ipv4Addr::from(start)), IpAddr::V4(Ipv4Addr::from(end))).unwrap()
    }

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn scenario_1_pool_exhaustion() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 4]));
        assert_eq!(pool.acquire("alice", true).unwrap(), v4(10, 0, 0, 1));
        assert_eq!(pool.acquire("bob", true).unwrap(), v4(10, 0, 0, 2));
        assert_eq!(pool.acquire("carol", true).unwrap(), v4(10, 0, 0, 3));
        assert_eq!(pool.acquire("dave", true).unwrap(), v4(10, 0, 0, 4));
        assert_eq!(pool.acquire("eve", true).unwrap_err(), PoolError::Exhausted);
        assert!(pool.check_conservation());
    }

    #[test]
    fn scenario_2_reclaim_then_steal() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 4]));
        pool.acquire("alice", true).unwrap();
        let bob_addr = pool.acquire("bob", true).unwrap();
        pool.acquire("carol", true).unwrap();
        pool.acquire("dave", true).unwrap();

        pool.release(bob_addr);
        let reclaimed = pool.acquire("bob", true).unwrap();
        assert_eq!(reclaimed, bob_addr);

        pool.release(bob_addr);
        let stolen = pool.acquire("frank", true).unwrap();
        assert_eq!(stolen, bob_addr);
        assert!(pool.recover_lease("bob").is_none());
        assert!(pool.check_conservation());
    }

    #[test]
    fn one_time_lease_is_prepended_and_consumed_first() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 4]));
        let a = pool.acquire("a", false).unwrap();
        let b = pool.acquire("b", false).unwrap();
        pool.acquire("c", false).unwrap();
        pool.release(a);
        pool.release(b);
        // b was released most recently with reuse disabled -> prepended ->
        // consumed before a.
        assert_eq!(pool.acquire("next", false).unwrap(), b);
        assert_eq!(pool.acquire("next2", false).unwrap(), a);
    }

    #[test]
    fn grow_is_monotonic_and_capped_at_size() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 8]));
        assert_eq!(pool.nr_leases(), 0);
        let first = pool.acquire("one", false).unwrap();
        assert_eq!(pool.nr_leases(), 1);
        assert_eq!(first, v4(10, 0, 0, 1));
        for i in 1..8 {
            let before = pool.nr_leases();
            pool.acquire(&format!("n{i}"), false).unwrap();
            assert!(pool.nr_leases() >= before);
        }
        assert_eq!(pool.nr_leases(), 8);
        assert_eq!(pool.acquire("overflow", false).unwrap_err(), PoolError::Exhausted);
    }

    #[test]
    fn non_reusable_peer_does_not_linger() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 2]));
        let addr = pool.acquire("transient", false).unwrap();
        pool.release(addr);
        assert!(pool.recover_lease("transient").is_none());
        // immediately reusable by anyone
        assert_eq!(pool.acquire("someone-else", false).unwrap(), addr);
    }

    #[test]
    fn distinct_names_in_same_bucket_get_distinct_leases() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 4]));
        let a = pool.acquire("aaa", true).unwrap();
        let b = pool.acquire("bbb", true).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn release_of_shared_lease_keeps_it_in_use() {
        let mut pool = Pool::new(range4([10, 0, 0, 1], [10, 0, 0, 2]));
        let addr = pool.acquire("shared", true).unwrap();
        // second acquire for the same reusable name bumps refcount rather
        // than handing out a second address.
        let again = pool.acquire("shared", true).unwrap();
        assert_eq!(addr, again);
        pool.release(addr);
        assert!(pool.recover_lease("shared").is_some());
        assert_eq!(pool.nr_in_use(), 1);
    }
}
