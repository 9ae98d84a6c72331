//! The pool registry: a set of pools with reference counting and
//! exact/overlap lookup (§4.E).

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::warn;

use crate::metrics;
use crate::pool::Pool;
use crate::range::{AddrRange, Overlap};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("ERROR: partial overlap of addresspool")]
    PartialOverlap,
}

pub type PoolHandle = Rc<RefCell<Pool>>;

/// A set of address pools, none of which may overlap. An explicit handle
/// rather than process-global state (§9 "global state"), so tests and
/// multiple in-process configurations can each own an isolated registry.
#[derive(Debug, Default)]
pub struct Registry {
    pools: Vec<PoolHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self { pools: Vec::new() }
    }

    pub fn pools(&self) -> &[PoolHandle] {
        &self.pools
    }

    /// Exact start+end match returns the existing pool; disjoint ranges
    /// are skipped; any other relation is a partial overlap, logged and
    /// returned as an error.
    pub fn find(&self, range: &AddrRange) -> Result<Option<PoolHandle>, RegistryError> {
        for pool in &self.pools {
            match pool.borrow().range().overlap(range) {
                Overlap::Exact => return Ok(Some(pool.clone())),
                Overlap::Disjoint => continue,
                Overlap::Partial => {
                    warn!(requested = %range, existing = %pool.borrow().range(), "inexact overlap of addresspool");
                    metrics::POOL_OVERLAPS_REFUSED.inc();
                    return Err(RegistryError::PartialOverlap);
                }
            }
        }
        Ok(None)
    }

    /// Installs (or reuses) a pool over `range`. Refused if `range`
    /// partially overlaps an already-installed pool.
    pub fn install(&mut self, range: AddrRange) -> Result<PoolHandle, RegistryError> {
        if let Some(existing) = self.find(&range)? {
            return Ok(existing);
        }
        let pool = Rc::new(RefCell::new(Pool::new(range)));
        self.pools.insert(0, pool.clone());
        Ok(pool)
    }

    pub fn reference(&self, pool: &PoolHandle) {
        pool.borrow_mut().reference();
    }

    /// Drops the pool from the registry once its reference count reaches
    /// zero; the unique point of pool destruction (§5 "shared resources").
    pub fn unreference(&mut self, pool: &PoolHandle) {
        let should_drop = pool.borrow_mut().unreference();
        if should_drop {
            self.pools.retain(|p| !Rc::ptr_eq(p, pool));
        }
    }
}
