//! The thin seam binding a connection's peer identity and policy to the
//! address-pool engine (§10.5). This is the adapter layer the spec calls
//! for: `ike-id` and `ike-addresspool` never depend on each other, and
//! `Conn` is where their contracts meet.

use ike_addresspool::{AddrRange, PoolError, PoolHandle, Registry, RegistryError};
use ike_id::{DerCodec, Identity};
use thiserror::Error;
use tracing::debug;

use crate::policy::{is_reusable, AuthMethod};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// One connection's identity, policy, and (once acquired) lease. Mirrors
/// the slice of the original connection struct that the lease engine
/// actually touches; everything else (SPD routes, the state machine) is
/// out of scope (§1).
#[derive(Debug)]
pub struct Conn {
    peer_id: Identity<'static>,
    auth: AuthMethod,
    pool: Option<PoolHandle>,
    lease_addr: Option<std::net::IpAddr>,
}

impl Conn {
    pub fn new(peer_id: Identity<'static>, auth: AuthMethod) -> Self {
        Self {
            peer_id,
            auth,
            pool: None,
            lease_addr: None,
        }
    }

    pub fn peer_id(&self) -> &Identity<'static> {
        &self.peer_id
    }

    pub fn lease_addr(&self) -> Option<std::net::IpAddr> {
        self.lease_addr
    }

    /// Installs (or reuses) the pool for `range`, references it for this
    /// connection, and acquires a lease keyed by the rendered peer
    /// identity (§4.D `acquire(conn)`).
    pub fn acquire(
        &mut self,
        registry: &mut Registry,
        range: AddrRange,
        unique_ids: bool,
        codec: &dyn DerCodec,
    ) -> Result<std::net::IpAddr, AdapterError> {
        let pool = registry.install(range)?;
        registry.reference(&pool);
        let name = ike_id::render(&self.peer_id, codec);
        let reusable = is_reusable(self.auth, &self.peer_id, unique_ids);
        let addr = pool.borrow_mut().acquire(&name, reusable)?;
        debug!(peer = %name, %addr, reusable, "connection acquired lease");
        self.pool = Some(pool);
        self.lease_addr = Some(addr);
        Ok(addr)
    }

    /// Releases this connection's lease (if it holds one) and
    /// unreferences the pool (§4.D `release(conn)` / §4.E `unreference`).
    pub fn release(&mut self, registry: &mut Registry) {
        let (Some(pool), Some(addr)) = (self.pool.take(), self.lease_addr.take()) else {
            return;
        };
        pool.borrow_mut().release(addr);
        registry.unreference(&pool);
    }
}
