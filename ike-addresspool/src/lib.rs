//! Address-pool lease management for IKEv1 XAUTH/ModeCfg and IKEv2
//! Configuration-Payload exchanges: an array of leases with an intrusive
//! free-list and reuse hash (§4.D), and a registry of non-overlapping
//! pools (§4.E).
//!
//! This crate knows nothing about peer identities or DN matching; callers
//! (e.g. `ike-core`) compute the rendered peer-identity string and the
//! reusability predicate and pass them in. That keeps the lease engine
//! testable on plain strings, matching §9's framing of the pool registry
//! as an explicit, independently-instantiable handle.

mod lease;
pub mod metrics;
mod pool;
mod range;
mod registry;

pub use pool::{Pool, PoolError};
pub use range::{AddrRange, Overlap, RangeError};
pub use registry::{PoolHandle, Registry, RegistryError};
