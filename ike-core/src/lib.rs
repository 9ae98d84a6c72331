//! Adapter layer binding `ike-id` peer-identity matching to
//! `ike-addresspool` lease management (§10.5). Neither lower-level crate
//! depends on the other; this crate is where their contracts meet,
//! alongside the slice of connection policy and configuration needed to
//! drive them.

pub mod config;
pub mod conn;
pub mod policy;

pub use conn::{AdapterError, Conn};
pub use policy::{is_reusable, AuthMethod};

pub use ike_addresspool::{AddrRange, Overlap, Pool, PoolError, PoolHandle, Registry, RegistryError};
pub use ike_id::{match_wild, render, same, wildcard_count, DerCodec, Identity, IdentityError, RefDerCodec};
