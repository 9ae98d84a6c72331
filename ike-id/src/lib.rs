//! IKE peer identity representation, parsing, and Distinguished Name
//! matching (RFC 2407 §4.6.2).
//!
//! Three modules, leaves first:
//! - [`der`] — the DER codec trait boundary for the X.509/ASN.1 decoder
//!   collaborator, plus a reference implementation.
//! - [`dn`] — Distinguished Name comparison: exact, any-order, and
//!   any-order-with-wildcards.
//! - [`identity`] — the tagged [`Identity`] value, its textual grammar,
//!   and the `same`/`match_wild`/`wildcard_count` predicates that the
//!   address-pool crate's reuse logic is built on.

pub mod der;
pub mod dn;
pub mod identity;

pub use der::{Asn1Error, DerCodec, RefDerCodec};
pub use dn::{Dn, DnError};
pub use identity::{match_wild, parse, render, same, wildcard_count, Identity, IdentityError, MAX_WILDCARDS};
