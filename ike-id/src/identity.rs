//! Peer identity value, textual grammar, and the equality/wildcard
//! predicates consumed by the address-pool reuse logic.
//!
//! The six shapes an IKE ID payload can carry (RFC 2407 §4.6.2) are
//! collapsed into one [`Identity`]. Parsing is grammar-driven ([`parse`]);
//! the DER and DN comparisons an identity may need are delegated to
//! [`crate::der`] / [`crate::dn`] rather than duplicated here.

use std::{
    borrow::Cow,
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use thiserror::Error;
use tracing::trace;

use crate::der::{Asn1Error, DerCodec};
use crate::dn::{self, DnError};

/// Returned by [`match_wild`] and [`wildcard_count`] when the match side is
/// the universal wildcard (`None`); it outranks any number of literal
/// wildcard RDNs a real `DerAsn1Dn` template could carry.
pub const MAX_WILDCARDS: usize = usize::MAX;

/// A parsed IKE peer identity.
///
/// Byte payloads are `Cow` so the parser can borrow directly from the
/// caller's input buffer; [`Identity::unshare`] is the ownership-transition
/// point a caller invokes to retain an identity past the input's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity<'a> {
    /// "fill from certificate later"; no payload.
    FromCert,
    /// Universal wildcard; matches any peer.
    None,
    /// RFC 7619 NULL authentication identity.
    Null,
    Ipv4Addr(Ipv4Addr),
    Ipv6Addr(Ipv6Addr),
    /// DNS name, rendered with a leading `@`.
    Fqdn(Cow<'a, str>),
    /// `user@host` form; the `@` is part of the stored text.
    UserFqdn(Cow<'a, str>),
    /// DER-encoded X.501 Distinguished Name.
    DerAsn1Dn(Cow<'a, [u8]>),
    /// Opaque binary key identifier.
    KeyId(Cow<'a, [u8]>),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("empty identity string")]
    Empty,
    #[error("invalid IPv4 address literal {0:?}: {1}")]
    Ipv4(String, std::net::AddrParseError),
    #[error("invalid IPv6 address literal {0:?}: {1}")]
    Ipv6(String, std::net::AddrParseError),
    #[error("invalid hex digits in identity: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid distinguished name: {0}")]
    Dn(#[from] DnError),
    #[error("invalid DER encoding: {0}")]
    Der(#[from] Asn1Error),
}

impl<'a> Identity<'a> {
    /// Transitions a possibly-borrowed identity into one that owns its
    /// payload, copying only when the payload was actually borrowed
    /// (`Cow::into_owned` is a no-op move otherwise).
    pub fn unshare(self) -> Identity<'static> {
        match self {
            Identity::FromCert => Identity::FromCert,
            Identity::None => Identity::None,
            Identity::Null => Identity::Null,
            Identity::Ipv4Addr(a) => Identity::Ipv4Addr(a),
            Identity::Ipv6Addr(a) => Identity::Ipv6Addr(a),
            Identity::Fqdn(s) => Identity::Fqdn(Cow::Owned(s.into_owned())),
            Identity::UserFqdn(s) => Identity::UserFqdn(Cow::Owned(s.into_owned())),
            Identity::DerAsn1Dn(b) => Identity::DerAsn1Dn(Cow::Owned(b.into_owned())),
            Identity::KeyId(b) => Identity::KeyId(Cow::Owned(b.into_owned())),
        }
    }
}

/// Parses the textual identity grammar (config files, CLI, `IDir`/`IDr`
/// adapters). `oe_only` restricts the grammar to the Opportunistic
/// Encryption subset; forms outside it simply aren't matched by their
/// usual branch and fall through to whichever later rule (if any) applies.
pub fn parse<'a>(input: &'a str, oe_only: bool, codec: &dyn DerCodec) -> Result<Identity<'a>, IdentityError> {
    if input.is_empty() {
        return Err(IdentityError::Empty);
    }
    trace!(input, oe_only, "parsing identity");

    if !oe_only {
        match input {
            "%fromcert" => return Ok(Identity::FromCert),
            "%none" => return Ok(Identity::None),
            "%null" => return Ok(Identity::Null),
            _ => {}
        }
        if input.contains('=') {
            let ldap = input.strip_prefix('@').unwrap_or(input);
            let der = dn::rfc4514_to_der(ldap, codec)?;
            return Ok(Identity::DerAsn1Dn(Cow::Owned(der)));
        }
    }

    if !input.contains('@') {
        if input == "%any" || input == "0.0.0.0" {
            return Ok(Identity::None);
        }
        if input.contains(':') {
            let addr: Ipv6Addr = input
                .parse()
                .map_err(|e| IdentityError::Ipv6(input.to_string(), e))?;
            return Ok(Identity::Ipv6Addr(addr));
        }
        let addr: Ipv4Addr = input
            .parse()
            .map_err(|e| IdentityError::Ipv4(input.to_string(), e))?;
        return Ok(Identity::Ipv4Addr(addr));
    }

    if let Some(rest) = input.strip_prefix('@') {
        if !oe_only {
            if let Some(hex_part) = rest.strip_prefix('#') {
                return Ok(Identity::KeyId(Cow::Owned(decode_hex(hex_part)?)));
            }
            if let Some(hex_part) = rest.strip_prefix('~') {
                return Ok(Identity::DerAsn1Dn(Cow::Owned(decode_hex(hex_part)?)));
            }
            if let Some(bracketed) = rest.strip_prefix('[') {
                let text = bracketed.strip_suffix(']').unwrap_or(bracketed);
                return Ok(Identity::KeyId(Cow::Borrowed(text.as_bytes())));
            }
        }
        return Ok(Identity::Fqdn(Cow::Borrowed(rest)));
    }

    // Contains '@' but not leading: user@host, retained whole per RFC DOI
    // §4.6.2.4.
    Ok(Identity::UserFqdn(Cow::Borrowed(input)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, IdentityError> {
    let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    Ok(hex::decode(stripped)?)
}

/// Renders an identity to the printable-ASCII form used in logs and
/// config round-trips (§4.A).
pub fn render(id: &Identity<'_>, codec: &dyn DerCodec) -> String {
    match id {
        Identity::FromCert => "%fromcert".to_string(),
        Identity::None => "(none)".to_string(),
        Identity::Null => "ID_NULL".to_string(),
        Identity::Ipv4Addr(a) => {
            if a.is_unspecified() {
                "%any".to_string()
            } else {
                a.to_string()
            }
        }
        Identity::Ipv6Addr(a) => {
            if a.is_unspecified() {
                "%any".to_string()
            } else {
                a.to_string()
            }
        }
        Identity::Fqdn(name) => format!("@{name}"),
        Identity::UserFqdn(name) => name.to_string(),
        Identity::KeyId(bytes) => format!("@#0x{}", hex::encode(bytes.as_ref())),
        Identity::DerAsn1Dn(der) => match codec.decode(der) {
            Ok(dn) => dn::to_rfc4514(&dn),
            Err(_) => "@~<invalid-der>".to_string(),
        },
    }
}

impl fmt::Display for Identity<'_> {
    /// A codec-free best-effort rendering; `DerAsn1Dn` falls back to its
    /// raw hex form since a `Display` impl has no `DerCodec` to call.
    /// Callers that need the RFC 4514 string should use [`render`] instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::DerAsn1Dn(der) => write!(f, "@~{}", hex::encode(der.as_ref())),
            other => write!(f, "{}", render_without_dn(other)),
        }
    }
}

fn render_without_dn(id: &Identity<'_>) -> String {
    match id {
        Identity::FromCert => "%fromcert".to_string(),
        Identity::None => "(none)".to_string(),
        Identity::Null => "ID_NULL".to_string(),
        Identity::Ipv4Addr(a) if a.is_unspecified() => "%any".to_string(),
        Identity::Ipv4Addr(a) => a.to_string(),
        Identity::Ipv6Addr(a) if a.is_unspecified() => "%any".to_string(),
        Identity::Ipv6Addr(a) => a.to_string(),
        Identity::Fqdn(name) => format!("@{name}"),
        Identity::UserFqdn(name) => name.to_string(),
        Identity::KeyId(bytes) => format!("@#0x{}", hex::encode(bytes.as_ref())),
        Identity::DerAsn1Dn(_) => unreachable!("handled by caller"),
    }
}

fn fqdn_eq(a: &str, b: &str) -> bool {
    a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}

fn dn_eq_bytes(a: &[u8], b: &[u8], codec: &dyn DerCodec) -> bool {
    match (codec.decode(a), codec.decode(b)) {
        (Ok(da), Ok(db)) => dn::exact_equal(&da, &db) || dn::any_order_equal(&da, &db),
        _ => false,
    }
}

/// Equality used for reuse lookup (`same_id` in the source this crate was
/// extracted from). `None` is a universal wildcard on either side;
/// otherwise mismatched kinds never compare equal.
pub fn same(a: &Identity<'_>, b: &Identity<'_>, codec: &dyn DerCodec) -> bool {
    if matches!(a, Identity::None) || matches!(b, Identity::None) {
        return true;
    }
    match (a, b) {
        (Identity::Null, Identity::Null) => true,
        (Identity::FromCert, Identity::FromCert) => true,
        (Identity::Ipv4Addr(x), Identity::Ipv4Addr(y)) => x == y,
        (Identity::Ipv6Addr(x), Identity::Ipv6Addr(y)) => x == y,
        (Identity::Fqdn(x), Identity::Fqdn(y)) => fqdn_eq(x, y),
        (Identity::UserFqdn(x), Identity::UserFqdn(y)) => fqdn_eq(x, y),
        (Identity::DerAsn1Dn(x), Identity::DerAsn1Dn(y)) => dn_eq_bytes(x, y, codec),
        (Identity::KeyId(x), Identity::KeyId(y)) => x == y,
        _ => false,
    }
}

/// Wildcard-bounded match: `b` is the template/policy side. A `None`
/// template matches unconditionally with the maximal wildcard count.
/// Preserves the asymmetry of the original `match_id`: `a == None` is
/// *not* itself treated as a wildcard here (only `same` is symmetric).
pub fn match_wild(a: &Identity<'_>, b: &Identity<'_>, codec: &dyn DerCodec) -> (bool, usize) {
    if matches!(b, Identity::None) {
        return (true, MAX_WILDCARDS);
    }
    if std::mem::discriminant(a) != std::mem::discriminant(b) {
        return (false, 0);
    }
    if let (Identity::DerAsn1Dn(da), Identity::DerAsn1Dn(db)) = (a, b) {
        return match (codec.decode(da), codec.decode(db)) {
            (Ok(dna), Ok(dnb)) => dn::any_order_wild(&dna, &dnb),
            _ => (false, 0),
        };
    }
    (same(a, b, codec), 0)
}

/// Number of wildcard RDNs (`None` counts as [`MAX_WILDCARDS`]).
pub fn wildcard_count(id: &Identity<'_>, codec: &dyn DerCodec) -> usize {
    match id {
        Identity::None => MAX_WILDCARDS,
        Identity::DerAsn1Dn(der) => codec.decode(der).map(|dn| dn::count_wildcards(&dn)).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::der::RefDerCodec;

    fn p<'a>(s: &'a str) -> Identity<'a> {
        parse(s, false, &RefDerCodec).expect("parses")
    }

    #[test]
    fn parses_fromcert_none_null() {
        assert_eq!(p("%fromcert"), Identity::FromCert);
        assert_eq!(p("%none"), Identity::None);
        assert_eq!(p("%null"), Identity::Null);
    }

    #[test]
    fn parses_any_and_zero_address_as_none() {
        assert_eq!(p("%any"), Identity::None);
        assert_eq!(p("0.0.0.0"), Identity::None);
    }

    #[test]
    fn parses_ip_literals() {
        assert_eq!(p("192.0.2.1"), Identity::Ipv4Addr(Ipv4Addr::new(192, 0, 2, 1)));
        assert!(matches!(p("::1"), Identity::Ipv6Addr(_)));
    }

    #[test]
    fn parses_fqdn_and_keyid_and_userfqdn() {
        assert_eq!(p("@host.example.com"), Identity::Fqdn(Cow::Borrowed("host.example.com")));
        assert_eq!(p("alice@host.example.com"), Identity::UserFqdn(Cow::Borrowed("alice@host.example.com")));
        match p("@#0xDEADBEEF") {
            Identity::KeyId(bytes) => assert_eq!(bytes.as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]),
            other => panic!("expected KeyId, got {other:?}"),
        }
    }

    #[test]
    fn parses_bracketed_keyid_stripping_trailing_bracket() {
        match p("@[raw key material]") {
            Identity::KeyId(bytes) => assert_eq!(bytes.as_ref(), b"raw key material"),
            other => panic!("expected KeyId, got {other:?}"),
        }
    }

    #[test]
    fn parses_der_dn_from_ldap_string() {
        match p("CN=server,O=Acme") {
            Identity::DerAsn1Dn(der) => {
                let dn = RefDerCodec.decode(&der).expect("decodes");
                assert_eq!(dn::to_rfc4514(&dn), "CN=server,O=Acme");
            }
            other => panic!("expected DerAsn1Dn, got {other:?}"),
        }
    }

    #[test]
    fn keyid_render_round_trip() {
        let id = p("@#0xDEADBEEF");
        assert_eq!(render(&id, &RefDerCodec), "@#0xdeadbeef");
    }

    #[test]
    fn render_round_trip_for_textual_forms() {
        let codec = RefDerCodec;
        for text in ["@a.b", "192.0.2.1", "%any", "%none", "ID_NULL"] {
            let id = parse(text, false, &codec).expect("parses");
            let rendered = render(&id, &codec);
            let reparsed = parse(&rendered, false, &codec).expect("reparses");
            assert_eq!(id, reparsed);
        }
    }

    #[test]
    fn none_is_a_universal_wildcard_for_same() {
        let codec = RefDerCodec;
        let none = Identity::None;
        let ip = Identity::Ipv4Addr(Ipv4Addr::new(192, 0, 2, 1));
        assert!(same(&none, &ip, &codec));
        assert!(same(&ip, &none, &codec));
    }

    #[test]
    fn fqdn_same_ignores_case_and_trailing_dot() {
        let codec = RefDerCodec;
        let a = Identity::Fqdn(Cow::Borrowed("Host.Example."));
        let b = Identity::Fqdn(Cow::Borrowed("host.example"));
        assert!(same(&a, &b, &codec));
    }

    #[test]
    fn keyid_same_is_byte_exact() {
        let codec = RefDerCodec;
        let ab = Identity::KeyId(Cow::Owned(b"AB".to_vec()));
        let ab2 = Identity::KeyId(Cow::Owned(b"AB".to_vec()));
        let a_lower_b = Identity::KeyId(Cow::Owned(b"Ab".to_vec()));
        assert!(same(&ab, &ab2, &codec));
        assert!(!same(&ab, &a_lower_b, &codec));
    }

    #[test]
    fn match_wild_asymmetry_on_none_side() {
        let codec = RefDerCodec;
        let none = Identity::None;
        let ip = Identity::Ipv4Addr(Ipv4Addr::new(192, 0, 2, 1));
        // b == None: unconditional match.
        assert_eq!(match_wild(&ip, &none, &codec), (true, MAX_WILDCARDS));
        // a == None, b != None: kinds differ, no match (asymmetric).
        assert_eq!(match_wild(&none, &ip, &codec).0, false);
    }

    #[test]
    fn unshare_produces_owned_identity() {
        let buf = String::from("@host.example.com");
        let id = parse(&buf, false, &RefDerCodec).expect("parses");
        let owned: Identity<'static> = id.unshare();
        assert_eq!(owned, Identity::Fqdn(Cow::Owned("host.example.com".to_string())));
    }
}
