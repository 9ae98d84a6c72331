//! X.501 Distinguished Name model and comparison predicates.
//!
//! A [`Dn`] is an ordered sequence of [`Rdn`]s; each `Rdn` is an unordered
//! set of [`Ava`]s. Three predicates are exposed: [`exact_equal`],
//! [`any_order_equal`], and [`any_order_wild`]. All three are pure
//! functions over already-decoded `Dn` values — decoding raw DER is the
//! [`crate::der::DerCodec`] collaborator's job, not this module's.

use std::fmt;

use thiserror::Error;

use crate::der::DerCodec;

/// An attribute-type OID, stored as its arc sequence (e.g. `[2, 5, 4, 3]`
/// for `commonName`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(pub Vec<u32>);

/// An Attribute-Value Assertion: an attribute type paired with a string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub oid: Oid,
    pub value: String,
}

/// A Relative Distinguished Name: an unordered set of [`Ava`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn(pub Vec<Ava>);

/// A Distinguished Name: an ordered sequence of [`Rdn`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dn(pub Vec<Rdn>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnError {
    #[error("empty distinguished name")]
    Empty,
    #[error("unterminated quoted value in distinguished name")]
    UnterminatedQuote,
    #[error("attribute-value assertion missing '=': {0:?}")]
    MissingEquals(String),
    #[error("unknown attribute type: {0}")]
    UnknownAttributeType(String),
    #[error("dangling escape character at end of value")]
    DanglingEscape,
}

/// Short-name <-> OID table for the attribute types this crate's identity
/// grammar and tests exercise. Unlisted attribute types must be given in
/// numeric OID form (`1.2.3.4=value`), matching RFC 4514 §2.3.
const NAME_TABLE: &[(&str, &[u32])] = &[
    ("CN", &[2, 5, 4, 3]),
    ("SN", &[2, 5, 4, 4]),
    ("C", &[2, 5, 4, 6]),
    ("L", &[2, 5, 4, 7]),
    ("ST", &[2, 5, 4, 8]),
    ("STREET", &[2, 5, 4, 9]),
    ("O", &[2, 5, 4, 10]),
    ("OU", &[2, 5, 4, 11]),
    ("T", &[2, 5, 4, 12]),
    ("DC", &[0, 9, 2342, 19200300, 100, 1, 25]),
    ("UID", &[0, 9, 2342, 19200300, 100, 1, 1]),
    ("E", &[1, 2, 840, 113549, 1, 9, 1]),
];

fn name_for_oid(oid: &Oid) -> Option<&'static str> {
    NAME_TABLE
        .iter()
        .find(|(_, arcs)| *arcs == oid.0.as_slice())
        .map(|(name, _)| *name)
}

fn oid_for_name(name: &str) -> Option<Oid> {
    if name.chars().all(|c| c.is_ascii_digit() || c == '.') && name.contains('.') {
        let arcs: Option<Vec<u32>> = name.split('.').map(|p| p.parse().ok()).collect();
        return arcs.map(Oid);
    }
    NAME_TABLE
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, arcs)| Oid(arcs.to_vec()))
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arcs: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", arcs.join("."))
    }
}

/// Renders a [`Dn`] as an RFC 4514 LDAP string, most-significant RDN first.
pub fn to_rfc4514(dn: &Dn) -> String {
    dn.0.iter()
        .map(render_rdn)
        .collect::<Vec<_>>()
        .join(",")
}

fn render_rdn(rdn: &Rdn) -> String {
    rdn.0
        .iter()
        .map(render_ava)
        .collect::<Vec<_>>()
        .join("+")
}

fn render_ava(ava: &Ava) -> String {
    let name = name_for_oid(&ava.oid)
        .map(str::to_string)
        .unwrap_or_else(|| ava.oid.to_string());
    format!("{}={}", name, escape_value(&ava.value))
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        let leading_space = i == 0 && c == ' ';
        let trailing_space = i == chars.len() - 1 && c == ' ';
        let leading_hash = i == 0 && c == '#';
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || leading_space
            || trailing_space
            || leading_hash
        {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Parses an RFC 4514 LDAP string into a [`Dn`], most-significant RDN first.
pub fn from_rfc4514(text: &str) -> Result<Dn, DnError> {
    if text.is_empty() {
        return Ok(Dn(Vec::new()));
    }
    let rdn_texts = split_unescaped(text, ',')?;
    let mut rdns = Vec::with_capacity(rdn_texts.len());
    for rdn_text in rdn_texts {
        let ava_texts = split_unescaped(&rdn_text, '+')?;
        let mut avas = Vec::with_capacity(ava_texts.len());
        for ava_text in ava_texts {
            avas.push(parse_ava(&ava_text)?);
        }
        rdns.push(Rdn(avas));
    }
    Ok(Dn(rdns))
}

fn parse_ava(text: &str) -> Result<Ava, DnError> {
    let idx = find_unescaped_eq(text).ok_or_else(|| DnError::MissingEquals(text.to_string()))?;
    let (name, raw_value) = (text[..idx].trim(), &text[idx + 1..]);
    let oid = oid_for_name(name).ok_or_else(|| DnError::UnknownAttributeType(name.to_string()))?;
    let value = unescape_value(raw_value)?;
    Ok(Ava { oid, value })
}

fn find_unescaped_eq(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut in_quotes = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'"' => in_quotes = !in_quotes,
            b'=' if !in_quotes => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits `text` at top-level occurrences of `delim`, honoring backslash
/// escapes and double-quoted spans so that e.g. `CN=Smith\, J.` is not
/// split on the escaped comma.
fn split_unescaped(text: &str, delim: char) -> Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                match chars.next() {
                    Some(next) => current.push(next),
                    None => return Err(DnError::DanglingEscape),
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c == delim && !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(DnError::UnterminatedQuote);
    }
    parts.push(current);
    Ok(parts)
}

fn unescape_value(raw: &str) -> Result<String, DnError> {
    let trimmed = raw.trim();
    let inner = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err(DnError::DanglingEscape),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Normalizes an AVA value the way the comparator's "ASN.1 string
/// comparator" is specified to: case-fold and collapse internal
/// whitespace, matching the caseIgnoreMatch-flavored rule used by real
/// directory comparators for the string AVA types this crate handles.
fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

const WILDCARD_VALUE: &str = "*";

/// Matches a single RDN of `b` against an RDN of `a`: every AVA of `b`
/// must find a same-OID AVA in `a` that either compares equal or is a
/// wildcard (`b`'s value is exactly `*`). Matching is existential, not a
/// bijection — a single AVA of `a` may satisfy more than one AVA of `b`.
fn rdn_match(a: &Rdn, b: &Rdn, mut wildcards: Option<&mut usize>) -> bool {
    if b.0.is_empty() {
        return false;
    }
    let mut matched = 0;
    for b_ava in &b.0 {
        let hit = a.0.iter().any(|a_ava| {
            if a_ava.oid != b_ava.oid {
                return false;
            }
            if b_ava.value == WILDCARD_VALUE {
                if let Some(w) = wildcards.as_deref_mut() {
                    *w += 1;
                }
                true
            } else {
                normalize(&a_ava.value) == normalize(&b_ava.value)
            }
        });
        if hit {
            matched += 1;
        }
    }
    matched > 0 && matched == b.0.len()
}

/// Symmetric set equality of two RDNs under raw (case-sensitive) value
/// comparison, used by [`exact_equal`]: same cardinality and every AVA of
/// each side has an exact counterpart in the other.
fn rdn_set_eq_raw(a: &Rdn, b: &Rdn) -> bool {
    if a.0.len() != b.0.len() {
        return false;
    }
    let side_covers = |xs: &[Ava], ys: &[Ava]| {
        xs.iter()
            .all(|x| ys.iter().any(|y| x.oid == y.oid && x.value == y.value))
    };
    side_covers(&a.0, &b.0) && side_covers(&b.0, &a.0)
}

/// Symmetric set equality of two RDNs under the normalized string
/// comparator, used by [`any_order_equal`].
fn rdn_set_eq_normalized(a: &Rdn, b: &Rdn) -> bool {
    if a.0.len() != b.0.len() {
        return false;
    }
    let side_covers = |xs: &[Ava], ys: &[Ava]| {
        xs.iter()
            .all(|x| ys.iter().any(|y| x.oid == y.oid && normalize(&x.value) == normalize(&y.value)))
    };
    side_covers(&a.0, &b.0) && side_covers(&b.0, &a.0)
}

/// Predicate 1: byte/semantic equality of the two DER encodings as
/// interpreted by the ASN.1 decoder — an ordered RDN sequence, each RDN
/// matched as a set.
pub fn exact_equal(a: &Dn, b: &Dn) -> bool {
    a.0.len() == b.0.len()
        && a.0.iter().zip(b.0.iter()).all(|(ra, rb)| rdn_set_eq_raw(ra, rb))
}

/// Predicate 2: if exact equality fails, re-encode both DNs to RFC 4514
/// strings, re-parse, and test that every RDN in `b` has a matching RDN
/// in `a` (same AVA set) with both sides having the same RDN count.
///
/// Re-parse failure of either side's RFC 4514 form is a legitimate
/// non-match, not an error (§7).
pub fn any_order_equal(a: &Dn, b: &Dn) -> bool {
    let (ra, rb) = match reparsed(a, b) {
        Some(pair) => pair,
        None => return false,
    };
    ra.0.len() == rb.0.len()
        && rb
            .0
            .iter()
            .all(|rdn_b| ra.0.iter().any(|rdn_a| rdn_set_eq_normalized(rdn_a, rdn_b)))
}

/// Predicate 3: same as [`any_order_equal`], but AVA matching tolerates a
/// wildcard value (`*`) on `b`'s side, incrementing the returned wildcard
/// count for each wildcard AVA consumed.
pub fn any_order_wild(a: &Dn, b: &Dn) -> (bool, usize) {
    let (ra, rb) = match reparsed(a, b) {
        Some(pair) => pair,
        None => return (false, 0),
    };
    if ra.0.len() != rb.0.len() {
        return (false, 0);
    }
    let mut wildcards = 0;
    let all_matched = rb.0.iter().all(|rdn_b| {
        ra.0
            .iter()
            .any(|rdn_a| rdn_match(rdn_a, rdn_b, Some(&mut wildcards)))
    });
    (all_matched, if all_matched { wildcards } else { 0 })
}

fn reparsed(a: &Dn, b: &Dn) -> Option<(Dn, Dn)> {
    let ra = from_rfc4514(&to_rfc4514(a)).ok()?;
    let rb = from_rfc4514(&to_rfc4514(b)).ok()?;
    Some((ra, rb))
}

/// Counts RDNs whose sole AVA value is exactly `*`.
pub fn count_wildcards(dn: &Dn) -> usize {
    dn.0.iter()
        .filter(|rdn| rdn.0.len() == 1 && rdn.0[0].value == WILDCARD_VALUE)
        .count()
}

/// Convenience: decode DER bytes and re-encode via `codec`, used by the
/// `DerAsn1Dn` identity variant's parser and renderer.
pub fn der_to_rfc4514(der: &[u8], codec: &dyn DerCodec) -> Result<String, crate::der::Asn1Error> {
    let dn = codec.decode(der)?;
    Ok(to_rfc4514(&dn))
}

/// Convenience: parse an RFC 4514 string and encode via `codec`, used by
/// the identity parser's `=`-triggered `DerAsn1Dn` branch.
pub fn rfc4514_to_der(text: &str, codec: &dyn DerCodec) -> Result<Vec<u8>, DnError> {
    let dn = from_rfc4514(text)?;
    Ok(codec.encode(&dn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::der::RefDerCodec;

    fn dn_from(text: &str) -> Dn {
        from_rfc4514(text).expect("valid rfc4514")
    }

    #[test]
    fn any_order_equal_ignores_rdn_order() {
        let a = dn_from("CN=server,O=Acme");
        let b = dn_from("O=Acme,CN=server");
        assert!(!exact_equal(&a, &b));
        assert!(any_order_equal(&a, &b));
    }

    #[test]
    fn exact_equal_is_order_sensitive() {
        let a = dn_from("CN=server,O=Acme");
        let b = dn_from("CN=server,O=Acme");
        assert!(exact_equal(&a, &b));
    }

    #[test]
    fn wildcard_counting_single_wildcard() {
        let a = dn_from("CN=alice,O=Acme");
        let b = dn_from("CN=*,O=Acme");
        let (matched, wildcards) = any_order_wild(&a, &b);
        assert!(matched);
        assert_eq!(wildcards, 1);
    }

    #[test]
    fn wildcard_counting_two_wildcards() {
        let a = dn_from("CN=a,O=b");
        let b = dn_from("CN=*,O=*");
        let (matched, wildcards) = any_order_wild(&a, &b);
        assert!(matched);
        assert_eq!(wildcards, 2);
    }

    #[test]
    fn any_order_equal_is_case_and_whitespace_insensitive() {
        let a = dn_from("CN=Server,O=Acme   Inc");
        let b = dn_from("cn=server,o=acme inc");
        assert!(any_order_equal(&a, &b));
    }

    #[test]
    fn der_round_trip_matches_rfc4514_round_trip() {
        let codec = RefDerCodec;
        let dn = dn_from("CN=server,O=Acme");
        let der = codec.encode(&dn);
        let back = codec.decode(&der).expect("decodes");
        assert_eq!(dn, back);
    }

    #[test]
    fn unknown_attribute_type_is_a_parse_error() {
        assert_eq!(
            from_rfc4514("XX=server"),
            Err(DnError::UnknownAttributeType("XX".to_string()))
        );
    }

    #[test]
    fn multi_valued_rdn_parses_with_plus() {
        let dn = dn_from("CN=server+OU=eng,O=Acme");
        assert_eq!(dn.0[0].0.len(), 2);
    }

    #[test]
    fn escaped_comma_in_value_is_not_a_separator() {
        let dn = dn_from(r#"CN=Smith\, J.,O=Acme"#);
        assert_eq!(dn.0.len(), 2);
        assert_eq!(dn.0[0].0[0].value, "Smith, J.");
    }
}
