//! Minimal DER codec for X.501 `Name` (`RDNSequence`), plus the `DerCodec`
//! trait that treats the ASN.1 decoder as an external collaborator.
//!
//! The comparator in [`crate::dn`] never touches bytes directly; it only
//! ever sees the [`Dn`](crate::dn::Dn) structure a `DerCodec` hands back.
//! [`RefDerCodec`] is a reference implementation, adequate for the
//! `PrintableString`/`UTF8String`/`IA5String` attribute values this crate's
//! tests exercise, in the same spirit as `ike-addresspool`'s in-memory
//! registry standing in for a persistent one.

use thiserror::Error;

use crate::dn::{Ava, Dn, Oid, Rdn};

const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_OID: u8 = 0x06;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_UTF8_STRING: u8 = 0x0C;
const TAG_IA5_STRING: u8 = 0x16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Asn1Error {
    #[error("unexpected end of DER input")]
    Truncated,
    #[error("unsupported DER tag 0x{0:02x}")]
    UnsupportedTag(u8),
    #[error("malformed DER length")]
    BadLength,
    #[error("trailing bytes after DER value")]
    TrailingBytes,
    #[error("empty OID encoding")]
    EmptyOid,
}

/// Given a DER-encoded DN, produce the ordered RDN sequence; and the inverse.
///
/// This is the trait boundary for the "X.509/ASN.1 decoder" collaborator
/// that the comparator design treats as an oracle. Production deployments
/// may implement this against a certified X.509 library; [`RefDerCodec`]
/// is the reference implementation used by this crate's own tests.
pub trait DerCodec {
    fn decode(&self, der: &[u8]) -> Result<Dn, Asn1Error>;
    fn encode(&self, dn: &Dn) -> Vec<u8>;
}

/// Reference [`DerCodec`]: a small hand-rolled DER reader/writer covering
/// the attribute-value string types this crate needs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefDerCodec;

impl DerCodec for RefDerCodec {
    fn decode(&self, der: &[u8]) -> Result<Dn, Asn1Error> {
        decode_dn(der)
    }

    fn encode(&self, dn: &Dn) -> Vec<u8> {
        encode_dn(dn)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_u8(&mut self) -> Result<u8, Asn1Error> {
        let b = *self.buf.get(self.pos).ok_or(Asn1Error::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_len(&mut self) -> Result<usize, Asn1Error> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 4 {
            return Err(Asn1Error::BadLength);
        }
        let mut len: usize = 0;
        for _ in 0..n {
            len = (len << 8) | self.read_u8()? as usize;
        }
        Ok(len)
    }

    /// Reads a tag+length+value triple, returning the tag and the value slice.
    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), Asn1Error> {
        let tag = self.read_u8()?;
        let len = self.read_len()?;
        let start = self.pos;
        let end = start.checked_add(len).ok_or(Asn1Error::BadLength)?;
        if end > self.buf.len() {
            return Err(Asn1Error::Truncated);
        }
        self.pos = end;
        Ok((tag, &self.buf[start..end]))
    }
}

fn decode_oid(bytes: &[u8]) -> Result<Oid, Asn1Error> {
    if bytes.is_empty() {
        return Err(Asn1Error::EmptyOid);
    }
    let mut arcs = Vec::new();
    let first = bytes[0] as u32;
    arcs.push(first / 40);
    arcs.push(first % 40);
    let mut value: u32 = 0;
    for &b in &bytes[1..] {
        value = (value << 7) | (b & 0x7f) as u32;
        if b & 0x80 == 0 {
            arcs.push(value);
            value = 0;
        }
    }
    Ok(Oid(arcs))
}

fn encode_oid(oid: &Oid) -> Vec<u8> {
    let arcs = &oid.0;
    let mut out = Vec::new();
    if arcs.len() >= 2 {
        out.push((arcs[0] * 40 + arcs[1]) as u8);
    } else if arcs.len() == 1 {
        out.push((arcs[0] * 40) as u8);
    }
    for &arc in arcs.iter().skip(2) {
        out.extend(encode_base128(arc));
    }
    out
}

fn encode_base128(mut value: u32) -> Vec<u8> {
    let mut chunks = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        chunks.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    chunks.reverse();
    chunks
}

fn decode_string_value(tag: u8, bytes: &[u8]) -> Result<String, Asn1Error> {
    match tag {
        TAG_PRINTABLE_STRING | TAG_UTF8_STRING | TAG_IA5_STRING => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        other => Err(Asn1Error::UnsupportedTag(other)),
    }
}

fn encode_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_len(value.len()));
    out.extend_from_slice(value);
    out
}

fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let mut bytes = Vec::new();
        let mut n = len;
        while n > 0 {
            bytes.push((n & 0xff) as u8);
            n >>= 8;
        }
        bytes.reverse();
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }
}

fn decode_ava(bytes: &[u8]) -> Result<Ava, Asn1Error> {
    let mut r = Reader::new(bytes);
    let (oid_tag, oid_bytes) = r.read_tlv()?;
    if oid_tag != TAG_OID {
        return Err(Asn1Error::UnsupportedTag(oid_tag));
    }
    let oid = decode_oid(oid_bytes)?;
    let (val_tag, val_bytes) = r.read_tlv()?;
    let value = decode_string_value(val_tag, val_bytes)?;
    if !r.is_empty() {
        return Err(Asn1Error::TrailingBytes);
    }
    Ok(Ava { oid, value })
}

fn encode_ava(ava: &Ava) -> Vec<u8> {
    let oid_tlv = encode_tlv(TAG_OID, &encode_oid(&ava.oid));
    let val_tlv = encode_tlv(TAG_UTF8_STRING, ava.value.as_bytes());
    let mut inner = oid_tlv;
    inner.extend(val_tlv);
    encode_tlv(TAG_SEQUENCE, &inner)
}

fn decode_rdn(bytes: &[u8]) -> Result<Rdn, Asn1Error> {
    let mut r = Reader::new(bytes);
    let mut avas = Vec::new();
    while !r.is_empty() {
        let (tag, value) = r.read_tlv()?;
        if tag != TAG_SEQUENCE {
            return Err(Asn1Error::UnsupportedTag(tag));
        }
        avas.push(decode_ava(value)?);
    }
    Ok(Rdn(avas))
}

fn encode_rdn(rdn: &Rdn) -> Vec<u8> {
    let mut inner = Vec::new();
    for ava in &rdn.0 {
        inner.extend(encode_ava(ava));
    }
    encode_tlv(TAG_SET, &inner)
}

/// Decodes a DER `Name` (`RDNSequence`) into the crate's [`Dn`] model.
pub fn decode_dn(der: &[u8]) -> Result<Dn, Asn1Error> {
    let mut outer = Reader::new(der);
    let (tag, body) = outer.read_tlv()?;
    if tag != TAG_SEQUENCE {
        return Err(Asn1Error::UnsupportedTag(tag));
    }
    if !outer.is_empty() {
        return Err(Asn1Error::TrailingBytes);
    }
    let mut r = Reader::new(body);
    let mut rdns = Vec::new();
    while !r.is_empty() {
        let (tag, value) = r.read_tlv()?;
        if tag != TAG_SET {
            return Err(Asn1Error::UnsupportedTag(tag));
        }
        rdns.push(decode_rdn(value)?);
    }
    let _ = r.remaining();
    Ok(Dn(rdns))
}

/// Encodes a [`Dn`] as a DER `Name` (`RDNSequence`).
pub fn encode_dn(dn: &Dn) -> Vec<u8> {
    let mut inner = Vec::new();
    for rdn in &dn.0 {
        inner.extend(encode_rdn(rdn));
    }
    encode_tlv(TAG_SEQUENCE, &inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::{Ava, Oid, Rdn};

    #[test]
    fn round_trips_a_two_rdn_dn() {
        let dn = Dn(vec![
            Rdn(vec![Ava {
                oid: Oid(vec![2, 5, 4, 3]),
                value: "server".into(),
            }]),
            Rdn(vec![Ava {
                oid: Oid(vec![2, 5, 4, 10]),
                value: "Acme".into(),
            }]),
        ]);
        let der = encode_dn(&dn);
        let back = decode_dn(&der).expect("decodes");
        assert_eq!(back, dn);
    }

    #[test]
    fn rejects_truncated_input() {
        let dn = Dn(vec![Rdn(vec![Ava {
            oid: Oid(vec![2, 5, 4, 3]),
            value: "server".into(),
        }])]);
        let der = encode_dn(&dn);
        let truncated = &der[..der.len() - 1];
        assert!(decode_dn(truncated).is_err());
    }

    #[test]
    fn multi_valued_rdn_round_trips() {
        let dn = Dn(vec![Rdn(vec![
            Ava {
                oid: Oid(vec![2, 5, 4, 3]),
                value: "server".into(),
            },
            Ava {
                oid: Oid(vec![2, 5, 4, 11]),
                value: "eng".into(),
            },
        ])]);
        let der = encode_dn(&dn);
        let back = decode_dn(&der).expect("decodes");
        assert_eq!(back, dn);
    }
}
