//! Canonical CBOR writer.

use crate::document::Document;
use crate::value::Value;
use std::cmp::Ordering;

/// CBOR tag marking a 16-byte object id byte string.
pub const OBJECT_ID_TAG: u64 = 37;

/// CBOR major types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Major {
    Unsigned,
    Negative,
    Bytes,
    Text,
    Array,
    Map,
    Tag,
    Simple,
}

impl Major {
    pub(crate) const fn bits(self) -> u8 {
        match self {
            Self::Unsigned => 0,
            Self::Negative => 1,
            Self::Bytes => 2,
            Self::Text => 3,
            Self::Array => 4,
            Self::Map => 5,
            Self::Tag => 6,
            Self::Simple => 7,
        }
    }

    pub(crate) const fn from_initial(byte: u8) -> Self {
        match byte >> 5 {
            0 => Self::Unsigned,
            1 => Self::Negative,
            2 => Self::Bytes,
            3 => Self::Text,
            4 => Self::Array,
            5 => Self::Map,
            6 => Self::Tag,
            _ => Self::Simple,
        }
    }
}

pub(crate) const SIMPLE_FALSE: u8 = 20;
pub(crate) const SIMPLE_TRUE: u8 = 21;
pub(crate) const SIMPLE_NULL: u8 = 22;
pub(crate) const FLOAT64: u8 = 27;

/// The one NaN bit pattern written and accepted: positive quiet NaN with an
/// empty payload.
pub(crate) const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// Encodes a value as canonical CBOR.
///
/// Output is deterministic: integers and lengths take their shortest form,
/// floats are always 64-bit with every NaN folded to one bit pattern, and
/// document entries are ordered by their encoded key (shorter first, then
/// bytewise). Two equal documents encode to the same bytes whatever their
/// field order.
#[must_use]
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

/// Encodes a document as a canonical CBOR map.
#[must_use]
pub fn document_to_canonical_cbor(document: &Document) -> Vec<u8> {
    let mut out = Vec::new();
    write_document(&mut out, document);
    out
}

/// Compares encoded map keys in canonical order.
pub(crate) fn canonical_key_order(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[allow(clippy::cast_possible_truncation)]
fn write_head(out: &mut Vec<u8>, major: Major, argument: u64) {
    let high = major.bits() << 5;
    match argument {
        0..=23 => out.push(high | argument as u8),
        24..=0xff => {
            out.push(high | 24);
            out.push(argument as u8);
        }
        0x100..=0xffff => {
            out.push(high | 25);
            out.extend_from_slice(&(argument as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(high | 26);
            out.extend_from_slice(&(argument as u32).to_be_bytes());
        }
        _ => {
            out.push(high | 27);
            out.extend_from_slice(&argument.to_be_bytes());
        }
    }
}

fn write_len(out: &mut Vec<u8>, major: Major, len: usize) {
    write_head(out, major, len as u64);
}

fn write_text(out: &mut Vec<u8>, text: &str) {
    write_len(out, Major::Text, text.len());
    out.extend_from_slice(text.as_bytes());
}

#[allow(clippy::cast_sign_loss)]
fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(Major::Simple.bits() << 5 | SIMPLE_NULL),
        Value::Bool(false) => out.push(Major::Simple.bits() << 5 | SIMPLE_FALSE),
        Value::Bool(true) => out.push(Major::Simple.bits() << 5 | SIMPLE_TRUE),
        // A negative n is written as -1 - n, which `!n` computes without overflow.
        Value::Integer(n) if *n < 0 => write_head(out, Major::Negative, !*n as u64),
        Value::Integer(n) => write_head(out, Major::Unsigned, *n as u64),
        Value::Float(f) => {
            let bits = if f.is_nan() { CANONICAL_NAN } else { f.to_bits() };
            out.push(Major::Simple.bits() << 5 | FLOAT64);
            out.extend_from_slice(&bits.to_be_bytes());
        }
        Value::Text(s) => write_text(out, s),
        Value::Bytes(b) => {
            write_len(out, Major::Bytes, b.len());
            out.extend_from_slice(b);
        }
        Value::ObjectId(id) => {
            write_head(out, Major::Tag, OBJECT_ID_TAG);
            write_len(out, Major::Bytes, id.as_bytes().len());
            out.extend_from_slice(id.as_bytes());
        }
        Value::Array(items) => {
            write_len(out, Major::Array, items.len());
            for item in items {
                write_value(out, item);
            }
        }
        Value::Document(doc) => write_document(out, doc),
    }
}

fn write_document(out: &mut Vec<u8>, document: &Document) {
    let mut entries: Vec<(Vec<u8>, &Value)> = document
        .iter()
        .map(|(key, value)| {
            let mut encoded = Vec::with_capacity(key.len() + 1);
            write_text(&mut encoded, key);
            (encoded, value)
        })
        .collect();
    entries.sort_by(|a, b| canonical_key_order(&a.0, &b.0));

    write_len(out, Major::Map, entries.len());
    for (key, value) in entries {
        out.extend_from_slice(&key);
        write_value(out, value);
    }
}
