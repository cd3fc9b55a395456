//! Canonical CBOR reader.
//!
//! Accepts exactly what the writer produces. Anything else (short floats,
//! indefinite lengths, over-long integers, unsorted keys) is rejected so a
//! value has one byte representation.

use crate::document::Document;
use crate::encoder::{
    canonical_key_order, Major, CANONICAL_NAN, FLOAT64, OBJECT_ID_TAG, SIMPLE_FALSE, SIMPLE_NULL,
    SIMPLE_TRUE,
};
use crate::error::{CodecError, CodecResult};
use crate::object_id::ObjectId;
use crate::value::Value;
use std::cmp::Ordering;

/// Largest element count accepted for arrays and maps.
const MAX_ITEMS: u64 = 1 << 24;

/// Largest byte length accepted for strings.
const MAX_LENGTH: u64 = 1 << 28;

/// Deepest nesting of arrays and maps accepted.
const MAX_DEPTH: usize = 512;

/// Decodes one canonical CBOR value.
///
/// # Errors
///
/// Returns an error if the input is not exactly one canonical value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut reader = Reader { input: bytes };
    let value = reader.value(0)?;
    if !reader.input.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: reader.input.len(),
        });
    }
    Ok(value)
}

/// Decodes one canonical CBOR value that must be a document.
///
/// # Errors
///
/// As [`from_cbor`], plus [`CodecError::NotADocument`] for other values.
pub fn document_from_cbor(bytes: &[u8]) -> CodecResult<Document> {
    match from_cbor(bytes)? {
        Value::Document(document) => Ok(document),
        other => Err(CodecError::NotADocument {
            found: other.type_name(),
        }),
    }
}

struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.input.len() < len {
            return Err(CodecError::Truncated);
        }
        let (head, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn initial(&mut self) -> CodecResult<(Major, u8)> {
        let byte = self.take(1)?[0];
        Ok((Major::from_initial(byte), byte & 0x1f))
    }

    /// Reads the argument following an initial byte, insisting on the
    /// shortest form.
    fn argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, floor) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.take(1)?[0]), 24),
            25 => (u64::from(u16::from_be_bytes(self.take_array()?)), 0x100),
            26 => (u64::from(u32::from_be_bytes(self.take_array()?)), 0x1_0000),
            27 => (u64::from_be_bytes(self.take_array()?), 0x1_0000_0000),
            31 => {
                return Err(CodecError::NotCanonical {
                    rule: "indefinite lengths are not allowed",
                })
            }
            _ => return Err(CodecError::malformed(format!("reserved additional info {info}"))),
        };
        if value < floor {
            return Err(CodecError::NotCanonical {
                rule: "arguments use the shortest form",
            });
        }
        Ok(value)
    }

    fn length(&mut self, info: u8, limit: u64) -> CodecResult<usize> {
        let claimed = self.argument(info)?;
        if claimed > limit {
            return Err(CodecError::TooLarge { claimed, limit });
        }
        usize::try_from(claimed).map_err(|_| CodecError::TooLarge { claimed, limit })
    }

    fn text(&mut self, info: u8) -> CodecResult<String> {
        let len = self.length(info, MAX_LENGTH)?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::malformed("text is not UTF-8"))
    }

    fn value(&mut self, depth: usize) -> CodecResult<Value> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooLarge {
                claimed: depth as u64,
                limit: MAX_DEPTH as u64,
            });
        }
        let (major, info) = self.initial()?;
        match major {
            Major::Unsigned => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            Major::Negative => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(!n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            Major::Bytes => {
                let len = self.length(info, MAX_LENGTH)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            Major::Text => self.text(info).map(Value::Text),
            Major::Array => {
                let len = self.length(info, MAX_ITEMS)?;
                let mut items = Vec::with_capacity(len.min(256));
                for _ in 0..len {
                    items.push(self.value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            Major::Map => self.document(info, depth).map(Value::Document),
            Major::Tag => self.tagged(info),
            Major::Simple => self.simple(info),
        }
    }

    fn document(&mut self, info: u8, depth: usize) -> CodecResult<Document> {
        let len = self.length(info, MAX_ITEMS)?;
        let mut document = Document::with_capacity(len.min(256));
        let mut previous: Option<&'a [u8]> = None;

        for _ in 0..len {
            let before = self.input;
            let (major, key_info) = self.initial()?;
            if major != Major::Text {
                return Err(CodecError::unsupported("non-text map key"));
            }
            let key = self.text(key_info)?;
            let encoded_key = &before[..before.len() - self.input.len()];

            if previous.is_some_and(|prev| canonical_key_order(prev, encoded_key) != Ordering::Less) {
                return Err(CodecError::NotCanonical {
                    rule: "map keys are unique and sorted",
                });
            }
            previous = Some(encoded_key);

            let value = self.value(depth + 1)?;
            document.insert(key, value);
        }
        Ok(document)
    }

    fn tagged(&mut self, info: u8) -> CodecResult<Value> {
        let tag = self.argument(info)?;
        if tag != OBJECT_ID_TAG {
            return Err(CodecError::unsupported(format!("tag {tag}")));
        }
        let (major, inner) = self.initial()?;
        if major != Major::Bytes {
            return Err(CodecError::malformed("object id must be a byte string"));
        }
        let len = self.length(inner, MAX_LENGTH)?;
        ObjectId::from_slice(self.take(len)?)
            .map(Value::ObjectId)
            .ok_or_else(|| CodecError::malformed("object id must be 16 bytes"))
    }

    fn simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            SIMPLE_FALSE => Ok(Value::Bool(false)),
            SIMPLE_TRUE => Ok(Value::Bool(true)),
            SIMPLE_NULL => Ok(Value::Null),
            FLOAT64 => {
                let bits = u64::from_be_bytes(self.take_array()?);
                let f = f64::from_bits(bits);
                if f.is_nan() && bits != CANONICAL_NAN {
                    return Err(CodecError::NotCanonical {
                        rule: "NaN is the positive quiet NaN",
                    });
                }
                Ok(Value::Float(f))
            }
            25 | 26 => Err(CodecError::NotCanonical {
                rule: "floats are 64-bit",
            }),
            31 => Err(CodecError::malformed("break outside an indefinite item")),
            other => Err(CodecError::unsupported(format!("simple value {other}"))),
        }
    }
}
