//! Security context values and their per-context codecs.
//!
//! A security context value is a single parameter or result. Values are
//! complicated by the fact that they can be defined by multiple actors: some
//! come from node policy, some from a received security block, and some are
//! generated while processing a block. A value's `(context id, kind, id)`
//! triple uniquely identifies its semantic meaning system-wide; the id alone
//! is meaningful only within the owning security context.

use crate::error::{SecError, SecResult};
use crate::helpers::{hex_nibble, hexify};
use serde_cbor::Value;

pub type ScValueId = u32;

/// Whether a value is a security parameter or a security result.
///
/// This distinction matters because value ids may be reused across the two
/// kinds within one security context: a context can define parameter 1 and
/// result 1 with different meanings, but never two parameters with id 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScValueKind {
    Parm,
    Result,
}

/// Where the raw bytes of a value physically live.
///
/// Purely descriptive; the semantic meaning of a value never depends on its
/// storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScValueLoc {
    /// Heap-allocated, owned by whoever holds the value.
    Local,
    /// Resident in the node-wide policy store, shared between processing
    /// episodes.
    SharedPolicy,
    /// Materialized from (or destined for) the persistent object store.
    ObjectStore,
}

/// One security context parameter or result instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScValue {
    pub kind: ScValueKind,
    pub loc: ScValueLoc,
    pub id: ScValueId,
    pub raw: Vec<u8>,
}

impl ScValue {
    pub fn new(kind: ScValueKind, id: ScValueId, raw: Vec<u8>) -> ScValue {
        ScValue {
            kind,
            loc: ScValueLoc::Local,
            id,
            raw,
        }
    }

    /// Integer-valued entries keep their value as 8 big-endian bytes.
    pub fn from_u64(kind: ScValueKind, id: ScValueId, value: u64) -> ScValue {
        ScValue::new(kind, id, value.to_be_bytes().to_vec())
    }

    pub fn as_u64(&self) -> Option<u64> {
        if self.raw.len() == 8 {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&self.raw);
            Some(u64::from_be_bytes(buf))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Release the owned buffer. Dropping a value does the same; this exists
    /// for callers that keep the structure alive across re-initialization.
    pub fn clear(&mut self) {
        self.raw = Vec::new();
    }
}

/// Linear scan over a value list; the first match wins. Uniqueness is not
/// enforced here, that is the job of callers such as the multiplicity check.
pub fn find(list: &[ScValue], id: ScValueId, kind: ScValueKind) -> Option<&ScValue> {
    list.iter().find(|v| v.id == id && v.kind == kind)
}

/// String/CBOR representation of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodec {
    /// UTF-8 string, e.g. a key name.
    Str,
    /// Raw bytes written as hex text, CBOR byte string on the wire.
    Hex,
    /// Unsigned integer, CBOR unsigned integer on the wire.
    Int,
}

/// Static descriptor binding a human-readable name to a `(id, kind)` pair
/// and the codec used to process it. Each security context exposes one map
/// covering all of its parameters and results; entries without a wire form
/// (`wire == false`) exist only in policy configuration and are never
/// carried in a security block.
#[derive(Debug, Clone, Copy)]
pub struct ScValueMapEntry {
    pub name: &'static str,
    pub id: ScValueId,
    pub kind: ScValueKind,
    pub codec: ValueCodec,
    pub wire: bool,
}

pub fn by_name<'a>(map: &'a [ScValueMapEntry], name: &str) -> Option<&'a ScValueMapEntry> {
    map.iter().find(|e| e.name == name)
}

pub fn by_id(map: &[ScValueMapEntry], id: ScValueId, kind: ScValueKind) -> Option<&ScValueMapEntry> {
    map.iter().find(|e| e.id == id && e.kind == kind)
}

/// Name of a value id within a map, for diagnostics.
pub fn name_of(map: &[ScValueMapEntry], id: ScValueId, kind: ScValueKind) -> &'static str {
    by_id(map, id, kind).map(|e| e.name).unwrap_or("?")
}

impl ScValueMapEntry {
    /// Parse the textual form of this value, e.g. from a policy
    /// configuration file.
    pub fn decode_str(&self, text: &str) -> SecResult<ScValue> {
        match self.codec {
            ValueCodec::Str => Ok(ScValue::new(self.kind, self.id, text.as_bytes().to_vec())),
            ValueCodec::Int => {
                let v: u64 = text
                    .parse()
                    .map_err(|_| SecError::Decode(format!("bad integer `{}`", text)))?;
                Ok(ScValue::from_u64(self.kind, self.id, v))
            }
            ValueCodec::Hex => Ok(ScValue::new(self.kind, self.id, hex_decode(text)?)),
        }
    }

    /// Textual form of this value; hex output is lowercase.
    pub fn encode_str(&self, val: &ScValue) -> String {
        match self.codec {
            ValueCodec::Str => String::from_utf8_lossy(&val.raw).into_owned(),
            ValueCodec::Int => val.as_u64().map(|v| v.to_string()).unwrap_or_default(),
            ValueCodec::Hex => hexify(&val.raw),
        }
    }

    /// Wire form of this value. The encoding must match the cipher-suite
    /// expected representation bit-for-bit, since this is what crosses the
    /// network inside a security block.
    pub fn cbor_encode(&self, val: &ScValue) -> SecResult<Value> {
        if !self.wire {
            return Err(SecError::UnknownValue(format!(
                "`{}` has no wire representation",
                self.name
            )));
        }
        match self.codec {
            ValueCodec::Str => Ok(Value::Text(
                String::from_utf8(val.raw.clone())
                    .map_err(|e| SecError::Decode(e.to_string()))?,
            )),
            ValueCodec::Int => {
                let v = val
                    .as_u64()
                    .ok_or_else(|| SecError::Decode("integer value malformed".to_string()))?;
                Ok(Value::Integer(v as i128))
            }
            ValueCodec::Hex => Ok(Value::Bytes(val.raw.clone())),
        }
    }

    /// Build a value from its wire form.
    pub fn cbor_decode(&self, value: &Value) -> SecResult<ScValue> {
        if !self.wire {
            return Err(SecError::UnknownValue(format!(
                "`{}` has no wire representation",
                self.name
            )));
        }
        match (self.codec, value) {
            (ValueCodec::Str, Value::Text(s)) => {
                Ok(ScValue::new(self.kind, self.id, s.as_bytes().to_vec()))
            }
            (ValueCodec::Int, Value::Integer(i)) if *i >= 0 => {
                Ok(ScValue::from_u64(self.kind, self.id, *i as u64))
            }
            (ValueCodec::Hex, Value::Bytes(b)) => Ok(ScValue::new(self.kind, self.id, b.clone())),
            _ => Err(SecError::Decode(format!(
                "wire value for `{}` has unexpected shape",
                self.name
            ))),
        }
    }
}

/// Parse hex text into bytes.
///
/// Accepts an optional `0x` prefix. Odd-length input treats the lone leading
/// digit as the low nibble of a synthesized leading zero byte, so `"abc"`
/// decodes to `[0x0a, 0xbc]`.
pub fn hex_decode(text: &str) -> SecResult<Vec<u8>> {
    let digits = if text.len() >= 2 && (text.as_bytes()[1] == b'x' || text.as_bytes()[1] == b'X') {
        &text[2..]
    } else {
        text
    };
    let bytes = digits.as_bytes();
    let mut out = Vec::with_capacity((bytes.len() + 1) / 2);
    let mut idx = 0;
    if bytes.len() % 2 == 1 {
        let nib = hex_nibble(bytes[0])
            .ok_or_else(|| SecError::Decode(format!("bad hex string `{}`", text)))?;
        out.push(nib);
        idx = 1;
    }
    while idx < bytes.len() {
        let hi = hex_nibble(bytes[idx])
            .ok_or_else(|| SecError::Decode(format!("bad hex string `{}`", text)))?;
        let lo = hex_nibble(bytes[idx + 1])
            .ok_or_else(|| SecError::Decode(format!("bad hex string `{}`", text)))?;
        out.push((hi << 4) | lo);
        idx += 2;
    }
    Ok(out)
}
