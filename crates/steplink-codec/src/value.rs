use std::time::Instant;

use crate::error::{CodecError, Result};

/// Runtime kind of a [`WireValue`]. Fixed at construction; assignments and
/// decodes coerce into this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Float,
    Bool,
}

/// The application-level value held by a [`WireValue`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// A typed wire-value cell: a fixed-width signed/unsigned little-endian
/// integer on the wire, optionally carrying a fixed-point fraction via a
/// scale multiplier, and an integer/float/boolean value on the host side.
///
/// Wire type tokens are C-like: `"u8"`, `"u16"`, `"s32"`, `"s64"`, …
/// Decoding computes `raw * scale`; encoding computes `round(value / scale)`
/// and truncates to the declared width per two's-complement semantics.
/// There is no range check on encode: out-of-range values wrap, which is
/// what the device firmware expects of raw casts on its side.
#[derive(Debug, Clone)]
pub struct WireValue {
    byte_len: usize,
    signed: bool,
    scale: f64,
    kind: Kind,
    value: Value,
    updated_at: Instant,
}

impl WireValue {
    /// Construct with scale 1 and a zero initial value.
    pub fn new(ctype: &str, kind: Kind) -> Result<Self> {
        Self::scaled(ctype, kind, 1.0)
    }

    /// Construct with an explicit scale multiplier and a zero initial value.
    pub fn scaled(ctype: &str, kind: Kind, scale: f64) -> Result<Self> {
        let (signed, byte_len) = parse_ctype(ctype)?;
        let value = match kind {
            Kind::Int => Value::Int(0),
            Kind::Float => Value::Float(0.0),
            Kind::Bool => Value::Bool(false),
        };
        Ok(Self {
            byte_len,
            signed,
            scale,
            kind,
            value,
            updated_at: Instant::now(),
        })
    }

    /// Width of the wire representation in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Whether the wire integer is signed.
    pub fn signed(&self) -> bool {
        self.signed
    }

    /// The scale multiplier applied on decode.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The fixed runtime kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Current value.
    pub fn value(&self) -> Value {
        self.value
    }

    /// Monotonic timestamp of the last assignment or decode.
    pub fn last_update(&self) -> Instant {
        self.updated_at
    }

    /// Assign an application-level value, coercing into the fixed kind.
    pub fn assign(&mut self, value: impl Into<Value>) {
        self.value = coerce(value.into(), self.kind);
        self.updated_at = Instant::now();
    }

    /// Current value as `f64` (booleans map to 0/1).
    pub fn as_f64(&self) -> f64 {
        match self.value {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
            Value::Bool(v) => v as u8 as f64,
        }
    }

    /// Current value as `i64` (floats truncate toward zero).
    pub fn as_i64(&self) -> i64 {
        match self.value {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
            Value::Bool(v) => v as i64,
        }
    }

    /// Current value as `bool` (nonzero is true).
    pub fn as_bool(&self) -> bool {
        match self.value {
            Value::Int(v) => v != 0,
            Value::Float(v) => v != 0.0,
            Value::Bool(v) => v,
        }
    }

    /// Encode the current value into its little-endian wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let raw = if self.scale != 1.0 {
            (self.as_f64() / self.scale).round() as i64
        } else {
            self.as_i64()
        };
        raw.to_le_bytes()[..self.byte_len].to_vec()
    }

    /// Decode little-endian wire bytes into the cell, applying the scale
    /// and coercing into the fixed kind. Refreshes the update timestamp.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.byte_len {
            return Err(CodecError::LengthMismatch {
                expected: self.byte_len,
                actual: bytes.len(),
            });
        }

        let mut word = [0u8; 8];
        word[..self.byte_len].copy_from_slice(bytes);
        let unsigned = u64::from_le_bytes(word);
        let raw = if self.signed {
            sign_extend(unsigned, self.byte_len)
        } else {
            unsigned as i64
        };

        self.value = match self.kind {
            Kind::Float => Value::Float(raw as f64 * self.scale),
            Kind::Bool => Value::Bool(raw != 0),
            Kind::Int => {
                if self.scale != 1.0 {
                    Value::Int((raw as f64 * self.scale) as i64)
                } else {
                    Value::Int(raw)
                }
            }
        };
        self.updated_at = Instant::now();
        Ok(())
    }
}

fn coerce(value: Value, kind: Kind) -> Value {
    match (kind, value) {
        (Kind::Int, Value::Float(v)) => Value::Int(v as i64),
        (Kind::Int, Value::Bool(v)) => Value::Int(v as i64),
        (Kind::Float, Value::Int(v)) => Value::Float(v as f64),
        (Kind::Float, Value::Bool(v)) => Value::Float(v as u8 as f64),
        (Kind::Bool, Value::Int(v)) => Value::Bool(v != 0),
        (Kind::Bool, Value::Float(v)) => Value::Bool(v != 0.0),
        (_, v) => v,
    }
}

fn sign_extend(unsigned: u64, byte_len: usize) -> i64 {
    let bits = byte_len * 8;
    if bits == 64 {
        return unsigned as i64;
    }
    let shift = 64 - bits;
    ((unsigned << shift) as i64) >> shift
}

fn parse_ctype(ctype: &str) -> Result<(bool, usize)> {
    let mut chars = ctype.chars();
    let signed = match chars.next() {
        Some('u') | Some('U') => false,
        Some('s') | Some('S') => true,
        _ => {
            return Err(CodecError::InvalidFormat(format!(
                "unrecognized signedness in wire type '{ctype}'"
            )))
        }
    };
    let bits: usize = chars.as_str().parse().map_err(|_| {
        CodecError::InvalidFormat(format!("unparsable width in wire type '{ctype}'"))
    })?;
    if bits % 8 != 0 || !matches!(bits, 8 | 16 | 32 | 64) {
        return Err(CodecError::InvalidFormat(format!(
            "unsupported width {bits} in wire type '{ctype}'"
        )));
    }
    Ok((signed, bits / 8))
}
