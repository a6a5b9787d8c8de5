//! Typed constants.

use std::sync::Arc;

use crate::{DType, ScalarType, StructType};

/// A host constant together with its device type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(ScalarType, i64),
    UInt(ScalarType, u64),
    Float(ScalarType, f64),
    Vector(ScalarType, Vec<Value>),
    Struct(Arc<StructType>, Vec<Value>),
}

impl Value {
    pub fn dtype(&self) -> DType {
        match self {
            Value::Bool(_) => DType::Scalar(ScalarType::Bool),
            Value::Int(s, _) | Value::UInt(s, _) | Value::Float(s, _) => DType::Scalar(*s),
            Value::Vector(s, lanes) => DType::Vector { scalar: *s, count: lanes.len() },
            Value::Struct(s, _) => DType::Struct(Arc::clone(s)),
        }
    }

    /// Appends the little-endian device representation.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bool(b) => out.push(*b as u8),
            Value::Int(s, v) => out.extend_from_slice(&v.to_le_bytes()[..s.bytes()]),
            Value::UInt(s, v) => out.extend_from_slice(&v.to_le_bytes()[..s.bytes()]),
            Value::Float(ScalarType::Double, v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Float(_, v) => out.extend_from_slice(&(*v as f32).to_le_bytes()),
            Value::Vector(s, lanes) => {
                lanes.iter().for_each(|lane| lane.encode(out));
                if lanes.len() == 3 {
                    out.extend(std::iter::repeat_n(0u8, s.bytes()));
                }
            }
            Value::Struct(_, fields) => fields.iter().for_each(|field| field.encode(out)),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.dtype().bytes());
        self.encode(&mut out);
        out
    }

    /// Reads a value of `dtype` from the front of `bytes` (the inverse of [`Value::encode`]).
    ///
    /// `bytes` must hold at least `dtype.bytes()` bytes.
    pub fn decode(dtype: &DType, bytes: &[u8]) -> Self {
        match dtype {
            DType::Scalar(s) => Self::decode_scalar(*s, bytes),
            DType::Vector { scalar, count } => {
                let size = scalar.bytes();
                Value::Vector(*scalar, (0..*count).map(|i| Self::decode_scalar(*scalar, &bytes[i * size..])).collect())
            }
            DType::Struct(s) => {
                let mut offset = 0;
                let fields = s
                    .fields
                    .iter()
                    .map(|field| {
                        let value = Self::decode(&field.dtype, &bytes[offset..]);
                        offset += field.dtype.bytes();
                        value
                    })
                    .collect();
                Value::Struct(Arc::clone(s), fields)
            }
        }
    }

    fn decode_scalar(scalar: ScalarType, bytes: &[u8]) -> Self {
        let size = scalar.bytes();
        let mut raw = [0u8; 8];
        raw[..size].copy_from_slice(&bytes[..size]);
        let bits = u64::from_le_bytes(raw);
        match scalar {
            ScalarType::Bool => Value::Bool(bits != 0),
            ScalarType::Float => Value::Float(scalar, f32::from_bits(bits as u32) as f64),
            ScalarType::Double => Value::Float(scalar, f64::from_bits(bits)),
            s if s.is_signed() => {
                let shift = 64 - s.bits();
                Value::Int(s, ((bits << shift) as i64) >> shift)
            }
            s => Value::UInt(s, bits),
        }
    }

    /// Zero of the given type.
    pub fn zero(dtype: &DType) -> Self {
        match dtype {
            DType::Scalar(s) => Self::scalar_zero(*s),
            DType::Vector { scalar, count } => Value::Vector(*scalar, vec![Self::scalar_zero(*scalar); *count]),
            DType::Struct(s) => Value::Struct(Arc::clone(s), s.fields.iter().map(|f| Self::zero(&f.dtype)).collect()),
        }
    }

    fn scalar_zero(scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Bool => Value::Bool(false),
            s if s.is_float() => Value::Float(s, 0.0),
            s if s.is_signed() => Value::Int(s, 0),
            s => Value::UInt(s, 0),
        }
    }
}
