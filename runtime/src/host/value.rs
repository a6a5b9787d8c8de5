//! Run-time values and C arithmetic.
//!
//! Scalars follow the C usual arithmetic conversions: integer promotion to
//! `int`, then the wider (or, at equal width, the unsigned) operand type.
//! Integer results wrap to their type's width; `float` arithmetic is done in
//! single precision. Vector operands apply the scalar rules lane by lane, with
//! scalars broadcast to the vector's component type.

use std::cmp::Ordering;
use std::sync::Arc;

use tessera_dtype::{AddrSpace, DType, ScalarType, Value};

use super::ast::{BinOp, UnOp};
use super::driver::HostImage;
use super::memory::Memory;

#[derive(Debug, Clone)]
pub struct Pointer {
    pub mem: Arc<Memory>,
    /// Byte offset; may step outside the allocation, accesses are checked.
    pub offset: isize,
    pub elem: DType,
    pub space: AddrSpace,
}

impl Pointer {
    pub fn offset_by(&self, elements: i64) -> Pointer {
        let offset = self.offset + elements as isize * self.elem.bytes() as isize;
        Pointer { offset, ..self.clone() }
    }

    pub fn load(&self) -> Result<Value, String> {
        self.mem.load(&self.elem, self.offset)
    }

    pub fn store(&self, value: &Value) -> Result<(), String> {
        self.mem.store(self.offset, value)
    }
}

#[derive(Debug, Clone)]
pub enum Val {
    Void,
    Data(Value),
    Ptr(Pointer),
    Image(Arc<HostImage>),
    Sampler(u32),
}

impl Val {
    pub fn data(self) -> Result<Value, String> {
        match self {
            Val::Data(value) => Ok(value),
            other => Err(format!("expected a value, found {}", other.describe())),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Val::Void => "void".into(),
            Val::Data(value) => value.dtype().name(),
            Val::Ptr(ptr) => format!("{} {}*", ptr.space.qualifier(), ptr.elem.name()),
            Val::Image(_) => "image2d_t".into(),
            Val::Sampler(_) => "sampler_t".into(),
        }
    }

    pub fn truthy(&self) -> Result<bool, String> {
        match self {
            Val::Data(value) => truthy(value),
            Val::Ptr(_) => Ok(true),
            other => Err(format!("{} used as a condition", other.describe())),
        }
    }
}

pub fn scalar_type(value: &Value) -> Option<ScalarType> {
    match value {
        Value::Bool(_) => Some(ScalarType::Bool),
        Value::Int(s, _) | Value::UInt(s, _) | Value::Float(s, _) | Value::Vector(s, _) => Some(*s),
        Value::Struct(..) => None,
    }
}

pub fn truthy(value: &Value) -> Result<bool, String> {
    Ok(match value {
        Value::Bool(b) => *b,
        Value::Int(_, v) => *v != 0,
        Value::UInt(_, v) => *v != 0,
        Value::Float(_, v) => *v != 0.0,
        other => return Err(format!("{} used as a condition", other.dtype())),
    })
}

pub fn as_i64(value: &Value) -> Result<i64, String> {
    Ok(match value {
        Value::Bool(b) => *b as i64,
        Value::Int(_, v) => *v,
        Value::UInt(_, v) => *v as i64,
        Value::Float(_, v) => *v as i64,
        other => return Err(format!("expected a scalar, found {}", other.dtype())),
    })
}

pub fn as_u64(value: &Value) -> Result<u64, String> {
    Ok(match value {
        Value::Float(_, v) if *v < 0.0 => (*v as i64) as u64,
        Value::Float(_, v) => *v as u64,
        other => as_i64(other)? as u64,
    })
}

pub fn as_f64(value: &Value) -> Result<f64, String> {
    Ok(match value {
        Value::Bool(b) => *b as u8 as f64,
        Value::Int(_, v) => *v as f64,
        Value::UInt(_, v) => *v as f64,
        Value::Float(_, v) => *v,
        other => return Err(format!("expected a scalar, found {}", other.dtype())),
    })
}

pub fn wrap_signed(scalar: ScalarType, v: i64) -> i64 {
    let shift = 64 - scalar.bits();
    (v << shift) >> shift
}

pub fn wrap_unsigned(scalar: ScalarType, v: u64) -> u64 {
    if scalar.bits() == 64 { v } else { v & ((1u64 << scalar.bits()) - 1) }
}

fn round_float(scalar: ScalarType, v: f64) -> f64 {
    if scalar == ScalarType::Double { v } else { v as f32 as f64 }
}

/// Scalar conversion with C semantics.
pub fn cast_scalar(value: &Value, to: ScalarType) -> Result<Value, String> {
    Ok(match to {
        ScalarType::Bool => Value::Bool(truthy(value)?),
        s if s.is_float() => Value::Float(s, round_float(s, as_f64(value)?)),
        s if s.is_signed() => Value::Int(s, wrap_signed(s, as_i64(value)?)),
        s => Value::UInt(s, wrap_unsigned(s, as_u64(value)?)),
    })
}

/// Saturating scalar conversion (`convert_T_sat`).
pub fn cast_scalar_sat(value: &Value, to: ScalarType) -> Result<Value, String> {
    if to.is_float() || to.is_bool() {
        return cast_scalar(value, to);
    }
    let (lo, hi): (i128, i128) = if to.is_signed() {
        (-(1i128 << (to.bits() - 1)), (1i128 << (to.bits() - 1)) - 1)
    } else {
        (0, (1i128 << to.bits()) - 1)
    };
    let wide: i128 = match value {
        Value::Float(_, v) if v.is_nan() => 0,
        Value::Float(_, v) => (v.clamp(lo as f64, hi as f64)) as i128,
        Value::UInt(_, v) => *v as i128,
        other => as_i64(other)? as i128,
    };
    let clamped = wide.clamp(lo, hi);
    Ok(if to.is_signed() { Value::Int(to, clamped as i64) } else { Value::UInt(to, clamped as u64) })
}

/// Converts to `to`, broadcasting scalars into vectors.
pub fn convert(value: &Value, to: &DType) -> Result<Value, String> {
    match (to, value) {
        (DType::Scalar(s), Value::Vector(..)) => Err(format!("cannot convert {} to {s}", value.dtype())),
        (DType::Scalar(s), _) => cast_scalar(value, *s),
        (DType::Vector { scalar, count }, Value::Vector(_, lanes)) => {
            if lanes.len() != *count {
                return Err(format!("cannot convert {} to {to}", value.dtype()));
            }
            Ok(Value::Vector(*scalar, lanes.iter().map(|l| cast_scalar(l, *scalar)).collect::<Result<_, _>>()?))
        }
        (DType::Vector { scalar, count }, Value::Struct(..)) => Err(format!("cannot convert struct to {scalar}{count}")),
        (DType::Vector { scalar, count }, _) => Ok(Value::Vector(*scalar, vec![cast_scalar(value, *scalar)?; *count])),
        (DType::Struct(s), Value::Struct(vs, _)) if vs.name == s.name => Ok(value.clone()),
        (DType::Struct(s), _) => Err(format!("cannot convert {} to {}", value.dtype(), s.name)),
    }
}

/// Integer promotion.
pub fn promote(scalar: ScalarType) -> ScalarType {
    match scalar {
        ScalarType::Bool | ScalarType::Char | ScalarType::UChar | ScalarType::Short | ScalarType::UShort => ScalarType::Int,
        other => other,
    }
}

/// Common type of a binary operation on scalars.
pub fn usual_type(a: ScalarType, b: ScalarType) -> ScalarType {
    let (a, b) = (promote(a), promote(b));
    if a == ScalarType::Double || b == ScalarType::Double {
        return ScalarType::Double;
    }
    if a == ScalarType::Float || b == ScalarType::Float {
        return ScalarType::Float;
    }
    match a.bits().cmp(&b.bits()) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal if a.is_unsigned() => a,
        Ordering::Equal => b,
    }
}

fn int_value(scalar: ScalarType, v: i64) -> Value {
    Value::Int(scalar, wrap_signed(scalar, v))
}

fn boolean(b: bool) -> Value {
    Value::Int(ScalarType::Int, b as i64)
}

fn scalar_binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    let (ta, tb) = match (scalar_type(a), scalar_type(b)) {
        (Some(ta), Some(tb)) => (ta, tb),
        _ => return Err(format!("invalid operands {} and {}", a.dtype(), b.dtype())),
    };

    if matches!(op, BinOp::Shl | BinOp::Shr) {
        let t = promote(ta);
        if t.is_float() || tb.is_float() {
            return Err("shift of a floating-point value".into());
        }
        let amount = (as_u64(b)? % t.bits() as u64) as u32;
        let x = cast_scalar(a, t)?;
        return Ok(match (&x, op) {
            (Value::Int(_, v), BinOp::Shl) => int_value(t, v.wrapping_shl(amount)),
            (Value::Int(_, v), _) => int_value(t, v >> amount),
            (Value::UInt(_, v), BinOp::Shl) => Value::UInt(t, wrap_unsigned(t, v.wrapping_shl(amount))),
            (Value::UInt(_, v), _) => Value::UInt(t, v >> amount),
            _ => unreachable!("promoted integer"),
        });
    }

    let t = usual_type(ta, tb);
    let (x, y) = (cast_scalar(a, t)?, cast_scalar(b, t)?);
    match (&x, &y) {
        (Value::Float(_, x), Value::Float(_, y)) => {
            let (x, y) = (*x, *y);
            let r = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => x / y,
                BinOp::Rem => x % y,
                BinOp::Lt => return Ok(boolean(x < y)),
                BinOp::Le => return Ok(boolean(x <= y)),
                BinOp::Gt => return Ok(boolean(x > y)),
                BinOp::Ge => return Ok(boolean(x >= y)),
                BinOp::Eq => return Ok(boolean(x == y)),
                BinOp::Ne => return Ok(boolean(x != y)),
                BinOp::And => return Ok(boolean(x != 0.0 && y != 0.0)),
                BinOp::Or => return Ok(boolean(x != 0.0 || y != 0.0)),
                _ => return Err(format!("operator {op:?} is not defined on {t}")),
            };
            Ok(Value::Float(t, round_float(t, r)))
        }
        (Value::Int(_, x), Value::Int(_, y)) => {
            let (x, y) = (*x, *y);
            let r = match op {
                BinOp::Add => x.wrapping_add(y),
                BinOp::Sub => x.wrapping_sub(y),
                BinOp::Mul => x.wrapping_mul(y),
                BinOp::Div | BinOp::Rem if y == 0 => return Err("integer division by zero".into()),
                BinOp::Div => x.wrapping_div(y),
                BinOp::Rem => x.wrapping_rem(y),
                BinOp::BitAnd => x & y,
                BinOp::BitOr => x | y,
                BinOp::BitXor => x ^ y,
                BinOp::Lt => return Ok(boolean(x < y)),
                BinOp::Le => return Ok(boolean(x <= y)),
                BinOp::Gt => return Ok(boolean(x > y)),
                BinOp::Ge => return Ok(boolean(x >= y)),
                BinOp::Eq => return Ok(boolean(x == y)),
                BinOp::Ne => return Ok(boolean(x != y)),
                BinOp::And => return Ok(boolean(x != 0 && y != 0)),
                BinOp::Or => return Ok(boolean(x != 0 || y != 0)),
                BinOp::Shl | BinOp::Shr => unreachable!("handled above"),
            };
            Ok(int_value(t, r))
        }
        (Value::UInt(_, x), Value::UInt(_, y)) => {
            let (x, y) = (*x, *y);
            let r = match op {
                BinOp::Add => x.wrapping_add(y),
                BinOp::Sub => x.wrapping_sub(y),
                BinOp::Mul => x.wrapping_mul(y),
                BinOp::Div | BinOp::Rem if y == 0 => return Err("integer division by zero".into()),
                BinOp::Div => x / y,
                BinOp::Rem => x % y,
                BinOp::BitAnd => x & y,
                BinOp::BitOr => x | y,
                BinOp::BitXor => x ^ y,
                BinOp::Lt => return Ok(boolean(x < y)),
                BinOp::Le => return Ok(boolean(x <= y)),
                BinOp::Gt => return Ok(boolean(x > y)),
                BinOp::Ge => return Ok(boolean(x >= y)),
                BinOp::Eq => return Ok(boolean(x == y)),
                BinOp::Ne => return Ok(boolean(x != y)),
                BinOp::And => return Ok(boolean(x != 0 && y != 0)),
                BinOp::Or => return Ok(boolean(x != 0 || y != 0)),
                BinOp::Shl | BinOp::Shr => unreachable!("handled above"),
            };
            Ok(Value::UInt(t, wrap_unsigned(t, r)))
        }
        _ => Err(format!("invalid operands {} and {}", a.dtype(), b.dtype())),
    }
}

/// Signed integer type of the same width, used for vector comparison results.
fn mask_type(scalar: ScalarType) -> ScalarType {
    match scalar.bytes() {
        1 => ScalarType::Char,
        2 => ScalarType::Short,
        4 => ScalarType::Int,
        _ => ScalarType::Long,
    }
}

pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    match (a, b) {
        (Value::Vector(sa, la), Value::Vector(sb, lb)) => {
            if la.len() != lb.len() {
                return Err(format!("vector width mismatch: {} and {}", a.dtype(), b.dtype()));
            }
            if sa != sb {
                return Err(format!("vector component mismatch: {} and {}", a.dtype(), b.dtype()));
            }
            vector_binary(op, *sa, la.iter().zip(lb.iter()))
        }
        (Value::Vector(s, lanes), scalar) => {
            let scalar = cast_scalar(scalar, *s)?;
            vector_binary(op, *s, lanes.iter().zip(std::iter::repeat(&scalar)))
        }
        (scalar, Value::Vector(s, lanes)) => {
            let scalar = cast_scalar(scalar, *s)?;
            vector_binary(op, *s, std::iter::repeat(&scalar).zip(lanes.iter()))
        }
        _ => scalar_binary(op, a, b),
    }
}

fn vector_binary<'a>(op: BinOp, scalar: ScalarType, lanes: impl Iterator<Item = (&'a Value, &'a Value)>) -> Result<Value, String> {
    let results = lanes.map(|(x, y)| scalar_binary(op, x, y)).collect::<Result<Vec<_>, _>>()?;
    if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
        let mask = mask_type(scalar);
        let lanes = results.iter().map(|r| truthy(r).map(|t| Value::Int(mask, -(t as i64)))).collect::<Result<_, _>>()?;
        return Ok(Value::Vector(mask, lanes));
    }
    let lanes = results.iter().map(|r| cast_scalar(r, scalar)).collect::<Result<_, _>>()?;
    Ok(Value::Vector(scalar, lanes))
}

pub fn unary(op: UnOp, a: &Value) -> Result<Value, String> {
    if let Value::Vector(s, lanes) = a {
        let lanes = lanes.iter().map(|l| unary(op, l)).collect::<Result<Vec<_>, _>>()?;
        if op == UnOp::Not {
            let mask = mask_type(*s);
            let lanes = lanes.iter().map(|l| truthy(l).map(|t| Value::Int(mask, -(t as i64)))).collect::<Result<_, _>>()?;
            return Ok(Value::Vector(mask, lanes));
        }
        let lanes = lanes.iter().map(|l| cast_scalar(l, *s)).collect::<Result<_, _>>()?;
        return Ok(Value::Vector(*s, lanes));
    }
    let t = scalar_type(a).ok_or_else(|| format!("invalid operand {}", a.dtype()))?;
    match op {
        UnOp::Not => Ok(boolean(!truthy(a)?)),
        UnOp::Plus => cast_scalar(a, promote(t)),
        UnOp::Neg => match cast_scalar(a, promote(t))? {
            Value::Float(s, v) => Ok(Value::Float(s, -v)),
            Value::Int(s, v) => Ok(int_value(s, v.wrapping_neg())),
            Value::UInt(s, v) => Ok(Value::UInt(s, wrap_unsigned(s, v.wrapping_neg()))),
            other => Err(format!("cannot negate {}", other.dtype())),
        },
        UnOp::BitNot => match cast_scalar(a, promote(t))? {
            Value::Int(s, v) => Ok(int_value(s, !v)),
            Value::UInt(s, v) => Ok(Value::UInt(s, wrap_unsigned(s, !v))),
            other => Err(format!("operator ~ is not defined on {}", other.dtype())),
        },
    }
}

/// Component `index` of a vector, or the value itself for scalars.
pub fn lane(value: &Value, index: usize) -> Result<Value, String> {
    match value {
        Value::Vector(_, lanes) => lanes.get(index).cloned().ok_or_else(|| format!("lane {index} out of range for {}", value.dtype())),
        scalar if index == 0 => Ok(scalar.clone()),
        other => Err(format!("lane {index} of scalar {}", other.dtype())),
    }
}
