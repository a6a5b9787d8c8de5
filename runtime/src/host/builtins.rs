//! Built-in functions of the kernel language.
//!
//! Work-item queries and `barrier` need the executing work-item and are
//! evaluated by the interpreter; everything else lives here.

use std::str::FromStr;

use tessera_device::ImageFormat;
use tessera_dtype::{DType, ScalarType, Value};

use super::driver::HostImage;
use super::value::{self, Pointer, as_f64, as_i64, cast_scalar, cast_scalar_sat, lane, scalar_type, truthy, usual_type};
use super::ast::BinOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Func {
    GetGlobalId,
    GetLocalId,
    GetGroupId,
    GetGlobalSize,
    GetLocalSize,
    GetNumGroups,
    GetGlobalOffset,
    GetWorkDim,
    Barrier,
    MemFence,
    ReadMemFence,
    WriteMemFence,
    #[strum(serialize = "atomic_add", serialize = "atom_add")]
    AtomicAdd,
    #[strum(serialize = "atomic_sub", serialize = "atom_sub")]
    AtomicSub,
    #[strum(serialize = "atomic_xchg", serialize = "atom_xchg")]
    AtomicXchg,
    #[strum(serialize = "atomic_inc", serialize = "atom_inc")]
    AtomicInc,
    #[strum(serialize = "atomic_dec", serialize = "atom_dec")]
    AtomicDec,
    #[strum(serialize = "atomic_cmpxchg", serialize = "atom_cmpxchg")]
    AtomicCmpxchg,
    #[strum(serialize = "atomic_min", serialize = "atom_min")]
    AtomicMin,
    #[strum(serialize = "atomic_max", serialize = "atom_max")]
    AtomicMax,
    #[strum(serialize = "atomic_and", serialize = "atom_and")]
    AtomicAnd,
    #[strum(serialize = "atomic_or", serialize = "atom_or")]
    AtomicOr,
    #[strum(serialize = "atomic_xor", serialize = "atom_xor")]
    AtomicXor,
    Min,
    Max,
    Clamp,
    Abs,
    Select,
    Mad,
    Fma,
    Sqrt,
    Rsqrt,
    Fabs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Exp,
    Log,
    Log2,
    Pow,
    Sin,
    Cos,
    Tan,
    Fmin,
    Fmax,
    Fmod,
    Isnan,
    Isinf,
    ReadImagef,
    ReadImageui,
    ReadImagei,
    GetImageWidth,
    GetImageHeight,
}

impl Func {
    pub fn arity(&self) -> usize {
        use Func::*;
        match self {
            GetWorkDim => 0,
            GetGlobalId | GetLocalId | GetGroupId | GetGlobalSize | GetLocalSize | GetNumGroups | GetGlobalOffset => 1,
            Barrier | MemFence | ReadMemFence | WriteMemFence => 1,
            AtomicInc | AtomicDec => 1,
            AtomicAdd | AtomicSub | AtomicXchg | AtomicMin | AtomicMax | AtomicAnd | AtomicOr | AtomicXor => 2,
            AtomicCmpxchg => 3,
            Abs | Sqrt | Rsqrt | Fabs | Floor | Ceil | Round | Trunc | Exp | Log | Log2 | Sin | Cos | Tan | Isnan
            | Isinf => 1,
            Min | Max | Pow | Fmin | Fmax | Fmod => 2,
            Clamp | Select | Mad | Fma => 3,
            ReadImagef | ReadImageui | ReadImagei => 3,
            GetImageWidth | GetImageHeight => 1,
        }
    }

    pub fn is_atomic(&self) -> bool {
        use Func::*;
        matches!(
            self,
            AtomicAdd
                | AtomicSub
                | AtomicXchg
                | AtomicInc
                | AtomicDec
                | AtomicCmpxchg
                | AtomicMin
                | AtomicMax
                | AtomicAnd
                | AtomicOr
                | AtomicXor
        )
    }
}

/// Rounding mode suffix of `convert_T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    #[default]
    Default,
    NearestEven,
    TowardZero,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    Func(Func),
    /// `convert_T[_sat][_rtX]`.
    Convert { to: DType, saturate: bool, rounding: Rounding },
    /// `as_T`: bit reinterpretation.
    As(DType),
}

impl Builtin {
    pub fn resolve(name: &str) -> Option<Builtin> {
        if let Ok(func) = Func::from_str(name) {
            return Some(Builtin::Func(func));
        }
        if let Some(rest) = name.strip_prefix("convert_") {
            let (rest, rounding) = match rest.rsplit_once('_') {
                Some((head, "rte")) => (head, Rounding::NearestEven),
                Some((head, "rtz")) => (head, Rounding::TowardZero),
                Some((head, "rtp")) => (head, Rounding::Up),
                Some((head, "rtn")) => (head, Rounding::Down),
                _ => (rest, Rounding::Default),
            };
            let (rest, saturate) = match rest.strip_suffix("_sat") {
                Some(head) => (head, true),
                None => (rest, false),
            };
            return DType::from_cl_name(rest).map(|to| Builtin::Convert { to, saturate, rounding });
        }
        name.strip_prefix("as_").and_then(DType::from_cl_name).map(Builtin::As)
    }

    pub fn arity(&self) -> usize {
        match self {
            Builtin::Func(func) => func.arity(),
            Builtin::Convert { .. } | Builtin::As(_) => 1,
        }
    }
}

fn round_with(v: f64, rounding: Rounding) -> f64 {
    match rounding {
        Rounding::Default | Rounding::TowardZero => v.trunc(),
        Rounding::NearestEven => v.round_ties_even(),
        Rounding::Up => v.ceil(),
        Rounding::Down => v.floor(),
    }
}

fn convert_scalar(v: &Value, to: ScalarType, saturate: bool, rounding: Rounding) -> Result<Value, String> {
    let v = match v {
        Value::Float(s, f) if to.is_int() => Value::Float(*s, round_with(*f, rounding)),
        other => other.clone(),
    };
    if saturate { cast_scalar_sat(&v, to) } else { cast_scalar(&v, to) }
}

pub fn convert(v: &Value, to: &DType, saturate: bool, rounding: Rounding) -> Result<Value, String> {
    match (to, v) {
        (DType::Scalar(s), Value::Vector(..)) => Err(format!("convert_{s} applied to {}", v.dtype())),
        (DType::Scalar(s), _) => convert_scalar(v, *s, saturate, rounding),
        (DType::Vector { scalar, count }, Value::Vector(_, lanes)) if lanes.len() == *count => Ok(Value::Vector(
            *scalar,
            lanes.iter().map(|l| convert_scalar(l, *scalar, saturate, rounding)).collect::<Result<_, _>>()?,
        )),
        _ => Err(format!("convert_{to} applied to {}", v.dtype())),
    }
}

/// `as_T`: reinterprets the bytes of `v` as `to`; sizes must agree.
pub fn reinterpret(v: &Value, to: &DType) -> Result<Value, String> {
    let bytes = v.to_bytes();
    if bytes.len() != to.bytes() {
        return Err(format!("as_{to} applied to {} ({} bytes)", v.dtype(), bytes.len()));
    }
    Ok(Value::decode(to, &bytes))
}

/// Width of the widest vector operand, if any.
fn vector_width(args: &[Value]) -> Option<(usize, ScalarType)> {
    args.iter().find_map(|a| match a {
        Value::Vector(s, lanes) => Some((lanes.len(), *s)),
        _ => None,
    })
}

/// Applies `f` lane by lane, broadcasting scalar operands.
fn lanewise(args: &[Value], f: impl Fn(&[Value]) -> Result<Value, String>) -> Result<Value, String> {
    let Some((width, _)) = vector_width(args) else {
        return f(args);
    };
    let mut lanes = Vec::with_capacity(width);
    for i in 0..width {
        let row = args
            .iter()
            .map(|a| match a {
                Value::Vector(..) => lane(a, i),
                scalar => Ok(scalar.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        lanes.push(f(&row)?);
    }
    let scalar = lanes.first().and_then(scalar_type).unwrap_or(ScalarType::Int);
    Ok(Value::Vector(scalar, lanes))
}

fn common_type(args: &[Value]) -> Result<ScalarType, String> {
    let mut types = args.iter().map(|a| scalar_type(a).ok_or_else(|| format!("invalid operand {}", a.dtype())));
    let first = types.next().unwrap_or(Ok(ScalarType::Int))?;
    types.try_fold(first, |acc, t| t.map(|t| usual_type(acc, t)))
}

/// Float type of a math operand; integers compute in `float`.
fn float_type(v: &Value) -> ScalarType {
    match scalar_type(v) {
        Some(ScalarType::Double) => ScalarType::Double,
        _ => ScalarType::Float,
    }
}

fn float_unary(args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value, String> {
    lanewise(args, |row| {
        let t = float_type(&row[0]);
        cast_scalar(&Value::Float(ScalarType::Double, f(as_f64(&row[0])?)), t)
    })
}

fn float_binary(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, String> {
    lanewise(args, |row| {
        let t = usual_type(float_type(&row[0]), float_type(&row[1]));
        cast_scalar(&Value::Float(ScalarType::Double, f(as_f64(&row[0])?, as_f64(&row[1])?)), t)
    })
}

fn pick(args: &[Value], take_first: impl Fn(&Value, &Value) -> Result<bool, String>) -> Result<Value, String> {
    lanewise(args, |row| {
        let t = common_type(row)?;
        let (a, b) = (cast_scalar(&row[0], t)?, cast_scalar(&row[1], t)?);
        Ok(if take_first(&a, &b)? { a } else { b })
    })
}

fn less(a: &Value, b: &Value) -> Result<bool, String> {
    truthy(&value::binary(BinOp::Lt, a, b)?)
}

fn classify(args: &[Value], f: impl Fn(f64) -> bool) -> Result<Value, String> {
    match &args[0] {
        Value::Vector(s, lanes) => {
            let mask = if s.bytes() == 8 { ScalarType::Long } else { ScalarType::Int };
            let lanes = lanes.iter().map(|l| as_f64(l).map(|v| Value::Int(mask, -(f(v) as i64)))).collect::<Result<_, _>>()?;
            Ok(Value::Vector(mask, lanes))
        }
        scalar => Ok(Value::Int(ScalarType::Int, f(as_f64(scalar)?) as i64)),
    }
}

/// Whether the most significant bit of a `select` condition lane is set.
fn msb_set(v: &Value) -> Result<bool, String> {
    Ok(match v {
        Value::Int(..) => as_i64(v)? < 0,
        Value::UInt(s, u) => (u >> (s.bits() - 1)) & 1 == 1,
        other => truthy(other)?,
    })
}

/// Evaluates a pure math built-in.
pub fn math(func: Func, args: &[Value]) -> Result<Value, String> {
    use Func::*;
    match func {
        Min => pick(args, less),
        Max => pick(args, |a, b| less(b, a)),
        Fmin => float_binary(args, f64::min),
        Fmax => float_binary(args, f64::max),
        Clamp => {
            let low = pick(&[args[0].clone(), args[1].clone()], |a, b| less(b, a))?;
            pick(&[low, args[2].clone()], less)
        }
        Abs => lanewise(args, |row| match &row[0] {
            Value::Int(s, v) => Ok(Value::UInt(s.to_unsigned(), value::wrap_unsigned(*s, v.unsigned_abs()))),
            Value::Float(s, v) => Ok(Value::Float(*s, v.abs())),
            other => Ok(other.clone()),
        }),
        Select => match &args[2] {
            Value::Vector(..) => lanewise(args, |row| Ok(if msb_set(&row[2])? { row[1].clone() } else { row[0].clone() })),
            cond => Ok(if truthy(cond)? { args[1].clone() } else { args[0].clone() }),
        },
        Mad | Fma => lanewise(args, |row| {
            let t = usual_type(float_type(&row[0]), float_type(&row[2]));
            let v = as_f64(&row[0])?.mul_add(as_f64(&row[1])?, as_f64(&row[2])?);
            cast_scalar(&Value::Float(ScalarType::Double, v), t)
        }),
        Sqrt => float_unary(args, f64::sqrt),
        Rsqrt => float_unary(args, |v| 1.0 / v.sqrt()),
        Fabs => float_unary(args, f64::abs),
        Floor => float_unary(args, f64::floor),
        Ceil => float_unary(args, f64::ceil),
        Round => float_unary(args, f64::round),
        Trunc => float_unary(args, f64::trunc),
        Exp => float_unary(args, f64::exp),
        Log => float_unary(args, f64::ln),
        Log2 => float_unary(args, f64::log2),
        Sin => float_unary(args, f64::sin),
        Cos => float_unary(args, f64::cos),
        Tan => float_unary(args, f64::tan),
        Pow => float_binary(args, f64::powf),
        Fmod => float_binary(args, |a, b| a % b),
        Isnan => classify(args, f64::is_nan),
        Isinf => classify(args, f64::is_infinite),
        other => Err(format!("{other:?} is not a math function")),
    }
}

/// Read-modify-write on `ptr`; returns the previous value.
pub fn atomic(func: Func, ptr: &Pointer, args: &[Value]) -> Result<Value, String> {
    let elem = ptr.elem.clone();
    let Some(scalar) = elem.scalar().filter(|_| !elem.is_struct() && elem.lanes() == 1) else {
        return Err(format!("atomic on {elem}"));
    };
    let operand = |i: usize| -> Result<Value, String> { cast_scalar(&args[i], scalar) };
    let one = Value::Int(ScalarType::Int, 1);
    ptr.mem.atomic_update(&elem, ptr.offset, |old| {
        let new = match func {
            Func::AtomicAdd => value::binary(BinOp::Add, old, &operand(0)?)?,
            Func::AtomicSub => value::binary(BinOp::Sub, old, &operand(0)?)?,
            Func::AtomicInc => value::binary(BinOp::Add, old, &one)?,
            Func::AtomicDec => value::binary(BinOp::Sub, old, &one)?,
            Func::AtomicXchg => operand(0)?,
            Func::AtomicCmpxchg => {
                if *old == operand(0)? { operand(1)? } else { old.clone() }
            }
            Func::AtomicMin => {
                let v = operand(0)?;
                if less(&v, old)? { v } else { old.clone() }
            }
            Func::AtomicMax => {
                let v = operand(0)?;
                if less(old, &v)? { v } else { old.clone() }
            }
            Func::AtomicAnd => value::binary(BinOp::BitAnd, old, &operand(0)?)?,
            Func::AtomicOr => value::binary(BinOp::BitOr, old, &operand(0)?)?,
            Func::AtomicXor => value::binary(BinOp::BitXor, old, &operand(0)?)?,
            other => return Err(format!("{other:?} is not an atomic function")),
        };
        cast_scalar(&new, scalar)
    })
}

const NORMALIZED_COORDS: u32 = 0x1;
const ADDRESS_MASK: u32 = 0xE;
const ADDRESS_CLAMP: u32 = 0x4;
const ADDRESS_REPEAT: u32 = 0x6;
const ADDRESS_MIRRORED_REPEAT: u32 = 0x8;

/// Pixel index along one axis under the sampler's addressing mode; `None`
/// selects the border color.
fn address(v: f64, len: usize, sampler: u32) -> Option<usize> {
    let len = len.max(1) as i64;
    let i = v.floor() as i64;
    let index = match sampler & ADDRESS_MASK {
        ADDRESS_REPEAT => i.rem_euclid(len),
        ADDRESS_MIRRORED_REPEAT => {
            let m = i.rem_euclid(2 * len);
            if m < len { m } else { 2 * len - 1 - m }
        }
        ADDRESS_CLAMP if !(0..len).contains(&i) => return None,
        _ => i.clamp(0, len - 1),
    };
    Some(index as usize)
}

/// Reads one pixel with nearest filtering.
///
/// `sampler` holds the `CLK_*` flags: normalized coordinates are scaled by
/// the image size, and out-of-range reads follow the addressing mode.
/// Linear filtering is treated as nearest.
pub fn read_image(func: Func, image: &HostImage, sampler: u32, coord: &Value) -> Result<Value, String> {
    let (mut x, mut y) = (as_f64(&lane(coord, 0)?)?, as_f64(&lane(coord, 1)?)?);
    if sampler & NORMALIZED_COORDS != 0 {
        x *= image.width as f64;
        y *= image.height as f64;
    }
    let target = match func {
        Func::ReadImagef => ScalarType::Float,
        Func::ReadImageui => ScalarType::UInt,
        _ => ScalarType::Int,
    };
    let (Some(x), Some(y)) = (address(x, image.width, sampler), address(y, image.height, sampler)) else {
        return Ok(Value::zero(&DType::vector(target, 4)));
    };
    let bpp = image.format.bytes_per_pixel();
    let raw = image.mem.read(((y * image.width + x) * bpp) as isize, bpp)?;
    let pixel = match image.format {
        ImageFormat::RgbaFloat => Value::decode(&DType::vector(ScalarType::Float, 4), &raw),
        ImageFormat::RgbaUInt => Value::decode(&DType::vector(ScalarType::UInt, 4), &raw),
        ImageFormat::RgbaInt => Value::decode(&DType::vector(ScalarType::Int, 4), &raw),
        ImageFormat::RgbaUNorm8 => Value::Vector(
            ScalarType::Float,
            raw.iter().map(|&b| Value::Float(ScalarType::Float, (b as f32 / 255.0) as f64)).collect(),
        ),
    };
    value::convert(&pixel, &DType::vector(target, 4))
}
