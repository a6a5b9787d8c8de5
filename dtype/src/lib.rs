//! OpenCL C type registry.
//!
//! Maps host element types to their device-language spelling and renders the
//! declarations that aggregate types need inside a kernel program. Names are a
//! pure function of the type, so independent kernel sessions agree on them
//! without coordination.

pub mod ext;
pub mod value;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_gen;


use std::fmt;
use std::sync::Arc;

use enumset::{EnumSet, enum_set};
use smallvec::SmallVec;

pub use ext::{Element, HasDType, ScalarElement, decode_slice, encode_slice, type_name};
pub use value::Value;

/// Address space qualifier of a kernel parameter or pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumIter, strum::IntoStaticStr)]
pub enum AddrSpace {
    /// Device memory shared by every work-item.
    Global,
    /// Work-group scratch memory.
    Local,
    /// Read-only device memory.
    Constant,
    /// Passed by value.
    Private,
}

impl AddrSpace {
    pub const fn qualifier(&self) -> &'static str {
        match self {
            Self::Global => "__global",
            Self::Local => "__local",
            Self::Constant => "__constant",
            Self::Private => "",
        }
    }
}

/// Scalar device types.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[derive(enumset::EnumSetType)]
#[enumset(repr = "u32")]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
pub enum ScalarType {
    Bool = 0,
    Char = 1,
    UChar = 2,
    Short = 3,
    UShort = 4,
    Int = 5,
    UInt = 6,
    Long = 7,
    ULong = 8,
    Float = 9,
    Double = 10,
}

impl ScalarType {
    pub const SIGNED: EnumSet<ScalarType> = enum_set!(ScalarType::Char | ScalarType::Short | ScalarType::Int | ScalarType::Long);
    pub const UNSIGNED: EnumSet<ScalarType> =
        enum_set!(ScalarType::UChar | ScalarType::UShort | ScalarType::UInt | ScalarType::ULong);
    pub const FLOATS: EnumSet<ScalarType> = enum_set!(ScalarType::Float | ScalarType::Double);

    /// Types whose ordering can be reproduced by an unsigned digit-by-digit key.
    pub const RADIX_KEYS: EnumSet<ScalarType> = enum_set!(
        ScalarType::Char
            | ScalarType::UChar
            | ScalarType::Short
            | ScalarType::UShort
            | ScalarType::Int
            | ScalarType::UInt
            | ScalarType::Long
            | ScalarType::ULong
            | ScalarType::Float
            | ScalarType::Double
    );

    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool | Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong | Self::Double => 8,
        }
    }

    pub const fn bits(&self) -> u32 {
        (self.bytes() * 8) as u32
    }

    pub fn is_signed(&self) -> bool {
        Self::SIGNED.contains(*self)
    }

    pub fn is_unsigned(&self) -> bool {
        Self::UNSIGNED.contains(*self)
    }

    pub fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub fn is_float(&self) -> bool {
        Self::FLOATS.contains(*self)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn cl_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::UChar => "uchar",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Long => "long",
            Self::ULong => "ulong",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Parses a scalar spelling, accepting the C aliases kernels commonly use.
    pub fn from_cl_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "char" | "signed char" => Self::Char,
            "uchar" | "unsigned char" => Self::UChar,
            "short" => Self::Short,
            "ushort" | "unsigned short" => Self::UShort,
            "int" => Self::Int,
            "uint" | "unsigned int" | "unsigned" => Self::UInt,
            "long" => Self::Long,
            "ulong" | "unsigned long" | "size_t" => Self::ULong,
            "float" => Self::Float,
            "double" => Self::Double,
            _ => return None,
        })
    }

    /// Unsigned type of the same width.
    pub const fn to_unsigned(&self) -> Self {
        match self {
            Self::Bool | Self::Char | Self::UChar => Self::UChar,
            Self::Short | Self::UShort => Self::UShort,
            Self::Int | Self::UInt | Self::Float => Self::UInt,
            Self::Long | Self::ULong | Self::Double => Self::ULong,
        }
    }

    /// Extension a device must report to use this type in a kernel.
    pub const fn required_extension(&self) -> Option<&'static str> {
        match self {
            Self::Double => Some("cl_khr_fp64"),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cl_name())
    }
}

/// Lane counts the device language accepts for built-in vector types.
pub const VECTOR_WIDTHS: [usize; 5] = [2, 3, 4, 8, 16];

/// Device type of a kernel value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    Scalar(ScalarType),
    Vector { scalar: ScalarType, count: usize },
    /// Packed aggregate: user structs and tuples.
    Struct(Arc<StructType>),
}

/// Aggregate declaration.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub dtype: DType,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self { name: name.into(), dtype }
    }
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Byte offset of field `index` in the packed layout.
    pub fn offset_of(&self, index: usize) -> usize {
        self.fields[..index].iter().map(|f| f.dtype.bytes()).sum()
    }
}

impl DType {
    pub const BOOL: DType = DType::Scalar(ScalarType::Bool);
    pub const INT: DType = DType::Scalar(ScalarType::Int);
    pub const UINT: DType = DType::Scalar(ScalarType::UInt);
    pub const LONG: DType = DType::Scalar(ScalarType::Long);
    pub const ULONG: DType = DType::Scalar(ScalarType::ULong);
    pub const FLOAT: DType = DType::Scalar(ScalarType::Float);

    pub fn vector(scalar: ScalarType, count: usize) -> Self {
        debug_assert!(VECTOR_WIDTHS.contains(&count), "unsupported vector width {count}");
        debug_assert!(!scalar.is_bool(), "bool vectors are not a device type");
        DType::Vector { scalar, count }
    }

    /// Named aggregate with the given fields.
    pub fn structure(name: impl Into<String>, fields: Vec<Field>) -> Self {
        DType::Struct(Arc::new(StructType { name: name.into(), fields }))
    }

    /// Tuple aggregate; the name is derived from the element names and fields are `v0`, `v1`, ...
    pub fn tuple(elements: &[DType]) -> Self {
        let mut name = String::from("tuple");
        for element in elements {
            name.push('_');
            name.push_str(&element.name());
        }
        name.push_str("_t");
        let fields = elements.iter().enumerate().map(|(i, dtype)| Field::new(format!("v{i}"), dtype.clone())).collect();
        Self::structure(name, fields)
    }

    /// Parses a scalar or vector spelling such as `uint` or `float4`.
    pub fn from_cl_name(name: &str) -> Option<Self> {
        if let Some(scalar) = ScalarType::from_cl_name(name) {
            return Some(DType::Scalar(scalar));
        }
        let split = name.find(|c: char| c.is_ascii_digit())?;
        let (base, width) = name.split_at(split);
        let scalar = ScalarType::from_cl_name(base).filter(|s| !s.is_bool())?;
        let count = width.parse::<usize>().ok().filter(|c| VECTOR_WIDTHS.contains(c))?;
        Some(DType::Vector { scalar, count })
    }

    pub fn name(&self) -> String {
        match self {
            DType::Scalar(s) => s.cl_name().to_string(),
            DType::Vector { scalar, count } => format!("{}{count}", scalar.cl_name()),
            DType::Struct(s) => s.name.clone(),
        }
    }

    /// Size in bytes of the device representation.
    ///
    /// Three-lane vectors occupy four lanes; aggregates are packed.
    pub fn bytes(&self) -> usize {
        match self {
            DType::Scalar(s) => s.bytes(),
            DType::Vector { scalar, count } => scalar.bytes() * if *count == 3 { 4 } else { *count },
            DType::Struct(s) => s.fields.iter().map(|f| f.dtype.bytes()).sum(),
        }
    }

    /// Component type of scalars and vectors.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            DType::Scalar(s) | DType::Vector { scalar: s, .. } => Some(*s),
            DType::Struct(_) => None,
        }
    }

    pub fn lanes(&self) -> usize {
        match self {
            DType::Vector { count, .. } => *count,
            _ => 1,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, DType::Struct(_))
    }

    /// Extensions the device must support, deduplicated.
    pub fn required_extensions(&self) -> SmallVec<[&'static str; 1]> {
        let mut out = SmallVec::new();
        self.collect_extensions(&mut out);
        out
    }

    fn collect_extensions(&self, out: &mut SmallVec<[&'static str; 1]>) {
        match self {
            DType::Scalar(s) | DType::Vector { scalar: s, .. } => {
                if let Some(ext) = s.required_extension()
                    && !out.contains(&ext)
                {
                    out.push(ext);
                }
            }
            DType::Struct(s) => s.fields.iter().for_each(|f| f.dtype.collect_extensions(out)),
        }
    }

    /// Type declaration text, for aggregates only.
    pub fn declaration(&self) -> Option<String> {
        let DType::Struct(s) = self else { return None };
        let mut decl = String::from("typedef struct __attribute__((packed)) {\n");
        for field in &s.fields {
            decl.push_str(&format!("    {} {};\n", field.dtype.name(), field.name));
        }
        decl.push_str(&format!("}} {};\n", s.name));
        Some(decl)
    }

    /// Aggregates that must be declared before this type can be used, in
    /// dependency order and ending with the type itself.
    pub fn declaration_order(&self) -> Vec<DType> {
        let mut order = Vec::new();
        self.visit_aggregates(&mut order);
        order
    }

    fn visit_aggregates(&self, order: &mut Vec<DType>) {
        if let DType::Struct(s) = self {
            for field in &s.fields {
                field.dtype.visit_aggregates(order);
            }
            if !order.contains(self) {
                order.push(self.clone());
            }
        }
    }
}

impl From<ScalarType> for DType {
    fn from(scalar: ScalarType) -> Self {
        DType::Scalar(scalar)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
