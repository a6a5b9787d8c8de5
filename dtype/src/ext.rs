//! Host element types and their device representation.

use std::fmt;

use crate::{DType, ScalarType, Value};

/// Host types with a device-language counterpart.
pub trait HasDType {
    fn dtype() -> DType;
}

/// Device spelling of `T`.
pub fn type_name<T: HasDType>() -> String {
    T::dtype().name()
}

/// Host values that can live in device buffers.
///
/// Encoding is little-endian and packed, which is the layout the type
/// registry declares on the device side.
pub trait Element: HasDType + Copy + Send + Sync + fmt::Debug + 'static {
    fn size() -> usize {
        Self::dtype().bytes()
    }

    fn encode(&self, out: &mut Vec<u8>);

    /// Reads a value from the front of `bytes`, which must hold at least `size()` bytes.
    fn decode(bytes: &[u8]) -> Self;

    fn to_value(&self) -> Value;
}

/// Elements that are device scalars and may form built-in vectors.
pub trait ScalarElement: Element + PartialOrd {
    const SCALAR: ScalarType;
}

pub fn encode_slice<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::size());
    values.iter().for_each(|v| v.encode(&mut out));
    out
}

pub fn decode_slice<T: Element>(bytes: &[u8]) -> Vec<T> {
    let size = T::size();
    bytes.chunks_exact(size).map(T::decode).collect()
}

macro_rules! impl_scalar_element {
    ($($ty:ty => $scalar:ident, $ctor:ident as $repr:ty);* $(;)?) => {$(
        impl HasDType for $ty {
            fn dtype() -> DType {
                DType::Scalar(ScalarType::$scalar)
            }
        }

        impl Element for $ty {
            fn size() -> usize {
                std::mem::size_of::<$ty>()
            }

            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn decode(bytes: &[u8]) -> Self {
                const SIZE: usize = std::mem::size_of::<$ty>();
                let mut raw = [0u8; SIZE];
                raw.copy_from_slice(&bytes[..SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            fn to_value(&self) -> Value {
                Value::$ctor(ScalarType::$scalar, *self as $repr)
            }
        }

        impl ScalarElement for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;
        }
    )*};
}

impl_scalar_element! {
    i8 => Char, Int as i64;
    u8 => UChar, UInt as u64;
    i16 => Short, Int as i64;
    u16 => UShort, UInt as u64;
    i32 => Int, Int as i64;
    u32 => UInt, UInt as u64;
    i64 => Long, Int as i64;
    u64 => ULong, UInt as u64;
    f32 => Float, Float as f64;
    f64 => Double, Float as f64;
}

impl HasDType for bool {
    fn dtype() -> DType {
        DType::Scalar(ScalarType::Bool)
    }
}

impl Element for bool {
    fn size() -> usize {
        1
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ScalarElement for bool {
    const SCALAR: ScalarType = ScalarType::Bool;
}

// Host arrays map onto built-in vectors. Three-lane vectors are padded to four
// lanes on the device, so `[T; 3]` is deliberately not an element type.
macro_rules! impl_vector_element {
    ($($n:literal),*) => {$(
        impl<T: ScalarElement> HasDType for [T; $n] {
            fn dtype() -> DType {
                DType::vector(T::SCALAR, $n)
            }
        }

        impl<T: ScalarElement> Element for [T; $n] {
            fn size() -> usize {
                T::size() * $n
            }

            fn encode(&self, out: &mut Vec<u8>) {
                self.iter().for_each(|lane| lane.encode(out));
            }

            fn decode(bytes: &[u8]) -> Self {
                let size = T::size();
                std::array::from_fn(|i| T::decode(&bytes[i * size..]))
            }

            fn to_value(&self) -> Value {
                Value::Vector(T::SCALAR, self.iter().map(Element::to_value).collect())
            }
        }
    )*};
}

impl_vector_element!(2, 4, 8, 16);

impl<A: Element, B: Element> HasDType for (A, B) {
    fn dtype() -> DType {
        DType::tuple(&[A::dtype(), B::dtype()])
    }
}

impl<A: Element, B: Element> Element for (A, B) {
    fn size() -> usize {
        A::size() + B::size()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
    }

    fn decode(bytes: &[u8]) -> Self {
        (A::decode(bytes), B::decode(&bytes[A::size()..]))
    }

    fn to_value(&self) -> Value {
        struct_value(Self::dtype(), vec![self.0.to_value(), self.1.to_value()])
    }
}

impl<A: Element, B: Element, C: Element> HasDType for (A, B, C) {
    fn dtype() -> DType {
        DType::tuple(&[A::dtype(), B::dtype(), C::dtype()])
    }
}

impl<A: Element, B: Element, C: Element> Element for (A, B, C) {
    fn size() -> usize {
        A::size() + B::size() + C::size()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
        self.2.encode(out);
    }

    fn decode(bytes: &[u8]) -> Self {
        let b = A::size();
        let c = b + B::size();
        (A::decode(bytes), B::decode(&bytes[b..]), C::decode(&bytes[c..]))
    }

    fn to_value(&self) -> Value {
        struct_value(Self::dtype(), vec![self.0.to_value(), self.1.to_value(), self.2.to_value()])
    }
}

#[doc(hidden)]
pub fn struct_value(dtype: DType, fields: Vec<Value>) -> Value {
    match dtype {
        DType::Struct(s) => Value::Struct(s, fields),
        other => unreachable!("aggregate element reported non-aggregate type {other}"),
    }
}

/// Makes a `#[repr(C)]` host struct usable as a device element.
///
/// The struct must not contain implicit padding: the device declaration is
/// packed, and a debug build asserts that the host size matches.
///
/// ```
/// # use tessera_dtype::{adapt_struct, type_name, Element};
/// #[repr(C)]
/// #[derive(Debug, Clone, Copy)]
/// struct Particle {
///     x: f32,
///     y: f32,
/// }
///
/// adapt_struct!(Particle, "Particle", { x: f32, y: f32 });
///
/// assert_eq!(type_name::<Particle>(), "Particle");
/// assert_eq!(Particle::size(), 8);
/// ```
#[macro_export]
macro_rules! adapt_struct {
    ($ty:ident, $name:literal, { $($field:ident : $fty:ty),+ $(,)? }) => {
        impl $crate::HasDType for $ty {
            fn dtype() -> $crate::DType {
                static DTYPE: ::std::sync::OnceLock<$crate::DType> = ::std::sync::OnceLock::new();
                DTYPE
                    .get_or_init(|| {
                        let dtype = $crate::DType::structure(
                            $name,
                            vec![$($crate::Field::new(stringify!($field), <$fty as $crate::HasDType>::dtype())),+],
                        );
                        debug_assert_eq!(
                            ::std::mem::size_of::<$ty>(),
                            dtype.bytes(),
                            "struct `{}` has implicit padding and cannot match its packed device declaration",
                            $name
                        );
                        dtype
                    })
                    .clone()
            }
        }

        impl $crate::Element for $ty {
            fn encode(&self, out: &mut Vec<u8>) {
                $(<$fty as $crate::Element>::encode(&self.$field, out);)+
            }

            fn decode(bytes: &[u8]) -> Self {
                let mut offset = 0usize;
                $(
                    let $field = <$fty as $crate::Element>::decode(&bytes[offset..]);
                    offset += <$fty as $crate::Element>::size();
                )+
                let _ = offset;
                Self { $($field),+ }
            }

            fn to_value(&self) -> $crate::Value {
                $crate::ext::struct_value(
                    <Self as $crate::HasDType>::dtype(),
                    vec![$($crate::Element::to_value(&self.$field)),+],
                )
            }
        }
    };
}
