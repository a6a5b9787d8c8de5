use crate::*;
use proptest::prelude::*;

impl ScalarType {
    pub fn generator() -> impl Strategy<Value = Self> {
        any::<Self>()
    }
}

impl DType {
    /// Scalars, vectors and tuples nested up to two levels deep.
    pub fn generator() -> impl Strategy<Value = Self> {
        let leaf = prop_oneof![
            ScalarType::generator().prop_map(DType::Scalar),
            (ScalarType::generator().prop_filter("bool vectors", |s| !s.is_bool()), proptest::sample::select(VECTOR_WIDTHS.to_vec()))
                .prop_map(|(scalar, count)| DType::vector(scalar, count)),
        ];
        leaf.prop_recursive(2, 8, 3, |inner| prop::collection::vec(inner, 1..=3).prop_map(|elems| DType::tuple(&elems)))
    }
}
