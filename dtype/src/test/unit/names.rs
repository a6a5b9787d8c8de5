use test_case::test_case;

use crate::*;

#[test_case(DType::Scalar(ScalarType::UChar), "uchar"; "uchar")]
#[test_case(DType::Scalar(ScalarType::ULong), "ulong"; "ulong")]
#[test_case(DType::vector(ScalarType::Float, 4), "float4"; "float4")]
#[test_case(DType::vector(ScalarType::Int, 16), "int16"; "int16")]
#[test_case(DType::tuple(&[DType::INT, DType::FLOAT]), "tuple_int_float_t"; "pair")]
fn spelling(dtype: DType, expected: &str) {
    assert_eq!(dtype.name(), expected);
    assert_eq!(dtype.to_string(), expected);
}

#[test]
fn host_types_map_to_device_names() {
    assert_eq!(type_name::<i8>(), "char");
    assert_eq!(type_name::<u32>(), "uint");
    assert_eq!(type_name::<f64>(), "double");
    assert_eq!(type_name::<bool>(), "bool");
    assert_eq!(type_name::<[f32; 2]>(), "float2");
    assert_eq!(type_name::<(u32, [i16; 4])>(), "tuple_uint_short4_t");
    assert_eq!(type_name::<(u32, (f32, i8), u8)>(), "tuple_uint_tuple_float_char_t_uchar_t");
}

#[test]
fn names_are_stable_across_calls() {
    let first = DType::tuple(&[DType::LONG, DType::vector(ScalarType::Double, 2)]);
    let second = DType::tuple(&[DType::LONG, DType::vector(ScalarType::Double, 2)]);
    assert_eq!(first, second);
    assert_eq!(first.name(), second.name());
}

#[test_case("float4", Some(DType::vector(ScalarType::Float, 4)))]
#[test_case("uint", Some(DType::UINT))]
#[test_case("size_t", Some(DType::ULONG))]
#[test_case("bool4", None)]
#[test_case("int5", None)]
#[test_case("particle", None)]
fn parse_spelling(name: &str, expected: Option<DType>) {
    assert_eq!(DType::from_cl_name(name), expected);
}

#[test]
fn three_lane_vectors_are_padded() {
    assert_eq!(DType::vector(ScalarType::Float, 3).bytes(), 16);
    assert_eq!(DType::vector(ScalarType::Short, 8).bytes(), 16);
}

#[test]
fn tuple_declaration_is_packed() {
    let pair = DType::tuple(&[DType::Scalar(ScalarType::Char), DType::INT]);
    assert_eq!(pair.bytes(), 5);
    assert_eq!(
        pair.declaration().unwrap(),
        "typedef struct __attribute__((packed)) {\n    char v0;\n    int v1;\n} tuple_char_int_t;\n"
    );
    assert!(DType::FLOAT.declaration().is_none());
}

#[test]
fn declaration_order_puts_dependencies_first() {
    let inner = DType::tuple(&[DType::INT, DType::FLOAT]);
    let outer = DType::tuple(&[inner.clone(), DType::UINT, inner.clone()]);
    assert_eq!(outer.declaration_order(), vec![inner, outer.clone()]);
    assert!(DType::UINT.declaration_order().is_empty());
}

#[test]
fn double_requires_fp64() {
    assert_eq!(DType::Scalar(ScalarType::Double).required_extensions().as_slice(), &["cl_khr_fp64"]);
    let nested = DType::tuple(&[DType::vector(ScalarType::Double, 2), DType::Scalar(ScalarType::Double)]);
    assert_eq!(nested.required_extensions().as_slice(), &["cl_khr_fp64"]);
    assert!(DType::FLOAT.required_extensions().is_empty());
}

#[test]
fn struct_field_offsets() {
    let DType::Struct(s) = DType::tuple(&[DType::Scalar(ScalarType::UChar), DType::LONG, DType::FLOAT]) else {
        unreachable!()
    };
    assert_eq!(s.offset_of(0), 0);
    assert_eq!(s.offset_of(1), 1);
    assert_eq!(s.offset_of(2), 9);
    assert_eq!(s.field("v2").map(|(i, _)| i), Some(2));
}
