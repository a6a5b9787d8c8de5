use proptest::prelude::*;

use crate::*;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Particle {
    x: f32,
    y: f32,
    id: u32,
}

adapt_struct!(Particle, "Particle", { x: f32, y: f32, id: u32 });

#[test]
fn adapted_struct_declaration() {
    assert_eq!(type_name::<Particle>(), "Particle");
    assert_eq!(Particle::size(), 12);
    assert_eq!(
        Particle::dtype().declaration().unwrap(),
        "typedef struct __attribute__((packed)) {\n    float x;\n    float y;\n    uint id;\n} Particle;\n"
    );
}

#[test]
fn adapted_struct_bytes() {
    let p = Particle { x: 1.5, y: -2.0, id: 7 };
    let bytes = encode_slice(&[p]);
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[8..], &7u32.to_le_bytes());
    assert_eq!(decode_slice::<Particle>(&bytes), vec![p]);
}

#[test]
fn value_encoding_matches_element_encoding() {
    let v = (3i16, [1.0f32, 2.0]);
    let mut direct = Vec::new();
    v.encode(&mut direct);
    assert_eq!(v.to_value().to_bytes(), direct);
    assert_eq!(v.to_value().dtype(), <(i16, [f32; 2])>::dtype());
}

#[test]
fn scalar_decode_reads_only_its_own_width() {
    assert_eq!(i32::decode(&[1, 0, 0, 0, 9, 9]), 1);
    assert_eq!(u16::decode(&[0xff, 0x7f, 0xff]), 0x7fff);
    assert_eq!(f64::decode(&2.5f64.to_le_bytes()), 2.5);
    assert_eq!(i8::decode(&[0x80]), -128);
}

#[test]
fn zero_values() {
    assert_eq!(Value::zero(&DType::UINT), Value::UInt(ScalarType::UInt, 0));
    assert_eq!(Value::zero(&DType::vector(ScalarType::Float, 3)).to_bytes(), vec![0u8; 16]);
}

#[test]
fn value_decode_inverts_encode() {
    let p = Particle { x: 0.25, y: 8.0, id: 3 };
    let value = p.to_value();
    assert_eq!(Value::decode(&Particle::dtype(), &value.to_bytes()), value);
    assert_eq!(Value::decode(&DType::Scalar(ScalarType::Char), &[0xff]), Value::Int(ScalarType::Char, -1));
    assert_eq!(Value::decode(&DType::Scalar(ScalarType::UShort), &[0xff, 0xff]), Value::UInt(ScalarType::UShort, 65535));
}

proptest! {
    #[test]
    fn bytes_preserve_values(values in prop::collection::vec((any::<i64>(), any::<u8>(), any::<bool>()), 0..64)) {
        let bytes = encode_slice(&values);
        prop_assert_eq!(bytes.len(), values.len() * 10);
        prop_assert_eq!(decode_slice::<(i64, u8, bool)>(&bytes), values);
    }

    #[test]
    fn declared_size_matches_encoding(dtype in DType::generator()) {
        prop_assert_eq!(Value::zero(&dtype).to_bytes().len(), dtype.bytes());
        let order = dtype.declaration_order();
        if dtype.is_struct() {
            prop_assert_eq!(order.last(), Some(&dtype));
        }
    }
}
