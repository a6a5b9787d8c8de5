use std::fmt;

use tessera_dtype::Element;
use test_case::test_case;

use super::{Class, queue, upload};
use crate::algorithm::{
    adjacent_difference, copy, copy_async, copy_from_host, copy_n, copy_to_host, fill, fill_n, gather, generate,
    generate_n, iota, reverse, reverse_copy, rotate, rotate_copy, scatter, swap_ranges, transform, transform2,
    transform_async,
};
use crate::error::Error;
use crate::functional::{Function, Minus, Plus};
use crate::iterator::{Counting, DeviceIterator, Transform};
use crate::lambda::_1;
use crate::vector::Vector;

#[test_case(Class::Cpu)]
#[test_case(Class::Gpu)]
fn copy_between_vectors(class: Class) {
    let queue = queue(class);
    let host: Vec<i32> = (0..100).collect();
    let v = upload(&host, &queue);
    let out = Vector::<i32>::with_len(100, queue.context()).unwrap();
    let end = copy(&v.begin(), &v.end(), &out.begin(), &queue).unwrap();
    assert_eq!(end, out.end());
    assert_eq!(out.to_vec(&queue).unwrap(), host);
}

#[test]
fn overlapping_copy_behaves_like_memmove() {
    let queue = queue(Class::Gpu);
    let v = upload(&[0, 1, 2, 3, 4, 5, 6, 7], &queue);
    copy(&v.begin(), &v.begin().advance(6), &v.begin().advance(2), &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![0, 1, 0, 1, 2, 3, 4, 5]);

    let v = upload(&[0, 1, 2, 3, 4, 5, 6, 7], &queue);
    copy(&v.begin().advance(2), &v.end(), &v.begin(), &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![2, 3, 4, 5, 6, 7, 6, 7]);
}

#[test]
fn copy_onto_itself_is_a_no_op() {
    let queue = queue(Class::Cpu);
    let v = upload(&[9, 8, 7], &queue);
    let end = copy(&v.begin(), &v.end(), &v.begin(), &queue).unwrap();
    assert_eq!(end, v.end());
    assert_eq!(v.to_vec(&queue).unwrap(), vec![9, 8, 7]);
}

#[test]
fn copy_n_and_async_copy() {
    let queue = queue(Class::Gpu);
    let v = upload(&[1.5f32, 2.5, 3.5, 4.5], &queue);
    let out = Vector::<f32>::with_len(4, queue.context()).unwrap();
    let end = copy_n(&v.begin(), 2, &out.begin(), &queue).unwrap();
    assert_eq!(out.begin().distance(&end), 2);

    let future = copy_async(&v.begin().advance(2), &v.end(), &out.begin().advance(2), &queue).unwrap();
    assert_eq!(future.get().unwrap(), out.end());
    assert_eq!(out.to_vec(&queue).unwrap(), vec![1.5, 2.5, 3.5, 4.5]);
}

#[test]
fn host_transfers() {
    let queue = queue(Class::Cpu);
    let out = Vector::<u32>::with_len(6, queue.context()).unwrap();
    let end = copy_from_host(&[5, 6, 7], &out.begin().advance(3), &queue).unwrap();
    assert_eq!(end, out.end());
    assert_eq!(copy_to_host(&out.begin().advance(3), &out.end(), &queue).unwrap(), vec![5, 6, 7]);

    let squares = Transform::new(Counting::new(0u32), _1 * _1);
    assert_eq!(copy_to_host(&squares, &squares.advance(5), &queue).unwrap(), vec![0, 1, 4, 9, 16]);
}

#[test]
fn fill_and_iota() {
    let queue = queue(Class::Gpu);
    let v = Vector::<i64>::with_len(10, queue.context()).unwrap();
    fill(&v.begin(), &v.end(), -3, &queue).unwrap();
    fill_n(&v.begin().advance(4), 2, 11, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![-3, -3, -3, -3, 11, 11, -3, -3, -3, -3]);

    iota(&v.begin(), &v.end(), 100, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), (100..110).collect::<Vec<_>>());
}

#[test]
fn errors_clone_with_their_source() {
    let error = Error::System { source: tessera_runtime::Error::UnsupportedDevice { device: "cuda".into() } };
    let copy = error.clone();
    assert_eq!(copy.to_string(), error.to_string());
    assert!(copy.to_string().contains("cuda"));
}

#[test]
fn fill_needs_storage() {
    let queue = queue(Class::Cpu);
    let numbers = Counting::new(0i32);
    let result = fill(&numbers, &numbers.advance(3), 1, &queue);
    assert!(matches!(result, Err(Error::NoStorage { .. })), "{result:?}");
}

#[test]
fn gather_then_scatter_round_trips() {
    let queue = queue(Class::Gpu);
    let values = upload(&[10, 20, 30, 40, 50], &queue);
    let map = upload(&[4u32, 0, 3, 1, 2], &queue);
    let gathered = Vector::<i32>::with_len(5, queue.context()).unwrap();
    gather(&map.begin(), &map.end(), &values.begin(), &gathered.begin(), &queue).unwrap();
    assert_eq!(gathered.to_vec(&queue).unwrap(), vec![50, 10, 40, 20, 30]);

    let restored = Vector::<i32>::with_len(5, queue.context()).unwrap();
    scatter(&gathered.begin(), &gathered.end(), &map.begin(), &restored.begin(), &queue).unwrap();
    assert_eq!(restored.to_vec(&queue).unwrap(), vec![10, 20, 30, 40, 50]);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(2)]
#[test_case(7)]
#[test_case(64)]
fn reverse_in_place(size: i32) {
    let queue = queue(Class::Gpu);
    let v = upload(&(0..size).collect::<Vec<_>>(), &queue);
    reverse(&v.begin(), &v.end(), &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), (0..size).rev().collect::<Vec<_>>());
}

#[test]
fn reverse_copy_into_overlapping_output() {
    let queue = queue(Class::Cpu);
    let v = upload(&[1, 2, 3, 4, 5], &queue);
    let end = reverse_copy(&v.begin(), &v.end(), &v.begin(), &queue).unwrap();
    assert_eq!(end, v.end());
    assert_eq!(v.to_vec(&queue).unwrap(), vec![5, 4, 3, 2, 1]);
}

#[test]
fn swap_ranges_exchanges() {
    let queue = queue(Class::Gpu);
    let a = upload(&[1, 2, 3], &queue);
    let b = upload(&[7, 8, 9, 10], &queue);
    let end = swap_ranges(&a.begin(), &a.end(), &b.begin(), &queue).unwrap();
    assert_eq!(b.begin().distance(&end), 3);
    assert_eq!(a.to_vec(&queue).unwrap(), vec![7, 8, 9]);
    assert_eq!(b.to_vec(&queue).unwrap(), vec![1, 2, 3, 10]);
}

#[test_case(Class::Cpu)]
#[test_case(Class::Gpu)]
fn transforms(class: Class) {
    let queue = queue(class);
    let a = upload(&[1, 2, 3, 4], &queue);
    let b = upload(&[10, 20, 30, 40], &queue);
    let out = Vector::<i32>::with_len(4, queue.context()).unwrap();

    transform(&a.begin(), &a.end(), &out.begin(), _1 * 3 + 1, &queue).unwrap();
    assert_eq!(out.to_vec(&queue).unwrap(), vec![4, 7, 10, 13]);

    transform2(&a.begin(), &a.end(), &b.begin(), &out.begin(), Plus, &queue).unwrap();
    assert_eq!(out.to_vec(&queue).unwrap(), vec![11, 22, 33, 44]);

    let future = transform_async(&b.begin(), &b.end(), &b.begin(), -_1, &queue).unwrap();
    assert_eq!(future.get().unwrap(), b.end());
    assert_eq!(b.to_vec(&queue).unwrap(), vec![-10, -20, -30, -40]);
}

#[test]
fn adjacent_difference_in_place() {
    let queue = queue(Class::Gpu);
    let v = upload(&[1, 4, 9, 16, 25], &queue);
    adjacent_difference(&v.begin(), &v.end(), &v.begin(), Minus, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![1, 3, 5, 7, 9]);
}

#[test]
fn vector_element_access() {
    let queue = queue(Class::Cpu);
    let v = upload(&[1u8, 2, 3], &queue);
    v.set(1, 42, &queue).unwrap();
    assert_eq!(v.get(1, &queue).unwrap(), 42);
    assert!(matches!(v.get(3, &queue), Err(Error::IndexOutOfRange { index: 3, len: 3 })));
    assert!(v.set(7, 0, &queue).is_err());
}

#[test]
fn vector_resize_keeps_prefix() {
    let queue = queue(Class::Cpu);
    let mut v = upload(&[1, 2, 3], &queue);
    v.resize(2, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![1, 2]);
    v.resize(6, &queue).unwrap();
    assert_eq!(v.len(), 6);
    assert_eq!(copy_to_host(&v.begin(), &v.begin().advance(2), &queue).unwrap(), vec![1, 2]);

    let mut empty = upload::<i32>(&[], &queue);
    assert!(empty.is_empty());
    empty.resize(4, &queue).unwrap();
    fill(&empty.begin(), &empty.end(), 5, &queue).unwrap();
    assert_eq!(empty.to_vec(&queue).unwrap(), vec![5; 4]);
}

#[test]
fn default_queue_entry_points() {
    let queue = crate::system::default_queue().unwrap();
    let v = upload(&[4, 8, 15, 16, 23, 42], &queue);
    let out = Vector::<i32>::with_len(6, queue.context()).unwrap();
    crate::algorithm::transform_default(&v.begin(), &v.end(), &out.begin(), _1 + 1).unwrap();
    crate::system::finish().unwrap();
    assert_eq!(out.to_vec(&queue).unwrap(), vec![5, 9, 16, 17, 24, 43]);
    assert_eq!(crate::algorithm::count_if_default(&out.begin(), &out.end(), _1.gt(16)).unwrap(), 3);
}

#[test_case(Class::Cpu)]
#[test_case(Class::Gpu)]
fn copy_through_an_adaptor_onto_its_own_buffer(class: Class) {
    let queue = queue(class);
    let v = upload(&[1, 2, 3, 4, 5, 6], &queue);
    let tens = Transform::new(v.begin(), _1 * 10);
    copy(&tens, &tens.advance(5), &v.begin().advance(1), &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![1, 10, 20, 30, 40, 50]);

    let v = upload(&[1, 2, 3, 4, 5], &queue);
    let plus = Transform::new(v.begin(), _1 + 1);
    reverse_copy(&plus, &plus.advance(4), &v.begin().advance(1), &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![1, 5, 4, 3, 2]);
}

fn round_trips<T: Element + PartialEq + fmt::Debug>(values: Vec<T>) {
    let queue = queue(Class::Cpu);
    let count = values.len();
    let device = upload(&values, &queue);
    let gathered = Vector::<T>::with_len(count, queue.context()).unwrap();
    let identity = Counting::new(0u32);
    gather(&identity, &identity.advance(count as isize), &device.begin(), &gathered.begin(), &queue).unwrap();
    assert_eq!(gathered.to_vec(&queue).unwrap(), values);

    let copied = Vector::<T>::with_len(count, queue.context()).unwrap();
    copy(&gathered.begin(), &gathered.end(), &copied.begin(), &queue).unwrap();
    assert_eq!(copy_to_host(&copied.begin(), &copied.end(), &queue).unwrap(), values);
}

#[test_case(|| round_trips(vec![i8::MIN, -1, 0, i8::MAX]) ; "char")]
#[test_case(|| round_trips(vec![0u8, 1, 200, u8::MAX]) ; "uchar")]
#[test_case(|| round_trips(vec![i16::MIN, -300, 0, i16::MAX]) ; "short")]
#[test_case(|| round_trips(vec![0u16, 513, u16::MAX]) ; "ushort")]
#[test_case(|| round_trips(vec![i32::MIN, -7, 0, i32::MAX]) ; "int")]
#[test_case(|| round_trips(vec![0u32, 70_000, u32::MAX]) ; "uint")]
#[test_case(|| round_trips(vec![i64::MIN, -1, 1 << 40, i64::MAX]) ; "long")]
#[test_case(|| round_trips(vec![0u64, 1 << 63, u64::MAX]) ; "ulong")]
#[test_case(|| round_trips(vec![-1.5f32, 0.0, 3.25, f32::MAX]) ; "float")]
#[test_case(|| round_trips(vec![-1.0e300f64, 0.5, f64::MIN_POSITIVE]) ; "double")]
#[test_case(|| round_trips(vec![true, false, false, true]) ; "bool")]
#[test_case(|| round_trips(vec![[1i8, -2], [i8::MAX, i8::MIN]]) ; "char2")]
#[test_case(|| round_trips(vec![[1u8, 2, 3, 4], [255, 0, 128, 7]]) ; "uchar4")]
#[test_case(|| round_trips(vec![[-1i16, 2, -3, 4, -5, 6, -7, 8]]) ; "short8")]
#[test_case(|| round_trips(vec![[9u16; 16], [u16::MAX; 16]]) ; "ushort16")]
#[test_case(|| round_trips(vec![[i32::MIN, i32::MAX], [0, -1]]) ; "int2")]
#[test_case(|| round_trips(vec![[1u32, 2, 3, 4], [u32::MAX, 0, 5, 6]]) ; "uint4")]
#[test_case(|| round_trips(vec![[i64::MIN, 0, 1, 2, 3, 4, 5, i64::MAX]]) ; "long8")]
#[test_case(|| round_trips(vec![[u64::MAX; 16], [3u64; 16]]) ; "ulong16")]
#[test_case(|| round_trips(vec![[0.5f32, -0.5], [1.0e10, -1.0e-10]]) ; "float2")]
#[test_case(|| round_trips(vec![[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]]) ; "float8")]
#[test_case(|| round_trips(vec![[0.25f64, -8.0, 1.0e-300, 2.0]]) ; "double4")]
#[test_case(|| round_trips(vec![[1.5f64; 16]]) ; "double16")]
#[test_case(|| round_trips(vec![(1i32, 2.5f32), (-3, -0.5)]) ; "int_float_pair")]
#[test_case(|| round_trips(vec![(7u8, i64::MIN), (0, 42)]) ; "padded_pair")]
#[test_case(|| round_trips(vec![(1.0f32, 2u16, -3i8), (0.0, u16::MAX, i8::MIN)]) ; "triple")]
#[test_case(|| round_trips(vec![([1u32, 2], 0.5f64), ([3, 4], -2.0)]) ; "vector_in_pair")]
fn every_element_type_round_trips(check: fn()) {
    check();
}

#[test_case(Class::Cpu)]
#[test_case(Class::Gpu)]
fn generate_calls_the_device_function_per_element(class: Class) {
    let queue = queue(class);
    let v = Vector::<i32>::with_len(6, queue.context()).unwrap();
    let seven = Function::<(), i32>::from_source("seven", "int seven() { return 7; }");
    generate(&v.begin(), &v.end(), seven, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![7; 6]);

    let thirds = Function::<(), i32>::from_source("thirds", "int thirds() { return (int)get_global_id(0) * 3; }");
    let end = generate_n(&v.begin(), 4, thirds, &queue).unwrap();
    assert_eq!(end, v.begin().advance(4));
    assert_eq!(v.to_vec(&queue).unwrap(), vec![0, 3, 6, 9, 7, 7]);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(3)]
#[test_case(7)]
#[test_case(8)]
fn rotate_matches_slice_rotate(middle: usize) {
    let queue = queue(Class::Gpu);
    let host: Vec<i32> = (0..8).collect();
    let v = upload(&host, &queue);
    let moved = rotate(&v.begin(), &v.begin().advance(middle as isize), &v.end(), &queue).unwrap();
    let mut expected = host;
    expected.rotate_left(middle);
    assert_eq!(v.to_vec(&queue).unwrap(), expected);
    assert_eq!(v.begin().distance(&moved), 8 - middle);
}

#[test]
fn rotate_copy_from_an_adaptor() {
    let queue = queue(Class::Cpu);
    let numbers = Counting::new(10u32);
    let out = Vector::<u32>::with_len(5, queue.context()).unwrap();
    let end = rotate_copy(&numbers, &numbers.advance(2), &numbers.advance(5), &out.begin(), &queue).unwrap();
    assert_eq!(end, out.end());
    assert_eq!(out.to_vec(&queue).unwrap(), vec![12, 13, 14, 10, 11]);

    let v = upload(&[1, 2, 3, 4, 5], &queue);
    rotate_copy(&v.begin(), &v.begin().advance(1), &v.end(), &v.begin(), &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![2, 3, 4, 5, 1]);
}
