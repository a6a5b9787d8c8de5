use proptest::prelude::*;
use test_case::test_case;

use super::{Class, queue, scrambled, upload};
use crate::algorithm::{is_sorted, merge_sort_on_cpu, nth_element, sort, sort_by_key, stable_sort};
use crate::functional::{Function, Greater, Less};
use crate::iterator::DeviceIterator;

fn assert_sorted_permutation(mut input: Vec<i32>, output: Vec<i32>) {
    input.sort();
    assert_eq!(output, input);
}

/// Orders by the last decimal digit only, so most keys compare equal.
fn last_digit_less() -> Function<(i32, i32), i32> {
    Function::from_source("last_digit_less", "int last_digit_less(int a, int b) { return (a % 10) < (b % 10); }")
}

#[test_case(Class::Cpu, 0)]
#[test_case(Class::Cpu, 1)]
#[test_case(Class::Cpu, 2)]
#[test_case(Class::Cpu, 3)]
#[test_case(Class::Cpu, 4)]
#[test_case(Class::Cpu, 32)]
#[test_case(Class::Cpu, 33)]
#[test_case(Class::Cpu, 1000)]
#[test_case(Class::Gpu, 2)]
#[test_case(Class::Gpu, 3)]
#[test_case(Class::Gpu, 33)]
#[test_case(Class::Gpu, 1000)]
fn sort_ints(class: Class, count: usize) {
    let queue = queue(class);
    let host: Vec<i32> = scrambled(count, 2000).into_iter().map(|x| x - 1000).collect();
    let v = upload(&host, &queue);
    sort(&v.begin(), &v.end(), Less, &queue).unwrap();
    assert_sorted_permutation(host, v.to_vec(&queue).unwrap());
}

#[test]
fn radix_sort_orders_floats_across_sign() {
    let queue = queue(Class::Gpu);
    let host = vec![3.5f32, -0.25, 0.0, -7.0, 1e6, -1e6, 2.0, 0.5, -3.5, 42.0, -0.5, 8.0, 1.0, -2.0, 6.0, -6.0, 9.0, -9.0, 0.125, -0.125, 100.0, -100.0, 7.0, 5.0, 4.0, 3.0, -1.0, -4.0, -5.0, 11.0, 12.0, 13.0, -13.0, 14.0];
    let v = upload(&host, &queue);
    sort(&v.begin(), &v.end(), Less, &queue).unwrap();
    let mut expected = host.clone();
    expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(v.to_vec(&queue).unwrap(), expected);
}

#[test]
fn radix_sort_handles_unsigned_and_long_keys() {
    let queue = queue(Class::Gpu);
    let host: Vec<u32> = scrambled(500, 1 << 30).into_iter().map(|x| (x as u32) << 1).collect();
    let v = upload(&host, &queue);
    sort(&v.begin(), &v.end(), Less, &queue).unwrap();
    let mut expected = host.clone();
    expected.sort();
    assert_eq!(v.to_vec(&queue).unwrap(), expected);

    let longs: Vec<i64> = scrambled(200, 100_000).into_iter().map(|x| (x as i64 - 50_000) * 1_000_003).collect();
    let w = upload(&longs, &queue);
    sort(&w.begin(), &w.end(), Less, &queue).unwrap();
    let mut expected = longs.clone();
    expected.sort();
    assert_eq!(w.to_vec(&queue).unwrap(), expected);
}

#[test]
fn greater_sorts_descending() {
    let queue = queue(Class::Gpu);
    let host = scrambled(300, 50);
    let v = upload(&host, &queue);
    sort(&v.begin(), &v.end(), Greater, &queue).unwrap();
    let mut expected = host.clone();
    expected.sort_by(|a, b| b.cmp(a));
    assert_eq!(v.to_vec(&queue).unwrap(), expected);
}

#[test]
fn sort_of_subrange_leaves_the_rest() {
    let queue = queue(Class::Cpu);
    let v = upload(&[9, 8, 7, 6, 5, 4, 3, 2, 1, 0], &queue);
    let first = v.begin().advance(2);
    let last = v.begin().advance(8);
    sort(&first, &last, Less, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![9, 8, 2, 3, 4, 5, 6, 7, 1, 0]);
}

#[test_case(Class::Cpu, 20)]
#[test_case(Class::Gpu, 20)]
#[test_case(Class::Gpu, 100)]
fn custom_comparator_is_stable(class: Class, count: usize) {
    let queue = queue(class);
    let keys: Vec<i32> = scrambled(count, 1000);
    let order: Vec<i32> = (0..count as i32).collect();
    let k = upload(&keys, &queue);
    let v = upload(&order, &queue);
    sort_by_key(&k.begin(), &k.end(), &v.begin(), last_digit_less(), &queue).unwrap();

    let mut expected: Vec<(i32, i32)> = keys.iter().copied().zip(order).collect();
    expected.sort_by_key(|(key, _)| key % 10);
    let (expected_keys, expected_values): (Vec<i32>, Vec<i32>) = expected.into_iter().unzip();
    assert_eq!(k.to_vec(&queue).unwrap(), expected_keys);
    assert_eq!(v.to_vec(&queue).unwrap(), expected_values);
}

#[test_case(Class::Cpu, 3)]
#[test_case(Class::Cpu, 30)]
#[test_case(Class::Gpu, 1000)]
fn sort_by_key_carries_values(class: Class, count: usize) {
    let queue = queue(class);
    // Distinct keys so the permutation is unique.
    let keys: Vec<i32> = (0..count as i32).map(|i| (i * 7919) % count as i32).collect();
    let values: Vec<f32> = keys.iter().map(|&k| k as f32 * 0.5).collect();
    let k = upload(&keys, &queue);
    let v = upload(&values, &queue);
    sort_by_key(&k.begin(), &k.end(), &v.begin(), Less, &queue).unwrap();
    let sorted = k.to_vec(&queue).unwrap();
    assert_eq!(sorted, (0..count as i32).collect::<Vec<_>>());
    assert_eq!(v.to_vec(&queue).unwrap(), sorted.iter().map(|&k| k as f32 * 0.5).collect::<Vec<_>>());
}

#[test_case(100)]
#[test_case(512)]
#[test_case(513)]
#[test_case(3000)]
fn merge_sort_on_cpu_is_stable(count: usize) {
    let queue = queue(Class::Cpu);
    let host = scrambled(count, 100_000);
    let v = upload(&host, &queue);
    merge_sort_on_cpu(&v.begin(), &v.end(), last_digit_less(), &queue).unwrap();
    let mut expected = host.clone();
    expected.sort_by_key(|x| x % 10);
    assert_eq!(v.to_vec(&queue).unwrap(), expected);
}

#[test_case(Class::Cpu)]
#[test_case(Class::Gpu)]
fn stable_sort_descending(class: Class) {
    let queue = queue(class);
    let host = scrambled(700, 40);
    let v = upload(&host, &queue);
    stable_sort(&v.begin(), &v.end(), Greater, &queue).unwrap();
    assert!(is_sorted(&v.begin(), &v.end(), Greater, &queue).unwrap());
    let mut expected = host.clone();
    expected.sort_by(|a, b| b.cmp(a));
    assert_eq!(v.to_vec(&queue).unwrap(), expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn sort_matches_host(host in prop::collection::vec(any::<i32>(), 0..200)) {
        let queue = queue(Class::Gpu);
        let v = upload(&host, &queue);
        sort(&v.begin(), &v.end(), Less, &queue).unwrap();
        let mut expected = host.clone();
        expected.sort();
        prop_assert_eq!(v.to_vec(&queue).unwrap(), expected);
    }
}

fn assert_selected(host: &[i32], output: &[i32], n: usize) {
    let mut sorted = host.to_vec();
    sorted.sort();
    assert_eq!(output[n], sorted[n]);
    assert!(output[..n].iter().all(|x| *x <= output[n]));
    assert!(output[n + 1..].iter().all(|x| *x >= output[n]));
    let mut permutation = output.to_vec();
    permutation.sort();
    assert_eq!(permutation, sorted);
}

#[test_case(Class::Cpu, 20, 7)]
#[test_case(Class::Cpu, 500, 0)]
#[test_case(Class::Gpu, 500, 250)]
#[test_case(Class::Gpu, 500, 499)]
#[test_case(Class::Gpu, 3000, 1234)]
fn nth_element_places_the_sorted_value(class: Class, size: usize, n: usize) {
    let queue = queue(class);
    let host = scrambled(size, 50);
    let v = upload(&host, &queue);
    nth_element(&v.begin(), &v.begin().advance(n as isize), &v.end(), Less, &queue).unwrap();
    assert_selected(&host, &v.to_vec(&queue).unwrap(), n);
}

#[test]
fn nth_element_at_the_end_is_a_no_op() {
    let queue = queue(Class::Cpu);
    let v = upload(&[3, 1, 2], &queue);
    nth_element(&v.begin(), &v.end(), &v.end(), Less, &queue).unwrap();
    assert_eq!(v.to_vec(&queue).unwrap(), vec![3, 1, 2]);
}
