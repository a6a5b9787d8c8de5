use test_case::test_case;

use tessera_dtype::ScalarType;

use super::{Class, queue};
use crate::algorithm::{
    Strategy, extrema_strategy, predicate_strategy, reduce_strategy, scan_strategy, sort_strategy,
};
use crate::config::Config;
use crate::functional::SortOrder;

#[test_case(Class::Cpu, 1023, Strategy::Serial; "cpu below threshold")]
#[test_case(Class::Cpu, 1024, Strategy::Chunked; "cpu at threshold")]
#[test_case(Class::Gpu, 31, Strategy::Serial; "gpu below threshold")]
#[test_case(Class::Gpu, 32, Strategy::Atomic; "gpu at threshold")]
fn predicate_thresholds(class: Class, count: usize, expected: Strategy) {
    let queue = queue(class);
    assert_eq!(predicate_strategy(queue.device(), count, &Config::default()), expected);
}

#[test_case(Class::Cpu, 1_000_000, Strategy::Serial; "cpu always serial")]
#[test_case(Class::Gpu, 127, Strategy::Serial; "gpu below two blocks")]
#[test_case(Class::Gpu, 128, Strategy::BlockReduce; "gpu two blocks")]
fn reduce_selection(class: Class, count: usize, expected: Strategy) {
    // The GPU test device caps work-groups at 64 items.
    let queue = queue(class);
    assert_eq!(reduce_strategy(queue.device(), count, &Config::default()), expected);
}

#[test]
fn scan_selection() {
    assert_eq!(scan_strategy(queue(Class::Cpu).device(), 5000), Strategy::Serial);
    assert_eq!(scan_strategy(queue(Class::Gpu).device(), 1), Strategy::Serial);
    assert_eq!(scan_strategy(queue(Class::Gpu).device(), 2), Strategy::BlockScan);
}

#[test_case(2, None, None, Strategy::FixedSort; "pair")]
#[test_case(3, Some(SortOrder::Ascending), Some(ScalarType::Int), Strategy::FixedSort; "triple")]
#[test_case(32, Some(SortOrder::Ascending), Some(ScalarType::Int), Strategy::InsertionSort; "small")]
#[test_case(33, Some(SortOrder::Ascending), Some(ScalarType::Int), Strategy::RadixSort; "radix")]
#[test_case(33, Some(SortOrder::Descending), Some(ScalarType::Float), Strategy::RadixSort; "descending radix")]
#[test_case(1000, None, Some(ScalarType::Int), Strategy::InsertionSort; "custom comparator")]
#[test_case(1000, Some(SortOrder::Ascending), None, Strategy::InsertionSort; "aggregate key")]
fn sort_selection(count: usize, order: Option<SortOrder>, key: Option<ScalarType>, expected: Strategy) {
    assert_eq!(sort_strategy(count, order, key, &Config::default()), expected);
}

#[test]
fn extrema_selection() {
    let config = Config::default();
    assert_eq!(extrema_strategy(63, &config), Strategy::Serial);
    assert_eq!(extrema_strategy(64, &config), Strategy::Atomic);
}

#[test]
fn thresholds_are_overridable() {
    let config = Config::builder().gpu_serial_threshold(8).insertion_sort_threshold(4).build();
    let queue = queue(Class::Gpu);
    assert_eq!(predicate_strategy(queue.device(), 8, &config), Strategy::Atomic);
    assert_eq!(sort_strategy(5, Some(SortOrder::Ascending), Some(ScalarType::UInt), &config), Strategy::RadixSort);
    assert_eq!(config.cpu_serial_threshold, 1024);
}

#[test]
fn builder_keeps_search_spacing_valid() {
    let config = Config::builder().binary_find_threads(0).block_size(1).build();
    assert_eq!(config.binary_find_threads, 2);
    assert_eq!(config.block_size, 2);
}

#[test]
fn strategy_names() {
    assert_eq!(Strategy::BlockReduce.to_string(), "block_reduce");
    assert_eq!(<&'static str>::from(Strategy::RadixSort), "radix_sort");
}

#[test]
#[tracing_test::traced_test]
fn dispatch_is_logged_with_strategy() {
    let queue = queue(Class::Gpu);
    let values = super::upload(&vec![1u32; 1000], &queue);
    let total = crate::algorithm::reduce(&values.begin(), &values.end(), 0, crate::functional::Plus, &queue).unwrap();
    assert_eq!(total, 1000);
    assert!(logs_contain("block_reduce"));
}
