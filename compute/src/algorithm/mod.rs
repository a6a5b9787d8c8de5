//! Algorithms over device iterator ranges.
//!
//! Every algorithm follows the same three steps:
//!
//! 1. **Select** a strategy from the device class, the range size and the
//!    thresholds in [`Config`](crate::Config). The selection functions are
//!    pure and public so callers (and tests) can see what will run.
//! 2. **Build** one or more [`MetaKernel`]s; input iterators render their
//!    element reads inline.
//! 3. **Execute** on the given queue and wait. Programs are reused through the
//!    per-context program cache, so a second call with the same shape does not
//!    rebuild anything.
//!
//! Empty ranges never touch the device.

mod compact;
mod copy;
mod count;
mod extrema;
mod find;
mod generate;
mod merge;
mod reduce;
mod scan;
mod search;
mod sort;
mod transform;

pub use compact::{
    copy_if, copy_if_default, partition, partition_copy, remove, remove_if, stable_partition, unique, unique_copy,
};
pub use copy::{
    copy, copy_async, copy_from_host, copy_n, copy_to_host, fill, fill_n, gather, iota, reverse, reverse_copy, rotate,
    rotate_copy, scatter, swap_ranges,
};
pub use count::{count, count_if, count_if_default, histogram, predicate_strategy};
pub use extrema::{extrema_strategy, max_element, min_element, minmax_element};
pub use find::{
    adjacent_find, adjacent_find_by, all_of, any_of, equal, find, find_if, find_if_default, find_if_not,
    is_partitioned, is_sorted, mismatch, none_of,
};
pub use generate::{generate, generate_n};
pub use merge::merge;
pub use reduce::{
    accumulate, inner_product, inner_product_by, reduce, reduce_default, reduce_strategy, transform_reduce,
};
pub use scan::{exclusive_scan, inclusive_scan, partial_sum, scan_strategy};
pub use search::{binary_find, binary_search, lower_bound, partition_point, upper_bound};
pub use sort::{merge_sort_on_cpu, nth_element, sort, sort_by_key, sort_default, sort_strategy, stable_sort};
pub use transform::{adjacent_difference, transform, transform2, transform_async, transform_default};

use tessera_codegen::{EmitSession, MetaKernel};
use tessera_device::{ContextId, Queue, WaitList};
use tessera_dtype::Element;

use crate::error::Result;
use crate::iterator::{BufferIter, DeviceIterator};

/// Execution plan chosen by an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    /// One work-item walks the whole range.
    Serial,
    /// One work-item per contiguous chunk, one chunk per compute unit.
    Chunked,
    /// One work-item per element, combined through a global atomic.
    Atomic,
    /// Work-group tree reduction in local memory.
    BlockReduce,
    /// Work-group Hillis-Steele scan with recursively scanned block sums.
    BlockScan,
    /// Compare-and-swap network for two or three elements.
    FixedSort,
    /// Stable single work-item insertion sort.
    InsertionSort,
    /// Least-significant-digit radix sort on 4-bit digits.
    RadixSort,
    /// Block insertion sorts followed by pairwise merge passes.
    MergeSort,
}

pub(crate) fn trace_dispatch(algorithm: &'static str, strategy: Strategy, count: usize) {
    tracing::debug!(algorithm, strategy = <&'static str>::from(strategy), count, "dispatch");
}

/// Device spelling of `T`, declaring it on `kernel` when it is an aggregate.
pub(crate) fn type_name<T: Element>(kernel: &mut MetaKernel) -> String {
    let dtype = T::dtype();
    kernel.inject_type(&dtype);
    dtype.name()
}

/// Uninitialised device storage for `len` elements on the queue's context.
pub(crate) fn scratch<T: Element>(queue: &Queue, len: usize) -> Result<BufferIter<T>> {
    let buffer = queue.context().create_buffer(len.max(1) * T::size())?;
    Ok(BufferIter::new(buffer, 0))
}

/// A one-element device buffer holding `value`.
pub(crate) fn device_scalar<T: Element>(value: T, queue: &Queue) -> Result<BufferIter<T>> {
    let cell = scratch::<T>(queue, 1)?;
    cell.write(value, queue)?;
    Ok(cell)
}

/// Launches `global` work-items and waits.
pub(crate) fn run_1d(kernel: &MetaKernel, queue: &Queue, global: usize) -> Result<()> {
    kernel.exec_1d(queue, 0, global, None)?.wait()?;
    Ok(())
}

/// Launches a single work-item and waits.
pub(crate) fn run_task(kernel: &MetaKernel, queue: &Queue) -> Result<()> {
    kernel.exec(queue)?.wait()?;
    Ok(())
}

/// Copies `count` elements between buffer iterators with a device copy.
pub(crate) fn copy_buffer<T: Element>(
    from: &BufferIter<T>,
    to: &BufferIter<T>,
    count: usize,
    queue: &Queue,
) -> Result<()> {
    queue
        .enqueue_copy_buffer(
            from.get_buffer(),
            to.get_buffer(),
            from.byte_offset(),
            to.byte_offset(),
            count * T::size(),
            &WaitList::new(),
        )?
        .wait()?;
    Ok(())
}

/// Whether `[a, a + count)` and `[b, b + count)` share any element.
pub(crate) fn overlaps<T: Element>(a: &BufferIter<T>, b: &BufferIter<T>, count: usize) -> bool {
    a.same_buffer(b) && a.index() < b.index() + count && b.index() < a.index() + count
}

/// Whether writing `[result, result + count)` can change what `first` reads.
///
/// Buffer inputs are compared by range; adaptors over the output buffer
/// always count as aliased since their reads may fall anywhere.
pub(crate) fn aliases<I: DeviceIterator>(first: &I, result: &BufferIter<I::Item>, count: usize) -> bool {
    match first.storage() {
        Ok(input) => overlaps(&input, result, count),
        Err(_) => first.reads(result.get_buffer()),
    }
}

pub(crate) fn debug_check_context(queue: &Queue, ids: &[Option<ContextId>]) {
    debug_assert!(
        ids.iter().flatten().all(|id| *id == queue.context().id()),
        "iterators and queue belong to different contexts"
    );
}
