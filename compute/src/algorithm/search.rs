use tessera_codegen::{Expr, MetaKernel};
use tessera_device::Queue;

use super::{Strategy, debug_check_context, device_scalar, find::{any_of, find_index}, run_1d, trace_dispatch};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{Bind2nd, Greater, Less, Not1, UnaryFunction};
use crate::iterator::{DeviceIterator, nth};

/// First position in `[first, last)` where `predicate` holds, for a range in
/// which every match follows every non-match; `last` when nothing matches.
///
/// While the window is larger than `binary_find_threshold`, one kernel samples
/// it at `binary_find_threads` evenly spaced points and the window shrinks to
/// the gap before the first matching sample. The final window is searched
/// with `find_if`.
#[tracing::instrument(skip_all, fields(count = first.distance(last)))]
pub fn binary_find<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let total = first.distance(last);
    debug_check_context(queue, &[first.context_id()]);
    let config = Config::global();
    let threads = config.binary_find_threads.max(2);

    let (mut lo, mut hi) = (0usize, total);
    let mut count = total;
    while count > config.binary_find_threshold {
        trace_dispatch("binary_find", Strategy::Atomic, count);
        let block = (count - 1) / (threads - 1);
        let index = device_scalar(count as u32, queue)?;

        let mut k = MetaKernel::new("binary_find");
        let stride = k.add_value_arg("_block", block as u32);
        let out = index.bind(&mut k);
        let window = nth(first, lo);
        let probe = window.emit_index(Expr::var("i"), &mut k);
        let test = predicate.call(probe, &mut k);
        let test = k.expr(&test);
        k.line(format!("const uint i = get_global_id(0) * {stride};"))
            .line(format!("if ({test}) atomic_min(&{}, i);", out.at_str("0")));
        run_1d(&k, queue, threads)?;

        let i = index.read(queue)? as usize;
        if i == count {
            lo = hi - (count - 1) % (threads - 1);
            break;
        }
        hi = (lo + i).min(total);
        lo = hi.saturating_sub(block);
        count = hi - lo;
    }

    let window = hi - lo;
    let offset = find_index(&nth(first, lo), window, &predicate, queue)?;
    Ok(if lo + offset >= total { last.clone() } else { nth(first, lo + offset) })
}

/// First position whose element is not less than `value`.
pub fn lower_bound<I: DeviceIterator>(first: &I, last: &I, value: I::Item, queue: &Queue) -> Result<I> {
    binary_find(first, last, Not1(Bind2nd::new(Less, value)), queue)
}

/// First position whose element is greater than `value`.
pub fn upper_bound<I: DeviceIterator>(first: &I, last: &I, value: I::Item, queue: &Queue) -> Result<I> {
    binary_find(first, last, Bind2nd::new(Greater, value), queue)
}

/// Whether the sorted range holds an element equivalent to `value`.
pub fn binary_search<I: DeviceIterator>(first: &I, last: &I, value: I::Item, queue: &Queue) -> Result<bool> {
    let found = lower_bound(first, last, value, queue)?;
    if found.position() == last.position() {
        return Ok(false);
    }
    any_of(&found, &nth(&found, 1), Not1(Bind2nd::new(Greater, value)), queue)
}

/// End of the leading run of elements satisfying `predicate`.
pub fn partition_point<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    binary_find(first, last, Not1(predicate), queue)
}
