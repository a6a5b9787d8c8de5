//! Stream compaction: flag, scan, scatter.

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::Queue;
use tessera_dtype::Element;

use super::{Strategy, aliases, copy_buffer, debug_check_context, exclusive_scan, run_1d, scratch, trace_dispatch};
use crate::error::Result;
use crate::functional::{Bind2nd, BinaryFunction, EqualTo, Not1, Plus, UnaryFunction};
use crate::iterator::{BufferIter, DeviceIterator, nth};

/// Copies the elements satisfying `predicate` to `result`, keeping their
/// order, and returns the end of the output.
#[tracing::instrument(skip_all, fields(count = first.distance(last)))]
pub fn copy_if<I, P>(first: &I, last: &I, result: &BufferIter<I::Item>, predicate: P, queue: &Queue) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let count = first.distance(last);
    compact(first, count, result, "copy_if", queue, |input, i, k| {
        let element = input.emit_index(Expr::var(i), k);
        predicate.call(element, k)
    })
}

pub fn copy_if_default<I, P>(first: &I, last: &I, result: &BufferIter<I::Item>, predicate: P) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    copy_if(first, last, result, predicate, &crate::system::default_queue()?)
}

/// Removes the elements satisfying `predicate`, shifting the rest forward, and
/// returns the new end.
pub fn remove_if<T, P>(first: &BufferIter<T>, last: &BufferIter<T>, predicate: P, queue: &Queue) -> Result<BufferIter<T>>
where
    T: Element,
    P: UnaryFunction<T>,
{
    copy_if(first, last, first, Not1(predicate), queue)
}

pub fn remove<T: Element>(first: &BufferIter<T>, last: &BufferIter<T>, value: T, queue: &Queue) -> Result<BufferIter<T>> {
    remove_if(first, last, Bind2nd::new(EqualTo, value), queue)
}

/// Copies the first element of every run of equal elements.
pub fn unique_copy<I>(first: &I, last: &I, result: &BufferIter<I::Item>, queue: &Queue) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
{
    let count = first.distance(last);
    compact(first, count, result, "unique_copy", queue, |input, i, k| {
        let previous = input.emit_index(Expr::var(i) - Expr::uint(1), k);
        let current = input.emit_index(Expr::var(i), k);
        let same = <EqualTo as BinaryFunction<I::Item>>::call(&EqualTo, previous, current, k);
        Expr::var(i).equals(Expr::uint(0)).or(!same)
    })
}

/// Drops consecutive duplicates in place and returns the new end.
pub fn unique<T: Element>(first: &BufferIter<T>, last: &BufferIter<T>, queue: &Queue) -> Result<BufferIter<T>> {
    unique_copy(first, last, first, queue)
}

/// Copies elements satisfying `predicate` to `out_true` and the rest to
/// `out_false`; returns both ends.
pub fn partition_copy<I, P>(
    first: &I,
    last: &I,
    out_true: &BufferIter<I::Item>,
    out_false: &BufferIter<I::Item>,
    predicate: P,
    queue: &Queue,
) -> Result<(BufferIter<I::Item>, BufferIter<I::Item>)>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let end_true = copy_if(first, last, out_true, predicate.clone(), queue)?;
    let end_false = copy_if(first, last, out_false, Not1(predicate), queue)?;
    Ok((end_true, end_false))
}

/// Reorders `[first, last)` so the elements satisfying `predicate` come first,
/// each group keeping its relative order. Returns the partition point.
pub fn stable_partition<T, P>(first: &BufferIter<T>, last: &BufferIter<T>, predicate: P, queue: &Queue) -> Result<BufferIter<T>>
where
    T: Element,
    P: UnaryFunction<T>,
{
    let count = first.distance(last);
    if count == 0 {
        return Ok(first.clone());
    }
    let staged = scratch::<T>(queue, count)?;
    let split = copy_if(first, last, &staged, predicate.clone(), queue)?;
    copy_if(first, last, &split, Not1(predicate), queue)?;
    copy_buffer(&staged, first, count, queue)?;
    Ok(nth(first, staged.distance(&split)))
}

/// Same result as [`stable_partition`]; relative order is not part of the
/// contract.
pub fn partition<T, P>(first: &BufferIter<T>, last: &BufferIter<T>, predicate: P, queue: &Queue) -> Result<BufferIter<T>>
where
    T: Element,
    P: UnaryFunction<T>,
{
    stable_partition(first, last, predicate, queue)
}

/// Copies the elements of `[first, first + count)` whose `flag` expression
/// holds to `result`, in order.
///
/// `flag` renders the condition for the element at the index variable it is
/// given. When writing `result` could change what the input reads the output is staged and copied back.
fn compact<I, F>(
    first: &I,
    count: usize,
    result: &BufferIter<I::Item>,
    algorithm: &'static str,
    queue: &Queue,
    flag: F,
) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    F: Fn(&I, &str, &mut MetaKernel) -> Expr,
{
    if count == 0 {
        return Ok(result.clone());
    }
    debug_check_context(queue, &[first.context_id(), result.context_id()]);
    trace_dispatch(algorithm, Strategy::BlockScan, count);

    let flags = scratch::<u32>(queue, count)?;
    let mut f = MetaKernel::new(format!("{algorithm}_flags"));
    let out = flags.bind(&mut f);
    let test = flag(first, "i", &mut f);
    let test = f.expr(&test);
    f.line("const uint i = get_global_id(0);").line(format!("{} = ({test}) ? 1 : 0;", out.at_str("i")));
    run_1d(&f, queue, count)?;

    let offsets = scratch::<u32>(queue, count)?;
    exclusive_scan(&flags, &flags.advance(count as isize), &offsets, 0u32, Plus, queue)?;
    let last = count as isize - 1;
    let total = (offsets.advance(last).read(queue)? + flags.advance(last).read(queue)?) as usize;

    let staged = if aliases(first, result, count) { Some(scratch::<I::Item>(queue, count)?) } else { None };
    let target = staged.as_ref().unwrap_or(result);

    let mut s = MetaKernel::new(format!("{algorithm}_scatter"));
    let flag_at = flags.bind(&mut s);
    let offset_at = offsets.bind(&mut s);
    let output = target.bind(&mut s);
    let element = first.emit_index(Expr::var("i"), &mut s);
    let element = s.expr(&element);
    s.line("const uint i = get_global_id(0);")
        .line(format!("if ({}) {} = {element};", flag_at.at_str("i"), output.at_str(&offset_at.at_str("i"))));
    run_1d(&s, queue, count)?;

    if let Some(staged) = &staged {
        copy_buffer(staged, result, total, queue)?;
    }
    Ok(nth(result, total))
}
