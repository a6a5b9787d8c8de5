//! Copying, filling and permuting ranges.
//!
//! Buffer-to-buffer copies go through the queue's copy command; any other
//! input is materialised by a kernel that evaluates the iterator expression
//! once per element.

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Event, Future, Queue, WaitList};
use tessera_dtype::{Element, ScalarElement, decode_slice, encode_slice};

use super::{Strategy, aliases, copy_buffer, debug_check_context, overlaps, run_1d, scratch, trace_dispatch, type_name};
use crate::error::Result;
use crate::iterator::{BufferIter, Counting, DeviceIterator, nth};

/// Copies `[first, last)` to `result` and returns the end of the output.
///
/// Overlapping buffer ranges are staged through a temporary.
pub fn copy<I: DeviceIterator>(first: &I, last: &I, result: &BufferIter<I::Item>, queue: &Queue) -> Result<BufferIter<I::Item>> {
    let count = first.distance(last);
    let end = nth(result, count);
    if count > 0 {
        enqueue_copy(first, count, result, queue)?.wait()?;
    }
    Ok(end)
}

/// Starts a copy and returns the end of the output once it completes.
pub fn copy_async<I: DeviceIterator>(
    first: &I,
    last: &I,
    result: &BufferIter<I::Item>,
    queue: &Queue,
) -> Result<Future<BufferIter<I::Item>>> {
    let count = first.distance(last);
    let end = nth(result, count);
    if count == 0 {
        return Ok(Future::ready(end));
    }
    Ok(Future::new(end, enqueue_copy(first, count, result, queue)?))
}

pub fn copy_n<I: DeviceIterator>(first: &I, count: usize, result: &BufferIter<I::Item>, queue: &Queue) -> Result<BufferIter<I::Item>> {
    copy(first, &nth(first, count), result, queue)
}

fn enqueue_copy<I: DeviceIterator>(first: &I, count: usize, result: &BufferIter<I::Item>, queue: &Queue) -> Result<Event> {
    debug_check_context(queue, &[first.context_id(), result.context_id()]);
    if first.buffer().is_none() {
        if first.reads(result.get_buffer()) {
            let staged = scratch::<I::Item>(queue, count)?;
            enqueue_copy(first, count, &staged, queue)?.wait()?;
            return enqueue_copy(&staged, count, result, queue);
        }
        trace_dispatch("copy", Strategy::Chunked, count);
        let mut k = MetaKernel::new("copy");
        let out = result.bind(&mut k);
        let element = first.emit_index(Expr::var("i"), &mut k);
        let element = k.expr(&element);
        k.line("const uint i = get_global_id(0);").line(format!("{} = {element};", out.at_str("i")));
        return Ok(k.exec_1d(queue, 0, count, None)?);
    }

    let input = first.storage()?;
    trace_dispatch("copy", Strategy::Serial, count);
    if input == *result {
        return Ok(queue.enqueue_marker(&WaitList::new())?);
    }
    let bytes = count * <I::Item as Element>::size();
    let source = if overlaps(&input, result, count) {
        let staged = scratch::<I::Item>(queue, count)?;
        copy_buffer(&input, &staged, count, queue)?;
        staged
    } else {
        input
    };
    Ok(queue.enqueue_copy_buffer(
        source.get_buffer(),
        result.get_buffer(),
        source.byte_offset(),
        result.byte_offset(),
        bytes,
        &WaitList::new(),
    )?)
}

/// Reads `[first, last)` back to the host.
pub fn copy_to_host<I: DeviceIterator>(first: &I, last: &I, queue: &Queue) -> Result<Vec<I::Item>> {
    let count = first.distance(last);
    if count == 0 {
        return Ok(Vec::new());
    }
    let source = match first.storage() {
        Ok(input) => input,
        Err(_) => {
            let staged = scratch::<I::Item>(queue, count)?;
            copy(first, last, &staged, queue)?;
            staged
        }
    };
    let mut bytes = vec![0u8; count * <I::Item as Element>::size()];
    queue.enqueue_read_buffer(source.get_buffer(), source.byte_offset(), &mut bytes)?;
    Ok(decode_slice(&bytes))
}

/// Writes `values` to the device starting at `result`; returns the end of the output.
pub fn copy_from_host<T: Element>(values: &[T], result: &BufferIter<T>, queue: &Queue) -> Result<BufferIter<T>> {
    if !values.is_empty() {
        queue.enqueue_write_buffer(result.get_buffer(), result.byte_offset(), &encode_slice(values))?;
    }
    Ok(nth(result, values.len()))
}

/// Sets every element of `[first, last)` to `value`.
///
/// The range must be backed by a buffer.
pub fn fill<I: DeviceIterator>(first: &I, last: &I, value: I::Item, queue: &Queue) -> Result<()> {
    fill_n(first, first.distance(last), value, queue)
}

pub fn fill_n<I: DeviceIterator>(first: &I, count: usize, value: I::Item, queue: &Queue) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let target = first.storage()?;
    queue.enqueue_fill(target.get_buffer(), value, target.index(), count)?.wait()?;
    Ok(())
}

/// Writes `start, start + 1, ...` over `[first, last)`.
pub fn iota<T: ScalarElement>(first: &BufferIter<T>, last: &BufferIter<T>, start: T, queue: &Queue) -> Result<()> {
    let count = first.distance(last);
    let values = Counting::new(start);
    copy(&values, &nth(&values, count), first, queue)?;
    Ok(())
}

/// `result[i] = input[map[i]]` for every position of `[map_first, map_last)`.
pub fn gather<M, I>(map_first: &M, map_last: &M, input: &I, result: &BufferIter<I::Item>, queue: &Queue) -> Result<BufferIter<I::Item>>
where
    M: DeviceIterator<Item = u32>,
    I: DeviceIterator,
{
    let count = map_first.distance(map_last);
    if count > 0 {
        debug_check_context(queue, &[map_first.context_id(), input.context_id(), result.context_id()]);
        let mut k = MetaKernel::new("gather");
        let out = result.bind(&mut k);
        let index = map_first.emit_index(Expr::var("i"), &mut k);
        let element = input.emit_index(index, &mut k);
        let element = k.expr(&element);
        k.line("const uint i = get_global_id(0);").line(format!("{} = {element};", out.at_str("i")));
        run_1d(&k, queue, count)?;
    }
    Ok(nth(result, count))
}

/// `result[map[i]] = input[i]` for every position of `[first, last)`.
pub fn scatter<I, M>(first: &I, last: &I, map: &M, result: &BufferIter<I::Item>, queue: &Queue) -> Result<()>
where
    I: DeviceIterator,
    M: DeviceIterator<Item = u32>,
{
    let count = first.distance(last);
    if count == 0 {
        return Ok(());
    }
    debug_check_context(queue, &[first.context_id(), map.context_id(), result.context_id()]);
    let mut k = MetaKernel::new("scatter");
    let out = result.bind(&mut k);
    let index = map.emit_index(Expr::var("i"), &mut k);
    let target = k.expr(&out.at(index));
    let element = first.emit_index(Expr::var("i"), &mut k);
    let element = k.expr(&element);
    k.line("const uint i = get_global_id(0);").line(format!("{target} = {element};"));
    run_1d(&k, queue, count)
}

/// Reverses `[first, last)` in place.
pub fn reverse<T: Element>(first: &BufferIter<T>, last: &BufferIter<T>, queue: &Queue) -> Result<()> {
    let count = first.distance(last);
    if count < 2 {
        return Ok(());
    }
    let mut k = MetaKernel::new("reverse");
    let ty = type_name::<T>(&mut k);
    let n = k.add_value_arg("_n", count as u32);
    let x = first.bind(&mut k);
    let mirror = format!("{n} - 1 - i");
    k.line("const uint i = get_global_id(0);")
        .line(format!("const {ty} t = {};", x.at_str("i")))
        .line(format!("{} = {};", x.at_str("i"), x.at_str(&mirror)))
        .line(format!("{} = t;", x.at_str(&mirror)));
    run_1d(&k, queue, count / 2)
}

/// Copies `[first, last)` to `result` in reverse order.
pub fn reverse_copy<I: DeviceIterator>(first: &I, last: &I, result: &BufferIter<I::Item>, queue: &Queue) -> Result<BufferIter<I::Item>> {
    let count = first.distance(last);
    let end = nth(result, count);
    if count == 0 {
        return Ok(end);
    }
    if aliases(first, result, count) {
        let staged = scratch::<I::Item>(queue, count)?;
        copy(first, last, &staged, queue)?;
        return reverse_copy(&staged, &nth(&staged, count), result, queue);
    }

    let mut k = MetaKernel::new("reverse_copy");
    let n = k.add_value_arg("_n", count as u32);
    let out = result.bind(&mut k);
    let element = first.emit_index(Expr::var(n) - Expr::uint(1) - Expr::var("i"), &mut k);
    let element = k.expr(&element);
    k.line("const uint i = get_global_id(0);").line(format!("{} = {element};", out.at_str("i")));
    run_1d(&k, queue, count)?;
    Ok(end)
}

/// Rotates `[first, last)` left so `middle` becomes the first element; returns
/// where the old first element ends up.
pub fn rotate<T: Element>(first: &BufferIter<T>, middle: &BufferIter<T>, last: &BufferIter<T>, queue: &Queue) -> Result<BufferIter<T>> {
    let count = first.distance(last);
    let head = first.distance(middle);
    let moved = nth(first, count - head);
    if head == 0 || head == count {
        return Ok(moved);
    }
    let staged = scratch::<T>(queue, count)?;
    copy_buffer(first, &staged, count, queue)?;
    rotate_copy(&staged, &nth(&staged, head), &nth(&staged, count), first, queue)?;
    Ok(moved)
}

/// Copies `[middle, last)` followed by `[first, middle)` to `result`.
pub fn rotate_copy<I: DeviceIterator>(
    first: &I,
    middle: &I,
    last: &I,
    result: &BufferIter<I::Item>,
    queue: &Queue,
) -> Result<BufferIter<I::Item>> {
    let count = first.distance(last);
    if count > 0 && aliases(first, result, count) {
        let staged = scratch::<I::Item>(queue, count)?;
        copy(first, last, &staged, queue)?;
        let head = first.distance(middle);
        return rotate_copy(&staged, &nth(&staged, head), &nth(&staged, count), result, queue);
    }
    let split = copy(middle, last, result, queue)?;
    copy(first, middle, &split, queue)
}

/// Exchanges `[first1, last1)` with the range starting at `first2`; returns the
/// end of the second range.
pub fn swap_ranges<T: Element>(first1: &BufferIter<T>, last1: &BufferIter<T>, first2: &BufferIter<T>, queue: &Queue) -> Result<BufferIter<T>> {
    let count = first1.distance(last1);
    if count > 0 {
        let mut k = MetaKernel::new("swap_ranges");
        let ty = type_name::<T>(&mut k);
        let a = first1.bind(&mut k);
        let b = first2.bind(&mut k);
        k.line("const uint i = get_global_id(0);")
            .line(format!("const {ty} t = {};", a.at_str("i")))
            .line(format!("{} = {};", a.at_str("i"), b.at_str("i")))
            .line(format!("{} = t;", b.at_str("i")));
        run_1d(&k, queue, count)?;
    }
    Ok(nth(first2, count))
}
