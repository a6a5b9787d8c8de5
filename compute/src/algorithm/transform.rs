use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Future, Queue};

use super::{copy::{copy, copy_async}, copy_buffer, debug_check_context, overlaps, run_1d, scratch};
use crate::error::Result;
use crate::functional::{BinaryFunction, UnaryFunction};
use crate::iterator::{BinaryTransform, BufferIter, DeviceIterator, Transform, nth};

/// `result[i] = f(x[i])`; returns the end of the output.
///
/// The function is fused into the element read, so this is a copy from a
/// [`Transform`] iterator. `result` may be `first` itself.
pub fn transform<I, F>(first: &I, last: &I, result: &BufferIter<F::Output>, function: F, queue: &Queue) -> Result<BufferIter<F::Output>>
where
    I: DeviceIterator,
    F: UnaryFunction<I::Item>,
{
    let mapped = Transform::new(first.clone(), function);
    copy(&mapped, &nth(&mapped, first.distance(last)), result, queue)
}

pub fn transform_default<I, F>(first: &I, last: &I, result: &BufferIter<F::Output>, function: F) -> Result<BufferIter<F::Output>>
where
    I: DeviceIterator,
    F: UnaryFunction<I::Item>,
{
    transform(first, last, result, function, &crate::system::default_queue()?)
}

/// `result[i] = f(a[i], b[i])`.
pub fn transform2<I1, I2, F>(
    first1: &I1,
    last1: &I1,
    first2: &I2,
    result: &BufferIter<F::Output>,
    function: F,
    queue: &Queue,
) -> Result<BufferIter<F::Output>>
where
    I1: DeviceIterator,
    I2: DeviceIterator,
    F: BinaryFunction<I1::Item, I2::Item>,
{
    let mapped = BinaryTransform::new(first1.clone(), first2.clone(), function);
    copy(&mapped, &nth(&mapped, first1.distance(last1)), result, queue)
}

/// [`transform`] without waiting; the future yields the end of the output.
pub fn transform_async<I, F>(
    first: &I,
    last: &I,
    result: &BufferIter<F::Output>,
    function: F,
    queue: &Queue,
) -> Result<Future<BufferIter<F::Output>>>
where
    I: DeviceIterator,
    F: UnaryFunction<I::Item>,
{
    let mapped = Transform::new(first.clone(), function);
    copy_async(&mapped, &nth(&mapped, first.distance(last)), result, queue)
}

/// `result[0] = x[0]`, `result[i] = op(x[i], x[i - 1])`.
pub fn adjacent_difference<I, F>(first: &I, last: &I, result: &BufferIter<I::Item>, op: F, queue: &Queue) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let count = first.distance(last);
    let end = nth(result, count);
    if count == 0 {
        return Ok(end);
    }
    debug_check_context(queue, &[first.context_id(), result.context_id()]);

    // Every element is read by two work-items, so an aliased output is staged.
    if let Ok(input) = first.storage()
        && overlaps(&input, result, count)
    {
        let staged = scratch::<I::Item>(queue, count)?;
        adjacent_difference(first, last, &staged, op, queue)?;
        copy_buffer(&staged, result, count, queue)?;
        return Ok(end);
    }

    let mut k = MetaKernel::new("adjacent_difference");
    let out = result.bind(&mut k);
    let current = first.emit_index(Expr::var("i"), &mut k);
    let previous = first.emit_index(Expr::var("i") - Expr::uint(1), &mut k);
    let difference = op.call(current.clone(), previous, &mut k);
    let difference = k.expr(&difference);
    let current = k.expr(&current);
    k.line("const uint i = get_global_id(0);")
        .line(format!("if (i == 0) {} = {current};", out.at_str("i")))
        .line(format!("else {} = {difference};", out.at_str("i")));
    run_1d(&k, queue, count)?;
    Ok(end)
}
