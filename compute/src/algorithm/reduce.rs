use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Device, Geometry, Queue, WaitList, clamp_work_group};
use tessera_dtype::HasDType;

use super::{Strategy, debug_check_context, run_task, scratch, trace_dispatch, type_name};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{BinaryFunction, Multiplies, Plus, UnaryFunction};
use crate::iterator::{BinaryTransform, BufferIter, DeviceIterator, Transform};

pub fn reduce_strategy(device: &Device, count: usize, config: &Config) -> Strategy {
    let block = clamp_work_group(config.block_size, device.max_work_group_size());
    if device.is_cpu() || count < 2 * block { Strategy::Serial } else { Strategy::BlockReduce }
}

/// Folds `[first, last)` with `op`, starting from `init`.
///
/// `op` must be associative: on GPU-class devices the elements are combined
/// as a tree, not left to right.
///
/// ```ignore
/// let sum = reduce(&v.begin(), &v.end(), 0, Plus, &queue)?;
/// ```
#[tracing::instrument(skip_all, fields(count = first.distance(last)))]
pub fn reduce<I, F>(first: &I, last: &I, init: I::Item, op: F, queue: &Queue) -> Result<I::Item>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let count = first.distance(last);
    if count == 0 {
        return Ok(init);
    }
    debug_check_context(queue, &[first.context_id()]);

    let config = Config::global();
    let strategy = reduce_strategy(queue.device(), count, &config);
    trace_dispatch("reduce", strategy, count);
    if strategy == Strategy::Serial {
        return serial_fold(first, count, init, &op, queue);
    }

    let block = clamp_work_group(config.block_size, queue.device().max_work_group_size());
    let (mut partials, mut len) = block_reduce(first, count, block, &op, queue)?;
    while len >= 2 * block {
        (partials, len) = block_reduce(&partials, len, block, &op, queue)?;
    }
    serial_fold(&partials, len, init, &op, queue)
}

pub fn reduce_default<I, F>(first: &I, last: &I, init: I::Item, op: F) -> Result<I::Item>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    reduce(first, last, init, op, &crate::system::default_queue()?)
}

/// Left-to-right fold on one work-item, for operations that are not associative.
pub fn accumulate<I, F>(first: &I, last: &I, init: I::Item, op: F, queue: &Queue) -> Result<I::Item>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let count = first.distance(last);
    if count == 0 {
        return Ok(init);
    }
    trace_dispatch("accumulate", Strategy::Serial, count);
    serial_fold(first, count, init, &op, queue)
}

/// `reduce` over `transform(x)` without materialising the transformed range.
pub fn transform_reduce<I, U, R>(first: &I, last: &I, init: U::Output, transform: U, op: R, queue: &Queue) -> Result<U::Output>
where
    I: DeviceIterator,
    U: UnaryFunction<I::Item>,
    R: BinaryFunction<U::Output, U::Output, Output = U::Output>,
{
    let mapped_first = Transform::new(first.clone(), transform.clone());
    let mapped_last = Transform::new(last.clone(), transform);
    reduce(&mapped_first, &mapped_last, init, op, queue)
}

/// `init + sum(a[i] * b[i])`.
pub fn inner_product<I1, I2>(first1: &I1, last1: &I1, first2: &I2, init: I1::Item, queue: &Queue) -> Result<I1::Item>
where
    I1: DeviceIterator,
    I2: DeviceIterator<Item = I1::Item>,
{
    inner_product_by(first1, last1, first2, init, Plus, Multiplies, queue)
}

/// `inner_product` with a custom sum (`op1`) and product (`op2`).
pub fn inner_product_by<I1, I2, S, P>(
    first1: &I1,
    last1: &I1,
    first2: &I2,
    init: P::Output,
    op1: S,
    op2: P,
    queue: &Queue,
) -> Result<P::Output>
where
    I1: DeviceIterator,
    I2: DeviceIterator,
    P: BinaryFunction<I1::Item, I2::Item>,
    S: BinaryFunction<P::Output, P::Output, Output = P::Output>,
{
    let count = first1.distance(last1);
    let products = BinaryTransform::new(first1.clone(), first2.clone(), op2);
    let end = products.advance(count as isize);
    reduce(&products, &end, init, op1, queue)
}

/// `init` folded with `count` elements from `first` on a single work-item.
fn serial_fold<I, F>(first: &I, count: usize, init: I::Item, op: &F, queue: &Queue) -> Result<I::Item>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let result = scratch::<I::Item>(queue, 1)?;
    let mut k = MetaKernel::new("serial_reduce");
    let ty = type_name::<I::Item>(&mut k);
    let seed = k.add_value_arg("_init", init);
    let n = k.add_value_arg("_n", count as u32);
    let out = result.bind(&mut k);
    let element = first.emit_index(Expr::var("i"), &mut k);
    let step = op.call(Expr::var("acc"), element, &mut k);
    let step = k.expr(&step);
    k.line(format!("{ty} acc = {seed};"))
        .line(format!("for (uint i = 0; i < {n}; i++) {{"))
        .line(format!("acc = {step};"))
        .line("}")
        .line(format!("{} = acc;", out.at_str("0")));
    run_task(&k, queue)?;
    result.read(queue)
}

/// One tree reduction pass: every work-group of `block` items folds `2 * block`
/// elements into one partial; the unaligned tail is folded into the last partial.
fn block_reduce<I, F>(
    first: &I,
    count: usize,
    block: usize,
    op: &F,
    queue: &Queue,
) -> Result<(BufferIter<I::Item>, usize)>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let groups = count / (2 * block);
    let partials = scratch::<I::Item>(queue, groups)?;

    let mut k = MetaKernel::new("block_reduce");
    let out = partials.bind(&mut k);
    let local = k.add_local_arg(<I::Item as HasDType>::dtype(), block);
    let lo = first.emit_index(Expr::var("base"), &mut k);
    let hi = first.emit_index(Expr::var("base") + Expr::uint(block as u64), &mut k);
    let pair = op.call(lo, hi, &mut k);
    let pair = k.expr(&pair);
    let slot = |index: Expr| Expr::var(local.clone()).index(index);
    let fold = op.call(slot(Expr::var("lid")), slot(Expr::var("lid") + Expr::var("s")), &mut k);
    let fold = k.expr(&fold);
    k.line("const uint lid = get_local_id(0);")
        .line("const uint g = get_group_id(0);")
        .line(format!("const uint base = g * {} + lid;", 2 * block))
        .line(format!("{local}[lid] = {pair};"))
        .line("barrier(CLK_LOCAL_MEM_FENCE);")
        .line(format!("for (uint s = {}; s > 0; s >>= 1) {{", block / 2))
        .line(format!("if (lid < s) {local}[lid] = {fold};"))
        .line("barrier(CLK_LOCAL_MEM_FENCE);")
        .line("}")
        .line(format!("if (lid == 0) {} = {local}[0];", out.at_str("g")));
    k.exec_nd(queue, &Geometry::new_1d(0, groups * block, Some(block)), &WaitList::new())?.wait()?;

    let tail_start = groups * 2 * block;
    if tail_start < count {
        let mut t = MetaKernel::new("reduce_tail");
        let ty = type_name::<I::Item>(&mut t);
        let start = t.add_value_arg("_start", tail_start as u32);
        let n = t.add_value_arg("_n", count as u32);
        let last = partials.advance(groups as isize - 1).bind(&mut t);
        let element = first.emit_index(Expr::var("i"), &mut t);
        let step = op.call(Expr::var("acc"), element, &mut t);
        let step = t.expr(&step);
        t.line(format!("{ty} acc = {};", last.at_str("0")))
            .line(format!("for (uint i = {start}; i < {n}; i++) {{"))
            .line(format!("acc = {step};"))
            .line("}")
            .line(format!("{} = acc;", last.at_str("0")));
        run_task(&t, queue)?;
    }
    Ok((partials, groups))
}
