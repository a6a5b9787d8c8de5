use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Device, Geometry, Queue, WaitList, clamp_work_group};
use tessera_dtype::{Element, HasDType};

use super::{Strategy, copy_buffer, debug_check_context, run_1d, run_task, scratch, trace_dispatch, type_name};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{BinaryFunction, Plus};
use crate::iterator::{BufferIter, DeviceIterator};

pub fn scan_strategy(device: &Device, count: usize) -> Strategy {
    if device.is_cpu() || count < 2 { Strategy::Serial } else { Strategy::BlockScan }
}

/// Writes `x[0], op(x[0], x[1]), ...` to `result` and returns the end of the output.
///
/// `result` may be `first` itself.
pub fn inclusive_scan<I, F>(
    first: &I,
    last: &I,
    result: &BufferIter<I::Item>,
    op: F,
    queue: &Queue,
) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    scan(first, last, result, None, &op, queue)
}

/// Writes `init, op(init, x[0]), ...` to `result` and returns the end of the output.
pub fn exclusive_scan<I, F>(
    first: &I,
    last: &I,
    result: &BufferIter<I::Item>,
    init: I::Item,
    op: F,
    queue: &Queue,
) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    scan(first, last, result, Some(init), &op, queue)
}

/// Inclusive running sums.
pub fn partial_sum<I: DeviceIterator>(
    first: &I,
    last: &I,
    result: &BufferIter<I::Item>,
    queue: &Queue,
) -> Result<BufferIter<I::Item>> {
    inclusive_scan(first, last, result, Plus, queue)
}

#[tracing::instrument(skip_all, fields(count = first.distance(last), exclusive = init.is_some()))]
fn scan<I, F>(
    first: &I,
    last: &I,
    result: &BufferIter<I::Item>,
    init: Option<I::Item>,
    op: &F,
    queue: &Queue,
) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let count = first.distance(last);
    let end = result.advance(count as isize);
    if count == 0 {
        return Ok(end);
    }
    debug_check_context(queue, &[first.context_id(), result.context_id()]);

    let strategy = scan_strategy(queue.device(), count);
    trace_dispatch("scan", strategy, count);
    if strategy == Strategy::Serial {
        serial_scan(first, count, result, init, op, queue)?;
        return Ok(end);
    }

    let block = clamp_work_group(Config::global().block_size, queue.device().max_work_group_size());
    let inclusive = block_scan(first, count, block, op, queue)?;
    match init {
        None => copy_buffer(&inclusive, result, count, queue)?,
        Some(init) => shift_exclusive(&inclusive, count, result, init, op, queue)?,
    }
    Ok(end)
}

/// Single work-item scan; each element is read before its output is written.
fn serial_scan<I, F>(
    first: &I,
    count: usize,
    result: &BufferIter<I::Item>,
    init: Option<I::Item>,
    op: &F,
    queue: &Queue,
) -> Result<()>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let mut k = MetaKernel::new(if init.is_some() { "serial_exclusive_scan" } else { "serial_inclusive_scan" });
    let ty = type_name::<I::Item>(&mut k);
    let n = k.add_value_arg("_n", count as u32);
    let out = result.bind(&mut k);
    let element = first.emit_index(Expr::var("i"), &mut k);
    let element = k.expr(&element);
    let step = op.call(Expr::var("acc"), Expr::var("v"), &mut k);
    let step = k.expr(&step);
    match init {
        Some(init) => {
            let seed = k.add_value_arg("_init", init);
            k.line(format!("{ty} acc = {seed};"))
                .line(format!("for (uint i = 0; i < {n}; i++) {{"))
                .line(format!("const {ty} v = {element};"))
                .line(format!("{} = acc;", out.at_str("i")))
                .line(format!("acc = {step};"))
                .line("}");
        }
        None => {
            let head = first.emit_index(Expr::uint(0), &mut k);
            let head = k.expr(&head);
            k.line(format!("{ty} acc = {head};"))
                .line(format!("{} = acc;", out.at_str("0")))
                .line(format!("for (uint i = 1; i < {n}; i++) {{"))
                .line(format!("const {ty} v = {element};"))
                .line(format!("acc = {step};"))
                .line(format!("{} = acc;", out.at_str("i")))
                .line("}");
        }
    }
    run_task(&k, queue)
}

/// Inclusive scan into fresh storage: a Hillis-Steele scan per work-group,
/// block totals scanned recursively, then each block offset by its predecessors.
fn block_scan<I, F>(first: &I, count: usize, block: usize, op: &F, queue: &Queue) -> Result<BufferIter<I::Item>>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item, Output = I::Item>,
{
    let groups = count.div_ceil(block);
    let partial = scratch::<I::Item>(queue, count)?;
    let sums = scratch::<I::Item>(queue, groups)?;

    let mut k = MetaKernel::new("block_scan");
    let ty = type_name::<I::Item>(&mut k);
    let n = k.add_value_arg("_n", count as u32);
    let out = partial.bind(&mut k);
    let totals = sums.bind(&mut k);
    let local = k.add_local_arg(<I::Item as HasDType>::dtype(), block);
    let element = first.emit_index(Expr::var("gid"), &mut k);
    let element = k.expr(&element);
    let combine = op.call(Expr::var(local.clone()).index(Expr::var("lid") - Expr::var("s")), Expr::var("v"), &mut k);
    let combine = k.expr(&combine);
    k.line("const uint gid = get_global_id(0);")
        .line("const uint lid = get_local_id(0);")
        .line("const uint g = get_group_id(0);")
        .line(format!("if (gid < {n}) {local}[lid] = {element};"))
        .line("barrier(CLK_LOCAL_MEM_FENCE);")
        .line(format!("for (uint s = 1; s < {block}; s <<= 1) {{"))
        .line(format!("{ty} v = {local}[lid];"))
        .line(format!("if (gid < {n} && lid >= s) v = {combine};"))
        .line("barrier(CLK_LOCAL_MEM_FENCE);")
        .line(format!("{local}[lid] = v;"))
        .line("barrier(CLK_LOCAL_MEM_FENCE);")
        .line("}")
        .line(format!("if (gid < {n}) {} = {local}[lid];", out.at_str("gid")))
        .line(format!("if (gid < {n} && (lid == {} || gid == {n} - 1)) {} = {local}[lid];", block - 1, totals.at_str("g")));
    let geometry = Geometry::padded_1d(count, block, queue.device().max_work_group_size());
    k.exec_nd(queue, &geometry, &WaitList::new())?.wait()?;

    if groups > 1 {
        let offsets = block_scan(&sums, groups, block, op, queue)?;
        let mut a = MetaKernel::new("scan_add_offsets");
        let out = partial.bind(&mut a);
        let prefix = offsets.bind(&mut a);
        let shifted = op.call(prefix.at(Expr::var("g") - Expr::uint(1)), out.at(Expr::var("i")), &mut a);
        let shifted = a.expr(&shifted);
        a.line("const uint i = get_global_id(0);")
            .line(format!("const uint g = i / {block};"))
            .line(format!("if (g > 0) {} = {shifted};", out.at_str("i")));
        run_1d(&a, queue, count)?;
    }
    Ok(partial)
}

/// `result[0] = init`, `result[i] = op(init, inclusive[i - 1])`.
fn shift_exclusive<T, F>(
    inclusive: &BufferIter<T>,
    count: usize,
    result: &BufferIter<T>,
    init: T,
    op: &F,
    queue: &Queue,
) -> Result<()>
where
    T: Element,
    F: BinaryFunction<T, T, Output = T>,
{
    let mut k = MetaKernel::new("exclusive_shift");
    let seed = k.add_value_arg("_init", init);
    let src = inclusive.bind(&mut k);
    let out = result.bind(&mut k);
    let value = op.call(Expr::var(seed.clone()), src.at(Expr::var("i") - Expr::uint(1)), &mut k);
    let value = k.expr(&value);
    k.line("const uint i = get_global_id(0);")
        .line(format!("if (i == 0) {} = {seed};", out.at_str("i")))
        .line(format!("else {} = {value};", out.at_str("i")));
    run_1d(&k, queue, count)
}
