use std::cmp::Ordering;

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Device, Queue};
use tessera_dtype::{Element, ScalarElement, decode_slice};

use super::{Strategy, copy::fill_n, debug_check_context, device_scalar, run_1d, run_task, scratch, trace_dispatch};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{Bind2nd, EqualTo, UnaryFunction};
use crate::iterator::{BufferIter, DeviceIterator};

/// Strategy shared by `count_if` and `find_if`.
///
/// CPU-class devices run serially below `cpu_serial_threshold` and one
/// work-item per compute unit above it; other devices run serially below
/// `gpu_serial_threshold` and one work-item per element above it.
pub fn predicate_strategy(device: &Device, count: usize, config: &Config) -> Strategy {
    if device.is_cpu() {
        if count < config.cpu_serial_threshold { Strategy::Serial } else { Strategy::Chunked }
    } else if count < config.gpu_serial_threshold {
        Strategy::Serial
    } else {
        Strategy::Atomic
    }
}

/// Number of elements in `[first, last)` satisfying `predicate`.
#[tracing::instrument(skip_all, fields(count = first.distance(last)))]
pub fn count_if<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<usize>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let count = first.distance(last);
    if count == 0 {
        return Ok(0);
    }
    debug_check_context(queue, &[first.context_id()]);

    let strategy = predicate_strategy(queue.device(), count, &Config::global());
    trace_dispatch("count_if", strategy, count);
    match strategy {
        Strategy::Serial => count_serial(first, count, &predicate, queue),
        Strategy::Chunked => count_chunked(first, count, &predicate, queue),
        _ => count_atomic(first, count, &predicate, queue),
    }
}

pub fn count_if_default<I, P>(first: &I, last: &I, predicate: P) -> Result<usize>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    count_if(first, last, predicate, &crate::system::default_queue()?)
}

/// Number of elements equal to `value`.
pub fn count<I>(first: &I, last: &I, value: I::Item, queue: &Queue) -> Result<usize>
where
    I: DeviceIterator,
{
    count_if(first, last, Bind2nd::new(EqualTo, value), queue)
}

/// Counts the elements of `[first, last)` falling in each of the equal-width
/// bins that split `[lower, upper)`; `[bins_first, bins_last)` receives one
/// count per bin. Elements outside the interval are not counted.
#[tracing::instrument(skip_all, fields(count = first.distance(last)))]
pub fn histogram<I>(
    first: &I,
    last: &I,
    lower: I::Item,
    upper: I::Item,
    bins_first: &BufferIter<u32>,
    bins_last: &BufferIter<u32>,
    queue: &Queue,
) -> Result<()>
where
    I: DeviceIterator,
    I::Item: ScalarElement,
{
    let count = first.distance(last);
    let bins = bins_first.distance(bins_last);
    if bins == 0 {
        return Ok(());
    }
    fill_n(bins_first, bins, 0, queue)?;
    if count == 0 || lower.partial_cmp(&upper) != Some(Ordering::Less) {
        return Ok(());
    }
    debug_check_context(queue, &[first.context_id(), bins_first.context_id()]);
    trace_dispatch("histogram", Strategy::Atomic, count);

    let mut k = MetaKernel::new("histogram");
    let lo = k.add_value_arg("_lower", lower);
    let hi = k.add_value_arg("_upper", upper);
    let n = k.add_value_arg("_bins", bins as u32);
    let out = bins_first.bind(&mut k);
    let element = first.emit_index(Expr::var("i"), &mut k);
    let element = k.expr(&element);
    k.line("const uint i = get_global_id(0);")
        .line(format!("const float lo = (float){lo};"))
        .line(format!("const float scaled = ((float)({element}) - lo) * (float){n} / ((float){hi} - lo);"))
        .line(format!("if (scaled >= 0.0f && scaled < (float){n}) atomic_inc(&{});", out.at_str("(uint)scaled")));
    run_1d(&k, queue, count)
}

fn predicate_at<I, P>(first: &I, index: &str, predicate: &P, kernel: &mut MetaKernel) -> String
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let element = first.emit_index(Expr::var(index), kernel);
    let test = predicate.call(element, kernel);
    kernel.expr(&test)
}

fn count_serial<I, P>(first: &I, count: usize, predicate: &P, queue: &Queue) -> Result<usize>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let result = device_scalar(0u32, queue)?;
    let mut k = MetaKernel::new("serial_count_if");
    let n = k.add_value_arg("_n", count as u32);
    let out = result.bind(&mut k);
    let test = predicate_at(first, "i", predicate, &mut k);
    k.line("uint found = 0;")
        .line(format!("for (uint i = 0; i < {n}; i++) {{"))
        .line(format!("if ({test}) found++;"))
        .line("}")
        .line(format!("{} = found;", out.at_str("0")));
    run_task(&k, queue)?;
    Ok(result.read(queue)? as usize)
}

/// One work-item per compute unit; partial counts are summed on the host.
fn count_chunked<I, P>(first: &I, count: usize, predicate: &P, queue: &Queue) -> Result<usize>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let threads = queue.device().compute_units().clamp(1, count);
    let chunk = count.div_ceil(threads);
    let partials = scratch::<u32>(queue, threads)?;

    let mut k = MetaKernel::new("chunked_count_if");
    let n = k.add_value_arg("_n", count as u32);
    let size = k.add_value_arg("_chunk", chunk as u32);
    let out = partials.bind(&mut k);
    let test = predicate_at(first, "i", predicate, &mut k);
    k.line("const uint t = get_global_id(0);")
        .line(format!("const uint begin = t * {size};"))
        .line(format!("const uint end = min(begin + {size}, {n});"))
        .line("uint found = 0;")
        .line("for (uint i = begin; i < end; i++) {")
        .line(format!("if ({test}) found++;"))
        .line("}")
        .line(format!("{} = found;", out.at_str("t")));
    run_1d(&k, queue, threads)?;

    let mut bytes = vec![0u8; threads * u32::size()];
    queue.enqueue_read_buffer(partials.get_buffer(), 0, &mut bytes)?;
    Ok(decode_slice::<u32>(&bytes).into_iter().map(|c| c as usize).sum())
}

fn count_atomic<I, P>(first: &I, count: usize, predicate: &P, queue: &Queue) -> Result<usize>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let result = device_scalar(0u32, queue)?;
    let mut k = MetaKernel::new("atomic_count_if");
    let out = result.bind(&mut k);
    let test = predicate_at(first, "i", predicate, &mut k);
    k.line("const uint i = get_global_id(0);")
        .line(format!("if ({test}) atomic_inc(&{});", out.at_str("0")));
    run_1d(&k, queue, count)?;
    Ok(result.read(queue)? as usize)
}
