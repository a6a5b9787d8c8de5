use tessera_codegen::{Expr, MetaKernel};
use tessera_device::Queue;

use super::{Strategy, count::predicate_strategy, debug_check_context, device_scalar, run_1d, run_task, trace_dispatch};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{Bind2nd, BinaryFunction, EqualTo, Flip, Identity, Not1, NotEqualTo, UnaryFunction};
use crate::iterator::{AdjacentTransform, BinaryTransform, DeviceIterator, nth};

/// First position in `[first, last)` satisfying `predicate`, or `last`.
#[tracing::instrument(skip_all, fields(count = first.distance(last)))]
pub fn find_if<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let count = first.distance(last);
    let index = find_index(first, count, &predicate, queue)?;
    Ok(if index == count { last.clone() } else { nth(first, index) })
}

pub fn find_if_default<I, P>(first: &I, last: &I, predicate: P) -> Result<I>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    find_if(first, last, predicate, &crate::system::default_queue()?)
}

pub fn find_if_not<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    find_if(first, last, Not1(predicate), queue)
}

/// First position holding `value`, or `last`.
pub fn find<I: DeviceIterator>(first: &I, last: &I, value: I::Item, queue: &Queue) -> Result<I> {
    find_if(first, last, Bind2nd::new(EqualTo, value), queue)
}

pub fn all_of<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<bool>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let count = first.distance(last);
    Ok(find_index(first, count, &Not1(predicate), queue)? == count)
}

pub fn any_of<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<bool>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let count = first.distance(last);
    Ok(find_index(first, count, &predicate, queue)? < count)
}

pub fn none_of<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<bool>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    any_of(first, last, predicate, queue).map(|any| !any)
}

/// First position whose element equals its successor, or `last`.
pub fn adjacent_find<I: DeviceIterator>(first: &I, last: &I, queue: &Queue) -> Result<I> {
    adjacent_find_by(first, last, EqualTo, queue)
}

/// First position `i` with `predicate(x[i], x[i + 1])`, or `last`.
pub fn adjacent_find_by<I, F>(first: &I, last: &I, predicate: F, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    F: BinaryFunction<I::Item, I::Item>,
{
    let count = first.distance(last);
    if count < 2 {
        return Ok(last.clone());
    }
    let pairs = AdjacentTransform::new(first.clone(), predicate);
    let index = find_index(&pairs, count - 1, &Identity, queue)?;
    Ok(if index == count - 1 { last.clone() } else { nth(first, index) })
}

/// Whether no element compares less than its predecessor.
pub fn is_sorted<I, C>(first: &I, last: &I, compare: C, queue: &Queue) -> Result<bool>
where
    I: DeviceIterator,
    C: BinaryFunction<I::Item, I::Item>,
{
    let count = first.distance(last);
    if count < 2 {
        return Ok(true);
    }
    let descents = AdjacentTransform::new(first.clone(), Flip(compare));
    Ok(find_index(&descents, count - 1, &Identity, queue)? == count - 1)
}

/// First position where the ranges differ, as a pair of iterators.
pub fn mismatch<I1, I2>(first1: &I1, last1: &I1, first2: &I2, queue: &Queue) -> Result<(I1, I2)>
where
    I1: DeviceIterator,
    I2: DeviceIterator<Item = I1::Item>,
{
    let count = first1.distance(last1);
    let differs = BinaryTransform::new(first1.clone(), first2.clone(), NotEqualTo);
    let index = find_index(&differs, count, &Identity, queue)?;
    Ok((nth(first1, index), nth(first2, index)))
}

/// Whether `[first1, last1)` equals the range starting at `first2`.
pub fn equal<I1, I2>(first1: &I1, last1: &I1, first2: &I2, queue: &Queue) -> Result<bool>
where
    I1: DeviceIterator,
    I2: DeviceIterator<Item = I1::Item>,
{
    let count = first1.distance(last1);
    let differs = BinaryTransform::new(first1.clone(), first2.clone(), NotEqualTo);
    Ok(find_index(&differs, count, &Identity, queue)? == count)
}

/// Whether every element satisfying `predicate` precedes every element that does not.
pub fn is_partitioned<I, P>(first: &I, last: &I, predicate: P, queue: &Queue) -> Result<bool>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    let count = first.distance(last);
    let split = find_index(first, count, &Not1(predicate.clone()), queue)?;
    let rest = count - split;
    Ok(find_index(&nth(first, split), rest, &predicate, queue)? == rest)
}

/// Offset of the first match in `count` elements from `first`, or `count`.
pub(crate) fn find_index<I, P>(first: &I, count: usize, predicate: &P, queue: &Queue) -> Result<usize>
where
    I: DeviceIterator,
    P: UnaryFunction<I::Item>,
{
    if count == 0 {
        return Ok(0);
    }
    debug_check_context(queue, &[first.context_id()]);

    let strategy = predicate_strategy(queue.device(), count, &Config::global());
    trace_dispatch("find_if", strategy, count);

    let result = device_scalar(count as u32, queue)?;
    let mut k = MetaKernel::new(match strategy {
        Strategy::Serial => "serial_find_if",
        Strategy::Chunked => "chunked_find_if",
        _ => "atomic_find_if",
    });
    let out = result.bind(&mut k);
    let element = first.emit_index(Expr::var("i"), &mut k);
    let test = predicate.call(element, &mut k);
    let test = k.expr(&test);
    let slot = out.at_str("0");

    match strategy {
        Strategy::Serial => {
            let n = k.add_value_arg("_n", count as u32);
            k.line(format!("for (uint i = 0; i < {n}; i++) {{"))
                .line(format!("if ({test}) {{"))
                .line(format!("{slot} = i;"))
                .line("break;")
                .line("}")
                .line("}");
            run_task(&k, queue)?;
        }
        Strategy::Chunked => {
            let threads = queue.device().compute_units().clamp(1, count);
            let n = k.add_value_arg("_n", count as u32);
            let size = k.add_value_arg("_chunk", count.div_ceil(threads) as u32);
            k.line("const uint t = get_global_id(0);")
                .line(format!("const uint begin = t * {size};"))
                .line(format!("const uint end = min(begin + {size}, {n});"))
                .line("for (uint i = begin; i < end; i++) {")
                .line(format!("if ({test}) {{"))
                .line(format!("atomic_min(&{slot}, i);"))
                .line("break;")
                .line("}")
                .line("}");
            run_1d(&k, queue, threads)?;
        }
        _ => {
            k.line("const uint i = get_global_id(0);").line(format!("if ({test}) atomic_min(&{slot}, i);"));
            run_1d(&k, queue, count)?;
        }
    }
    Ok((result.read(queue)? as usize).min(count))
}
