use tessera_codegen::{Expr, MetaKernel};
use tessera_device::Queue;

use super::{Strategy, debug_check_context, device_scalar, run_1d, run_task, trace_dispatch, type_name};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{BinaryFunction, Compare, Flip};
use crate::iterator::{DeviceIterator, nth};

pub fn extrema_strategy(count: usize, config: &Config) -> Strategy {
    if count < config.extrema_serial_threshold { Strategy::Serial } else { Strategy::Atomic }
}

/// First position of the smallest element under `compare`, or `last` for an
/// empty range.
pub fn min_element<I, C>(first: &I, last: &I, compare: C, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    C: Compare<I::Item>,
{
    find_extremum(first, last, &compare, "min_element", queue)
}

/// First position of the largest element under `compare`.
pub fn max_element<I, C>(first: &I, last: &I, compare: C, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    C: Compare<I::Item>,
{
    find_extremum(first, last, &Flip(compare), "max_element", queue)
}

/// `(min_element, max_element)`.
pub fn minmax_element<I, C>(first: &I, last: &I, compare: C, queue: &Queue) -> Result<(I, I)>
where
    I: DeviceIterator,
    C: Compare<I::Item>,
{
    let min = min_element(first, last, compare.clone(), queue)?;
    let max = max_element(first, last, compare, queue)?;
    Ok((min, max))
}

/// Position of the element no other element is `better` than; ties keep the
/// lowest position.
fn find_extremum<I, C>(first: &I, last: &I, better: &C, algorithm: &'static str, queue: &Queue) -> Result<I>
where
    I: DeviceIterator,
    C: BinaryFunction<I::Item, I::Item>,
{
    let count = first.distance(last);
    match count {
        0 => return Ok(last.clone()),
        1 => return Ok(first.clone()),
        _ => {}
    }
    debug_check_context(queue, &[first.context_id()]);

    let strategy = extrema_strategy(count, &Config::global());
    trace_dispatch(algorithm, strategy, count);

    let result = device_scalar(0u32, queue)?;
    let mut k = MetaKernel::new(if strategy == Strategy::Serial { "serial_find_extrema" } else { "find_extrema" });
    let best = result.bind(&mut k);
    if strategy == Strategy::Serial {
        let n = k.add_value_arg("_n", count as u32);
        let candidate = first.emit_index(Expr::var("i"), &mut k);
        let incumbent = first.emit_index(Expr::var("best"), &mut k);
        let wins = better.call(candidate, incumbent, &mut k);
        let wins = k.expr(&wins);
        k.line("uint best = 0;")
            .line(format!("for (uint i = 1; i < {n}; i++) {{"))
            .line(format!("if ({wins}) best = i;"))
            .line("}")
            .line(format!("{} = best;", best.at_str("0")));
        run_task(&k, queue)?;
    } else {
        let ty = type_name::<I::Item>(&mut k);
        let value = first.emit_index(Expr::var("i"), &mut k);
        let value = k.expr(&value);
        let current = first.emit_index(Expr::var("cur"), &mut k);
        let current = k.expr(&current);
        let wins = better.call(Expr::var("v"), Expr::var("cv"), &mut k);
        let loses = better.call(Expr::var("cv"), Expr::var("v"), &mut k);
        let claim = wins.or((!loses).and(Expr::var("i").lt(Expr::var("cur"))));
        let claim = k.expr(&claim);
        let slot = format!("&{}", best.at_str("0"));
        k.line("const uint i = get_global_id(0);")
            .line(format!("const {ty} v = {value};"))
            .line(format!("uint cur = atomic_or({slot}, 0u);"))
            .line("while (1) {")
            .line(format!("const {ty} cv = {current};"))
            .line(format!("if (!{claim}) break;"))
            .line(format!("const uint prev = atomic_cmpxchg({slot}, cur, i);"))
            .line("if (prev == cur) break;")
            .line("cur = prev;")
            .line("}");
        run_1d(&k, queue, count)?;
    }
    Ok(nth(first, result.read(queue)? as usize))
}
