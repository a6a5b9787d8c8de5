use tessera_codegen::{Expr, MetaKernel};
use tessera_device::Queue;

use super::{Strategy, copy::copy, debug_check_context, run_1d, scratch, trace_dispatch};
use crate::config::Config;
use crate::error::Result;
use crate::functional::Compare;
use crate::iterator::{BufferIter, DeviceIterator, nth};

/// Merges two sorted ranges into `result` and returns the end of the output.
///
/// Stable: of two equivalent elements the one from the first range comes first.
/// The output is split into tiles of `merge_tile_size`; each tile finds its
/// starting point on the merge path by binary search, then merges serially.
#[tracing::instrument(skip_all, fields(left = first1.distance(last1), right = first2.distance(last2)))]
pub fn merge<I1, I2, C>(
    first1: &I1,
    last1: &I1,
    first2: &I2,
    last2: &I2,
    result: &BufferIter<I1::Item>,
    compare: C,
    queue: &Queue,
) -> Result<BufferIter<I1::Item>>
where
    I1: DeviceIterator,
    I2: DeviceIterator<Item = I1::Item>,
    C: Compare<I1::Item>,
{
    let (n1, n2) = (first1.distance(last1), first2.distance(last2));
    if n2 == 0 {
        return copy(first1, last1, result, queue);
    }
    if n1 == 0 {
        return copy(first2, last2, result, queue);
    }
    debug_check_context(queue, &[first1.context_id(), first2.context_id(), result.context_id()]);

    let total = n1 + n2;
    let tile = Config::global().merge_tile_size.max(1);
    let tiles = total.div_ceil(tile);
    trace_dispatch("merge", Strategy::MergeSort, total);

    // splits[t]: elements of the first range consumed before output position t * tile
    let splits = scratch::<u32>(queue, tiles + 1)?;
    let mut p = MetaKernel::new("merge_path_partition");
    let len1 = p.add_value_arg("_n1", n1 as u32);
    let len2 = p.add_value_arg("_n2", n2 as u32);
    let out = splits.bind(&mut p);
    let a = first1.emit_index(Expr::var("mid"), &mut p);
    let b = first2.emit_index(Expr::var("d") - Expr::uint(1) - Expr::var("mid"), &mut p);
    let b_first = compare.call(b, a, &mut p);
    let b_first = p.expr(&b_first);
    p.line("const uint t = get_global_id(0);")
        .line(format!("const uint d = min(t * {tile}, {len1} + {len2});"))
        .line(format!("uint lo = d > {len2} ? d - {len2} : 0;"))
        .line(format!("uint hi = min(d, {len1});"))
        .line("while (lo < hi) {")
        .line("const uint mid = (lo + hi) / 2;")
        .line(format!("if ({b_first}) hi = mid;"))
        .line("else lo = mid + 1;")
        .line("}")
        .line(format!("{} = lo;", out.at_str("t")));
    run_1d(&p, queue, tiles + 1)?;

    let mut m = MetaKernel::new("merge_tiles");
    let len1 = m.add_value_arg("_n1", n1 as u32);
    let len2 = m.add_value_arg("_n2", n2 as u32);
    let split = splits.bind(&mut m);
    let output = result.bind(&mut m);
    let a = first1.emit_index(Expr::var("a"), &mut m);
    let b = first2.emit_index(Expr::var("b"), &mut m);
    let b_first = compare.call(b.clone(), a.clone(), &mut m);
    let take_a = Expr::var("a")
        .lt(Expr::var("a_end"))
        .and(Expr::var("b").ge(Expr::var("b_end")).or(!b_first));
    let take_a = m.expr(&take_a);
    let a = m.expr(&a);
    let b = m.expr(&b);
    m.line("const uint t = get_global_id(0);")
        .line(format!("const uint d = t * {tile};"))
        .line(format!("const uint d_end = min(d + {tile}, {len1} + {len2});"))
        .line(format!("uint a = {};", split.at_str("t")))
        .line("uint b = d - a;")
        .line(format!("const uint a_end = {};", split.at_str("t + 1")))
        .line("const uint b_end = d_end - a_end;")
        .line("for (uint o = d; o < d_end; o++) {")
        .line(format!("if ({take_a}) {{"))
        .line(format!("{} = {a};", output.at_str("o")))
        .line("a++;")
        .line("} else {")
        .line(format!("{} = {b};", output.at_str("o")))
        .line("b++;")
        .line("}")
        .line("}");
    run_1d(&m, queue, tiles)?;

    Ok(nth(result, total))
}
