//! Sorting.
//!
//! | range                                   | strategy                         |
//! |-----------------------------------------|----------------------------------|
//! | up to 3 elements                        | compare-and-swap network         |
//! | up to `insertion_sort_threshold`        | insertion sort in local memory   |
//! | `<`/`>` on an integer or float scalar   | LSD radix sort, 4-bit digits     |
//! | anything else                           | insertion sort in global memory  |
//!
//! Every strategy except a descending radix sort is stable.

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::Queue;
use tessera_dtype::{DType, Element, HasDType, ScalarType};

use super::{Strategy, compact::stable_partition, copy::reverse, copy_buffer, debug_check_context, run_1d, run_task, scratch, trace_dispatch, type_name};
use crate::config::Config;
use crate::error::Result;
use crate::functional::{Bind1st, Bind2nd, Compare, Not1, Plus, SortOrder};
use crate::iterator::{BoundBuffer, BufferIter, DeviceIterator};

const RADIX_BITS: u32 = 4;
/// Ranges at most this long are finished by a full sort in `nth_element`.
const SELECT_SORT_THRESHOLD: usize = 32;
const RADIX_BUCKETS: usize = 1 << RADIX_BITS;

pub fn sort_strategy(count: usize, natural_order: Option<SortOrder>, key: Option<ScalarType>, config: &Config) -> Strategy {
    if count <= 3 {
        Strategy::FixedSort
    } else if count <= config.insertion_sort_threshold {
        Strategy::InsertionSort
    } else if natural_order.is_some() && key.is_some() {
        Strategy::RadixSort
    } else {
        Strategy::InsertionSort
    }
}

/// Scalar type of `T` when its order can be reproduced with radix digits.
fn radix_key<T: Element>() -> Option<ScalarType> {
    match T::dtype() {
        DType::Scalar(s) if ScalarType::RADIX_KEYS.contains(s) => Some(s),
        _ => None,
    }
}

/// Sorts `[first, last)` in place so that `compare(x[i + 1], x[i])` never holds.
///
/// ```ignore
/// sort(&v.begin(), &v.end(), Less, &queue)?;
/// ```
pub fn sort<T, C>(first: &BufferIter<T>, last: &BufferIter<T>, compare: C, queue: &Queue) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    sort_impl::<T, T, C>(first, last, None, &compare, queue)
}

pub fn sort_default<T, C>(first: &BufferIter<T>, last: &BufferIter<T>, compare: C) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    sort(first, last, compare, &crate::system::default_queue()?)
}

/// Partially sorts `[first, last)` so that `nth` holds the element a full sort
/// would place there, nothing before it orders after it and nothing after it
/// orders before it.
///
/// Each round partitions the remaining range three ways around the current
/// value at `nth` and keeps the side that contains `nth`.
#[tracing::instrument(skip_all, fields(count = first.distance(last), nth = first.distance(nth)))]
pub fn nth_element<T, C>(first: &BufferIter<T>, nth: &BufferIter<T>, last: &BufferIter<T>, compare: C, queue: &Queue) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    debug_assert!(first.index() <= nth.index(), "nth precedes the range");
    if nth.index() >= last.index() {
        return Ok(());
    }
    let (mut lo, mut hi) = (first.clone(), last.clone());
    loop {
        if lo.distance(&hi) <= SELECT_SORT_THRESHOLD {
            return sort(&lo, &hi, compare, queue);
        }
        let pivot = nth.read(queue)?;
        let less = stable_partition(&lo, &hi, Bind2nd::new(compare.clone(), pivot), queue)?;
        let equal = stable_partition(&less, &hi, Not1(Bind1st::new(compare.clone(), pivot)), queue)?;
        tracing::trace!(below = lo.distance(&less), equal = less.distance(&equal), "select round");
        if nth.index() < less.index() {
            hi = less;
        } else if nth.index() < equal.index() {
            return Ok(());
        } else {
            lo = equal;
        }
    }
}

/// Sorts keys and applies the same permutation to the values starting at
/// `values_first`.
pub fn sort_by_key<K, V, C>(
    keys_first: &BufferIter<K>,
    keys_last: &BufferIter<K>,
    values_first: &BufferIter<V>,
    compare: C,
    queue: &Queue,
) -> Result<()>
where
    K: Element,
    V: Element,
    C: Compare<K>,
{
    sort_impl(keys_first, keys_last, Some(values_first), &compare, queue)
}

/// Sort that keeps equal elements in their original order.
pub fn stable_sort<T, C>(first: &BufferIter<T>, last: &BufferIter<T>, compare: C, queue: &Queue) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    let count = first.distance(last);
    if count < 2 {
        return Ok(());
    }
    if queue.device().is_cpu() {
        return merge_sort_on_cpu(first, last, compare, queue);
    }
    match compare.natural_order() {
        Some(SortOrder::Descending) if count > 3 => {
            let config = Config::global();
            trace_dispatch("stable_sort", Strategy::InsertionSort, count);
            insertion_sort::<T, T, C>(first, count, None, &compare, count <= config.insertion_sort_threshold, queue)
        }
        _ => sort(first, last, compare, queue),
    }
}

fn sort_impl<K, V, C>(
    first: &BufferIter<K>,
    last: &BufferIter<K>,
    values: Option<&BufferIter<V>>,
    compare: &C,
    queue: &Queue,
) -> Result<()>
where
    K: Element,
    V: Element,
    C: Compare<K>,
{
    let count = first.distance(last);
    if count < 2 {
        return Ok(());
    }
    debug_check_context(queue, &[first.context_id(), values.and_then(|v| v.context_id())]);

    let config = Config::global();
    let radix = compare.natural_order().zip(radix_key::<K>());
    let strategy = sort_strategy(count, compare.natural_order(), radix_key::<K>(), &config);
    trace_dispatch(if values.is_some() { "sort_by_key" } else { "sort" }, strategy, count);

    match (strategy, radix) {
        (Strategy::FixedSort, _) => fixed_sort(first, count, values, compare, queue),
        (Strategy::RadixSort, Some((order, key))) => {
            radix_sort(first, count, values, key, &config, queue)?;
            if order == SortOrder::Descending {
                reverse(first, last, queue)?;
                if let Some(values) = values {
                    reverse(values, &values.advance(count as isize), queue)?;
                }
            }
            Ok(())
        }
        _ => insertion_sort(first, count, values, compare, count <= config.insertion_sort_threshold, queue),
    }
}

/// Value arrays bound on a kernel alongside the keys, with their type name.
fn bind_values<V: Element>(values: Option<&BufferIter<V>>, kernel: &mut MetaKernel) -> Option<(BoundBuffer, String)> {
    values.map(|v| {
        let bound = v.bind(kernel);
        (bound, type_name::<V>(kernel))
    })
}

/// Bubble network: `(0, 1)` for two elements, `(0, 1), (1, 2), (0, 1)` for three.
fn fixed_sort<K, V, C>(first: &BufferIter<K>, count: usize, values: Option<&BufferIter<V>>, compare: &C, queue: &Queue) -> Result<()>
where
    K: Element,
    V: Element,
    C: Compare<K>,
{
    let pairs: &[(usize, usize)] = if count == 2 { &[(0, 1)] } else { &[(0, 1), (1, 2), (0, 1)] };
    let mut k = MetaKernel::new(format!("fixed_sort_{count}"));
    let ty = type_name::<K>(&mut k);
    let keys = first.bind(&mut k);
    let vals = bind_values(values, &mut k);
    for &(i, j) in pairs {
        let (i, j) = (i.to_string(), j.to_string());
        let a = k.var("a");
        let b = k.var("b");
        let swap = compare.call(Expr::var(b.clone()), Expr::var(a.clone()), &mut k);
        let swap = k.expr(&swap);
        k.line(format!("const {ty} {a} = {};", keys.at_str(&i)))
            .line(format!("const {ty} {b} = {};", keys.at_str(&j)))
            .line(format!("if ({swap}) {{"))
            .line(format!("{} = {b};", keys.at_str(&i)))
            .line(format!("{} = {a};", keys.at_str(&j)));
        if let Some((vals, vty)) = &vals {
            let t = k.var("t");
            k.line(format!("const {vty} {t} = {};", vals.at_str(&i)))
                .line(format!("{} = {};", vals.at_str(&i), vals.at_str(&j)))
                .line(format!("{} = {t};", vals.at_str(&j)));
        }
        k.line("}");
    }
    run_task(&k, queue)
}

/// Stable insertion sort on one work-item, staged through local memory when
/// `in_local` is set.
fn insertion_sort<K, V, C>(
    first: &BufferIter<K>,
    count: usize,
    values: Option<&BufferIter<V>>,
    compare: &C,
    in_local: bool,
    queue: &Queue,
) -> Result<()>
where
    K: Element,
    V: Element,
    C: Compare<K>,
{
    let mut k = MetaKernel::new(if in_local { "local_insertion_sort" } else { "insertion_sort" });
    let ty = type_name::<K>(&mut k);
    let n = k.add_value_arg("_n", count as u32);
    let keys = first.bind(&mut k);
    let vals = bind_values(values, &mut k);

    let (work_keys, work_vals) = if in_local {
        let local_keys = BoundBuffer::array(k.add_local_arg(<K as HasDType>::dtype(), count));
        let local_vals = vals.as_ref().map(|_| BoundBuffer::array(k.add_local_arg(<V as HasDType>::dtype(), count)));
        k.line(format!("for (uint i = 0; i < {n}; i++) {{"));
        k.line(format!("{} = {};", local_keys.at_str("i"), keys.at_str("i")));
        if let (Some(local), Some((vals, _))) = (&local_vals, &vals) {
            k.line(format!("{} = {};", local.at_str("i"), vals.at_str("i")));
        }
        k.line("}");
        (local_keys, local_vals)
    } else {
        (keys.clone(), vals.as_ref().map(|(v, _)| v.clone()))
    };

    let before = compare.call(Expr::var("key"), work_keys.at(Expr::var("j") - Expr::uint(1)), &mut k);
    let before = k.expr(&before);
    k.line(format!("for (uint i = 1; i < {n}; i++) {{"))
        .line(format!("const {ty} key = {};", work_keys.at_str("i")));
    if let (Some(wv), Some((_, vty))) = (&work_vals, &vals) {
        k.line(format!("const {vty} val = {};", wv.at_str("i")));
    }
    k.line("uint j = i;").line(format!("while (j > 0 && {before}) {{"));
    k.line(format!("{} = {};", work_keys.at_str("j"), work_keys.at_str("j - 1")));
    if let Some(wv) = &work_vals {
        k.line(format!("{} = {};", wv.at_str("j"), wv.at_str("j - 1")));
    }
    k.line("j--;").line("}");
    k.line(format!("{} = key;", work_keys.at_str("j")));
    if let Some(wv) = &work_vals {
        k.line(format!("{} = val;", wv.at_str("j")));
    }
    k.line("}");

    if in_local {
        k.line(format!("for (uint i = 0; i < {n}; i++) {{"));
        k.line(format!("{} = {};", keys.at_str("i"), work_keys.at_str("i")));
        if let (Some(local), Some((vals, _))) = (&work_vals, &vals) {
            k.line(format!("{} = {};", vals.at_str("i"), local.at_str("i")));
        }
        k.line("}");
    }
    run_task(&k, queue)
}

/// Device helper mapping a key to an unsigned integer with the same order.
///
/// Returns the function name and its definition.
fn radix_key_function(key: ScalarType) -> (String, String) {
    let ty = key.cl_name();
    let name = format!("_radix_key_{ty}");
    let body = match key {
        ScalarType::UChar | ScalarType::UShort | ScalarType::UInt => "return (uint)(v);".to_string(),
        ScalarType::ULong => "return v;".to_string(),
        ScalarType::Char | ScalarType::Short => format!("return (uint)((int)(v) + {});", 1u32 << (key.bits() - 1)),
        ScalarType::Int => "return as_uint(v) ^ 0x80000000u;".to_string(),
        ScalarType::Long => "return as_ulong(v) ^ 0x8000000000000000ul;".to_string(),
        ScalarType::Float => {
            "const uint u = as_uint(v);\n    return (u & 0x80000000u) ? ~u : (u | 0x80000000u);".to_string()
        }
        _ => "const ulong u = as_ulong(v);\n    return (u & 0x8000000000000000ul) ? ~u : (u | 0x8000000000000000ul);"
            .to_string(),
    };
    let out = if key.bits() > 32 { "ulong" } else { "uint" };
    let source = format!("{out} {name}({ty} v) {{\n    {body}\n}}");
    (name, source)
}

/// Ascending LSD radix sort, one pass per 4-bit digit.
///
/// Each pass counts digits per block of `radix_block_size` elements, turns the
/// digit-major counts into offsets with an exclusive scan, then scatters every
/// block in order, which keeps the sort stable.
fn radix_sort<K, V>(
    first: &BufferIter<K>,
    count: usize,
    values: Option<&BufferIter<V>>,
    key: ScalarType,
    config: &Config,
    queue: &Queue,
) -> Result<()>
where
    K: Element,
    V: Element,
{
    let block = config.radix_block_size.max(1);
    let blocks = count.div_ceil(block);
    let table = RADIX_BUCKETS * blocks;
    let counts = scratch::<u32>(queue, table)?;
    let offsets = scratch::<u32>(queue, table)?;
    let spare_keys = scratch::<K>(queue, count)?;
    let spare_vals = values.map(|_| scratch::<V>(queue, count)).transpose()?;
    let (key_fn, key_source) = radix_key_function(key);

    let mut src = (first.clone(), values.cloned());
    let mut dst = (spare_keys, spare_vals);
    for pass in 0..key.bits() / RADIX_BITS {
        let shift = pass * RADIX_BITS;

        let mut c = MetaKernel::new("radix_count");
        c.add_function(&key_fn, &key_source);
        let n = c.add_value_arg("_n", count as u32);
        let nblocks = c.add_value_arg("_blocks", blocks as u32);
        let bits = c.add_value_arg("_shift", shift);
        let input = src.0.bind(&mut c);
        let out = counts.bind(&mut c);
        c.line("const uint b = get_global_id(0);")
            .line(format!("const uint begin = b * {block};"))
            .line(format!("const uint end = min(begin + {block}, {n});"))
            .line(format!("for (uint d = 0; d < {RADIX_BUCKETS}; d++) {} = 0;", out.at_str(&format!("d * {nblocks} + b"))))
            .line("for (uint i = begin; i < end; i++) {")
            .line(format!("const uint d = ({key_fn}({}) >> {bits}) & {};", input.at_str("i"), RADIX_BUCKETS - 1))
            .line(format!("{} += 1;", out.at_str(&format!("d * {nblocks} + b"))))
            .line("}");
        run_1d(&c, queue, blocks)?;

        super::exclusive_scan(&counts, &counts.advance(table as isize), &offsets, 0u32, Plus, queue)?;

        let mut s = MetaKernel::new(if values.is_some() { "radix_scatter_by_key" } else { "radix_scatter" });
        s.add_function(&key_fn, &key_source);
        let ty = type_name::<K>(&mut s);
        let n = s.add_value_arg("_n", count as u32);
        let nblocks = s.add_value_arg("_blocks", blocks as u32);
        let bits = s.add_value_arg("_shift", shift);
        let input = src.0.bind(&mut s);
        let output = dst.0.bind(&mut s);
        let offset = offsets.bind(&mut s);
        let slot = offset.at_str(&format!("d * {nblocks} + b"));
        s.line("const uint b = get_global_id(0);")
            .line(format!("const uint begin = b * {block};"))
            .line(format!("const uint end = min(begin + {block}, {n});"))
            .line("for (uint i = begin; i < end; i++) {")
            .line(format!("const {ty} key = {};", input.at_str("i")))
            .line(format!("const uint d = ({key_fn}(key) >> {bits}) & {};", RADIX_BUCKETS - 1))
            .line(format!("const uint pos = {slot};"))
            .line(format!("{slot} = pos + 1;"))
            .line(format!("{} = key;", output.at_str("pos")));
        if let (Some(vin), Some(vout)) = (&src.1, &dst.1) {
            let vin = vin.bind(&mut s);
            let vout = vout.bind(&mut s);
            s.line(format!("{} = {};", vout.at_str("pos"), vin.at_str("i")));
        }
        s.line("}");
        run_1d(&s, queue, blocks)?;

        std::mem::swap(&mut src, &mut dst);
    }

    if !src.0.same_buffer(first) {
        copy_buffer(&src.0, first, count, queue)?;
        if let (Some(sorted), Some(values)) = (&src.1, values) {
            copy_buffer(sorted, values, count, queue)?;
        }
    }
    Ok(())
}

/// Merge sort for CPU-class devices: insertion-sorted blocks of
/// `merge_sort_block_size` elements merged pairwise until one run remains.
///
/// Stable. Ranges up to `merge_sort_threshold` are a single insertion sort.
pub fn merge_sort_on_cpu<T, C>(first: &BufferIter<T>, last: &BufferIter<T>, compare: C, queue: &Queue) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    let count = first.distance(last);
    if count < 2 {
        return Ok(());
    }
    debug_check_context(queue, &[first.context_id()]);

    let config = Config::global();
    if count <= config.merge_sort_threshold {
        trace_dispatch("merge_sort_on_cpu", Strategy::InsertionSort, count);
        return block_insertion_sort(first, count, count, &compare, queue);
    }
    trace_dispatch("merge_sort_on_cpu", Strategy::MergeSort, count);

    let block = config.merge_sort_block_size.max(1);
    block_insertion_sort(first, count, block, &compare, queue)?;

    let mut src = first.clone();
    let mut dst = scratch::<T>(queue, count)?;
    let mut width = block;
    while width < count {
        merge_pass(&src, &dst, count, width, &compare, queue)?;
        std::mem::swap(&mut src, &mut dst);
        width *= 2;
    }
    if !src.same_buffer(first) {
        copy_buffer(&src, first, count, queue)?;
    }
    Ok(())
}

/// One work-item per block of `block` elements, each insertion-sorting its block.
fn block_insertion_sort<T, C>(first: &BufferIter<T>, count: usize, block: usize, compare: &C, queue: &Queue) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    let mut k = MetaKernel::new("block_insertion_sort");
    let ty = type_name::<T>(&mut k);
    let n = k.add_value_arg("_n", count as u32);
    let size = k.add_value_arg("_block", block as u32);
    let x = first.bind(&mut k);
    let before = compare.call(Expr::var("key"), x.at(Expr::var("j") - Expr::uint(1)), &mut k);
    let before = k.expr(&before);
    k.line("const uint b = get_global_id(0);")
        .line(format!("const uint begin = b * {size};"))
        .line(format!("const uint end = min(begin + {size}, {n});"))
        .line("for (uint i = begin + 1; i < end; i++) {")
        .line(format!("const {ty} key = {};", x.at_str("i")))
        .line("uint j = i;")
        .line(format!("while (j > begin && {before}) {{"))
        .line(format!("{} = {};", x.at_str("j"), x.at_str("j - 1")))
        .line("j--;")
        .line("}")
        .line(format!("{} = key;", x.at_str("j")))
        .line("}");
    run_1d(&k, queue, count.div_ceil(block))
}

/// Merges adjacent sorted runs of `width` elements from `src` into `dst`; ties
/// take the left run first.
fn merge_pass<T, C>(src: &BufferIter<T>, dst: &BufferIter<T>, count: usize, width: usize, compare: &C, queue: &Queue) -> Result<()>
where
    T: Element,
    C: Compare<T>,
{
    let mut k = MetaKernel::new("merge_runs");
    let n = k.add_value_arg("_n", count as u32);
    let w = k.add_value_arg("_width", width as u32);
    let input = src.bind(&mut k);
    let output = dst.bind(&mut k);
    let right_first = compare.call(input.at(Expr::var("b")), input.at(Expr::var("a")), &mut k);
    let take_left = Expr::var("a").lt(Expr::var("mid")).and(Expr::var("b").ge(Expr::var("hi")).or(!right_first));
    let take_left = k.expr(&take_left);
    k.line("const uint p = get_global_id(0);")
        .line(format!("const uint lo = p * 2 * {w};"))
        .line(format!("const uint mid = min(lo + {w}, {n});"))
        .line(format!("const uint hi = min(lo + 2 * {w}, {n});"))
        .line("uint a = lo;")
        .line("uint b = mid;")
        .line("for (uint o = lo; o < hi; o++) {")
        .line(format!("if ({take_left}) {{"))
        .line(format!("{} = {};", output.at_str("o"), input.at_str("a")))
        .line("a++;")
        .line("} else {")
        .line(format!("{} = {};", output.at_str("o"), input.at_str("b")))
        .line("b++;")
        .line("}")
        .line("}");
    run_1d(&k, queue, count.div_ceil(2 * width))
}
