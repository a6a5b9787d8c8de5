use tessera_codegen::MetaKernel;
use tessera_device::Queue;
use tessera_dtype::Element;

use super::{debug_check_context, run_1d};
use crate::error::Result;
use crate::functional::Generator;
use crate::iterator::{BufferIter, DeviceIterator, nth};

/// Stores `generator()` into every element of `[first, last)`.
///
/// The generator runs once per element with no ordering between calls.
pub fn generate<T, G>(first: &BufferIter<T>, last: &BufferIter<T>, generator: G, queue: &Queue) -> Result<()>
where
    T: Element,
    G: Generator<Output = T>,
{
    generate_n(first, first.distance(last), generator, queue)?;
    Ok(())
}

pub fn generate_n<T, G>(first: &BufferIter<T>, count: usize, generator: G, queue: &Queue) -> Result<BufferIter<T>>
where
    T: Element,
    G: Generator<Output = T>,
{
    if count > 0 {
        debug_check_context(queue, &[first.context_id()]);
        let mut k = MetaKernel::new("generate");
        let out = first.bind(&mut k);
        let value = generator.call(&mut k);
        let value = k.expr(&value);
        k.line("const uint i = get_global_id(0);").line(format!("{} = {value};", out.at_str("i")));
        run_1d(&k, queue, count)?;
    }
    Ok(nth(first, count))
}
