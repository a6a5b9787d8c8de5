use tessera_codegen::{Expr, MetaKernel};
use tessera_device::ContextId;
use tessera_dtype::ScalarElement;

use super::{DeviceIterator, SourceEmittable};

/// The sequence `start, start + 1, ...`, computed in the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Counting<T> {
    start: T,
    index: usize,
}

impl<T: ScalarElement> Counting<T> {
    pub fn new(start: T) -> Self {
        Self { start, index: 0 }
    }

    pub fn start(&self) -> T {
        self.start
    }
}

impl<T: ScalarElement> SourceEmittable for Counting<T> {
    type Item = T;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let start = kernel.add_value_arg("_start", self.start);
        let step = if self.index > 0 { Expr::uint(self.index as u64) + index } else { index };
        (Expr::var(start) + step.cast(T::dtype())).cast(T::dtype())
    }
}

impl<T: ScalarElement> DeviceIterator for Counting<T> {
    fn position(&self) -> usize {
        self.index
    }

    fn advance(&self, n: isize) -> Self {
        Self { start: self.start, index: self.index.saturating_add_signed(n) }
    }

    fn context_id(&self) -> Option<ContextId> {
        None
    }
}
