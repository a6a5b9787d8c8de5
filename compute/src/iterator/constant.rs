use tessera_codegen::{Expr, MetaKernel};
use tessera_device::ContextId;
use tessera_dtype::Element;

use super::{DeviceIterator, SourceEmittable};

/// An endless repetition of one value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant<T> {
    value: T,
    index: usize,
}

impl<T: Element> Constant<T> {
    pub fn new(value: T) -> Self {
        Self { value, index: 0 }
    }

    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: Element> SourceEmittable for Constant<T> {
    type Item = T;

    fn emit_index(&self, _index: Expr, kernel: &mut MetaKernel) -> Expr {
        Expr::var(kernel.add_value_arg("_const", self.value))
    }
}

impl<T: Element> DeviceIterator for Constant<T> {
    fn position(&self) -> usize {
        self.index
    }

    fn advance(&self, n: isize) -> Self {
        Self { value: self.value, index: self.index.saturating_add_signed(n) }
    }

    fn context_id(&self) -> Option<ContextId> {
        None
    }
}
