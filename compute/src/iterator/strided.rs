use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Buffer, ContextId};

use super::{DeviceIterator, SourceEmittable};

/// Every `stride`-th element of another sequence.
#[derive(Debug, Clone)]
pub struct Strided<I> {
    inner: I,
    stride: usize,
    index: usize,
}

impl<I: DeviceIterator> Strided<I> {
    pub fn new(inner: I, stride: usize) -> Self {
        debug_assert!(stride > 0, "stride must be positive");
        Self { inner, stride: stride.max(1), index: 0 }
    }

    /// End of the strided view over `[first, last)`.
    pub fn end_of(first: &I, last: &I, stride: usize) -> Self {
        let stride = stride.max(1);
        Self::new(first.clone(), stride).advance(first.distance(last).div_ceil(stride) as isize)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl<I: DeviceIterator> SourceEmittable for Strided<I> {
    type Item = I::Item;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let logical = if self.index > 0 { Expr::uint(self.index as u64) + index } else { index };
        self.inner.emit_index(logical * Expr::uint(self.stride as u64), kernel)
    }
}

impl<I: DeviceIterator> DeviceIterator for Strided<I> {
    fn position(&self) -> usize {
        self.index
    }

    fn advance(&self, n: isize) -> Self {
        Self { inner: self.inner.clone(), stride: self.stride, index: self.index.saturating_add_signed(n) }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.inner.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.inner.context_id()
    }
}
