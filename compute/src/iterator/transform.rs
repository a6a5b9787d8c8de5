use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Buffer, ContextId};

use super::{DeviceIterator, SourceEmittable};
use crate::functional::{BinaryFunction, UnaryFunction};

/// `f(x[i])`.
#[derive(Debug, Clone)]
pub struct Transform<I, F> {
    inner: I,
    function: F,
}

impl<I: DeviceIterator, F: UnaryFunction<I::Item>> Transform<I, F> {
    pub fn new(inner: I, function: F) -> Self {
        Self { inner, function }
    }

    pub fn base(&self) -> &I {
        &self.inner
    }
}

impl<I: DeviceIterator, F: UnaryFunction<I::Item>> SourceEmittable for Transform<I, F> {
    type Item = F::Output;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let arg = self.inner.emit_index(index, kernel);
        self.function.call(arg, kernel)
    }
}

impl<I: DeviceIterator, F: UnaryFunction<I::Item>> DeviceIterator for Transform<I, F> {
    fn position(&self) -> usize {
        self.inner.position()
    }

    fn advance(&self, n: isize) -> Self {
        Self { inner: self.inner.advance(n), function: self.function.clone() }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.inner.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.inner.context_id()
    }
}

/// `f(a[i], b[i])`.
#[derive(Debug, Clone)]
pub struct BinaryTransform<I1, I2, F> {
    first: I1,
    second: I2,
    function: F,
}

impl<I1, I2, F> BinaryTransform<I1, I2, F>
where
    I1: DeviceIterator,
    I2: DeviceIterator,
    F: BinaryFunction<I1::Item, I2::Item>,
{
    pub fn new(first: I1, second: I2, function: F) -> Self {
        Self { first, second, function }
    }
}

impl<I1, I2, F> SourceEmittable for BinaryTransform<I1, I2, F>
where
    I1: DeviceIterator,
    I2: DeviceIterator,
    F: BinaryFunction<I1::Item, I2::Item>,
{
    type Item = F::Output;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let lhs = self.first.emit_index(index.clone(), kernel);
        let rhs = self.second.emit_index(index, kernel);
        self.function.call(lhs, rhs, kernel)
    }
}

impl<I1, I2, F> DeviceIterator for BinaryTransform<I1, I2, F>
where
    I1: DeviceIterator,
    I2: DeviceIterator,
    F: BinaryFunction<I1::Item, I2::Item>,
{
    fn position(&self) -> usize {
        self.first.position()
    }

    fn advance(&self, n: isize) -> Self {
        Self { first: self.first.advance(n), second: self.second.advance(n), function: self.function.clone() }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.first.reads(buffer) || self.second.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.first.context_id().or_else(|| self.second.context_id())
    }
}

/// `f(x[i], x[i + 1])`: a range of `n` inputs yields `n - 1` elements.
#[derive(Debug, Clone)]
pub struct AdjacentTransform<I, F> {
    inner: I,
    function: F,
}

impl<I: DeviceIterator, F: BinaryFunction<I::Item, I::Item>> AdjacentTransform<I, F> {
    pub fn new(inner: I, function: F) -> Self {
        Self { inner, function }
    }
}

impl<I: DeviceIterator, F: BinaryFunction<I::Item, I::Item>> SourceEmittable for AdjacentTransform<I, F> {
    type Item = F::Output;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let current = self.inner.emit_index(index.clone(), kernel);
        let next = self.inner.emit_index(index + Expr::uint(1), kernel);
        self.function.call(current, next, kernel)
    }
}

impl<I: DeviceIterator, F: BinaryFunction<I::Item, I::Item>> DeviceIterator for AdjacentTransform<I, F> {
    fn position(&self) -> usize {
        self.inner.position()
    }

    fn advance(&self, n: isize) -> Self {
        Self { inner: self.inner.advance(n), function: self.function.clone() }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.inner.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.inner.context_id()
    }
}
