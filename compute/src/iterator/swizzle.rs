use std::marker::PhantomData;

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Buffer, ContextId};
use tessera_dtype::{Element, HasDType};

use super::{DeviceIterator, SourceEmittable};

/// Selected components of a vector sequence, e.g. `xy` of `float4` as `float2`.
pub struct Swizzle<I, T> {
    inner: I,
    components: String,
    _element: PhantomData<fn() -> T>,
}

impl<I: DeviceIterator, T: Element> Swizzle<I, T> {
    /// `components` uses the `xyzw` or `s0123...` notation.
    pub fn new(inner: I, components: impl Into<String>) -> Self {
        let components = components.into();
        let source_lanes = <I::Item as HasDType>::dtype().lanes();
        debug_assert!(source_lanes > 1, "swizzle of a non-vector element");
        debug_assert_eq!(
            component_count(&components, source_lanes),
            T::dtype().lanes(),
            "swizzle '{components}' does not produce {}",
            T::dtype()
        );
        Self { inner, components, _element: PhantomData }
    }
}

fn component_count(components: &str, source_lanes: usize) -> usize {
    if matches!(components, "lo" | "hi" | "even" | "odd") {
        return source_lanes / 2;
    }
    match components.strip_prefix('s').or_else(|| components.strip_prefix('S')) {
        Some(indices) => indices.len(),
        None => components.len(),
    }
}

impl<I: Clone, T> Clone for Swizzle<I, T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), components: self.components.clone(), _element: PhantomData }
    }
}

impl<I: std::fmt::Debug, T> std::fmt::Debug for Swizzle<I, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swizzle").field("inner", &self.inner).field("components", &self.components).finish()
    }
}

impl<I: DeviceIterator, T: Element> SourceEmittable for Swizzle<I, T> {
    type Item = T;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        self.inner.emit_index(index, kernel).member(self.components.clone())
    }
}

impl<I: DeviceIterator, T: Element> DeviceIterator for Swizzle<I, T> {
    fn position(&self) -> usize {
        self.inner.position()
    }

    fn advance(&self, n: isize) -> Self {
        Self { inner: self.inner.advance(n), components: self.components.clone(), _element: PhantomData }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.inner.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.inner.context_id()
    }
}
