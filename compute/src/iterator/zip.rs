use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Buffer, ContextId};
use tessera_dtype::HasDType;

use super::{DeviceIterator, SourceEmittable};

/// Pairs of elements of two sequences, as a `tuple_A_B_t` aggregate.
#[derive(Debug, Clone)]
pub struct Zip2<A, B> {
    a: A,
    b: B,
}

impl<A: DeviceIterator, B: DeviceIterator> Zip2<A, B> {
    pub fn new(a: A, b: B) -> Self {
        debug_assert!(same_context(&[a.context_id(), b.context_id()]), "zipped iterators belong to different contexts");
        Self { a, b }
    }
}

impl<A: DeviceIterator, B: DeviceIterator> SourceEmittable for Zip2<A, B> {
    type Item = (A::Item, B::Item);

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let a = self.a.emit_index(index.clone(), kernel);
        let b = self.b.emit_index(index, kernel);
        Expr::construct(<Self::Item as HasDType>::dtype(), [a, b])
    }
}

impl<A: DeviceIterator, B: DeviceIterator> DeviceIterator for Zip2<A, B> {
    fn position(&self) -> usize {
        self.a.position()
    }

    fn advance(&self, n: isize) -> Self {
        Self { a: self.a.advance(n), b: self.b.advance(n) }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.a.reads(buffer) || self.b.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.a.context_id().or_else(|| self.b.context_id())
    }
}

/// Triples of elements of three sequences.
#[derive(Debug, Clone)]
pub struct Zip3<A, B, C> {
    a: A,
    b: B,
    c: C,
}

impl<A: DeviceIterator, B: DeviceIterator, C: DeviceIterator> Zip3<A, B, C> {
    pub fn new(a: A, b: B, c: C) -> Self {
        debug_assert!(
            same_context(&[a.context_id(), b.context_id(), c.context_id()]),
            "zipped iterators belong to different contexts"
        );
        Self { a, b, c }
    }
}

impl<A: DeviceIterator, B: DeviceIterator, C: DeviceIterator> SourceEmittable for Zip3<A, B, C> {
    type Item = (A::Item, B::Item, C::Item);

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        let a = self.a.emit_index(index.clone(), kernel);
        let b = self.b.emit_index(index.clone(), kernel);
        let c = self.c.emit_index(index, kernel);
        Expr::construct(<Self::Item as HasDType>::dtype(), [a, b, c])
    }
}

impl<A: DeviceIterator, B: DeviceIterator, C: DeviceIterator> DeviceIterator for Zip3<A, B, C> {
    fn position(&self) -> usize {
        self.a.position()
    }

    fn advance(&self, n: isize) -> Self {
        Self { a: self.a.advance(n), b: self.b.advance(n), c: self.c.advance(n) }
    }

    fn reads(&self, buffer: &Buffer) -> bool {
        self.a.reads(buffer) || self.b.reads(buffer) || self.c.reads(buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        self.a.context_id().or_else(|| self.b.context_id()).or_else(|| self.c.context_id())
    }
}

pub(crate) fn same_context(ids: &[Option<ContextId>]) -> bool {
    let mut known = ids.iter().flatten();
    match known.next() {
        Some(first) => known.all(|id| id == first),
        None => true,
    }
}
