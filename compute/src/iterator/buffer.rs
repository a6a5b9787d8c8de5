use std::fmt;
use std::marker::PhantomData;

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Buffer, ContextId, Queue};
use tessera_dtype::{AddrSpace, Element};

use super::{DeviceIterator, SourceEmittable};
use crate::error::Result;

/// Iterator over the elements of a buffer.
pub struct BufferIter<T> {
    buffer: Buffer,
    index: usize,
    _element: PhantomData<fn() -> T>,
}

impl<T: Element> BufferIter<T> {
    pub fn new(buffer: Buffer, index: usize) -> Self {
        Self { buffer, index, _element: PhantomData }
    }

    pub fn get_buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of the current element.
    pub fn byte_offset(&self) -> usize {
        self.index * T::size()
    }

    /// Declares the buffer on `kernel` once, for repeated indexing.
    pub fn bind(&self, kernel: &mut MetaKernel) -> BoundBuffer {
        let name = kernel.add_buffer_arg(AddrSpace::Global, T::dtype(), &self.buffer);
        let offset = (self.index > 0).then(|| kernel.add_value_arg("_off", self.index as u32));
        BoundBuffer { name, offset }
    }

    /// Reads the current element.
    pub fn read(&self, queue: &Queue) -> Result<T> {
        let mut bytes = vec![0u8; T::size()];
        queue.enqueue_read_buffer(&self.buffer, self.byte_offset(), &mut bytes)?;
        Ok(T::decode(&bytes))
    }

    /// Overwrites the current element.
    pub fn write(&self, value: T, queue: &Queue) -> Result<()> {
        let mut bytes = Vec::with_capacity(T::size());
        value.encode(&mut bytes);
        queue.enqueue_write_buffer(&self.buffer, self.byte_offset(), &bytes)?;
        Ok(())
    }

    /// Whether `self` and `other` view the same buffer.
    pub fn same_buffer(&self, other: &BufferIter<T>) -> bool {
        self.buffer == other.buffer
    }
}

impl<T> Clone for BufferIter<T> {
    fn clone(&self) -> Self {
        Self { buffer: self.buffer.clone(), index: self.index, _element: PhantomData }
    }
}

impl<T> PartialEq for BufferIter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer && self.index == other.index
    }
}

impl<T> fmt::Debug for BufferIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferIter").field("buffer", &self.buffer.id()).field("index", &self.index).finish()
    }
}

impl<T: Element> SourceEmittable for BufferIter<T> {
    type Item = T;

    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr {
        self.bind(kernel).at(index)
    }
}

impl<T: Element> DeviceIterator for BufferIter<T> {
    fn position(&self) -> usize {
        self.index
    }

    fn advance(&self, n: isize) -> Self {
        let index = self.index.checked_add_signed(n);
        debug_assert!(index.is_some(), "iterator advanced before the start of its buffer");
        Self::new(self.buffer.clone(), index.unwrap_or(0))
    }

    fn buffer(&self) -> Option<&Buffer> {
        Some(&self.buffer)
    }

    fn context_id(&self) -> Option<ContextId> {
        Some(self.buffer.context_id())
    }
}

/// A buffer parameter declared on a kernel, with the iterator's start offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundBuffer {
    name: String,
    offset: Option<String>,
}

impl BoundBuffer {
    /// A kernel array indexed from zero, such as a `__local` scratch argument.
    pub(crate) fn array(name: impl Into<String>) -> Self {
        Self { name: name.into(), offset: None }
    }

    /// Parameter name of the buffer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element `index` positions past the iterator.
    pub fn at(&self, index: impl Into<Expr>) -> Expr {
        let index = index.into();
        let index = match &self.offset {
            Some(offset) => Expr::var(offset.clone()) + index,
            None => index,
        };
        Expr::var(self.name.clone()).index(index)
    }

    /// Rendered text of [`BoundBuffer::at`], for splicing into statements.
    pub fn at_str(&self, index: &str) -> String {
        match &self.offset {
            Some(offset) => format!("{}[{offset} + {index}]", self.name),
            None => format!("{}[{index}]", self.name),
        }
    }
}
