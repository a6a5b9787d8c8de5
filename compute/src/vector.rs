use std::fmt;
use std::marker::PhantomData;

use tessera_device::{Buffer, Context, Queue};
use tessera_dtype::{Element, decode_slice, encode_slice};

use crate::algorithm::copy_buffer;
use crate::error::{IndexOutOfRangeSnafu, Result};
use crate::iterator::BufferIter;

/// A contiguous device array of `T` on one context.
///
/// The vector owns one reference to its buffer; iterators taken from it hold
/// their own, so they stay valid after the vector is dropped or resized.
pub struct Vector<T> {
    buffer: Buffer,
    len: usize,
    _element: PhantomData<fn() -> T>,
}

impl<T: Element> Vector<T> {
    /// `len` uninitialised elements.
    pub fn with_len(len: usize, context: &Context) -> Result<Self> {
        let buffer = context.create_buffer(len.max(1) * T::size())?;
        Ok(Self { buffer, len, _element: PhantomData })
    }

    /// Copies `values` to a new vector on the queue's context.
    pub fn from_slice(values: &[T], queue: &Queue) -> Result<Self> {
        let vector = Self::with_len(values.len(), queue.context())?;
        if !values.is_empty() {
            queue.enqueue_write_buffer(&vector.buffer, 0, &encode_slice(values))?;
        }
        Ok(vector)
    }

    pub fn to_vec(&self, queue: &Queue) -> Result<Vec<T>> {
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let mut bytes = vec![0u8; self.len * T::size()];
        queue.enqueue_read_buffer(&self.buffer, 0, &mut bytes)?;
        Ok(decode_slice(&bytes))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn begin(&self) -> BufferIter<T> {
        BufferIter::new(self.buffer.clone(), 0)
    }

    pub fn end(&self) -> BufferIter<T> {
        BufferIter::new(self.buffer.clone(), self.len)
    }

    /// `(begin, end)`.
    pub fn iter(&self) -> (BufferIter<T>, BufferIter<T>) {
        (self.begin(), self.end())
    }

    /// Changes the length, keeping the leading `min(len, new_len)` elements.
    ///
    /// Growing reallocates; new elements are uninitialised.
    pub fn resize(&mut self, len: usize, queue: &Queue) -> Result<()> {
        if len * T::size() <= self.buffer.size() {
            self.len = len;
            return Ok(());
        }
        let grown = Self::with_len(len, queue.context())?;
        if self.len > 0 {
            copy_buffer(&self.begin(), &grown.begin(), self.len, queue)?;
        }
        self.buffer = grown.buffer;
        self.len = len;
        Ok(())
    }

    pub fn get(&self, index: usize, queue: &Queue) -> Result<T> {
        self.check(index)?;
        BufferIter::<T>::new(self.buffer.clone(), index).read(queue)
    }

    pub fn set(&self, index: usize, value: T, queue: &Queue) -> Result<()> {
        self.check(index)?;
        BufferIter::<T>::new(self.buffer.clone(), index).write(value, queue)
    }

    fn check(&self, index: usize) -> Result<()> {
        snafu::ensure!(index < self.len, IndexOutOfRangeSnafu { index, len: self.len });
        Ok(())
    }
}

impl<T> fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector").field("buffer", &self.buffer.id()).field("len", &self.len).finish()
    }
}
