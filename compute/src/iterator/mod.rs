//! Device iterators.
//!
//! An iterator does not hold values: indexing it inside a kernel yields the
//! expression that reads the element. Adaptors wrap other iterators and
//! compose those expressions, so a chain such as
//! `Transform<AdjacentTransform<BufferIter<T>, F>, G>` renders as one inline
//! expression inside the kernel of whatever algorithm consumes it.
//!
//! Only [`BufferIter`] is backed by storage. Algorithms that write take
//! `BufferIter` outputs; generic paths that discover at run time that an
//! iterator has no storage fail with [`Error::NoStorage`](crate::Error::NoStorage).

mod buffer;
mod constant;
mod counting;
mod pixel;
mod strided;
mod swizzle;
mod transform;
mod zip;

pub use buffer::{BoundBuffer, BufferIter};
pub use constant::Constant;
pub use counting::Counting;
pub use pixel::{Pixel, PixelInput};
pub use strided::Strided;
pub use swizzle::Swizzle;
pub use transform::{AdjacentTransform, BinaryTransform, Transform};
pub use zip::{Zip2, Zip3};

use tessera_codegen::{Expr, MetaKernel};
use tessera_device::{Buffer, ContextId};
use tessera_dtype::Element;

use crate::error::{NoStorageSnafu, Result};

/// Values that render as kernel source when indexed.
pub trait SourceEmittable {
    type Item: Element;

    /// Expression reading the element `index` positions past this iterator.
    ///
    /// Buffers the expression reads are declared on `kernel` as parameters.
    fn emit_index(&self, index: Expr, kernel: &mut MetaKernel) -> Expr;
}

/// A position in a device sequence.
pub trait DeviceIterator: SourceEmittable + Clone + Send + Sync {
    /// Logical position; distances between iterators of one sequence are
    /// differences of positions.
    fn position(&self) -> usize;

    /// Iterator `n` positions further (or back, for negative `n`).
    fn advance(&self, n: isize) -> Self;

    /// Storage behind the iterator, if it reads a buffer directly.
    fn buffer(&self) -> Option<&Buffer> {
        None
    }

    /// Whether indexing the iterator reads `buffer`, directly or through an
    /// adaptor.
    fn reads(&self, buffer: &Buffer) -> bool {
        self.buffer() == Some(buffer)
    }

    /// Context of the buffers the iterator reads, if any.
    fn context_id(&self) -> Option<ContextId>;

    /// Number of elements in `[self, last)`.
    fn distance(&self, last: &Self) -> usize {
        debug_assert!(last.position() >= self.position(), "iterator range is reversed");
        last.position().saturating_sub(self.position())
    }

    /// The iterator as a writable buffer iterator, or [`Error::NoStorage`](crate::Error::NoStorage).
    fn storage(&self) -> Result<BufferIter<Self::Item>> {
        match self.buffer() {
            Some(buffer) => Ok(BufferIter::new(buffer.clone(), self.position())),
            None => NoStorageSnafu { iterator: std::any::type_name::<Self>() }.fail(),
        }
    }
}

/// Advances `iter` by an unsigned count.
pub(crate) fn nth<I: DeviceIterator>(iter: &I, n: usize) -> I {
    iter.advance(n as isize)
}
