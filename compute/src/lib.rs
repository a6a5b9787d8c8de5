//! STL-style algorithms over device memory.
//!
//! Algorithms take iterator ranges and a [`Queue`](tessera_device::Queue),
//! generate the kernels they need through [`tessera_codegen::MetaKernel`] and
//! pick an execution strategy from the device class and the range size.
//!
//! - [`iterator`]: buffer iterators and fused adaptors (`Transform`, `Zip2`, ...).
//! - [`functional`] and [`lambda`]: device function objects and `_1`/`_2` placeholders.
//! - [`algorithm`]: the algorithms and their strategy selection.
//! - [`Vector`]: a minimal device container.
//!
//! ```ignore
//! let queue = tessera_compute::system::default_queue()?;
//! let v = Vector::from_slice(&[3, 1, 2], &queue)?;
//! sort(&v.begin(), &v.end(), Less, &queue)?;
//! let total = reduce(&v.begin(), &v.end(), 0, Plus, &queue)?;
//! ```

pub mod algorithm;
pub mod config;
pub mod error;
pub mod functional;
pub mod iterator;
pub mod lambda;
pub mod system;
pub mod vector;


pub use algorithm::*;
pub use config::Config;
pub use error::{Error, Result};
pub use functional::*;
pub use iterator::{
    AdjacentTransform, BinaryTransform, BoundBuffer, BufferIter, Constant, Counting, DeviceIterator, Pixel,
    PixelInput, SourceEmittable, Strided, Swizzle, Transform, Zip2, Zip3,
};
pub use lambda::{_1, _2, Lambda};
pub use vector::Vector;
