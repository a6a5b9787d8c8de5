//! Device-facing contracts for tessera.
//!
//! This crate defines what the kernel engine needs from a compute runtime
//! (the [`driver`] traits) and the handle types built on top of it:
//! contexts, buffers, programs, kernels, queues and completion tokens.

pub mod buffer;
pub mod context;
pub mod device;
pub mod driver;
pub mod error;
pub mod event;
pub mod handle;
pub mod program;
pub mod queue;


pub use buffer::{Buffer, Image2d, ImageFormat};
pub use context::{Context, ContextId};
pub use device::{Device, DeviceInfo, DeviceType, Platform};
pub use error::{Error, ErrorCode, Result};
pub use event::{Event, EventStatus, Future, WaitList};
pub use handle::Shared;
pub use program::{Kernel, KernelArg, Program};
pub use queue::{Geometry, HostSink, Queue, QueueProperties, clamp_work_group};
