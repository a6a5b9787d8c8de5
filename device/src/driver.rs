//! Backend contract.
//!
//! A compute backend implements these traits; everything above this module
//! (handles, queues, the kernel builder, algorithms) is backend-agnostic.
//! Objects created through the contract are wrapped in [`Shared`](crate::Shared)
//! handles by the public wrappers, so a backend only needs to free resources in
//! `Drop`.

use std::any::Any;
use std::fmt;

use smallvec::SmallVec;
use tessera_dtype::AddrSpace;

use crate::buffer::{Buffer, Image2d, ImageFormat};
use crate::device::DeviceInfo;
use crate::error::Result;
use crate::event::Event;
use crate::program::{Kernel, KernelArg};
use crate::queue::{Geometry, HostSink, QueueProperties};

/// Entry point of a backend: platform identity and device enumeration.
pub trait Driver: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn vendor(&self) -> &str;

    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Creates a context grouping `devices`, all enumerated by this driver.
    fn create_context(&self, devices: &[DeviceInfo]) -> Result<Box<dyn DriverContext>>;
}

pub trait DriverContext: Send + Sync + fmt::Debug {
    fn allocate(&self, bytes: usize) -> Result<Box<dyn DriverMemory>>;

    fn create_image2d(&self, format: ImageFormat, width: usize, height: usize) -> Result<Box<dyn DriverMemory>>;

    /// Builds `source`; failures return [`Error::Compile`](crate::Error::Compile) with the log.
    fn build_program(&self, source: &str, options: &str) -> Result<Box<dyn DriverProgram>>;

    fn create_queue(&self, device: &DeviceInfo, properties: QueueProperties) -> Result<Box<dyn DriverQueue>>;
}

/// Device memory object (buffer or image).
pub trait DriverMemory: Send + Sync + fmt::Debug {
    fn size(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

pub trait DriverProgram: Send + Sync + fmt::Debug {
    fn build_log(&self) -> &str;

    fn kernel_names(&self) -> Vec<String>;

    fn create_kernel(&self, name: &str) -> Result<Box<dyn DriverKernel>>;
}

pub trait DriverKernel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Address space of each parameter, in declaration order.
    fn arg_spaces(&self) -> &[AddrSpace];

    fn as_any(&self) -> &dyn Any;
}

/// Submission channel for one device.
///
/// `submit` takes ownership of the command and the event that reports its
/// completion. The backend must eventually resolve the event, after every event
/// in `wait` has finished (and, for in-order queues, after every earlier
/// submission).
pub trait DriverQueue: Send + Sync + fmt::Debug {
    fn submit(&self, command: Command, wait: Vec<Event>, event: Event) -> Result<()>;

    /// Blocks until every submitted command has finished.
    fn finish(&self) -> Result<()>;
}

/// A unit of queued work.
#[derive(Debug)]
pub enum Command {
    NdRange { kernel: Kernel, args: Vec<KernelArg>, geometry: Geometry },
    Read { buffer: Buffer, offset: usize, len: usize, sink: HostSink },
    Write { buffer: Buffer, offset: usize, data: Vec<u8> },
    Copy { src: Buffer, src_offset: usize, dst: Buffer, dst_offset: usize, len: usize },
    Fill { buffer: Buffer, pattern: SmallVec<[u8; 16]>, offset: usize, len: usize },
    WriteImage { image: Image2d, data: Vec<u8> },
    Marker,
}

impl Command {
    pub const fn kind(&self) -> &'static str {
        match self {
            Command::NdRange { .. } => "ndrange",
            Command::Read { .. } => "read",
            Command::Write { .. } => "write",
            Command::Copy { .. } => "copy",
            Command::Fill { .. } => "fill",
            Command::WriteImage { .. } => "write_image",
            Command::Marker => "marker",
        }
    }
}
