//! Command queues and launch geometry.
//!
//! A [`Queue`] validates each command against its context and device, wraps
//! it with a fresh [`Event`] and hands it to the backend. Blocking helpers
//! (`enqueue_write_buffer`, `enqueue_read_buffer`) wait on that event before
//! returning.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use snafu::ensure;
use tessera_dtype::Element;

use crate::buffer::{Buffer, Image2d};
use crate::context::Context;
use crate::device::{Device, DeviceInfo};
use crate::driver::{Command, DriverQueue};
use crate::error::{ErrorCode, Result, RuntimeSnafu};
use crate::event::{Event, Future, WaitList};
use crate::handle::Shared;
use crate::program::Kernel;

/// Destination of a device-to-host read, filled when the read completes.
pub type HostSink = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bon::Builder)]
pub struct QueueProperties {
    /// Commands may run as soon as their wait-lists are satisfied.
    #[builder(default)]
    pub out_of_order: bool,
    #[builder(default)]
    pub profiling: bool,
}

/// N-dimensional launch geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub dims: usize,
    pub offset: [usize; 3],
    pub global: [usize; 3],
    /// Work-group size; `None` lets the backend choose.
    pub local: Option<[usize; 3]>,
}

impl Geometry {
    pub fn new_1d(offset: usize, global: usize, local: Option<usize>) -> Self {
        Self { dims: 1, offset: [offset, 0, 0], global: [global, 1, 1], local: local.map(|l| [l, 1, 1]) }
    }

    pub fn new_2d(offset: [usize; 2], global: [usize; 2], local: Option<[usize; 2]>) -> Self {
        Self {
            dims: 2,
            offset: [offset[0], offset[1], 0],
            global: [global[0], global[1], 1],
            local: local.map(|l| [l[0], l[1], 1]),
        }
    }

    pub fn new_3d(offset: [usize; 3], global: [usize; 3], local: Option<[usize; 3]>) -> Self {
        Self { dims: 3, offset, global, local }
    }

    /// A single work-item.
    pub fn task() -> Self {
        Self::new_1d(0, 1, Some(1))
    }

    /// One-dimensional geometry covering `count` items with work-groups of
    /// `local` items.
    ///
    /// `local` is clamped to the largest power of two not above the device
    /// limit, and the global size is padded up to a multiple of it. Kernels
    /// launched this way must guard `get_global_id(0) < count`.
    pub fn padded_1d(count: usize, local: usize, max_work_group_size: usize) -> Self {
        let local = clamp_work_group(local, max_work_group_size);
        Self::new_1d(0, count.div_ceil(local) * local, Some(local))
    }

    /// Shrinks the requested work-group so it divides the global range in
    /// every dimension and fits `max_work_group_size` in total.
    ///
    /// Each local size becomes the largest power of two that divides the
    /// global size and is not above the request, so no work-item outside
    /// the global range is launched.
    pub fn fitted(mut self, max_work_group_size: usize) -> Self {
        let Some(mut local) = self.local else { return self };
        let mut budget = max_work_group_size.max(1);
        for d in 0..self.dims {
            let divides = 1usize << self.global[d].trailing_zeros().min(usize::BITS - 1);
            local[d] = clamp_work_group(local[d], budget).min(divides);
            budget /= local[d];
        }
        self.local = Some(local);
        self
    }

    pub fn work_items(&self) -> usize {
        self.global[..self.dims].iter().product()
    }

    pub fn work_group_size(&self) -> Option<usize> {
        self.local.map(|l| l[..self.dims].iter().product())
    }

    pub fn num_groups(&self) -> [usize; 3] {
        let local = self.local.unwrap_or([1, 1, 1]);
        std::array::from_fn(|d| self.global[d] / local[d].max(1))
    }

    /// Checks the geometry against device limits.
    pub fn validate(&self, device: &DeviceInfo) -> Result<()> {
        ensure!(
            (1..=3).contains(&self.dims),
            RuntimeSnafu { code: ErrorCode::InvalidWorkDimension, detail: format!("{} dimensions", self.dims) }
        );
        ensure!(
            self.global[..self.dims].iter().all(|&g| g > 0),
            RuntimeSnafu { code: ErrorCode::InvalidGlobalWorkSize, detail: format!("global size {:?}", self.global) }
        );
        if let Some(local) = self.local {
            ensure!(
                local[..self.dims].iter().zip(&self.global).all(|(&l, &g)| l > 0 && g % l == 0),
                RuntimeSnafu {
                    code: ErrorCode::InvalidWorkGroupSize,
                    detail: format!("global size {:?} is not a multiple of local size {local:?}", self.global),
                }
            );
            let group = local[..self.dims].iter().product::<usize>();
            ensure!(
                group <= device.max_work_group_size,
                RuntimeSnafu {
                    code: ErrorCode::InvalidWorkGroupSize,
                    detail: format!("work-group of {group} exceeds device limit {}", device.max_work_group_size),
                }
            );
        }
        Ok(())
    }
}

/// Largest power of two `<= min(requested, max)`, at least 1.
pub fn clamp_work_group(requested: usize, max: usize) -> usize {
    let limit = requested.min(max).max(1);
    1 << (usize::BITS - 1 - limit.leading_zeros())
}

/// Submission channel for one device of a context.
#[derive(Clone)]
pub struct Queue {
    raw: Shared<Box<dyn DriverQueue>>,
    context: Context,
    device: Device,
    properties: QueueProperties,
}

impl Queue {
    pub fn new(context: &Context, device: &Device, properties: QueueProperties) -> Result<Self> {
        ensure!(
            context.devices().contains(device),
            RuntimeSnafu { code: ErrorCode::InvalidDevice, detail: format!("{} is not part of the context", device.name()) }
        );
        let raw = context.raw().create_queue(device.info(), properties)?;
        Ok(Self { raw: Shared::new(raw), context: context.clone(), device: device.clone(), properties })
    }

    /// In-order queue on the context's first device.
    pub fn for_context(context: &Context) -> Result<Self> {
        Self::new(context, context.device(), QueueProperties::default())
    }

    pub fn id(&self) -> u64 {
        self.raw.id()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn properties(&self) -> QueueProperties {
        self.properties
    }

    fn submit(&self, command: Command, wait: &WaitList) -> Result<Event> {
        let event = Event::new(command.kind());
        tracing::trace!(queue.id = self.id(), event.id = event.id(), command = command.kind(), "submit");
        self.raw.submit(command, wait.iter().cloned().collect(), event.clone())?;
        Ok(event)
    }

    fn check_buffer(&self, buffer: &Buffer, offset: usize, len: usize) -> Result<()> {
        ensure!(
            buffer.context_id() == self.context.id(),
            RuntimeSnafu { code: ErrorCode::InvalidContext, detail: "buffer belongs to another context" }
        );
        ensure!(
            offset.checked_add(len).is_some_and(|end| end <= buffer.size()),
            RuntimeSnafu {
                code: ErrorCode::InvalidValue,
                detail: format!("range {offset}..{} exceeds buffer of {} bytes", offset.saturating_add(len), buffer.size()),
            }
        );
        Ok(())
    }

    /// Launches `kernel` with its current bindings.
    pub fn enqueue_nd_range(&self, kernel: &Kernel, geometry: &Geometry, wait: &WaitList) -> Result<Event> {
        ensure!(
            kernel.program().context_id() == self.context.id(),
            RuntimeSnafu { code: ErrorCode::InvalidContext, detail: "kernel belongs to another context" }
        );
        geometry.validate(self.device.info())?;
        let args = kernel.bound_args()?;
        tracing::debug!(
            kernel.name = kernel.name(),
            global = ?&geometry.global[..geometry.dims],
            local = ?geometry.local.map(|l| l[..geometry.dims].to_vec()),
            "enqueue kernel"
        );
        self.submit(Command::NdRange { kernel: kernel.clone(), args, geometry: geometry.clone() }, wait)
    }

    pub fn enqueue_1d_range(&self, kernel: &Kernel, offset: usize, global: usize, local: Option<usize>) -> Result<Event> {
        self.enqueue_nd_range(kernel, &Geometry::new_1d(offset, global, local), &WaitList::new())
    }

    /// Launches a single work-item.
    pub fn enqueue_task(&self, kernel: &Kernel) -> Result<Event> {
        self.enqueue_nd_range(kernel, &Geometry::task(), &WaitList::new())
    }

    pub fn enqueue_write_buffer_async(&self, buffer: &Buffer, offset: usize, data: Vec<u8>, wait: &WaitList) -> Result<Event> {
        self.check_buffer(buffer, offset, data.len())?;
        self.submit(Command::Write { buffer: buffer.clone(), offset, data }, wait)
    }

    /// Blocking host-to-device write.
    pub fn enqueue_write_buffer(&self, buffer: &Buffer, offset: usize, data: &[u8]) -> Result<()> {
        self.enqueue_write_buffer_async(buffer, offset, data.to_vec(), &WaitList::new())?.wait()
    }

    /// Device-to-host read resolved through a future.
    pub fn enqueue_read_buffer_async(&self, buffer: &Buffer, offset: usize, len: usize, wait: &WaitList) -> Result<Future<Vec<u8>>> {
        self.check_buffer(buffer, offset, len)?;
        let sink: HostSink = Arc::new(Mutex::new(Vec::new()));
        let event = self.submit(Command::Read { buffer: buffer.clone(), offset, len, sink: Arc::clone(&sink) }, wait)?;
        Ok(Future::deferred(event, move || Ok(sink.lock().clone())))
    }

    /// Blocking device-to-host read into `out`.
    pub fn enqueue_read_buffer(&self, buffer: &Buffer, offset: usize, out: &mut [u8]) -> Result<()> {
        let bytes = self.enqueue_read_buffer_async(buffer, offset, out.len(), &WaitList::new())?.get()?;
        out.copy_from_slice(&bytes);
        Ok(())
    }

    pub fn enqueue_copy_buffer(
        &self,
        src: &Buffer,
        dst: &Buffer,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
        wait: &WaitList,
    ) -> Result<Event> {
        self.check_buffer(src, src_offset, len)?;
        self.check_buffer(dst, dst_offset, len)?;
        ensure!(
            src != dst || src_offset + len <= dst_offset || dst_offset + len <= src_offset,
            RuntimeSnafu { code: ErrorCode::MemCopyOverlap, detail: "source and destination ranges overlap" }
        );
        self.submit(Command::Copy { src: src.clone(), src_offset, dst: dst.clone(), dst_offset, len }, wait)
    }

    /// Repeats `pattern` over `len` bytes starting at `offset`.
    pub fn enqueue_fill_buffer(&self, buffer: &Buffer, pattern: &[u8], offset: usize, len: usize, wait: &WaitList) -> Result<Event> {
        self.check_buffer(buffer, offset, len)?;
        ensure!(
            !pattern.is_empty() && len % pattern.len() == 0 && offset % pattern.len() == 0,
            RuntimeSnafu { code: ErrorCode::InvalidValue, detail: "fill range must be a multiple of the pattern size" }
        );
        self.submit(Command::Fill { buffer: buffer.clone(), pattern: pattern.into(), offset, len }, wait)
    }

    /// Fills `count` elements starting at element `first` with `value`.
    pub fn enqueue_fill<T: Element>(&self, buffer: &Buffer, value: T, first: usize, count: usize) -> Result<Event> {
        let mut pattern = Vec::with_capacity(T::size());
        value.encode(&mut pattern);
        self.enqueue_fill_buffer(buffer, &pattern, first * T::size(), count * T::size(), &WaitList::new())
    }

    pub fn enqueue_write_image(&self, image: &Image2d, data: Vec<u8>) -> Result<Event> {
        ensure!(
            data.len() == image.pixels() * image.format().bytes_per_pixel(),
            RuntimeSnafu { code: ErrorCode::InvalidValue, detail: "image data does not match its dimensions" }
        );
        self.submit(Command::WriteImage { image: image.clone(), data }, &WaitList::new())
    }

    /// An event that completes once every event in `wait` (or, when empty,
    /// every earlier command) has completed.
    pub fn enqueue_marker(&self, wait: &WaitList) -> Result<Event> {
        self.submit(Command::Marker, wait)
    }

    pub fn finish(&self) -> Result<()> {
        self.raw.finish()
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id())
            .field("device", &self.device.name())
            .field("properties", &self.properties)
            .finish()
    }
}
