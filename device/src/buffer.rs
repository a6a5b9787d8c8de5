//! Device memory objects.

use std::fmt;

use crate::context::ContextId;
use crate::driver::DriverMemory;
use crate::handle::Shared;

/// Reference-counted device allocation owned by one context.
///
/// Contents are only reachable through a [`Queue`](crate::Queue).
#[derive(Clone)]
pub struct Buffer {
    raw: Shared<Box<dyn DriverMemory>>,
    context: ContextId,
}

impl Buffer {
    pub(crate) fn new(raw: Shared<Box<dyn DriverMemory>>, context: ContextId) -> Self {
        Self { raw, context }
    }

    pub fn size(&self) -> usize {
        self.raw.size()
    }

    pub fn id(&self) -> u64 {
        self.raw.id()
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn ref_count(&self) -> usize {
        self.raw.ref_count()
    }

    /// Backend object, for drivers to downcast.
    pub fn raw(&self) -> &dyn DriverMemory {
        &**self.raw
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("id", &self.id()).field("size", &self.size()).field("context", &self.context).finish()
    }
}

/// Pixel layout of a 2D image: four channels of the given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    RgbaFloat,
    RgbaUInt,
    RgbaInt,
    RgbaUNorm8,
}

impl ImageFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::RgbaFloat | Self::RgbaUInt | Self::RgbaInt => 16,
            Self::RgbaUNorm8 => 4,
        }
    }

    /// Suffix of the `read_image*` built-in that returns this format's pixels.
    pub const fn read_suffix(&self) -> &'static str {
        match self {
            Self::RgbaFloat | Self::RgbaUNorm8 => "f",
            Self::RgbaUInt => "ui",
            Self::RgbaInt => "i",
        }
    }
}

/// Read-only 2D image.
#[derive(Clone)]
pub struct Image2d {
    raw: Shared<Box<dyn DriverMemory>>,
    context: ContextId,
    format: ImageFormat,
    width: usize,
    height: usize,
}

impl Image2d {
    pub(crate) fn new(
        raw: Shared<Box<dyn DriverMemory>>,
        context: ContextId,
        format: ImageFormat,
        width: usize,
        height: usize,
    ) -> Self {
        Self { raw, context, format, width, height }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn id(&self) -> u64 {
        self.raw.id()
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn raw(&self) -> &dyn DriverMemory {
        &**self.raw
    }
}

impl fmt::Debug for Image2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image2d")
            .field("id", &self.id())
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
