//! Contexts: device groups that own memory and programs.

use std::fmt;
use std::sync::Arc;

use snafu::ensure;

use crate::buffer::{Buffer, Image2d, ImageFormat};
use crate::device::Device;
use crate::driver::DriverContext;
use crate::error::{Error, ErrorCode, ExtensionUnsupportedSnafu, Result, RuntimeSnafu};
use crate::handle::Shared;
use crate::program::Program;

pub type ContextId = u64;

#[derive(Clone)]
pub struct Context {
    raw: Shared<Box<dyn DriverContext>>,
    devices: Arc<[Device]>,
}

impl Context {
    pub fn new(device: &Device) -> Result<Self> {
        Self::with_devices(std::slice::from_ref(device))
    }

    /// Creates a context over several devices of the same driver.
    pub fn with_devices(devices: &[Device]) -> Result<Self> {
        let Some(first) = devices.first() else {
            return RuntimeSnafu { code: ErrorCode::InvalidValue, detail: "context needs at least one device" }.fail();
        };
        ensure!(
            devices.iter().all(|d| d.same_driver(first)),
            RuntimeSnafu { code: ErrorCode::InvalidDevice, detail: "context devices come from different drivers" }
        );

        let infos: Vec<_> = devices.iter().map(|d| d.info().clone()).collect();
        let raw = first.driver().create_context(&infos)?;
        let context = Self { raw: Shared::new(raw), devices: devices.into() };
        tracing::debug!(context.id = context.id(), device = first.name(), devices = devices.len(), "context created");
        Ok(context)
    }

    pub fn id(&self) -> ContextId {
        self.raw.id()
    }

    /// The first (default) device of the context.
    pub fn device(&self) -> &Device {
        &self.devices[0]
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn create_buffer(&self, bytes: usize) -> Result<Buffer> {
        ensure!(bytes > 0, RuntimeSnafu { code: ErrorCode::InvalidBufferSize, detail: "buffer size must be non-zero" });
        let raw = self.raw.allocate(bytes)?;
        Ok(Buffer::new(Shared::new(raw), self.id()))
    }

    pub fn create_image2d(&self, format: ImageFormat, width: usize, height: usize) -> Result<Image2d> {
        ensure!(self.devices.iter().all(|d| d.info().image_support), ExtensionUnsupportedSnafu { extension: "images" });
        ensure!(
            width > 0 && height > 0,
            RuntimeSnafu { code: ErrorCode::InvalidImageSize, detail: format!("{width}x{height}") }
        );
        let raw = self.raw.create_image2d(format, width, height)?;
        Ok(Image2d::new(Shared::new(raw), self.id(), format, width, height))
    }

    /// Builds a program from source text.
    #[tracing::instrument(skip_all, fields(context.id = self.id(), source.len = source.len()))]
    pub fn build_program(&self, source: &str, options: &str) -> Result<Program> {
        match self.raw.build_program(source, options) {
            Ok(raw) => {
                tracing::debug!("program built");
                Ok(Program::new(Shared::new(raw), self.id(), source, options))
            }
            Err(error) => {
                if let Error::Compile { log } = &error {
                    tracing::debug!(build.log = %log, "program build failed");
                }
                Err(error)
            }
        }
    }

    pub fn raw(&self) -> &dyn DriverContext {
        &**self.raw
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id()).field("devices", &self.devices).finish()
    }
}
