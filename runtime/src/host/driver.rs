//! Host implementations of the backend contract.

use std::any::Any;
use std::sync::Arc;

use papaya::HashMap;
use tessera_device::driver::{Driver, DriverContext, DriverKernel, DriverMemory, DriverProgram, DriverQueue};
use tessera_device::{DeviceInfo, Error, ErrorCode, ImageFormat, QueueProperties, Result};
use tessera_dtype::AddrSpace;

use super::ast;
use super::memory::Memory;
use super::parser;
use super::queue::HostQueue;
use crate::config::HostConfig;

/// Interprets OpenCL C on the calling process's threads.
#[derive(Debug, Clone, Default)]
pub struct HostDriver {
    config: HostConfig,
}

impl HostDriver {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

impl Driver for HostDriver {
    fn name(&self) -> &str {
        "tessera host"
    }

    fn vendor(&self) -> &str {
        "tessera"
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![self.config.device_info()])
    }

    fn create_context(&self, devices: &[DeviceInfo]) -> Result<Box<dyn DriverContext>> {
        if devices.is_empty() {
            return Err(Error::runtime(ErrorCode::InvalidValue, "context needs at least one device"));
        }
        Ok(Box::new(HostContext { devices: devices.to_vec() }))
    }
}

#[derive(Debug)]
pub struct HostContext {
    devices: Vec<DeviceInfo>,
}

impl HostContext {
    /// First extension the program needs that some device lacks.
    fn missing_extension(&self, program: &ast::Program) -> Option<String> {
        let mut needed = program.extensions.clone();
        if program.uses_double && !needed.iter().any(|e| e == "cl_khr_fp64") {
            needed.push("cl_khr_fp64".into());
        }
        needed.into_iter().find(|ext| !self.devices.iter().all(|d| d.supports_extension(ext)))
    }
}

impl DriverContext for HostContext {
    fn allocate(&self, bytes: usize) -> Result<Box<dyn DriverMemory>> {
        Ok(Box::new(HostMemory { mem: Arc::new(Memory::new(bytes)) }))
    }

    fn create_image2d(&self, format: ImageFormat, width: usize, height: usize) -> Result<Box<dyn DriverMemory>> {
        let bytes = width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| Error::runtime(ErrorCode::InvalidImageSize, format!("{width}x{height}")))?;
        Ok(Box::new(HostImage { mem: Arc::new(Memory::new(bytes)), format, width, height }))
    }

    #[tracing::instrument(skip_all, fields(options = options))]
    fn build_program(&self, source: &str, options: &str) -> Result<Box<dyn DriverProgram>> {
        let program = parser::parse(source).map_err(|log| Error::Compile { log })?;
        if let Some(extension) = self.missing_extension(&program) {
            return Err(Error::ExtensionUnsupported { extension });
        }

        let kernels = HashMap::new();
        for (index, function) in program.functions.iter().enumerate().filter(|(_, f)| f.is_kernel) {
            kernels.pin().insert(function.name.clone(), index);
        }
        tracing::debug!(kernels = kernels.len(), "host program built");
        let log = if options.trim().is_empty() { String::new() } else { format!("ignored build options: {options}") };
        Ok(Box::new(HostProgram { program: Arc::new(program), kernels, log }))
    }

    fn create_queue(&self, device: &DeviceInfo, properties: QueueProperties) -> Result<Box<dyn DriverQueue>> {
        if !self.devices.contains(device) {
            return Err(Error::runtime(ErrorCode::InvalidDevice, format!("{} is not part of the context", device.name)));
        }
        Ok(Box::new(HostQueue::new(properties)?))
    }
}

/// Buffer storage.
#[derive(Debug)]
pub struct HostMemory {
    pub(crate) mem: Arc<Memory>,
}

impl DriverMemory for HostMemory {
    fn size(&self) -> usize {
        self.mem.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Image storage: row-major pixels of `format`.
#[derive(Debug, Clone)]
pub struct HostImage {
    pub(crate) mem: Arc<Memory>,
    pub(crate) format: ImageFormat,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl DriverMemory for HostImage {
    fn size(&self) -> usize {
        self.mem.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct HostProgram {
    program: Arc<ast::Program>,
    kernels: HashMap<String, usize>,
    log: String,
}

impl DriverProgram for HostProgram {
    fn build_log(&self) -> &str {
        &self.log
    }

    fn kernel_names(&self) -> Vec<String> {
        self.program.kernel_names().map(str::to_string).collect()
    }

    fn create_kernel(&self, name: &str) -> Result<Box<dyn DriverKernel>> {
        let index = self
            .kernels
            .pin()
            .get(name)
            .copied()
            .ok_or_else(|| Error::runtime(ErrorCode::InvalidKernelName, format!("no kernel named '{name}'")))?;
        let spaces = self.program.functions[index].params.iter().map(|p| p.ty.arg_space()).collect();
        Ok(Box::new(HostKernel { program: Arc::clone(&self.program), index, name: name.to_string(), spaces }))
    }
}

#[derive(Debug)]
pub struct HostKernel {
    pub(crate) program: Arc<ast::Program>,
    pub(crate) index: usize,
    name: String,
    spaces: Vec<AddrSpace>,
}

impl DriverKernel for HostKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn arg_spaces(&self) -> &[AddrSpace] {
        &self.spaces
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
