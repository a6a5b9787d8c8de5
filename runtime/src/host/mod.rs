//! In-process OpenCL C backend.
//!
//! Programs are parsed with a pest grammar into an AST at build time and interpreted
//! per work-item at launch. Only the language subset generated by the kernel
//! builder (plus what hand-written test kernels need) is accepted.

pub(crate) mod ast;
pub(crate) mod builtins;
pub(crate) mod driver;
pub(crate) mod exec;
pub(crate) mod interp;
pub(crate) mod memory;
pub(crate) mod parser;
pub(crate) mod queue;
pub(crate) mod value;

pub use driver::{HostContext, HostDriver, HostImage, HostKernel, HostMemory, HostProgram};
pub use queue::HostQueue;

use tessera_device::Platform;

/// Platform backed by a host driver with `config`.
pub fn platform(config: crate::HostConfig) -> Platform {
    Platform::new(std::sync::Arc::new(HostDriver::new(config)))
}
