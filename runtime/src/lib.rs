//! Host runtime for tessera.
//!
//! Provides the in-process backend that implements the
//! [`tessera_device::driver`] contract by interpreting the OpenCL C subset the
//! kernel builder emits, plus the process-wide device registry and default
//! [`System`].
//!
//! # Device selection
//!
//! `TESSERA_DEVICE` names the default device (`host`, `host:gpu`, ...). The
//! host device's reported properties come from [`HostConfig::from_env`], so the
//! same machine can stand in for CPU-class and GPU-class devices.

pub mod config;
pub mod device_registry;
pub mod error;
pub mod host;
pub mod system;


pub use config::HostConfig;
pub use device_registry::{DEVICE_FACTORIES, DeviceFactory, DeviceFactoryRegistry, DeviceSpec};
pub use error::*;
pub use host::HostDriver;
pub use system::System;
