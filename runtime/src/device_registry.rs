//! Device factory registry.
//!
//! Maps device strings such as `"host"` or `"HOST:GPU"` to [`Device`]s. A
//! string names a backend and, optionally, the device class to pick from it.
//! Devices are created once per canonical spec and cached; backends beyond
//! the built-in host interpreter plug in through [`register_factory`].
//!
//! [`register_factory`]: DeviceFactoryRegistry::register_factory

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use snafu::{OptionExt, ResultExt};
use tessera_device::{Device, DeviceType, Platform};

use crate::config::HostConfig;
use crate::error::{DeviceSnafu, Error, InvalidDeviceSpecSnafu, NoMatchingDeviceSnafu, Result, UnsupportedDeviceSnafu};
use crate::host::HostDriver;

/// Backend name plus an optional device class, e.g. `HOST:GPU`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceSpec {
    /// Upper-case backend name.
    pub backend: String,
    pub device_type: Option<DeviceType>,
}

impl DeviceSpec {
    pub fn host() -> Self {
        Self { backend: "HOST".into(), device_type: None }
    }

    pub fn host_of_type(device_type: DeviceType) -> Self {
        Self { backend: "HOST".into(), device_type: Some(device_type) }
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::host()
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| InvalidDeviceSpecSnafu { spec: s, reason }.build();
        let (backend, kind) = match s.trim().split_once(':') {
            Some((backend, kind)) => (backend.trim(), Some(kind.trim())),
            None => (s.trim(), None),
        };
        if backend.is_empty() || !backend.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("backend must be a non-empty identifier"));
        }
        let device_type = kind.map(|k| k.parse::<DeviceType>().map_err(|_| invalid("unknown device type"))).transpose()?;
        Ok(Self { backend: backend.to_uppercase(), device_type })
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device_type {
            Some(kind) => {
                let kind: &'static str = kind.into();
                write!(f, "{}:{}", self.backend, kind.to_uppercase())
            }
            None => f.write_str(&self.backend),
        }
    }
}

/// Creates a [`Device`] for a spec whose backend the factory is registered under.
pub type DeviceFactory = Arc<dyn Fn(&DeviceSpec) -> Result<Device> + Send + Sync>;

/// Registry of device factories with a per-spec device cache.
///
/// Lookups take a read lock; creation re-checks the cache under the write
/// lock so concurrent callers share one device.
pub struct DeviceFactoryRegistry {
    devices: RwLock<HashMap<DeviceSpec, Device>>,
    factories: RwLock<HashMap<String, DeviceFactory>>,
}

impl DeviceFactoryRegistry {
    /// Create a registry with the host backend registered as `HOST`.
    pub fn new() -> Self {
        let registry = Self { devices: RwLock::new(HashMap::new()), factories: RwLock::new(HashMap::new()) };
        registry.register_factory("HOST", Arc::new(create_host_device));
        registry
    }

    /// Register a factory for a backend name (case-insensitive).
    ///
    /// Replacing a factory does not evict devices it already created.
    pub fn register_factory(&self, backend: &str, factory: DeviceFactory) {
        self.factories.write().insert(backend.to_uppercase(), factory);
    }

    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get or create the device for `spec`.
    pub fn device(&self, spec: &DeviceSpec) -> Result<Device> {
        if let Some(device) = self.devices.read().get(spec) {
            return Ok(device.clone());
        }

        let mut devices = self.devices.write();
        if let Some(device) = devices.get(spec) {
            return Ok(device.clone());
        }

        let factory = self
            .factories
            .read()
            .get(&spec.backend)
            .cloned()
            .context(UnsupportedDeviceSnafu { device: spec.backend.clone() })?;
        let device = factory(spec)?;
        tracing::debug!(spec = %spec, device = device.name(), "device created");
        devices.insert(spec.clone(), device.clone());
        Ok(device)
    }

    /// Forget cached devices; the next lookup creates them again.
    pub fn clear(&self) {
        self.devices.write().clear();
    }
}

impl Default for DeviceFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn create_host_device(spec: &DeviceSpec) -> Result<Device> {
    let mut config = HostConfig::from_env();
    if let Some(device_type) = spec.device_type {
        config.device_type = device_type;
    }
    let wanted = config.device_type;
    let platform = Platform::new(Arc::new(HostDriver::new(config)));
    let kind: &'static str = wanted.into();
    platform
        .device_of_type(wanted)
        .context(DeviceSnafu)?
        .context(NoMatchingDeviceSnafu { backend: spec.backend.clone(), device_type: kind })
}

/// Global device factory registry, created on first access.
pub static DEVICE_FACTORIES: Lazy<DeviceFactoryRegistry> = Lazy::new(DeviceFactoryRegistry::new);
