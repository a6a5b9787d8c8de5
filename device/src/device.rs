//! Platforms and devices.

use std::fmt;
use std::sync::Arc;

use crate::driver::Driver;
use crate::error::Result;

/// Device class; algorithms pick strategies by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DeviceType {
    #[default]
    Cpu,
    Gpu,
    Accelerator,
}

/// Properties a backend reports for one device.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct DeviceInfo {
    /// Index within the driver's device list.
    #[builder(default)]
    pub id: usize,
    #[builder(into)]
    pub name: String,
    #[builder(into, default = String::from("tessera"))]
    pub vendor: String,
    #[builder(default)]
    pub device_type: DeviceType,
    #[builder(default = 1)]
    pub compute_units: usize,
    #[builder(default = 256)]
    pub max_work_group_size: usize,
    #[builder(default = 32 * 1024)]
    pub local_mem_size: usize,
    #[builder(default)]
    pub extensions: Vec<String>,
    #[builder(default)]
    pub image_support: bool,
}

impl DeviceInfo {
    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }
}

/// A device exposed by some driver.
#[derive(Clone)]
pub struct Device {
    driver: Arc<dyn Driver>,
    info: Arc<DeviceInfo>,
}

impl Device {
    pub fn new(driver: Arc<dyn Driver>, info: DeviceInfo) -> Self {
        Self { driver, info: Arc::new(info) }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn device_type(&self) -> DeviceType {
        self.info.device_type
    }

    pub fn is_cpu(&self) -> bool {
        self.info.device_type == DeviceType::Cpu
    }

    pub fn is_gpu(&self) -> bool {
        self.info.device_type == DeviceType::Gpu
    }

    pub fn compute_units(&self) -> usize {
        self.info.compute_units
    }

    pub fn max_work_group_size(&self) -> usize {
        self.info.max_work_group_size
    }

    pub fn local_mem_size(&self) -> usize {
        self.info.local_mem_size
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.info.supports_extension(name)
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub(crate) fn same_driver(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.driver, &other.driver)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.same_driver(other) && self.info.id == other.info.id
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver.name())
            .field("name", &self.info.name)
            .field("type", &self.info.device_type)
            .finish()
    }
}

/// A driver viewed as a platform.
#[derive(Clone, Debug)]
pub struct Platform {
    driver: Arc<dyn Driver>,
}

impl Platform {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub fn vendor(&self) -> &str {
        self.driver.vendor()
    }

    pub fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.driver.devices()?.into_iter().map(|info| Device::new(Arc::clone(&self.driver), info)).collect())
    }

    /// First device of the requested class, if any.
    pub fn device_of_type(&self, device_type: DeviceType) -> Result<Option<Device>> {
        Ok(self.devices()?.into_iter().find(|d| d.device_type() == device_type))
    }
}
