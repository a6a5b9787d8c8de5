//! Host device description.
//!
//! The host backend can pose as any device class so callers exercise the
//! CPU-tuned and GPU-tuned algorithm strategies on the same machine.

use bon::bon;
use tessera_device::{DeviceInfo, DeviceType};

const BASE_EXTENSIONS: [&str; 2] = ["cl_khr_global_int32_base_atomics", "cl_khr_local_int32_base_atomics"];

/// Properties of the single device the host driver exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub name: String,
    /// Device class reported to algorithms.
    pub device_type: DeviceType,
    pub compute_units: usize,
    pub max_work_group_size: usize,
    /// Bytes of `__local` memory per work-group.
    pub local_mem_size: usize,
    /// Advertise `cl_khr_fp64`.
    pub fp64: bool,
    pub images: bool,
}

fn default_compute_units() -> usize {
    std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "host".into(),
            device_type: DeviceType::Cpu,
            compute_units: default_compute_units(),
            max_work_group_size: 256,
            local_mem_size: 32 * 1024,
            fp64: true,
            images: true,
        }
    }
}

#[bon]
impl HostConfig {
    #[builder]
    pub fn builder(
        #[builder(into, default = String::from("host"))] name: String,
        #[builder(default)] device_type: DeviceType,
        compute_units: Option<usize>,
        #[builder(default = 256)] max_work_group_size: usize,
        #[builder(default = 32 * 1024)] local_mem_size: usize,
        #[builder(default = true)] fp64: bool,
        #[builder(default = true)] images: bool,
    ) -> Self {
        Self {
            name,
            device_type,
            compute_units: compute_units.unwrap_or_else(default_compute_units).max(1),
            max_work_group_size: max_work_group_size.max(1),
            local_mem_size,
            fp64,
            images,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_DEVICE_TYPE` - `cpu`, `gpu` or `accelerator` (default: cpu)
    /// * `TESSERA_COMPUTE_UNITS` - Reported compute units (default: available_parallelism)
    /// * `TESSERA_MAX_WORK_GROUP_SIZE` - Work-group size limit (default: 256)
    /// * `TESSERA_LOCAL_MEM_SIZE` - Local memory bytes (default: 32768)
    /// * `TESSERA_FP64` - `0` hides `cl_khr_fp64`
    /// * `TESSERA_IMAGES` - `0` disables image support
    pub fn from_env() -> Self {
        let device_type = std::env::var("TESSERA_DEVICE_TYPE").ok().and_then(|s| s.parse().ok()).unwrap_or_default();
        let compute_units = std::env::var("TESSERA_COMPUTE_UNITS").ok().and_then(|s| s.parse().ok());
        let max_work_group_size =
            std::env::var("TESSERA_MAX_WORK_GROUP_SIZE").ok().and_then(|s| s.parse().ok()).unwrap_or(256);
        let local_mem_size = std::env::var("TESSERA_LOCAL_MEM_SIZE").ok().and_then(|s| s.parse().ok()).unwrap_or(32 * 1024);
        let fp64 = std::env::var("TESSERA_FP64").map(|v| v != "0").unwrap_or(true);
        let images = std::env::var("TESSERA_IMAGES").map(|v| v != "0").unwrap_or(true);

        Self::builder()
            .device_type(device_type)
            .maybe_compute_units(compute_units)
            .max_work_group_size(max_work_group_size)
            .local_mem_size(local_mem_size)
            .fp64(fp64)
            .images(images)
            .build()
    }

    pub fn device_info(&self) -> DeviceInfo {
        let mut extensions: Vec<String> = BASE_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        if self.fp64 {
            extensions.push("cl_khr_fp64".into());
        }
        let kind: &'static str = self.device_type.into();
        DeviceInfo::builder()
            .name(format!("{} ({})", self.name, kind.to_ascii_lowercase()))
            .device_type(self.device_type)
            .compute_units(self.compute_units)
            .max_work_group_size(self.max_work_group_size)
            .local_mem_size(self.local_mem_size)
            .extensions(extensions)
            .image_support(self.images)
            .build()
    }
}
