//! Process-wide default device, context and queue.
//!
//! The default system is resolved on first use from `TESSERA_DEVICE`
//! (a [`DeviceSpec`] string, default `host`) through [`DEVICE_FACTORIES`].
//! Tests can inject their own with [`System::set_default`], and
//! [`System::shutdown`] tears everything down, including caches registered
//! by higher layers through [`System::on_shutdown`].

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use snafu::ResultExt;
use tessera_device::{Context, Device, Queue, QueueProperties};

use crate::device_registry::{DEVICE_FACTORIES, DeviceSpec};
use crate::error::{DeviceSnafu, Result};

type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

static DEFAULT: Lazy<RwLock<Option<System>>> = Lazy::new(|| RwLock::new(None));
static HOOKS: Lazy<Mutex<Vec<(&'static str, ShutdownHook)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// A device with a context and an in-order queue on it.
#[derive(Clone, Debug)]
pub struct System {
    device: Device,
    context: Context,
    queue: Queue,
}

impl System {
    pub fn new(device: &Device) -> Result<Self> {
        Self::with_properties(device, QueueProperties::default())
    }

    pub fn with_properties(device: &Device, properties: QueueProperties) -> Result<Self> {
        let context = Context::new(device).context(DeviceSnafu)?;
        let queue = Queue::new(&context, device, properties).context(DeviceSnafu)?;
        Ok(Self { device: device.clone(), context, queue })
    }

    pub fn from_spec(spec: &DeviceSpec) -> Result<Self> {
        Self::new(&DEVICE_FACTORIES.device(spec)?)
    }

    /// System for the device named by `TESSERA_DEVICE`.
    pub fn from_env() -> Result<Self> {
        let spec = match std::env::var("TESSERA_DEVICE") {
            Ok(s) => s.parse()?,
            Err(_) => DeviceSpec::default(),
        };
        Self::from_spec(&spec)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The default system, created on first call.
    pub fn get() -> Result<System> {
        if let Some(system) = DEFAULT.read().as_ref() {
            return Ok(system.clone());
        }
        let mut slot = DEFAULT.write();
        if let Some(system) = slot.as_ref() {
            return Ok(system.clone());
        }
        let system = Self::from_env()?;
        tracing::debug!(device = system.device.name(), "default system created");
        *slot = Some(system.clone());
        Ok(system)
    }

    /// Replace the default system.
    pub fn set_default(system: System) {
        *DEFAULT.write() = Some(system);
    }

    pub fn default_device() -> Result<Device> {
        Ok(Self::get()?.device)
    }

    pub fn default_context() -> Result<Context> {
        Ok(Self::get()?.context)
    }

    pub fn default_queue() -> Result<Queue> {
        Ok(Self::get()?.queue)
    }

    /// Block until the default queue is idle. A no-op before first use.
    pub fn finish() -> Result<()> {
        let queue = DEFAULT.read().as_ref().map(|s| s.queue.clone());
        match queue {
            Some(queue) => queue.finish().context(DeviceSnafu),
            None => Ok(()),
        }
    }

    /// Register `hook` to run on [`System::shutdown`]. Re-registering a name
    /// replaces the previous hook.
    pub fn on_shutdown(name: &'static str, hook: impl Fn() + Send + Sync + 'static) {
        let mut hooks = HOOKS.lock();
        hooks.retain(|(n, _)| *n != name);
        hooks.push((name, Arc::new(hook)));
    }

    /// Drain the default queue, run shutdown hooks and drop every cached
    /// device. The next [`System::get`] starts from scratch.
    pub fn shutdown() -> Result<()> {
        let finished = Self::finish();
        DEFAULT.write().take();
        let hooks: Vec<_> = HOOKS.lock().iter().map(|(name, hook)| (*name, Arc::clone(hook))).collect();
        for (name, hook) in hooks {
            tracing::debug!(hook = name, "shutdown hook");
            hook();
        }
        DEVICE_FACTORIES.clear();
        finished
    }
}
