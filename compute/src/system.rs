//! Default queue for the `*_default` algorithm entry points.
//!
//! Resolution is delegated to [`tessera_runtime::System`]; the first lookup
//! also registers a shutdown hook that drops every cached program.

use once_cell::sync::Lazy;
use snafu::ResultExt;
use tessera_codegen::ProgramCacheRegistry;
use tessera_device::{Context, Device, Queue};
use tessera_runtime::System;

use crate::error::{Result, SystemSnafu};

static SHUTDOWN_HOOK: Lazy<()> = Lazy::new(|| {
    System::on_shutdown("program-cache", || ProgramCacheRegistry::global().shutdown());
});

fn system() -> Result<System> {
    Lazy::force(&SHUTDOWN_HOOK);
    System::get().context(SystemSnafu)
}

pub fn default_device() -> Result<Device> {
    Ok(system()?.device().clone())
}

pub fn default_context() -> Result<Context> {
    Ok(system()?.context().clone())
}

pub fn default_queue() -> Result<Queue> {
    Ok(system()?.queue().clone())
}

/// Block until the default queue is idle.
pub fn finish() -> Result<()> {
    System::finish().context(SystemSnafu)
}

/// Tear down the default system and the program caches.
pub fn shutdown() -> Result<()> {
    Lazy::force(&SHUTDOWN_HOOK);
    System::shutdown().context(SystemSnafu)
}
