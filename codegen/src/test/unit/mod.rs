pub mod lru;
pub mod meta_kernel;

use tessera_device::{Context, Queue};
use tessera_runtime::HostConfig;
use tessera_runtime::host::platform;

/// Fresh host context and in-order queue.
pub fn host_queue() -> Queue {
    queue_with(HostConfig::builder().compute_units(2).build())
}

pub fn queue_with(config: HostConfig) -> Queue {
    let device = platform(config).devices().unwrap().remove(0);
    let context = Context::new(&device).unwrap();
    Queue::new(&context, &device, Default::default()).unwrap()
}
