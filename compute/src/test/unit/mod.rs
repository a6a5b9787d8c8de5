pub mod copy;
pub mod iterator;
pub mod sort;
pub mod strategy;

use tessera_device::{Context, DeviceType, Queue};
use tessera_dtype::Element;
use tessera_runtime::HostConfig;
use tessera_runtime::host::platform;

use crate::vector::Vector;

/// Device class a test runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Cpu,
    Gpu,
}

impl Class {
    fn config(self) -> HostConfig {
        match self {
            Class::Cpu => HostConfig::builder().compute_units(4).build(),
            Class::Gpu => HostConfig::builder().device_type(DeviceType::Gpu).compute_units(4).max_work_group_size(64).build(),
        }
    }
}

/// Fresh context and in-order queue on a host device of the given class.
pub fn queue(class: Class) -> Queue {
    let device = platform(class.config()).devices().unwrap().remove(0);
    let context = Context::new(&device).unwrap();
    Queue::new(&context, &device, Default::default()).unwrap()
}

pub fn upload<T: Element>(values: &[T], queue: &Queue) -> Vector<T> {
    Vector::from_slice(values, queue).unwrap()
}

/// Deterministic pseudo-random integers in `[0, modulo)`.
pub fn scrambled(count: usize, modulo: i32) -> Vec<i32> {
    let mut state = 0x2545_f491u32;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % modulo as u32) as i32
        })
        .collect()
}
