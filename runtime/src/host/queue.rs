//! Host command queue.
//!
//! In-order queues own one worker thread that drains a channel, so commands
//! finish in submission order. Out-of-order commands go to the rayon pool as
//! soon as their own wait-list has finished.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tessera_device::driver::{Command, DriverQueue};
use tessera_device::{Buffer, Error, ErrorCode, Event, QueueProperties, Result};

use super::driver::{HostImage, HostKernel, HostMemory};
use super::exec;
use super::memory::Memory;

struct Job {
    command: Command,
    wait: Vec<Event>,
    event: Event,
}

impl Job {
    fn run(self) {
        // A failed dependency fails this command with the same error.
        let outcome = self.wait.iter().try_for_each(Event::wait).and_then(|()| {
            self.event.set_running();
            catch_unwind(AssertUnwindSafe(|| execute(self.command))).unwrap_or_else(|_| {
                Err(Error::runtime(ErrorCode::OutOfResources, "host command panicked"))
            })
        });
        self.event.resolve(outcome);
    }

    /// Spawns the job on the rayon pool once every event it waits on has
    /// finished.
    fn spawn_when_ready(self) {
        let wait = self.wait.clone();
        let remaining = Arc::new(AtomicUsize::new(wait.len() + 1));
        let job = Arc::new(Mutex::new(Some(self)));
        let release = move || {
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1
                && let Some(job) = job.lock().take()
            {
                rayon::spawn(move || job.run());
            }
        };
        for event in &wait {
            event.on_complete(release.clone());
        }
        release();
    }
}

enum Mode {
    InOrder { sender: Mutex<Option<Sender<Job>>>, worker: Mutex<Option<JoinHandle<()>>> },
    OutOfOrder { outstanding: Mutex<Vec<Event>> },
}

pub struct HostQueue {
    mode: Mode,
    properties: QueueProperties,
}

impl HostQueue {
    pub fn new(properties: QueueProperties) -> Result<Self> {
        let mode = if properties.out_of_order {
            Mode::OutOfOrder { outstanding: Mutex::new(Vec::new()) }
        } else {
            let (sender, receiver) = channel::<Job>();
            let worker = std::thread::Builder::new()
                .name("tessera-host-queue".into())
                .spawn(move || {
                    for job in receiver {
                        job.run();
                    }
                })
                .map_err(|e| Error::runtime(ErrorCode::OutOfHostMemory, format!("cannot start queue worker: {e}")))?;
            Mode::InOrder { sender: Mutex::new(Some(sender)), worker: Mutex::new(Some(worker)) }
        };
        Ok(Self { mode, properties })
    }
}

impl DriverQueue for HostQueue {
    fn submit(&self, command: Command, mut wait: Vec<Event>, event: Event) -> Result<()> {
        match &self.mode {
            Mode::InOrder { sender, .. } => {
                let job = Job { command, wait, event };
                let sender = sender.lock();
                let Some(sender) = sender.as_ref() else {
                    return Err(Error::runtime(ErrorCode::InvalidCommandQueue, "queue is shut down"));
                };
                sender.send(job).map_err(|_| Error::runtime(ErrorCode::InvalidCommandQueue, "queue worker exited"))
            }
            Mode::OutOfOrder { outstanding } => {
                let mut outstanding = outstanding.lock();
                outstanding.retain(|e| !e.is_complete());
                if matches!(command, Command::Marker) && wait.is_empty() {
                    wait = outstanding.clone();
                }
                outstanding.push(event.clone());
                Job { command, wait, event }.spawn_when_ready();
                Ok(())
            }
        }
    }

    fn finish(&self) -> Result<()> {
        let marker = Event::new("marker");
        self.submit(Command::Marker, Vec::new(), marker.clone())?;
        marker.wait()
    }
}

impl Drop for HostQueue {
    fn drop(&mut self) {
        if let Mode::InOrder { sender, worker } = &self.mode {
            sender.lock().take();
            if let Some(worker) = worker.lock().take() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for HostQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostQueue").field("properties", &self.properties).finish()
    }
}

fn memory(buffer: &Buffer) -> Result<&Memory> {
    buffer
        .raw()
        .as_any()
        .downcast_ref::<HostMemory>()
        .map(|host| &*host.mem)
        .ok_or_else(|| Error::runtime(ErrorCode::InvalidMemObject, "buffer was not allocated by the host backend"))
}

fn access(result: std::result::Result<(), String>) -> Result<()> {
    result.map_err(|detail| Error::runtime(ErrorCode::InvalidValue, detail))
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::NdRange { kernel, args, geometry } => {
            let Some(host) = kernel.raw().as_any().downcast_ref::<HostKernel>() else {
                return Err(Error::runtime(ErrorCode::InvalidKernel, "kernel was not built by the host backend"));
            };
            exec::launch(&host.program, host.index, &args, &geometry)
        }
        Command::Read { buffer, offset, len, sink } => {
            let bytes = memory(&buffer)?.read(offset as isize, len).map_err(|d| Error::runtime(ErrorCode::InvalidValue, d))?;
            *sink.lock() = bytes;
            Ok(())
        }
        Command::Write { buffer, offset, data } => access(memory(&buffer)?.write(offset as isize, &data)),
        Command::Copy { src, src_offset, dst, dst_offset, len } => {
            let bytes =
                memory(&src)?.read(src_offset as isize, len).map_err(|d| Error::runtime(ErrorCode::InvalidValue, d))?;
            access(memory(&dst)?.write(dst_offset as isize, &bytes))
        }
        Command::Fill { buffer, pattern, offset, len } => {
            if pattern.is_empty() {
                return Err(Error::runtime(ErrorCode::InvalidValue, "empty fill pattern"));
            }
            access(memory(&buffer)?.fill(offset, len, &pattern))
        }
        Command::WriteImage { image, data } => {
            let Some(host) = image.raw().as_any().downcast_ref::<HostImage>() else {
                return Err(Error::runtime(ErrorCode::InvalidMemObject, "image was not created by the host backend"));
            };
            if data.len() != host.mem.len() {
                return Err(Error::runtime(
                    ErrorCode::InvalidValue,
                    format!("image holds {} bytes, got {}", host.mem.len(), data.len()),
                ));
            }
            access(host.mem.write(0, &data))
        }
        Command::Marker => Ok(()),
    }
}
