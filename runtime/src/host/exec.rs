//! ND-range execution.
//!
//! Work-groups run in parallel on the rayon pool. Inside a group, work-items
//! run one after another unless the kernel calls `barrier`, in which case every
//! work-item of the group gets its own thread and they rendezvous on a
//! [`GroupBarrier`].

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use tessera_device::{Error, Geometry, KernelArg};
use tessera_dtype::{AddrSpace, DType, ScalarType, Value};

use super::ast::{Function, Program, Ty};
use super::driver::{HostImage, HostMemory};
use super::interp::{Fault, Machine, WorkItem, coerce};
use super::memory::Memory;
use super::value::{Pointer, Val, as_u64};

const ABANDONED: &str = "work-group barrier abandoned by a faulting work-item";

#[derive(Debug, Default)]
struct BarrierState {
    active: usize,
    arrived: usize,
    generation: u64,
    poisoned: bool,
}

/// Rendezvous point for the work-items of one group.
///
/// Work-items that return stop counting towards the rendezvous, and a faulting
/// work-item releases everyone with an error instead of leaving them blocked.
#[derive(Debug)]
pub struct GroupBarrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl GroupBarrier {
    pub fn new(size: usize) -> Self {
        Self { state: Mutex::new(BarrierState { active: size, ..Default::default() }), cond: Condvar::new() }
    }

    fn release(&self, state: &mut BarrierState) {
        state.arrived = 0;
        state.generation += 1;
        self.cond.notify_all();
    }

    pub fn wait(&self) -> Result<(), String> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(ABANDONED.into());
        }
        state.arrived += 1;
        if state.arrived >= state.active {
            self.release(&mut state);
            return Ok(());
        }
        let generation = state.generation;
        while state.generation == generation && !state.poisoned {
            self.cond.wait(&mut state);
        }
        if state.generation == generation { Err(ABANDONED.into()) } else { Ok(()) }
    }

    /// The calling work-item returned from the kernel.
    pub fn leave(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.arrived > 0 && state.arrived >= state.active {
            self.release(&mut state);
        }
    }

    pub fn poison(&self) {
        self.state.lock().poisoned = true;
        self.cond.notify_all();
    }
}

/// Kernel argument prepared for execution.
#[derive(Debug, Clone)]
enum Bound {
    Val(Val),
    /// `__local` scratch; allocated fresh for every work-group.
    Local { bytes: usize, elem: DType },
}

fn bind(function: &Function, args: &[KernelArg]) -> Result<Vec<Bound>, Error> {
    let fail = |index: usize, reason: String| Error::Bind { kernel: function.name.clone(), index, reason };
    if args.len() != function.params.len() {
        return Err(fail(args.len(), format!("kernel takes {} arguments, {} bound", function.params.len(), args.len())));
    }
    function
        .params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, arg))| {
            Ok(match (&param.ty, arg) {
                (Ty::Ptr(elem, space), KernelArg::Buffer(buffer)) => {
                    let Some(host) = buffer.raw().as_any().downcast_ref::<HostMemory>() else {
                        return Err(fail(index, "buffer was not allocated by the host backend".into()));
                    };
                    Bound::Val(Val::Ptr(Pointer { mem: Arc::clone(&host.mem), offset: 0, elem: elem.clone(), space: *space }))
                }
                (Ty::Ptr(elem, AddrSpace::Local), KernelArg::Local(bytes)) => Bound::Local { bytes: *bytes, elem: elem.clone() },
                (Ty::Image, KernelArg::Image(image)) => {
                    let Some(host) = image.raw().as_any().downcast_ref::<HostImage>() else {
                        return Err(fail(index, "image was not created by the host backend".into()));
                    };
                    Bound::Val(Val::Image(Arc::new(host.clone())))
                }
                (Ty::Data(dtype), KernelArg::Value(bytes)) => {
                    if bytes.len() != dtype.bytes() {
                        return Err(fail(index, format!("{} expects {} bytes, got {}", dtype, dtype.bytes(), bytes.len())));
                    }
                    Bound::Val(Val::Data(Value::decode(dtype, bytes)))
                }
                (Ty::Sampler, KernelArg::Value(bytes)) if bytes.len() == 4 => {
                    let flags = Value::decode(&DType::Scalar(ScalarType::UInt), bytes);
                    Bound::Val(Val::Sampler(as_u64(&flags).unwrap_or_default() as u32))
                }
                (ty, arg) => return Err(fail(index, format!("parameter '{}' of type {} cannot take {arg:?}", param.name, ty.name()))),
            })
        })
        .collect()
}

fn unflatten(flat: usize, extent: [usize; 3]) -> [usize; 3] {
    [flat % extent[0], (flat / extent[0]) % extent[1], flat / (extent[0] * extent[1])]
}

struct Launch<'a> {
    program: &'a Program,
    kernel: usize,
    args: Vec<Bound>,
    globals: Vec<Val>,
    geometry: &'a Geometry,
    local: [usize; 3],
    groups: [usize; 3],
}

impl Launch<'_> {
    fn item<'b>(&self, group: [usize; 3], local_id: [usize; 3], barrier: Option<&'b GroupBarrier>) -> WorkItem<'b> {
        WorkItem {
            dims: self.geometry.dims,
            global_id: std::array::from_fn(|d| self.geometry.offset[d] + group[d] * self.local[d] + local_id[d]),
            local_id,
            group_id: group,
            global_size: self.geometry.global,
            local_size: self.local,
            global_offset: self.geometry.offset,
            barrier,
        }
    }

    fn materialize(&self) -> Vec<Val> {
        self.args
            .iter()
            .map(|arg| match arg {
                Bound::Val(val) => val.clone(),
                Bound::Local { bytes, elem } => Val::Ptr(Pointer {
                    mem: Arc::new(Memory::new(*bytes)),
                    offset: 0,
                    elem: elem.clone(),
                    space: AddrSpace::Local,
                }),
            })
            .collect()
    }

    fn run_group(&self, flat_group: usize) -> Result<(), Fault> {
        let group = unflatten(flat_group, self.groups);
        let args = self.materialize();
        let items = self.local.iter().product::<usize>();

        if !self.program.functions[self.kernel].uses_barrier {
            for flat in 0..items {
                let item = self.item(group, unflatten(flat, self.local), None);
                Machine::new(self.program, &self.globals, item).call(self.kernel, args.clone())?;
            }
            return Ok(());
        }

        let barrier = GroupBarrier::new(items);
        let faults = std::thread::scope(|scope| {
            let handles = (0..items)
                .map(|flat| {
                    let args = args.clone();
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let item = self.item(group, unflatten(flat, self.local), Some(barrier));
                        let result = Machine::new(self.program, &self.globals, item).call(self.kernel, args);
                        match &result {
                            Ok(_) => barrier.leave(),
                            Err(_) => barrier.poison(),
                        }
                        result
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(Ok(_)) => None,
                    Ok(Err(fault)) => Some(fault),
                    Err(_) => Some(Fault::from("work-item thread panicked".to_string())),
                })
                .collect::<Vec<_>>()
        });
        let root = faults.iter().position(|f| f.message != ABANDONED).unwrap_or(0);
        match faults.into_iter().nth(root) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// Runs kernel `kernel` of `program` over `geometry`.
#[tracing::instrument(skip_all, fields(kernel = %program.functions[kernel].name))]
pub fn launch(program: &Program, kernel: usize, args: &[KernelArg], geometry: &Geometry) -> Result<(), Error> {
    let function = &program.functions[kernel];
    let execution = |fault: Fault| Error::Execution { kernel: function.name.clone(), message: fault.to_string() };
    let bound = bind(function, args)?;

    let local = geometry.local.unwrap_or([1, 1, 1]);
    let groups: [usize; 3] = std::array::from_fn(|d| geometry.global[d] / local[d].max(1));
    let mut launch = Launch { program, kernel, args: bound, globals: Vec::new(), geometry, local, groups };

    for global in &program.globals {
        let item = launch.item([0; 3], [0; 3], None);
        let val = Machine::new(program, &launch.globals, item).constant(&global.init).map_err(execution)?;
        let val = coerce(val, &global.ty).map_err(|e| execution(Fault::from(format!("'{}': {e}", global.name))))?;
        launch.globals.push(val);
    }

    tracing::trace!(groups = ?groups, local = ?local, barrier = function.uses_barrier, "launch");
    let total = groups.iter().product::<usize>();
    (0..total).into_par_iter().try_for_each(|group| launch.run_group(group)).map_err(execution)
}
