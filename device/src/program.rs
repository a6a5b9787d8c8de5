//! Compiled programs and their kernels.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::{AddrSpace, Element, Value};

use crate::buffer::{Buffer, Image2d};
use crate::context::ContextId;
use crate::driver::{DriverKernel, DriverProgram};
use crate::error::{BindSnafu, ErrorCode, Result, RuntimeSnafu};
use crate::handle::Shared;

/// Device code built from one (source, options) pair for one context.
#[derive(Clone)]
pub struct Program {
    raw: Shared<Box<dyn DriverProgram>>,
    context: ContextId,
    source: Arc<str>,
    options: Arc<str>,
}

impl Program {
    pub(crate) fn new(raw: Shared<Box<dyn DriverProgram>>, context: ContextId, source: &str, options: &str) -> Self {
        Self { raw, context, source: source.into(), options: options.into() }
    }

    pub fn id(&self) -> u64 {
        self.raw.id()
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn build_log(&self) -> &str {
        self.raw.build_log()
    }

    pub fn kernel_names(&self) -> Vec<String> {
        self.raw.kernel_names()
    }

    pub fn create_kernel(&self, name: &str) -> Result<Kernel> {
        let raw = self.raw.create_kernel(name)?;
        let args = vec![None; raw.arg_spaces().len()];
        Ok(Kernel { raw: Shared::new(raw), program: self.clone(), args: Arc::new(Mutex::new(args)) })
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program").field("id", &self.id()).field("context", &self.context).finish_non_exhaustive()
    }
}

/// Value bound to a kernel parameter.
#[derive(Clone)]
pub enum KernelArg {
    Buffer(Buffer),
    Image(Image2d),
    /// Work-group scratch of the given byte size.
    Local(usize),
    /// Raw little-endian bytes of a by-value parameter.
    Value(SmallVec<[u8; 16]>),
}

impl KernelArg {
    pub fn value<T: Element>(value: &T) -> Self {
        let mut bytes = Vec::with_capacity(T::size());
        value.encode(&mut bytes);
        KernelArg::Value(bytes.into())
    }

    pub fn from_value(value: &Value) -> Self {
        KernelArg::Value(value.to_bytes().into())
    }

    fn accepts(&self, space: AddrSpace) -> bool {
        matches!(
            (self, space),
            (KernelArg::Buffer(_), AddrSpace::Global | AddrSpace::Constant)
                | (KernelArg::Local(_), AddrSpace::Local)
                | (KernelArg::Value(_) | KernelArg::Image(_), AddrSpace::Private)
        )
    }
}

impl fmt::Debug for KernelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelArg::Buffer(b) => write!(f, "Buffer(#{}, {}B)", b.id(), b.size()),
            KernelArg::Image(i) => write!(f, "Image(#{})", i.id()),
            KernelArg::Local(bytes) => write!(f, "Local({bytes}B)"),
            KernelArg::Value(bytes) => write!(f, "Value({bytes:02x?})"),
        }
    }
}

/// Entry point of a program with its argument bindings.
///
/// Clones share bindings, like native kernel handles do.
#[derive(Clone)]
pub struct Kernel {
    raw: Shared<Box<dyn DriverKernel>>,
    program: Program,
    args: Arc<Mutex<Vec<Option<KernelArg>>>>,
}

impl Kernel {
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn arg_count(&self) -> usize {
        self.raw.arg_spaces().len()
    }

    pub fn set_arg(&self, index: usize, arg: KernelArg) -> Result<()> {
        let Some(&space) = self.raw.arg_spaces().get(index) else {
            return RuntimeSnafu {
                code: ErrorCode::InvalidArgIndex,
                detail: format!("kernel '{}' has {} arguments, got index {index}", self.name(), self.arg_count()),
            }
            .fail();
        };
        ensure!(
            arg.accepts(space),
            RuntimeSnafu {
                code: ErrorCode::InvalidArgValue,
                detail: format!("argument {index} of '{}' is {space:?}, got {arg:?}", self.name()),
            }
        );
        self.args.lock()[index] = Some(arg);
        Ok(())
    }

    /// Snapshot of every binding; fails if any parameter is unbound.
    pub fn bound_args(&self) -> Result<Vec<KernelArg>> {
        let args = self.args.lock();
        args.iter()
            .enumerate()
            .map(|(index, arg)| {
                arg.clone().ok_or_else(|| {
                    BindSnafu { kernel: self.name(), index, reason: "argument was never set" }.build()
                })
            })
            .collect()
    }

    pub fn raw(&self) -> &dyn DriverKernel {
        &**self.raw
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("name", &self.name()).field("args", &self.arg_count()).finish()
    }
}
