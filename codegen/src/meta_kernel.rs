//! Kernel source builder.
//!
//! A [`MetaKernel`] accumulates one kernel: its parameters (with the values to
//! bind at launch), body statements, and everything the body depends on (type
//! declarations, helper functions, pragmas, samplers). [`MetaKernel::source`]
//! renders the program text in a fixed order:
//!
//! ```text
//! pragmas
//! type declarations (dependency order)
//! sampler declarations
//! helper functions
//! __kernel void name(args) { body }
//! ```
//!
//! A builder is created per algorithm invocation and consumed by one launch.

use std::collections::HashSet;
use std::fmt::Write as _;

use tessera_device::{Buffer, Event, Geometry, Image2d, Kernel, KernelArg, Queue, WaitList};
use tessera_dtype::{AddrSpace, DType, Element, Value};

use crate::error::{DeviceSnafu, Result, UnboundArgSnafu, UndeclaredArgSnafu};
use crate::expr::{EmitSession, Expr};
use crate::program_cache::{ProgramCacheRegistry, fingerprint};

use snafu::{OptionExt, ResultExt};

/// Position of a parameter in the kernel signature.
pub type ArgIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Pointer,
    Value,
    Image,
}

#[derive(Debug, Clone)]
struct ArgDecl {
    space: AddrSpace,
    dtype: DType,
    name: String,
    kind: ArgKind,
}

impl ArgDecl {
    fn render(&self) -> String {
        match self.kind {
            ArgKind::Pointer => format!("{} {} *{}", self.space.qualifier(), self.dtype.name(), self.name),
            ArgKind::Value => format!("const {} {}", self.dtype.name(), self.name),
            ArgKind::Image => format!("__read_only image2d_t {}", self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetaKernel {
    name: String,
    args: Vec<ArgDecl>,
    bindings: Vec<Option<KernelArg>>,
    body: String,
    depth: usize,
    pragmas: Vec<String>,
    declared: HashSet<String>,
    declarations: String,
    samplers: Vec<String>,
    functions: Vec<(String, String)>,
    options: String,
    cache_key: Option<String>,
    counter: usize,
}

impl MetaKernel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            bindings: Vec::new(),
            body: String::new(),
            depth: 1,
            pragmas: Vec::new(),
            declared: HashSet::new(),
            declarations: String::new(),
            samplers: Vec::new(),
            functions: Vec::new(),
            options: String::new(),
            cache_key: None,
            counter: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Declares a parameter; pointers for global, local and constant spaces,
    /// by-value for private. The returned index is stable.
    pub fn add_arg(&mut self, space: AddrSpace, dtype: DType, name: impl Into<String>) -> ArgIndex {
        let kind = if space == AddrSpace::Private { ArgKind::Value } else { ArgKind::Pointer };
        self.declare(ArgDecl { space, dtype, name: name.into(), kind }, None)
    }

    fn declare(&mut self, decl: ArgDecl, binding: Option<KernelArg>) -> ArgIndex {
        if decl.kind != ArgKind::Image {
            self.inject_type(&decl.dtype);
        }
        self.args.push(decl);
        self.bindings.push(binding);
        self.args.len() - 1
    }

    /// Declares a `__global` buffer parameter bound to `buffer` and returns its name.
    ///
    /// Every call adds a parameter, even for a buffer already declared.
    pub fn add_buffer_arg(&mut self, space: AddrSpace, dtype: DType, buffer: &Buffer) -> String {
        let name = format!("_buf{}", self.args.len());
        let kind = if space == AddrSpace::Private { ArgKind::Value } else { ArgKind::Pointer };
        let decl = ArgDecl { space, dtype, name: name.clone(), kind };
        self.declare(decl, Some(KernelArg::Buffer(buffer.clone())));
        name
    }

    /// Declares a by-value parameter holding `value` and returns its name.
    pub fn add_value_arg<T: Element>(&mut self, prefix: &str, value: T) -> String {
        self.add_value(prefix, &value.to_value())
    }

    pub fn add_value(&mut self, prefix: &str, value: &Value) -> String {
        let name = format!("{prefix}{}", self.args.len());
        let decl = ArgDecl { space: AddrSpace::Private, dtype: value.dtype(), name: name.clone(), kind: ArgKind::Value };
        self.declare(decl, Some(KernelArg::from_value(value)));
        name
    }

    /// Declares a `__local` scratch array of `count` elements.
    pub fn add_local_arg(&mut self, dtype: DType, count: usize) -> String {
        let name = format!("_local{}", self.args.len());
        let bytes = dtype.bytes() * count.max(1);
        let decl = ArgDecl { space: AddrSpace::Local, dtype, name: name.clone(), kind: ArgKind::Pointer };
        self.declare(decl, Some(KernelArg::Local(bytes)));
        name
    }

    pub fn add_image_arg(&mut self, image: &Image2d) -> String {
        let name = format!("_img{}", self.args.len());
        let decl = ArgDecl { space: AddrSpace::Private, dtype: DType::UINT, name: name.clone(), kind: ArgKind::Image };
        self.declare(decl, Some(KernelArg::Image(image.clone())));
        name
    }

    /// Declares a file-scope sampler constant; repeated names are ignored.
    pub fn add_sampler(&mut self, name: &str, flags: &str) {
        let decl = format!("const sampler_t {name} = {flags};");
        if !self.samplers.contains(&decl) {
            self.samplers.push(decl);
        }
    }

    /// Binds (or rebinds) the value of a declared parameter.
    pub fn set_arg(&mut self, index: ArgIndex, arg: KernelArg) -> Result<()> {
        let slot = self.bindings.get_mut(index).context(UndeclaredArgSnafu { kernel: self.name.as_str(), index })?;
        *slot = Some(arg);
        Ok(())
    }

    pub fn set_arg_value<T: Element>(&mut self, index: ArgIndex, value: T) -> Result<()> {
        self.set_arg(index, KernelArg::value(&value))
    }

    /// Adds a pragma line once.
    pub fn add_pragma(&mut self, pragma: impl Into<String>) {
        let pragma = pragma.into();
        if !self.pragmas.contains(&pragma) {
            self.pragmas.push(pragma);
        }
    }

    /// Adds a helper function definition once per name.
    pub fn add_function(&mut self, name: &str, source: &str) {
        if !self.functions.iter().any(|(n, _)| n == name) {
            self.functions.push((name.to_string(), source.trim().to_string()));
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|(n, _)| n == name)
    }

    pub fn set_options(&mut self, options: impl Into<String>) {
        self.options = options.into();
    }

    /// Overrides the fingerprint used as the program cache key.
    pub fn set_cache_key(&mut self, key: impl Into<String>) {
        self.cache_key = Some(key.into());
    }

    /// Fresh identifier `{prefix}{n}`, unique within this kernel.
    pub fn var(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.counter);
        self.counter += 1;
        name
    }

    /// Appends one body statement; lines ending in `{` indent the following
    /// lines, lines starting with `}` close the level.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref().trim();
        if text.starts_with('}') {
            self.depth = self.depth.saturating_sub(1).max(1);
        }
        let _ = writeln!(self.body, "{}{text}", "    ".repeat(self.depth));
        if text.ends_with('{') {
            self.depth += 1;
        }
        self
    }

    /// Appends several statements.
    pub fn lines<S: AsRef<str>>(&mut self, lines: impl IntoIterator<Item = S>) -> &mut Self {
        for line in lines {
            self.line(line);
        }
        self
    }

    /// Renders `expr`, declaring the types it needs.
    pub fn expr(&mut self, expr: &Expr) -> String {
        expr.emit(self)
    }

    /// Complete program text.
    pub fn source(&self) -> String {
        let mut out = String::new();
        for pragma in &self.pragmas {
            let _ = writeln!(out, "{pragma}");
        }
        if !self.pragmas.is_empty() {
            out.push('\n');
        }
        if !self.declarations.is_empty() {
            out.push_str(&self.declarations);
            out.push('\n');
        }
        for sampler in &self.samplers {
            let _ = writeln!(out, "{sampler}");
        }
        if !self.samplers.is_empty() {
            out.push('\n');
        }
        for (_, function) in &self.functions {
            let _ = writeln!(out, "{function}\n");
        }
        let args = self.args.iter().map(ArgDecl::render).collect::<Vec<_>>().join(", ");
        let _ = write!(out, "__kernel void {}({args})\n{{\n{}}}\n", self.name, self.body);
        out
    }

    /// Builds (or fetches from the global cache) the program on `context` and
    /// returns the kernel with every stored binding applied.
    pub fn compile(&self, context: &tessera_device::Context) -> Result<Kernel> {
        self.compile_with(context, ProgramCacheRegistry::global())
    }

    #[tracing::instrument(skip_all, fields(kernel.name = %self.name, context.id = context.id()))]
    pub fn compile_with(&self, context: &tessera_device::Context, registry: &ProgramCacheRegistry) -> Result<Kernel> {
        let source = self.source();
        let key = self.cache_key.clone().unwrap_or_else(|| fingerprint(&source, &self.options));
        let cache = registry.cache_for(context);
        let program = cache.get_or_build(&key, || {
            tracing::trace!(source = %source, "building kernel source");
            context.build_program(&source, &self.options).context(DeviceSnafu)
        })?;
        let kernel = program.create_kernel(&self.name).context(DeviceSnafu)?;
        for (index, binding) in self.bindings.iter().enumerate() {
            if let Some(arg) = binding {
                kernel.set_arg(index, arg.clone()).context(DeviceSnafu)?;
            }
        }
        Ok(kernel)
    }

    fn check_bound(&self) -> Result<()> {
        match self.bindings.iter().position(Option::is_none) {
            Some(index) => UnboundArgSnafu { kernel: self.name.as_str(), index, name: self.args[index].name.as_str() }.fail(),
            None => Ok(()),
        }
    }

    /// Launches over `geometry` on `queue`.
    ///
    /// A requested work-group size is shrunk to the device limit and to a
    /// divisor of the global range, so any local size is accepted.
    pub fn exec_nd(&self, queue: &Queue, geometry: &Geometry, wait: &WaitList) -> Result<Event> {
        self.check_bound()?;
        let kernel = self.compile(queue.context())?;
        let geometry = geometry.clone().fitted(queue.device().max_work_group_size());
        queue.enqueue_nd_range(&kernel, &geometry, wait).context(DeviceSnafu)
    }

    pub fn exec_1d(&self, queue: &Queue, offset: usize, global: usize, local: Option<usize>) -> Result<Event> {
        self.exec_nd(queue, &Geometry::new_1d(offset, global, local), &WaitList::new())
    }

    /// Launches a single work-item.
    pub fn exec(&self, queue: &Queue) -> Result<Event> {
        self.exec_nd(queue, &Geometry::task(), &WaitList::new())
    }
}

impl EmitSession for MetaKernel {
    fn inject_type(&mut self, dtype: &DType) {
        for ext in dtype.required_extensions() {
            self.add_pragma(format!("#pragma OPENCL EXTENSION {ext} : enable"));
        }
        for aggregate in dtype.declaration_order() {
            let name = aggregate.name();
            if self.declared.insert(name)
                && let Some(declaration) = aggregate.declaration()
            {
                self.declarations.push_str(&declaration);
            }
        }
    }
}
