//! Kernel source generation for tessera.
//!
//! - [`expr`]: expression AST rendered to OpenCL C.
//! - [`meta_kernel`]: the per-invocation kernel builder (parameters, body,
//!   type declarations, helper functions) that compiles and launches itself.
//! - [`program_cache`]: per-context LRU of compiled programs keyed by source
//!   fingerprint.
//!
//! ```ignore
//! let mut k = MetaKernel::new("fill");
//! let out = k.add_buffer_arg(AddrSpace::Global, DType::INT, &buffer);
//! k.line(format!("{out}[get_global_id(0)] = 7;"));
//! k.exec_1d(&queue, 0, n, None)?.wait()?;
//! ```

pub mod error;
pub mod expr;
pub mod lru;
pub mod meta_kernel;
pub mod program_cache;


pub use error::{Error, Result};
pub use expr::{BinaryOp, Detached, EmitSession, Expr, UnaryOp, float_literal};
pub use meta_kernel::{ArgIndex, MetaKernel};
pub use program_cache::{CacheStats, ProgramCache, ProgramCacheRegistry, fingerprint};
