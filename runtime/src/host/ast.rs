//! Resolved syntax tree of a host program.
//!
//! Variables are resolved to frame slots and calls to function indices or
//! built-ins while parsing, so execution never looks names up.

use std::fmt;

use smallvec::SmallVec;
use tessera_dtype::{AddrSpace, DType, Value};

use super::builtins::Builtin;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Static type of a variable, parameter or cast target.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Void,
    Data(DType),
    Ptr(DType, AddrSpace),
    Image,
    Sampler,
}

impl Ty {
    pub fn name(&self) -> String {
        match self {
            Ty::Void => "void".into(),
            Ty::Data(dtype) => dtype.name(),
            Ty::Ptr(dtype, space) => format!("{} {}*", space.qualifier(), dtype.name()),
            Ty::Image => "image2d_t".into(),
            Ty::Sampler => "sampler_t".into(),
        }
    }

    /// Address space a kernel parameter of this type lives in.
    pub fn arg_space(&self) -> AddrSpace {
        match self {
            Ty::Ptr(_, space) => *space,
            _ => AddrSpace::Private,
        }
    }
}

#[derive(Debug)]
pub struct Program {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    pub extensions: Vec<String>,
    pub uses_double: bool,
}

impl Program {
    pub fn kernel_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().filter(|f| f.is_kernel).map(|f| f.name.as_str())
    }
}

/// File-scope constant (samplers and `__constant` scalars).
#[derive(Debug)]
pub struct Global {
    pub name: String,
    pub ty: Ty,
    pub init: Expr,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub ret: Ty,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub slots: usize,
    pub is_kernel: bool,
    /// Calls `barrier`, directly or through a helper.
    pub uses_barrier: bool,
}

#[derive(Debug)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub slot: usize,
}

#[derive(Debug)]
pub struct Decl {
    pub slot: usize,
    pub ty: Ty,
    /// Element count of a private array declaration.
    pub array: Option<usize>,
    pub init: Option<Expr>,
}

#[derive(Debug)]
pub enum Stmt {
    Decl(Vec<Decl>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If { cond: Expr, then: Box<Stmt>, otherwise: Option<Box<Stmt>> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt> },
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    Break,
    Continue,
    Return(Option<Expr>),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne)
    }
}

/// `.name` selector; `lanes` is set when the name is a valid vector swizzle.
#[derive(Debug, Clone)]
pub struct Selector {
    pub name: String,
    pub lanes: Option<SmallVec<[u8; 16]>>,
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug)]
pub enum ExprKind {
    Lit(Value),
    Local(usize),
    Global(usize),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, Selector),
    Arrow(Box<Expr>, Selector),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Assign(Option<BinOp>, Box<Expr>, Box<Expr>),
    IncDec { target: Box<Expr>, increment: bool, prefix: bool },
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Cast(Ty, Box<Expr>),
    VectorLit(DType, Vec<Expr>),
    StructLit(DType, Vec<Expr>),
    Call(usize, Vec<Expr>),
    Builtin(Builtin, Vec<Expr>),
    AddrOf(Box<Expr>),
    Deref(Box<Expr>),
}

/// Lane indices named by a swizzle (`xyzw`, `s0`..`sF`, `lo`, `hi`, `even`, `odd`).
///
/// `lo`/`hi`/`even`/`odd` depend on the vector width and are resolved at run
/// time, so they are not handled here.
pub fn swizzle_lanes(name: &str) -> Option<SmallVec<[u8; 16]>> {
    if let Some(digits) = name.strip_prefix('s').or_else(|| name.strip_prefix('S'))
        && !digits.is_empty()
    {
        return digits.chars().map(|c| c.to_digit(16).map(|d| d as u8)).collect();
    }
    if name.is_empty() || name.len() > 4 {
        return None;
    }
    name.chars()
        .map(|c| match c {
            'x' => Some(0),
            'y' => Some(1),
            'z' => Some(2),
            'w' => Some(3),
            _ => None,
        })
        .collect()
}
