//! Kernel expression AST.
//!
//! Iterator adaptors and functors compose [`Expr`] trees; text is produced
//! once, by [`Expr::emit`], when the tree is spliced into a kernel body.
//! Nodes that name an aggregate type (literals, casts, constructors) ask the
//! [`EmitSession`] to declare it, so a kernel never references an undeclared
//! struct.

use std::fmt::Write as _;
use std::ops;

use tessera_dtype::{DType, Element, ScalarType, Value};

/// Receiver for the type declarations an expression depends on.
pub trait EmitSession {
    fn inject_type(&mut self, dtype: &DType);
}

/// Session that drops declarations; useful for rendering standalone fragments.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl EmitSession for Detached {
    fn inject_type(&mut self, _dtype: &DType) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Index { base: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Select { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Cast { dtype: DType, operand: Box<Expr> },
    /// Field, vector component (`.s3`) or swizzle (`.xyz`) access.
    Member { base: Box<Expr>, member: String },
    /// Vector `(float4)(a, b, c, d)` or aggregate `(T){ a, b }` construction.
    Construct { dtype: DType, elements: Vec<Expr> },
    Raw(String),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Expr::Raw(text.into())
    }

    pub fn lit<T: Element>(value: T) -> Self {
        Expr::Literal(value.to_value())
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Value::Int(ScalarType::Int, value))
    }

    pub fn uint(value: u64) -> Self {
        Expr::Literal(Value::UInt(ScalarType::UInt, value))
    }

    pub fn index(self, index: impl Into<Expr>) -> Self {
        Expr::Index { base: Box::new(self), index: Box::new(index.into()) }
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        Expr::Member { base: Box::new(self), member: member.into() }
    }

    pub fn call(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call { name: name.into(), args: args.into_iter().collect() }
    }

    pub fn select(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Select { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) }
    }

    pub fn cast(self, dtype: DType) -> Self {
        Expr::Cast { dtype, operand: Box::new(self) }
    }

    pub fn construct(dtype: DType, elements: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Construct { dtype, elements: elements.into_iter().collect() }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs.into())
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ne, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Or, self, rhs.into())
    }

    /// `get_global_id(dim)`.
    pub fn global_id(dim: u32) -> Self {
        Expr::call("get_global_id", [Expr::uint(dim as u64)])
    }

    /// Renders the tree, declaring every aggregate it mentions on `session`.
    pub fn emit(&self, session: &mut impl EmitSession) -> String {
        let mut out = String::new();
        self.write(session, &mut out);
        out
    }

    fn write(&self, session: &mut impl EmitSession, out: &mut String) {
        match self {
            Expr::Literal(value) => write_literal(value, session, out),
            Expr::Var(name) | Expr::Raw(name) => out.push_str(name),
            Expr::Index { base, index } => {
                base.write(session, out);
                out.push('[');
                index.write(session, out);
                out.push(']');
            }
            Expr::Unary { op, operand } => {
                let operand = operand.emit(session);
                let symbol: &'static str = op.into();
                // `- -x` must not lex as a decrement.
                let gap = if operand.starts_with(symbol) { " " } else { "" };
                let _ = write!(out, "({symbol}{gap}{operand})");
            }
            Expr::Binary { op, lhs, rhs } => {
                out.push('(');
                lhs.write(session, out);
                let _ = write!(out, " {} ", op.symbol());
                rhs.write(session, out);
                out.push(')');
            }
            Expr::Call { name, args } => {
                out.push_str(name);
                out.push('(');
                write_list(args, session, out);
                out.push(')');
            }
            Expr::Select { cond, then, otherwise } => {
                out.push('(');
                cond.write(session, out);
                out.push_str(" ? ");
                then.write(session, out);
                out.push_str(" : ");
                otherwise.write(session, out);
                out.push(')');
            }
            Expr::Cast { dtype, operand } => {
                session.inject_type(dtype);
                let _ = write!(out, "(({})(", dtype.name());
                operand.write(session, out);
                out.push_str("))");
            }
            Expr::Member { base, member } => {
                base.write(session, out);
                out.push('.');
                out.push_str(member);
            }
            Expr::Construct { dtype, elements } => {
                session.inject_type(dtype);
                if dtype.is_struct() {
                    let _ = write!(out, "({}){{ ", dtype.name());
                    write_list(elements, session, out);
                    out.push_str(" }");
                } else {
                    let _ = write!(out, "({})(", dtype.name());
                    write_list(elements, session, out);
                    out.push(')');
                }
            }
        }
    }
}

fn write_list(items: &[Expr], session: &mut impl EmitSession, out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write(session, out);
    }
}

fn write_literal(value: &Value, session: &mut impl EmitSession, out: &mut String) {
    match value {
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(ScalarType::Int, v) => {
            let _ = write!(out, "{v}");
        }
        Value::Int(ScalarType::Long, v) => {
            let _ = write!(out, "{v}l");
        }
        Value::Int(s, v) => {
            let _ = write!(out, "(({s}){v})");
        }
        Value::UInt(ScalarType::UInt, v) => {
            let _ = write!(out, "{v}u");
        }
        Value::UInt(ScalarType::ULong, v) => {
            let _ = write!(out, "{v}ul");
        }
        Value::UInt(s, v) => {
            let _ = write!(out, "(({s}){v}u)");
        }
        Value::Float(s, v) => out.push_str(&float_literal(*s, *v)),
        Value::Vector(s, lanes) => {
            let _ = write!(out, "({s}{})(", lanes.len());
            for (i, lane) in lanes.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(lane, session, out);
            }
            out.push(')');
        }
        Value::Struct(s, fields) => {
            session.inject_type(&value.dtype());
            let _ = write!(out, "({}){{ ", s.name);
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(field, session, out);
            }
            out.push_str(" }");
        }
    }
}

/// Literal text for a floating-point constant: `f` suffix for `float`, none for `double`.
pub fn float_literal(scalar: ScalarType, value: f64) -> String {
    let double = scalar == ScalarType::Double;
    if value.is_nan() {
        return if double { "((double)NAN)".into() } else { "NAN".into() };
    }
    if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        return if double { format!("((double){sign}INFINITY)") } else { format!("({sign}INFINITY)") };
    }
    if double {
        let text = format!("{value:?}");
        if text.contains(['.', 'e']) { text } else { format!("{text}.0") }
    } else {
        let text = format!("{:?}", value as f32);
        if text.contains(['.', 'e']) { format!("{text}f") } else { format!("{text}.0f") }
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::var(name)
    }
}

impl From<String> for Expr {
    fn from(name: String) -> Self {
        Expr::Var(name)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::int(value as i64)
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Expr::uint(value as u64)
    }
}

impl From<usize> for Expr {
    fn from(value: usize) -> Self {
        Expr::uint(value as u64)
    }
}

macro_rules! impl_binary_operator {
    ($($trait:ident::$method:ident => $op:ident),* $(,)?) => {$(
        impl<R: Into<Expr>> ops::$trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::$op, self, rhs.into())
            }
        }
    )*};
}

impl_binary_operator! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
    BitAnd::bitand => BitAnd,
    BitOr::bitor => BitOr,
    BitXor::bitxor => BitXor,
    Shl::shl => Shl,
    Shr::shr => Shr,
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary { op: UnaryOp::Neg, operand: Box::new(self) }
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary { op: UnaryOp::Not, operand: Box::new(self) }
    }
}
