//! Placeholder expressions.
//!
//! `_1` and `_2` stand for the first and second argument of a function
//! object; arithmetic on them builds an expression template that is
//! instantiated with the actual argument expressions when a kernel is
//! generated:
//!
//! ```ignore
//! transform(&v.begin(), &v.end(), &v.begin(), _1 * 3 + 1, &queue)?;
//! count_if(&v.begin(), &v.end(), _1.lt(5), &queue)?;
//! ```
//!
//! A lambda's result has the type of its first argument; comparisons used
//! as predicates only need to be truthy.

use std::ops;

use tessera_codegen::{BinaryOp, Expr, MetaKernel, UnaryOp};
use tessera_dtype::{Element, Value};

use crate::functional::{BinaryFunction, Compare, UnaryFunction};

#[derive(Debug, Clone, PartialEq)]
pub enum Lambda {
    /// Argument placeholder, zero-based.
    Arg(usize),
    Lit(Value),
    Unary(UnaryOp, Box<Lambda>),
    Binary(BinaryOp, Box<Lambda>, Box<Lambda>),
    Call(String, Vec<Lambda>),
    Select(Box<Lambda>, Box<Lambda>, Box<Lambda>),
}

#[allow(non_upper_case_globals)]
pub const _1: Lambda = Lambda::Arg(0);
#[allow(non_upper_case_globals)]
pub const _2: Lambda = Lambda::Arg(1);

impl Lambda {
    pub fn lit<T: Element>(value: T) -> Self {
        Lambda::Lit(value.to_value())
    }

    /// Call of a built-in or helper function.
    pub fn function(name: impl Into<String>, args: impl IntoIterator<Item = Lambda>) -> Self {
        Lambda::Call(name.into(), args.into_iter().collect())
    }

    pub fn select(cond: Lambda, then: Lambda, otherwise: Lambda) -> Self {
        Lambda::Select(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    fn binary(op: BinaryOp, lhs: Lambda, rhs: Lambda) -> Self {
        Lambda::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs.into())
    }

    pub fn not_equals(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Ne, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Lambda>) -> Self {
        Self::binary(BinaryOp::Or, self, rhs.into())
    }

    /// Highest placeholder index used, plus one.
    pub fn arity(&self) -> usize {
        match self {
            Lambda::Arg(i) => i + 1,
            Lambda::Lit(_) => 0,
            Lambda::Unary(_, operand) => operand.arity(),
            Lambda::Binary(_, lhs, rhs) => lhs.arity().max(rhs.arity()),
            Lambda::Call(_, args) => args.iter().map(Lambda::arity).max().unwrap_or(0),
            Lambda::Select(c, t, o) => c.arity().max(t.arity()).max(o.arity()),
        }
    }

    /// Substitutes `args` for the placeholders.
    pub fn instantiate(&self, args: &[Expr]) -> Expr {
        match self {
            Lambda::Arg(i) => {
                debug_assert!(*i < args.len(), "placeholder _{} used in a function of {} arguments", i + 1, args.len());
                args[*i].clone()
            }
            Lambda::Lit(value) => Expr::Literal(value.clone()),
            Lambda::Unary(op, operand) => Expr::Unary { op: *op, operand: Box::new(operand.instantiate(args)) },
            Lambda::Binary(op, lhs, rhs) => Expr::binary(*op, lhs.instantiate(args), rhs.instantiate(args)),
            Lambda::Call(name, call_args) => Expr::call(name.clone(), call_args.iter().map(|a| a.instantiate(args))),
            Lambda::Select(c, t, o) => Expr::select(c.instantiate(args), t.instantiate(args), o.instantiate(args)),
        }
    }
}

impl<A: Element> UnaryFunction<A> for Lambda {
    type Output = A;

    fn call(&self, arg: Expr, _kernel: &mut MetaKernel) -> Expr {
        self.instantiate(&[arg])
    }
}

impl<A: Element, B: Element> BinaryFunction<A, B> for Lambda {
    type Output = A;

    fn call(&self, lhs: Expr, rhs: Expr, _kernel: &mut MetaKernel) -> Expr {
        self.instantiate(&[lhs, rhs])
    }
}

impl<T: Element> Compare<T> for Lambda {}

macro_rules! lambda_from {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Lambda {
            fn from(value: $ty) -> Self {
                Lambda::lit(value)
            }
        }
    )*};
}

lambda_from!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, bool);

macro_rules! lambda_operator {
    ($($trait:ident::$method:ident => $op:ident),* $(,)?) => {$(
        impl<R: Into<Lambda>> ops::$trait<R> for Lambda {
            type Output = Lambda;

            fn $method(self, rhs: R) -> Lambda {
                Lambda::binary(BinaryOp::$op, self, rhs.into())
            }
        }
    )*};
}

lambda_operator! {
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

impl ops::Neg for Lambda {
    type Output = Lambda;

    fn neg(self) -> Lambda {
        Lambda::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl ops::Not for Lambda {
    type Output = Lambda;

    fn not(self) -> Lambda {
        Lambda::Unary(UnaryOp::Not, Box::new(self))
    }
}
