//! Device function objects.
//!
//! A function object does not run on the host: given the expressions of its
//! arguments it returns the expression of its result, registering whatever
//! helper definitions it needs on the kernel being built.

use std::marker::PhantomData;

use tessera_codegen::{Expr, MetaKernel};
use tessera_dtype::Element;

/// A device function of one argument of type `A`.
pub trait UnaryFunction<A: Element>: Clone + Send + Sync {
    type Output: Element;

    fn call(&self, arg: Expr, kernel: &mut MetaKernel) -> Expr;
}

/// A device function of two arguments.
pub trait BinaryFunction<A: Element, B: Element = A>: Clone + Send + Sync {
    type Output: Element;

    fn call(&self, lhs: Expr, rhs: Expr, kernel: &mut MetaKernel) -> Expr;
}

/// A device function of no arguments, evaluated once per generated element.
pub trait Generator: Clone + Send + Sync {
    type Output: Element;

    fn call(&self, kernel: &mut MetaKernel) -> Expr;
}

/// Direction of a comparator that matches the natural order of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Strict weak ordering used by sorting and searching algorithms.
pub trait Compare<T: Element>: BinaryFunction<T, T> {
    /// `Some` when the comparison is `<` or `>` on `T` itself, which lets
    /// sorts use key-based strategies instead of comparisons.
    fn natural_order(&self) -> Option<SortOrder> {
        None
    }
}

macro_rules! binary_operator {
    ($($(#[$meta:meta])* $name:ident => $op:tt),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl<T: Element> BinaryFunction<T, T> for $name {
            type Output = T;

            fn call(&self, lhs: Expr, rhs: Expr, _kernel: &mut MetaKernel) -> Expr {
                lhs $op rhs
            }
        }
    )*};
}

binary_operator! {
    /// `a + b`
    Plus => +,
    /// `a - b`
    Minus => -,
    /// `a * b`
    Multiplies => *,
    /// `a / b`
    Divides => /,
    /// `a % b`
    Modulus => %,
}

macro_rules! builtin_binary {
    ($($(#[$meta:meta])* $name:ident => $func:literal),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl<T: Element> BinaryFunction<T, T> for $name {
            type Output = T;

            fn call(&self, lhs: Expr, rhs: Expr, _kernel: &mut MetaKernel) -> Expr {
                Expr::call($func, [lhs, rhs])
            }
        }
    )*};
}

builtin_binary! {
    /// The built-in `min`.
    Min => "min",
    /// The built-in `max`.
    Max => "max",
}

macro_rules! comparison {
    ($($(#[$meta:meta])* $name:ident => $method:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl<T: Element> BinaryFunction<T, T> for $name {
            type Output = bool;

            fn call(&self, lhs: Expr, rhs: Expr, _kernel: &mut MetaKernel) -> Expr {
                lhs.$method(rhs)
            }
        }
    )*};
}

comparison! {
    /// `a < b`
    Less => lt,
    /// `a > b`
    Greater => gt,
    /// `a <= b`
    LessEqual => le,
    /// `a >= b`
    GreaterEqual => ge,
    /// `a == b`
    EqualTo => equals,
    /// `a != b`
    NotEqualTo => not_equals,
    /// `a && b`
    LogicalAnd => and,
    /// `a || b`
    LogicalOr => or,
}

impl<T: Element> Compare<T> for Less {
    fn natural_order(&self) -> Option<SortOrder> {
        Some(SortOrder::Ascending)
    }
}

impl<T: Element> Compare<T> for Greater {
    fn natural_order(&self) -> Option<SortOrder> {
        Some(SortOrder::Descending)
    }
}

/// `!a`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalNot;

impl<T: Element> UnaryFunction<T> for LogicalNot {
    type Output = bool;

    fn call(&self, arg: Expr, _kernel: &mut MetaKernel) -> Expr {
        !arg
    }
}

/// Returns its argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl<T: Element> UnaryFunction<T> for Identity {
    type Output = T;

    fn call(&self, arg: Expr, _kernel: &mut MetaKernel) -> Expr {
        arg
    }
}

/// `-a`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Negate;

impl<T: Element> UnaryFunction<T> for Negate {
    type Output = T;

    fn call(&self, arg: Expr, _kernel: &mut MetaKernel) -> Expr {
        -arg
    }
}

/// Logical negation of a predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Not1<F>(pub F);

pub fn not1<F>(predicate: F) -> Not1<F> {
    Not1(predicate)
}

impl<T: Element, F: UnaryFunction<T>> UnaryFunction<T> for Not1<F> {
    type Output = bool;

    fn call(&self, arg: Expr, kernel: &mut MetaKernel) -> Expr {
        !self.0.call(arg, kernel)
    }
}

/// A binary function with its arguments swapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flip<F>(pub F);

impl<T: Element, F: BinaryFunction<T, T>> BinaryFunction<T, T> for Flip<F> {
    type Output = F::Output;

    fn call(&self, lhs: Expr, rhs: Expr, kernel: &mut MetaKernel) -> Expr {
        self.0.call(rhs, lhs, kernel)
    }
}

/// A binary function with its second argument fixed to a host value.
///
/// The value is passed as a kernel argument, so programs are reused across
/// values.
#[derive(Debug, Clone)]
pub struct Bind2nd<F, T> {
    function: F,
    value: T,
}

impl<F, T> Bind2nd<F, T> {
    pub fn new(function: F, value: T) -> Self {
        Self { function, value }
    }
}

impl<T: Element, F: BinaryFunction<T, T>> UnaryFunction<T> for Bind2nd<F, T> {
    type Output = F::Output;

    fn call(&self, arg: Expr, kernel: &mut MetaKernel) -> Expr {
        let value = kernel.add_value_arg("_bound", self.value);
        self.function.call(arg, Expr::var(value), kernel)
    }
}

/// A binary function with its first argument fixed to a host value.
#[derive(Debug, Clone)]
pub struct Bind1st<F, T> {
    function: F,
    value: T,
}

impl<F, T> Bind1st<F, T> {
    pub fn new(function: F, value: T) -> Self {
        Self { function, value }
    }
}

impl<T: Element, F: BinaryFunction<T, T>> UnaryFunction<T> for Bind1st<F, T> {
    type Output = F::Output;

    fn call(&self, arg: Expr, kernel: &mut MetaKernel) -> Expr {
        let value = kernel.add_value_arg("_bound", self.value);
        self.function.call(Expr::var(value), arg, kernel)
    }
}

/// A user function given as device source text.
///
/// `Sig` is `()`, `(A,)` or `(A, B)` for the argument types and `R` the result
/// type. The definition is added to every kernel that calls it.
///
/// ```ignore
/// let square = Function::<(i32,), i32>::from_source("square", "int square(int x) { return x * x; }");
/// transform(&input.begin(), &input.end(), &output.begin(), square, &queue)?;
/// ```
pub struct Function<Sig, R> {
    name: String,
    source: String,
    _signature: PhantomData<fn(Sig) -> R>,
}

impl<Sig, R> Function<Sig, R> {
    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self { name: name.into(), source: source.into(), _signature: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn emit(&self, args: impl IntoIterator<Item = Expr>, kernel: &mut MetaKernel) -> Expr {
        kernel.add_function(&self.name, &self.source);
        Expr::call(self.name.clone(), args)
    }
}

impl<Sig, R> Clone for Function<Sig, R> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), source: self.source.clone(), _signature: PhantomData }
    }
}

impl<Sig, R> std::fmt::Debug for Function<Sig, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

impl<R: Element> Generator for Function<(), R> {
    type Output = R;

    fn call(&self, kernel: &mut MetaKernel) -> Expr {
        self.emit(std::iter::empty(), kernel)
    }
}

impl<A: Element, R: Element> UnaryFunction<A> for Function<(A,), R> {
    type Output = R;

    fn call(&self, arg: Expr, kernel: &mut MetaKernel) -> Expr {
        self.emit([arg], kernel)
    }
}

impl<A: Element, B: Element, R: Element> BinaryFunction<A, B> for Function<(A, B), R> {
    type Output = R;

    fn call(&self, lhs: Expr, rhs: Expr, kernel: &mut MetaKernel) -> Expr {
        self.emit([lhs, rhs], kernel)
    }
}

impl<T: Element, R: Element> Compare<T> for Function<(T, T), R> {}
