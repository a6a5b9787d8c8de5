//! Parser for the OpenCL C subset the host backend runs.
//!
//! The grammar lives in `opencl.pest`; this module walks the resulting pairs
//! into the resolved syntax tree. Names are resolved on the way: locals to
//! frame slots, calls to function indices or built-ins, well-known macros to
//! literals. Errors carry the `line:col` of the offending input.

use std::collections::{BTreeSet, HashMap};

use pest::Parser;
use pest_derive::Parser;
use tessera_dtype::{AddrSpace, DType, Field, ScalarType, Value};

use super::ast::{BinOp, Decl, Expr, ExprKind, Function, Global, Param, Pos, Program, Selector, Stmt, Ty, UnOp, swizzle_lanes};
use super::builtins::{Builtin, Func};
use super::value;

#[derive(Parser)]
#[grammar = "host/opencl.pest"]
pub struct OpenClParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

const FP64: &str = "cl_khr_fp64";

pub fn parse(source: &str) -> Result<Program, String> {
    let mut pairs = OpenClParser::parse(Rule::program, source).map_err(syntax_error)?;
    let program = pairs.next().ok_or_else(|| "1:1: empty program".to_string())?;
    Builder::default().program(program)
}

fn syntax_error(err: pest::error::Error<Rule>) -> String {
    let (line, col) = match err.line_col {
        pest::error::LineColLocation::Pos(at) => at,
        pest::error::LineColLocation::Span(at, _) => at,
    };
    format!("{line}:{col}: {}", err.variant.message())
}

fn pos(pair: &Pair<'_>) -> Pos {
    let (line, col) = pair.line_col();
    Pos { line: line as u32, col: col as u32 }
}

/// Next child of a pair whose shape the grammar guarantees.
fn child<'i>(pairs: &mut impl Iterator<Item = Pair<'i>>, at: Pos) -> Result<Pair<'i>, String> {
    pairs.next().ok_or_else(|| format!("{at}: incomplete syntax"))
}

/// Children of `pair` without keyword tokens.
fn operands(pair: Pair<'_>) -> impl Iterator<Item = Pair<'_>> {
    pair.into_inner().filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::k_if | Rule::k_else | Rule::k_for | Rule::k_while | Rule::k_do | Rule::k_return | Rule::k_sizeof
                | Rule::k_typedef | Rule::k_struct
        )
    })
}

fn address_space(word: &str) -> Option<AddrSpace> {
    match word {
        "__global" | "global" => Some(AddrSpace::Global),
        "__local" | "local" => Some(AddrSpace::Local),
        "__constant" | "constant" => Some(AddrSpace::Constant),
        "__private" | "private" => Some(AddrSpace::Private),
        _ => None,
    }
}

fn binary_operator(op: &str) -> Option<BinOp> {
    Some(match op {
        "||" => BinOp::Or,
        "&&" => BinOp::And,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "&" => BinOp::BitAnd,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Rem,
        _ => return None,
    })
}

fn assignment_operator(op: &str) -> Option<Option<BinOp>> {
    match op {
        "=" => Some(None),
        compound => binary_operator(compound.strip_suffix('=')?).map(Some),
    }
}

fn int_literal(text: &str, at: Pos) -> Result<Value, String> {
    use ScalarType::*;
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let suffix = &text[digits.len()..];
    let (unsigned, long) = (suffix.contains(['u', 'U']), suffix.contains(['l', 'L']));
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    };
    let v = parsed.map_err(|e| format!("{at}: invalid integer literal '{text}': {e}"))?;
    Ok(match (unsigned, long) {
        (false, false) if v <= i32::MAX as u64 => Value::Int(Int, v as i64),
        (false, _) if v <= i64::MAX as u64 => Value::Int(Long, v as i64),
        (true, false) if v <= u32::MAX as u64 => Value::UInt(UInt, v),
        _ => Value::UInt(ULong, v),
    })
}

/// `#pragma OPENCL EXTENSION <name> : enable`
fn extension_pragma(directive: &str) -> Option<String> {
    let mut words = directive.trim_start_matches('#').split_whitespace();
    if words.next()? != "pragma" || words.next()? != "OPENCL" || words.next()? != "EXTENSION" {
        return None;
    }
    let name = words.next()?.trim_end_matches(':');
    let rest: String = words.collect::<Vec<_>>().join(" ");
    rest.trim_start_matches(':').trim().eq("enable").then(|| name.to_string())
}

/// Macros from the OpenCL C headers that kernels use as plain identifiers.
fn constant(name: &str) -> Option<Value> {
    use ScalarType::*;
    let int = |v: i64| Value::Int(Int, v);
    let float = |v: f32| Value::Float(Float, v as f64);
    Some(match name {
        "true" => int(1),
        "false" => int(0),
        "CLK_LOCAL_MEM_FENCE" => int(1),
        "CLK_GLOBAL_MEM_FENCE" => int(2),
        "CLK_NORMALIZED_COORDS_FALSE" | "CLK_ADDRESS_NONE" => int(0),
        "CLK_NORMALIZED_COORDS_TRUE" => int(1),
        "CLK_ADDRESS_CLAMP_TO_EDGE" => int(2),
        "CLK_ADDRESS_CLAMP" => int(4),
        "CLK_ADDRESS_REPEAT" => int(6),
        "CLK_ADDRESS_MIRRORED_REPEAT" => int(8),
        "CLK_FILTER_NEAREST" => int(0x10),
        "CLK_FILTER_LINEAR" => int(0x20),
        "INFINITY" => float(f32::INFINITY),
        "NAN" => float(f32::NAN),
        "MAXFLOAT" | "FLT_MAX" => float(f32::MAX),
        "FLT_MIN" => float(f32::MIN_POSITIVE),
        "FLT_EPSILON" => float(f32::EPSILON),
        "DBL_MAX" => Value::Float(Double, f64::MAX),
        "M_PI" => Value::Float(Double, std::f64::consts::PI),
        "M_PI_F" => float(std::f32::consts::PI),
        "CHAR_MAX" => int(i8::MAX as i64),
        "CHAR_MIN" => int(i8::MIN as i64),
        "UCHAR_MAX" => int(u8::MAX as i64),
        "SHRT_MAX" => int(i16::MAX as i64),
        "SHRT_MIN" => int(i16::MIN as i64),
        "USHRT_MAX" => int(u16::MAX as i64),
        "INT_MAX" => int(i32::MAX as i64),
        "INT_MIN" => int(i32::MIN as i64),
        "UINT_MAX" => Value::UInt(UInt, u32::MAX as u64),
        "LONG_MAX" => Value::Int(Long, i64::MAX),
        "LONG_MIN" => Value::Int(Long, i64::MIN),
        "ULONG_MAX" => Value::UInt(ULong, u64::MAX),
        _ => return None,
    })
}

fn is_lvalue(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Local(_) | ExprKind::Index(..) | ExprKind::Member(..) | ExprKind::Arrow(..) | ExprKind::Deref(_)
    )
}

fn fold(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Lit(v) => Some(v.clone()),
        ExprKind::Unary(op, operand) => value::unary(*op, &fold(operand)?).ok(),
        ExprKind::Binary(op, lhs, rhs) => value::binary(*op, &fold(lhs)?, &fold(rhs)?).ok(),
        _ => None,
    }
}

/// Name resolution state while walking the parse tree.
#[derive(Default)]
struct Builder {
    extensions: Vec<String>,
    fp64_literals: bool,
    uses_double: bool,
    types: HashMap<String, DType>,
    globals: Vec<Global>,
    global_names: HashMap<String, usize>,
    functions: Vec<Function>,
    function_names: HashMap<String, usize>,
    defined: Vec<bool>,
    calls: Vec<BTreeSet<usize>>,
    scopes: Vec<HashMap<String, usize>>,
    slots: usize,
    current: Option<usize>,
    barrier: bool,
}

impl Builder {
    // File scope.

    fn program(mut self, pair: Pair<'_>) -> Result<Program, String> {
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::pragma => {
                    if let Some(ext) = extension_pragma(item.as_str()) {
                        self.fp64_literals |= ext == FP64;
                        self.extensions.push(ext);
                    }
                }
                Rule::typedef_decl => self.typedef(item)?,
                Rule::function => self.function(item)?,
                Rule::global_decl => self.global(item)?,
                _ => {}
            }
        }

        for (caller, callees) in self.calls.iter().enumerate() {
            if let Some(&missing) = callees.iter().find(|&&callee| !self.defined[callee]) {
                return Err(format!(
                    "function '{}' is called from '{}' but never defined",
                    self.functions[missing].name, self.functions[caller].name
                ));
            }
        }
        let mut changed = true;
        while changed {
            changed = false;
            for index in 0..self.functions.len() {
                if !self.functions[index].uses_barrier && self.calls[index].iter().any(|&c| self.functions[c].uses_barrier) {
                    self.functions[index].uses_barrier = true;
                    changed = true;
                }
            }
        }

        Ok(Program {
            globals: self.globals,
            functions: self.functions,
            extensions: self.extensions,
            uses_double: self.uses_double,
        })
    }

    fn typedef(&mut self, pair: Pair<'_>) -> Result<(), String> {
        let at = pos(&pair);
        let mut parts = operands(pair);
        let definition = child(&mut parts, at)?;
        let name_pair = child(&mut parts, at)?;
        let name = name_pair.as_str().to_string();
        let dtype = match definition.as_rule() {
            Rule::struct_def => {
                let mut fields = Vec::new();
                for field_decl in operands(definition).filter(|p| p.as_rule() == Rule::field_decl) {
                    let field_at = pos(&field_decl);
                    let mut parts = field_decl.into_inner();
                    let Ty::Data(dtype) = self.base_type(child(&mut parts, field_at)?)?.0 else {
                        return Err(format!("{field_at}: struct fields must have a data type"));
                    };
                    fields.extend(parts.map(|ident| Field::new(ident.as_str().to_string(), dtype.clone())));
                }
                DType::structure(name.clone(), fields)
            }
            _ => match self.type_name(definition)? {
                Ty::Data(dtype) => dtype,
                other => return Err(format!("{}: typedef of {} is not supported", pos(&name_pair), other.name())),
            },
        };
        self.types.insert(name, dtype);
        Ok(())
    }

    fn global(&mut self, pair: Pair<'_>) -> Result<(), String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let ty = self.type_name(child(&mut parts, at)?)?;
        let name = child(&mut parts, at)?.as_str().to_string();
        let init = self.expr(child(&mut parts, at)?)?;
        self.global_names.insert(name.clone(), self.globals.len());
        self.globals.push(Global { name, ty, init });
        Ok(())
    }

    fn function(&mut self, pair: Pair<'_>) -> Result<(), String> {
        self.scopes = vec![HashMap::new()];
        self.slots = 0;

        let mut is_kernel = false;
        let mut ret = Ty::Void;
        let mut name = None;
        let mut params = Vec::new();
        let mut body = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::kernel_keyword => is_kernel = true,
                Rule::type_name => ret = self.type_name(part)?,
                Rule::ident => name = Some((part.as_str().to_string(), pos(&part))),
                Rule::param => {
                    if let Some(param) = self.param(part)? {
                        params.push(param);
                    }
                }
                Rule::block => body = Some(part),
                _ => {}
            }
        }
        let Some((name, at)) = name else {
            return Err("function without a name".to_string());
        };

        let index = match self.function_names.get(&name) {
            Some(&index) => {
                if self.functions[index].params.len() != params.len() {
                    return Err(format!("{at}: conflicting declarations of '{name}'"));
                }
                if self.defined[index] && body.is_some() {
                    return Err(format!("{at}: redefinition of '{name}'"));
                }
                index
            }
            None => {
                let index = self.functions.len();
                self.functions.push(Function {
                    name: name.clone(),
                    ret: ret.clone(),
                    params: Vec::new(),
                    body: Vec::new(),
                    slots: 0,
                    is_kernel,
                    uses_barrier: false,
                });
                self.defined.push(false);
                self.calls.push(BTreeSet::new());
                self.function_names.insert(name, index);
                index
            }
        };
        if !self.defined[index] {
            self.functions[index].params = params;
        }
        let Some(body) = body else {
            self.scopes.clear();
            return Ok(());
        };

        self.current = Some(index);
        self.barrier = false;
        let body = self.block(body)?;
        let function = &mut self.functions[index];
        function.body = body;
        function.slots = self.slots;
        function.ret = ret;
        function.is_kernel |= is_kernel;
        function.uses_barrier = self.barrier;
        self.defined[index] = true;
        self.current = None;
        self.scopes.clear();
        Ok(())
    }

    /// `None` for the `(void)` parameter list.
    fn param(&mut self, pair: Pair<'_>) -> Result<Option<Param>, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let (base, space) = self.base_type(child(&mut parts, at)?)?;
        let mut pointers = 0;
        let mut name = None;
        let mut array = false;
        for part in parts {
            match part.as_rule() {
                Rule::ptr => pointers += 1,
                Rule::ident => name = Some((part.as_str().to_string(), pos(&part))),
                Rule::array_param => array = true,
                _ => {}
            }
        }
        if matches!(base, Ty::Void) && pointers == 0 && name.is_none() {
            return Ok(None);
        }
        let mut ty = self.pointer(base, space, pointers, at)?;
        if array {
            ty = match ty {
                Ty::Data(dtype) => Ty::Ptr(dtype, space.unwrap_or(AddrSpace::Private)),
                other => return Err(format!("{at}: array of {} is not supported", other.name())),
            };
        }
        let (name, name_at) = name.unwrap_or((String::new(), at));
        let slot = self.declare(&name, name_at)?;
        Ok(Some(Param { name, ty, slot }))
    }

    fn declare(&mut self, name: &str, at: Pos) -> Result<usize, String> {
        let slot = self.slots;
        self.slots += 1;
        if name.is_empty() {
            return Ok(slot);
        }
        let Some(scope) = self.scopes.last_mut() else {
            return Err(format!("{at}: declaration of '{name}' outside a function"));
        };
        if scope.insert(name.to_string(), slot).is_some() {
            return Err(format!("{at}: redefinition of '{name}'"));
        }
        Ok(slot)
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    // Types.

    fn note_fp64(&mut self, dtype: &DType) {
        if dtype.required_extensions().contains(&FP64) {
            self.uses_double = true;
        }
    }

    fn data_type(&mut self, dtype: DType) -> Ty {
        self.note_fp64(&dtype);
        Ty::Data(dtype)
    }

    /// Base type and address space of a `type_spec` or `cast_spec`.
    fn base_type(&mut self, spec: Pair<'_>) -> Result<(Ty, Option<AddrSpace>), String> {
        let at = pos(&spec);
        let mut space = None;
        let mut base = None;
        for part in spec.into_inner() {
            let ty = match part.as_rule() {
                Rule::address_space => {
                    space = address_space(part.as_str());
                    continue;
                }
                Rule::sign_type => {
                    let mut words = part.into_inner();
                    let unsigned = words.next().is_some_and(|w| w.as_str() == "unsigned");
                    let scalar = match (unsigned, words.next().map_or("int", |w| w.as_str())) {
                        (true, "char") => ScalarType::UChar,
                        (false, "char") => ScalarType::Char,
                        (true, "short") => ScalarType::UShort,
                        (false, "short") => ScalarType::Short,
                        (true, "long") => ScalarType::ULong,
                        (false, "long") => ScalarType::Long,
                        (true, _) => ScalarType::UInt,
                        (false, _) => ScalarType::Int,
                    };
                    Ty::Data(DType::Scalar(scalar))
                }
                Rule::long_int if part.as_str().starts_with("short") => Ty::Data(DType::Scalar(ScalarType::Short)),
                Rule::long_int => Ty::Data(DType::Scalar(ScalarType::Long)),
                Rule::builtin_type => match DType::from_cl_name(part.as_str()) {
                    Some(dtype) => self.data_type(dtype),
                    None => return Err(format!("{}: unknown type '{}'", pos(&part), part.as_str())),
                },
                Rule::struct_ref | Rule::type_ident => {
                    let name_at = pos(&part);
                    let name = operands(part).next().map(|p| p.as_str().to_string()).unwrap_or_default();
                    match self.types.get(&name).cloned() {
                        Some(dtype) => self.data_type(dtype),
                        None => return Err(format!("{name_at}: unknown type name '{name}'")),
                    }
                }
                Rule::void_type => Ty::Void,
                Rule::image_type => Ty::Image,
                Rule::sampler_type => Ty::Sampler,
                _ => continue,
            };
            base = Some(ty);
        }
        match base {
            Some(ty) => Ok((ty, space)),
            None => Err(format!("{at}: expected a type")),
        }
    }

    fn pointer(&self, base: Ty, space: Option<AddrSpace>, pointers: usize, at: Pos) -> Result<Ty, String> {
        match (pointers, base) {
            (0, base) => Ok(base),
            (1, Ty::Data(dtype)) => Ok(Ty::Ptr(dtype, space.unwrap_or(AddrSpace::Private))),
            (1, other) => Err(format!("{at}: pointers to {} are not supported", other.name())),
            _ => Err(format!("{at}: pointers to pointers are not supported")),
        }
    }

    /// A `type_name` or `cast_type`: base type plus pointer declarators.
    fn type_name(&mut self, pair: Pair<'_>) -> Result<Ty, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let (base, space) = self.base_type(child(&mut parts, at)?)?;
        self.pointer(base, space, parts.count(), at)
    }

    // Statements.

    fn block(&mut self, pair: Pair<'_>) -> Result<Vec<Stmt>, String> {
        self.scopes.push(HashMap::new());
        let mut stmts = Vec::new();
        for statement in pair.into_inner() {
            stmts.push(self.statement(statement)?);
        }
        self.scopes.pop();
        Ok(stmts)
    }

    fn statement(&mut self, pair: Pair<'_>) -> Result<Stmt, String> {
        let at = pos(&pair);
        Ok(match pair.as_rule() {
            Rule::block => Stmt::Block(self.block(pair)?),
            Rule::if_stmt => {
                let mut parts = operands(pair);
                let cond = self.expr(child(&mut parts, at)?)?;
                let then = Box::new(self.statement(child(&mut parts, at)?)?);
                let otherwise = match parts.next() {
                    Some(stmt) => Some(Box::new(self.statement(stmt)?)),
                    None => None,
                };
                Stmt::If { cond, then, otherwise }
            }
            Rule::for_stmt => {
                self.scopes.push(HashMap::new());
                let mut parts = operands(pair);
                let init = match child(&mut parts, at)?.into_inner().next() {
                    Some(stmt) if stmt.as_rule() == Rule::empty_stmt => None,
                    Some(stmt) => Some(Box::new(self.statement(stmt)?)),
                    None => None,
                };
                let cond = self.optional_expr(child(&mut parts, at)?)?;
                let step = self.optional_expr(child(&mut parts, at)?)?;
                let body = Box::new(self.statement(child(&mut parts, at)?)?);
                self.scopes.pop();
                Stmt::For { init, cond, step, body }
            }
            Rule::while_stmt => {
                let mut parts = operands(pair);
                let cond = self.expr(child(&mut parts, at)?)?;
                let body = Box::new(self.statement(child(&mut parts, at)?)?);
                Stmt::While { cond, body }
            }
            Rule::do_stmt => {
                let mut parts = operands(pair);
                let body = Box::new(self.statement(child(&mut parts, at)?)?);
                let cond = self.expr(child(&mut parts, at)?)?;
                Stmt::DoWhile { body, cond }
            }
            Rule::break_stmt => Stmt::Break,
            Rule::continue_stmt => Stmt::Continue,
            Rule::return_stmt => Stmt::Return(self.optional_expr(pair)?),
            Rule::empty_stmt => Stmt::Empty,
            Rule::declaration => self.declaration(pair)?,
            Rule::expr_stmt => Stmt::Expr(self.expr(child(&mut pair.into_inner(), at)?)?),
            other => return Err(format!("{at}: unexpected {other:?}")),
        })
    }

    /// The expression inside `pair`, if it has one.
    fn optional_expr(&mut self, pair: Pair<'_>) -> Result<Option<Expr>, String> {
        match operands(pair).next() {
            Some(expr) => Ok(Some(self.expr(expr)?)),
            None => Ok(None),
        }
    }

    fn declaration(&mut self, pair: Pair<'_>) -> Result<Stmt, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let (base, space) = self.base_type(child(&mut parts, at)?)?;
        if space == Some(AddrSpace::Local) {
            return Err(format!("{at}: __local variables must be passed as kernel arguments"));
        }
        let mut decls = Vec::new();
        for declarator in parts {
            let mut pointers = 0;
            let mut name = None;
            let mut array = None;
            let mut init = None;
            for part in declarator.into_inner() {
                match part.as_rule() {
                    Rule::ptr => pointers += 1,
                    Rule::ident => name = Some((part.as_str().to_string(), pos(&part))),
                    Rule::array_size => {
                        let size = child(&mut part.into_inner(), at)?;
                        let size_at = pos(&size);
                        let size = self.expr(size)?;
                        array = match fold(&size).and_then(|v| value::as_u64(&v).ok()) {
                            Some(n) if n > 0 => Some(n as usize),
                            _ => return Err(format!("{size_at}: array size must be a positive constant")),
                        };
                    }
                    _ => {
                        if array.is_some() {
                            return Err(format!("{}: array initializers are not supported", pos(&part)));
                        }
                        init = Some(self.expr(part)?);
                    }
                }
            }
            let ty = self.pointer(base.clone(), space, pointers, at)?;
            if matches!(ty, Ty::Void) {
                return Err(format!("{at}: variable of type void"));
            }
            let (name, name_at) = name.ok_or_else(|| format!("{at}: expected a variable name"))?;
            let slot = self.declare(&name, name_at)?;
            decls.push(Decl { slot, ty, array, init });
        }
        Ok(Stmt::Decl(decls))
    }

    // Expressions.

    fn expr(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        match pair.as_rule() {
            Rule::assignment => self.assignment(pair),
            Rule::conditional => self.conditional(pair),
            Rule::logical_or
            | Rule::logical_and
            | Rule::bit_or
            | Rule::bit_xor
            | Rule::bit_and
            | Rule::equality
            | Rule::relational
            | Rule::shift
            | Rule::additive
            | Rule::multiplicative => self.binary(pair),
            Rule::unary => self.unary(pair),
            Rule::postfix => self.postfix(pair),
            other => Err(format!("{}: expected an expression, found {other:?}", pos(&pair))),
        }
    }

    fn assignment(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let target = self.expr(child(&mut parts, at)?)?;
        let Some(op_pair) = parts.next() else { return Ok(target) };
        let op_at = pos(&op_pair);
        let op = assignment_operator(op_pair.as_str())
            .ok_or_else(|| format!("{op_at}: unknown operator '{}'", op_pair.as_str()))?;
        if !is_lvalue(&target) {
            return Err(format!("{}: expression is not assignable", target.pos));
        }
        let value = self.expr(child(&mut parts, at)?)?;
        Ok(Expr { kind: ExprKind::Assign(op, Box::new(target), Box::new(value)), pos: op_at })
    }

    fn conditional(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let cond = self.expr(child(&mut parts, at)?)?;
        let Some(then) = parts.next() else { return Ok(cond) };
        let then = self.expr(then)?;
        let otherwise = self.expr(child(&mut parts, at)?)?;
        Ok(Expr { kind: ExprKind::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)), pos: at })
    }

    fn binary(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let mut lhs = self.expr(child(&mut parts, at)?)?;
        while let Some(op_pair) = parts.next() {
            let op_at = pos(&op_pair);
            let op = binary_operator(op_pair.as_str())
                .ok_or_else(|| format!("{op_at}: unknown operator '{}'", op_pair.as_str()))?;
            let rhs = self.expr(child(&mut parts, op_at)?)?;
            lhs = Expr { kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), pos: op_at };
        }
        Ok(lhs)
    }

    fn unary(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let first = child(&mut parts, at)?;
        let kind = match first.as_rule() {
            Rule::prefix_op => {
                let operand = self.expr(child(&mut parts, at)?)?;
                match first.as_str() {
                    "-" => ExprKind::Unary(UnOp::Neg, Box::new(operand)),
                    "+" => ExprKind::Unary(UnOp::Plus, Box::new(operand)),
                    "!" => ExprKind::Unary(UnOp::Not, Box::new(operand)),
                    "~" => ExprKind::Unary(UnOp::BitNot, Box::new(operand)),
                    "&" => ExprKind::AddrOf(Box::new(operand)),
                    "*" => ExprKind::Deref(Box::new(operand)),
                    op => {
                        if !is_lvalue(&operand) {
                            return Err(format!("{at}: operand of '{op}' is not assignable"));
                        }
                        ExprKind::IncDec { target: Box::new(operand), increment: op == "++", prefix: true }
                    }
                }
            }
            Rule::sizeof_expr => {
                let ty = self.type_name(child(&mut operands(first), at)?)?;
                let bytes = match &ty {
                    Ty::Data(dtype) => dtype.bytes(),
                    Ty::Ptr(..) => 8,
                    other => return Err(format!("{at}: sizeof({}) is not supported", other.name())),
                };
                ExprKind::Lit(Value::UInt(ScalarType::ULong, bytes as u64))
            }
            Rule::struct_lit => {
                let mut parts = first.into_inner();
                let ty = self.type_name(child(&mut parts, at)?)?;
                let Ty::Data(dtype @ DType::Struct(_)) = ty else {
                    return Err(format!("{at}: compound literal of {} is not supported", ty.name()));
                };
                ExprKind::StructLit(dtype, self.list(parts)?)
            }
            Rule::vector_lit => {
                let mut parts = first.into_inner();
                let name = child(&mut parts, at)?;
                let Some(dtype) = DType::from_cl_name(name.as_str()) else {
                    return Err(format!("{at}: unknown vector type '{}'", name.as_str()));
                };
                self.note_fp64(&dtype);
                ExprKind::VectorLit(dtype, self.list(parts)?)
            }
            Rule::cast_expr => {
                let mut parts = first.into_inner();
                let ty = self.type_name(child(&mut parts, at)?)?;
                ExprKind::Cast(ty, Box::new(self.expr(child(&mut parts, at)?)?))
            }
            _ => return self.expr(first),
        };
        Ok(Expr { kind, pos: at })
    }

    fn list<'i>(&mut self, items: impl Iterator<Item = Pair<'i>>) -> Result<Vec<Expr>, String> {
        items.map(|item| self.expr(item)).collect()
    }

    fn postfix(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let mut expr = self.primary(child(&mut parts, at)?)?;
        for op in parts {
            let op_at = pos(&op);
            let kind = match op.as_rule() {
                Rule::index => {
                    let index = self.expr(child(&mut op.into_inner(), op_at)?)?;
                    ExprKind::Index(Box::new(expr), Box::new(index))
                }
                Rule::member | Rule::arrow => {
                    let arrow = op.as_rule() == Rule::arrow;
                    let name = child(&mut op.into_inner(), op_at)?.as_str().to_string();
                    let selector = Selector { lanes: swizzle_lanes(&name), name };
                    if arrow {
                        ExprKind::Arrow(Box::new(expr), selector)
                    } else {
                        ExprKind::Member(Box::new(expr), selector)
                    }
                }
                rule => {
                    if !is_lvalue(&expr) {
                        return Err(format!("{op_at}: operand of postfix operator is not assignable"));
                    }
                    ExprKind::IncDec { target: Box::new(expr), increment: rule == Rule::post_inc, prefix: false }
                }
            };
            expr = Expr { kind, pos: op_at };
        }
        Ok(expr)
    }

    fn primary(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let kind = match pair.as_rule() {
            Rule::int_lit => ExprKind::Lit(int_literal(pair.as_str(), at)?),
            Rule::float_lit => {
                let text = pair.as_str();
                let digits = text.trim_end_matches(['f', 'F']);
                let v = digits.parse::<f64>().map_err(|e| format!("{at}: invalid float literal '{text}': {e}"))?;
                if digits.len() < text.len() || !self.fp64_literals {
                    ExprKind::Lit(Value::Float(ScalarType::Float, v as f32 as f64))
                } else {
                    ExprKind::Lit(Value::Float(ScalarType::Double, v))
                }
            }
            Rule::call => return self.call(pair),
            Rule::ident => return self.identifier(pair.as_str(), at),
            _ => return self.expr(pair),
        };
        Ok(Expr { kind, pos: at })
    }

    fn identifier(&mut self, name: &str, at: Pos) -> Result<Expr, String> {
        let kind = if let Some(slot) = self.lookup(name) {
            ExprKind::Local(slot)
        } else if let Some(&index) = self.global_names.get(name) {
            ExprKind::Global(index)
        } else if let Some(value) = constant(name) {
            ExprKind::Lit(value)
        } else {
            return Err(format!("{at}: use of undeclared identifier '{name}'"));
        };
        Ok(Expr { kind, pos: at })
    }

    fn call(&mut self, pair: Pair<'_>) -> Result<Expr, String> {
        let at = pos(&pair);
        let mut parts = pair.into_inner();
        let name = child(&mut parts, at)?.as_str().to_string();
        let args = self.list(parts)?;
        if let Some(&index) = self.function_names.get(&name) {
            let expected = self.functions[index].params.len();
            if args.len() != expected {
                return Err(format!("{at}: '{name}' takes {expected} arguments, {} given", args.len()));
            }
            if let Some(current) = self.current {
                self.calls[current].insert(index);
            }
            return Ok(Expr { kind: ExprKind::Call(index, args), pos: at });
        }
        let Some(builtin) = Builtin::resolve(&name) else {
            return Err(format!("{at}: call to undeclared function '{name}'"));
        };
        if args.len() != builtin.arity() {
            return Err(format!("{at}: '{name}' takes {} arguments, {} given", builtin.arity(), args.len()));
        }
        if builtin == Builtin::Func(Func::Barrier) {
            self.barrier = true;
        }
        Ok(Expr { kind: ExprKind::Builtin(builtin, args), pos: at })
    }
}
