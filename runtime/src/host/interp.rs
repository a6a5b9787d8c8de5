//! Tree-walking evaluator for one work-item.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tessera_dtype::{AddrSpace, DType, ScalarType, Value};

use super::ast::{BinOp, Expr, ExprKind, Pos, Program, Selector, Stmt, Ty};
use super::builtins::{self, Builtin, Func};
use super::exec::GroupBarrier;
use super::memory::Memory;
use super::value::{self, Pointer, Val, as_i64, as_u64, convert, lane};

const MAX_CALL_DEPTH: usize = 64;

type Lanes = SmallVec<[u8; 16]>;

/// A run-time failure, located at the innermost expression that raised it.
#[derive(Debug, Clone)]
pub struct Fault {
    pub pos: Option<Pos>,
    pub message: String,
}

impl Fault {
    fn at(pos: Pos, message: impl Into<String>) -> Self {
        Fault { pos: Some(pos), message: message.into() }
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Fault { pos: None, message }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{pos}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

type Result<T, E = Fault> = std::result::Result<T, E>;

/// Identity of the executing work-item.
#[derive(Debug, Clone, Copy)]
pub struct WorkItem<'a> {
    pub dims: usize,
    pub global_id: [usize; 3],
    pub local_id: [usize; 3],
    pub group_id: [usize; 3],
    pub global_size: [usize; 3],
    pub local_size: [usize; 3],
    pub global_offset: [usize; 3],
    pub barrier: Option<&'a GroupBarrier>,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Val),
}

#[derive(Debug, Clone)]
enum Step {
    Field(usize),
    Lanes(Lanes),
}

/// Assignable location.
#[derive(Debug)]
enum Place {
    Slot { slot: usize, path: Vec<Step> },
    Mem(Pointer),
    MemLanes(Pointer, Lanes),
}

pub struct Machine<'a> {
    program: &'a Program,
    globals: &'a [Val],
    item: WorkItem<'a>,
    depth: Cell<usize>,
}

/// Lanes named by `selector` on a vector of `width` components.
fn select_lanes(selector: &Selector, width: usize) -> Result<Lanes, String> {
    if let Some(lanes) = &selector.lanes {
        return match lanes.iter().find(|&&l| l as usize >= width) {
            Some(l) => Err(format!("component {l} of '.{}' out of range for a {width}-wide vector", selector.name)),
            None => Ok(lanes.clone()),
        };
    }
    let padded = if width == 3 { 4 } else { width } as u8;
    let half = padded / 2;
    let lanes: Lanes = match selector.name.as_str() {
        "lo" => (0..half).collect(),
        "hi" => (half..padded).collect(),
        "even" => (0..padded).step_by(2).collect(),
        "odd" => (1..padded).step_by(2).collect(),
        other => return Err(format!("no member named '{other}' in a {width}-wide vector")),
    };
    Ok(lanes)
}

fn pick_lanes(v: &Value, lanes: &[u8]) -> Result<Value, String> {
    let Value::Vector(scalar, components) = v else {
        return match lanes {
            [0] => Ok(v.clone()),
            _ => Err(format!("swizzle of scalar {}", v.dtype())),
        };
    };
    let picked = lanes
        .iter()
        .map(|&l| components.get(l as usize).cloned().unwrap_or_else(|| Value::zero(&DType::Scalar(*scalar))))
        .collect::<Vec<_>>();
    Ok(match picked.len() {
        1 => picked.into_iter().next().unwrap_or_else(|| Value::zero(&DType::Scalar(*scalar))),
        _ => Value::Vector(*scalar, picked),
    })
}

fn assign_lanes(target: &mut Value, lanes: &[u8], new: &Value) -> Result<(), String> {
    let Value::Vector(scalar, components) = target else {
        return match lanes {
            [0] => {
                *target = convert(new, &target.dtype())?;
                Ok(())
            }
            _ => Err(format!("swizzle of scalar {}", target.dtype())),
        };
    };
    for (i, &l) in lanes.iter().enumerate() {
        let source = if lanes.len() == 1 { new.clone() } else { lane(new, i)? };
        let slot = components.get_mut(l as usize).ok_or_else(|| format!("component {l} out of range"))?;
        *slot = value::cast_scalar(&source, *scalar)?;
    }
    Ok(())
}

fn member_value(v: &Value, selector: &Selector) -> Result<Value, String> {
    match v {
        Value::Struct(s, fields) => match s.field(&selector.name) {
            Some((index, _)) => Ok(fields[index].clone()),
            None => Err(format!("no member named '{}' in {}", selector.name, s.name)),
        },
        Value::Vector(_, components) => pick_lanes(v, &select_lanes(selector, components.len())?),
        other => pick_lanes(other, &select_lanes(selector, 1)?),
    }
}

fn set_path(target: &mut Value, path: &[Step], new: &Value) -> Result<(), String> {
    let Some((step, rest)) = path.split_first() else {
        *target = convert(new, &target.dtype())?;
        return Ok(());
    };
    match step {
        Step::Field(index) => match target {
            Value::Struct(_, fields) => match fields.get_mut(*index) {
                Some(field) => set_path(field, rest, new),
                None => Err(format!("field {index} out of range")),
            },
            other => Err(format!("member access on {}", other.dtype())),
        },
        Step::Lanes(lanes) if rest.is_empty() => assign_lanes(target, lanes, new),
        Step::Lanes(lanes) => {
            let mut picked = pick_lanes(target, lanes)?;
            set_path(&mut picked, rest, new)?;
            assign_lanes(target, lanes, &picked)
        }
    }
}

fn follow_path(v: &Value, path: &[Step]) -> Result<Value, String> {
    path.iter().try_fold(v.clone(), |v, step| match step {
        Step::Field(index) => match v {
            Value::Struct(_, mut fields) if *index < fields.len() => Ok(fields.swap_remove(*index)),
            other => Err(format!("member access on {}", other.dtype())),
        },
        Step::Lanes(lanes) => pick_lanes(&v, lanes),
    })
}

/// Converts `val` for storage in a variable of type `ty`.
pub fn coerce(val: Val, ty: &Ty) -> Result<Val, String> {
    match (ty, val) {
        (Ty::Data(dtype), val) => Ok(Val::Data(convert(&val.data()?, dtype)?)),
        (Ty::Ptr(elem, space), Val::Ptr(ptr)) => {
            let space = if *space == AddrSpace::Private { ptr.space } else { *space };
            Ok(Val::Ptr(Pointer { elem: elem.clone(), space, ..ptr }))
        }
        (Ty::Sampler, Val::Data(flags)) => Ok(Val::Sampler(as_u64(&flags)? as u32)),
        (Ty::Sampler, sampler @ Val::Sampler(_)) => Ok(sampler),
        (Ty::Image, image @ Val::Image(_)) => Ok(image),
        (Ty::Void, _) => Ok(Val::Void),
        (ty, val) => Err(format!("cannot convert {} to {}", val.describe(), ty.name())),
    }
}

fn initial(ty: &Ty) -> Val {
    match ty {
        Ty::Data(dtype) => Val::Data(Value::zero(dtype)),
        Ty::Sampler => Val::Sampler(0),
        _ => Val::Void,
    }
}

fn boolean(b: bool) -> Val {
    Val::Data(Value::Int(ScalarType::Int, b as i64))
}

/// Arithmetic including pointer offsets and pointer comparison.
fn arith(op: BinOp, a: Val, b: Val) -> Result<Val, String> {
    match (a, b) {
        (Val::Data(a), Val::Data(b)) => Ok(Val::Data(value::binary(op, &a, &b)?)),
        (Val::Ptr(p), Val::Data(n)) if matches!(op, BinOp::Add | BinOp::Sub) => {
            let n = as_i64(&n)?;
            Ok(Val::Ptr(p.offset_by(if op == BinOp::Add { n } else { n.wrapping_neg() })))
        }
        (Val::Data(n), Val::Ptr(p)) if op == BinOp::Add => Ok(Val::Ptr(p.offset_by(as_i64(&n)?))),
        (Val::Ptr(p), Val::Ptr(q)) => {
            if !Arc::ptr_eq(&p.mem, &q.mem) {
                return match op {
                    BinOp::Eq => Ok(boolean(false)),
                    BinOp::Ne => Ok(boolean(true)),
                    _ => Err("pointers into different allocations".into()),
                };
            }
            match op {
                BinOp::Sub => {
                    let elements = (p.offset - q.offset) / p.elem.bytes().max(1) as isize;
                    Ok(Val::Data(Value::Int(ScalarType::Long, elements as i64)))
                }
                op if op.is_comparison() => {
                    let (x, y) = (Value::Int(ScalarType::Long, p.offset as i64), Value::Int(ScalarType::Long, q.offset as i64));
                    Ok(Val::Data(value::binary(op, &x, &y)?))
                }
                op => Err(format!("operator {op:?} on pointers")),
            }
        }
        (a, b) => Err(format!("invalid operands {} and {} to {op:?}", a.describe(), b.describe())),
    }
}

impl<'a> Machine<'a> {
    pub fn new(program: &'a Program, globals: &'a [Val], item: WorkItem<'a>) -> Self {
        Self { program, globals, item, depth: Cell::new(0) }
    }

    /// Evaluates a file-scope initializer.
    pub fn constant(&self, expr: &Expr) -> Result<Val> {
        self.eval(&mut [], expr)
    }

    /// Runs function `index` with already-converted arguments.
    pub fn call(&self, index: usize, args: Vec<Val>) -> Result<Val> {
        let function = &self.program.functions[index];
        if self.depth.get() >= MAX_CALL_DEPTH {
            return Err(format!("call depth exceeded in '{}'", function.name).into());
        }
        let mut frame = vec![Val::Void; function.slots];
        for (param, arg) in function.params.iter().zip(args) {
            frame[param.slot] = coerce(arg, &param.ty).map_err(|e| format!("argument '{}' of '{}': {e}", param.name, function.name))?;
        }
        self.depth.set(self.depth.get() + 1);
        let flow = self.block(&mut frame, &function.body);
        self.depth.set(self.depth.get() - 1);
        match flow? {
            Flow::Return(val) => Ok(coerce(val, &function.ret)?),
            _ => Ok(Val::Void),
        }
    }

    fn block(&self, frame: &mut [Val], stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.exec(frame, stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn condition(&self, frame: &mut [Val], expr: &Expr) -> Result<bool> {
        self.eval(frame, expr)?.truthy().map_err(|e| Fault::at(expr.pos, e))
    }

    /// Runs a loop body; `None` means keep looping.
    fn iteration(&self, frame: &mut [Val], body: &Stmt) -> Result<Option<Flow>> {
        Ok(match self.exec(frame, body)? {
            Flow::Break => Some(Flow::Normal),
            flow @ Flow::Return(_) => Some(flow),
            Flow::Normal | Flow::Continue => None,
        })
    }

    fn exec(&self, frame: &mut [Val], stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Decl(decls) => {
                for decl in decls {
                    let val = match (&decl.ty, decl.array, &decl.init) {
                        (Ty::Data(dtype), Some(count), _) => Val::Ptr(Pointer {
                            mem: Arc::new(Memory::new(dtype.bytes() * count)),
                            offset: 0,
                            elem: dtype.clone(),
                            space: AddrSpace::Private,
                        }),
                        (ty, _, Some(init)) => {
                            let val = self.eval(frame, init)?;
                            coerce(val, ty).map_err(|e| Fault::at(init.pos, e))?
                        }
                        (ty, _, None) => initial(ty),
                    };
                    frame[decl.slot] = val;
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(stmts) => self.block(frame, stmts),
            Stmt::If { cond, then, otherwise } => {
                if self.condition(frame, cond)? {
                    self.exec(frame, then)
                } else if let Some(otherwise) = otherwise {
                    self.exec(frame, otherwise)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::For { init, cond, step, body } => {
                if let Some(init) = init {
                    self.exec(frame, init)?;
                }
                loop {
                    if let Some(cond) = cond
                        && !self.condition(frame, cond)?
                    {
                        return Ok(Flow::Normal);
                    }
                    if let Some(flow) = self.iteration(frame, body)? {
                        return Ok(flow);
                    }
                    if let Some(step) = step {
                        self.eval(frame, step)?;
                    }
                }
            }
            Stmt::While { cond, body } => {
                while self.condition(frame, cond)? {
                    if let Some(flow) = self.iteration(frame, body)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, cond } => loop {
                if let Some(flow) = self.iteration(frame, body)? {
                    return Ok(flow);
                }
                if !self.condition(frame, cond)? {
                    return Ok(Flow::Normal);
                }
            },
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(None) => Ok(Flow::Return(Val::Void)),
            Stmt::Return(Some(expr)) => Ok(Flow::Return(self.eval(frame, expr)?)),
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    fn eval(&self, frame: &mut [Val], expr: &Expr) -> Result<Val> {
        self.eval_kind(frame, expr).map_err(|mut fault| {
            fault.pos.get_or_insert(expr.pos);
            fault
        })
    }

    fn pointer(&self, frame: &mut [Val], expr: &Expr) -> Result<Pointer> {
        match self.eval(frame, expr)? {
            Val::Ptr(ptr) => Ok(ptr),
            other => Err(Fault::at(expr.pos, format!("expected a pointer, found {}", other.describe()))),
        }
    }

    fn eval_kind(&self, frame: &mut [Val], expr: &Expr) -> Result<Val> {
        Ok(match &expr.kind {
            ExprKind::Lit(v) => Val::Data(v.clone()),
            ExprKind::Local(slot) => frame[*slot].clone(),
            ExprKind::Global(index) => self.globals[*index].clone(),
            ExprKind::Index(base, index) => {
                let ptr = self.pointer(frame, base)?;
                let index = as_i64(&self.eval(frame, index)?.data()?)?;
                Val::Data(ptr.offset_by(index).load()?)
            }
            ExprKind::Deref(operand) => Val::Data(self.pointer(frame, operand)?.load()?),
            ExprKind::Member(base, selector) => {
                let base = self.eval(frame, base)?.data()?;
                Val::Data(member_value(&base, selector)?)
            }
            ExprKind::Arrow(base, selector) => {
                let ptr = self.pointer(frame, base)?;
                Val::Data(member_value(&ptr.load()?, selector)?)
            }
            ExprKind::Unary(op, operand) => Val::Data(value::unary(*op, &self.eval(frame, operand)?.data()?)?),
            ExprKind::Binary(op @ (BinOp::And | BinOp::Or), lhs, rhs) => {
                let lhs = self.eval(frame, lhs)?;
                match lhs {
                    Val::Data(Value::Vector(..)) => arith(*op, lhs, self.eval(frame, rhs)?)?,
                    lhs => {
                        let left = lhs.truthy()?;
                        match (op, left) {
                            (BinOp::And, false) => boolean(false),
                            (BinOp::Or, true) => boolean(true),
                            _ => boolean(self.condition(frame, rhs)?),
                        }
                    }
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(frame, lhs)?;
                let rhs = self.eval(frame, rhs)?;
                arith(*op, lhs, rhs)?
            }
            ExprKind::Assign(op, target, value) => {
                let place = self.place(frame, target)?;
                let mut new = self.eval(frame, value)?;
                if let Some(op) = op {
                    new = arith(*op, self.read(frame, &place)?, new)?;
                }
                self.write(frame, &place, new)?;
                self.read(frame, &place)?
            }
            ExprKind::IncDec { target, increment, prefix } => {
                let place = self.place(frame, target)?;
                let old = self.read(frame, &place)?;
                let op = if *increment { BinOp::Add } else { BinOp::Sub };
                let new = arith(op, old.clone(), Val::Data(Value::Int(ScalarType::Int, 1)))?;
                self.write(frame, &place, new)?;
                if *prefix { self.read(frame, &place)? } else { old }
            }
            ExprKind::Ternary(cond, then, otherwise) => {
                if self.condition(frame, cond)? {
                    self.eval(frame, then)?
                } else {
                    self.eval(frame, otherwise)?
                }
            }
            ExprKind::Cast(ty, operand) => coerce(self.eval(frame, operand)?, ty)?,
            ExprKind::VectorLit(dtype, elements) => {
                let DType::Vector { scalar, count } = dtype else {
                    return Err(format!("{dtype} is not a vector type").into());
                };
                let mut lanes = Vec::with_capacity(*count);
                for element in elements {
                    match self.eval(frame, element)?.data()? {
                        Value::Vector(_, components) => lanes.extend(components),
                        scalar => lanes.push(scalar),
                    }
                }
                if lanes.len() == 1 {
                    lanes = vec![lanes[0].clone(); *count];
                }
                if lanes.len() != *count {
                    return Err(format!("{dtype} literal with {} components", lanes.len()).into());
                }
                let lanes = lanes.iter().map(|l| value::cast_scalar(l, *scalar)).collect::<Result<_, _>>()?;
                Val::Data(Value::Vector(*scalar, lanes))
            }
            ExprKind::StructLit(dtype, elements) => {
                let DType::Struct(s) = dtype else {
                    return Err(format!("{dtype} is not a struct type").into());
                };
                if elements.len() != s.fields.len() {
                    return Err(format!("{} has {} fields, {} given", s.name, s.fields.len(), elements.len()).into());
                }
                let mut fields = Vec::with_capacity(elements.len());
                for (field, element) in s.fields.iter().zip(elements) {
                    fields.push(convert(&self.eval(frame, element)?.data()?, &field.dtype)?);
                }
                Val::Data(Value::Struct(Arc::clone(s), fields))
            }
            ExprKind::Call(index, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                self.call(*index, values)?
            }
            ExprKind::Builtin(builtin, args) => self.builtin(frame, builtin, args)?,
            ExprKind::AddrOf(operand) => match self.place(frame, operand)? {
                Place::Mem(ptr) => Val::Ptr(ptr),
                _ => return Err("address of a private scalar is not supported".to_string().into()),
            },
        })
    }

    fn place(&self, frame: &mut [Val], expr: &Expr) -> Result<Place> {
        match &expr.kind {
            ExprKind::Local(slot) => Ok(Place::Slot { slot: *slot, path: Vec::new() }),
            ExprKind::Index(base, index) => {
                let ptr = self.pointer(frame, base)?;
                let index = as_i64(&self.eval(frame, index)?.data()?)?;
                Ok(Place::Mem(ptr.offset_by(index)))
            }
            ExprKind::Deref(operand) => Ok(Place::Mem(self.pointer(frame, operand)?)),
            ExprKind::Arrow(base, selector) => {
                let ptr = self.pointer(frame, base)?;
                self.member_place(frame, Place::Mem(ptr), selector).map_err(|e| Fault::at(expr.pos, e))
            }
            ExprKind::Member(base, selector) => {
                let place = self.place(frame, base)?;
                self.member_place(frame, place, selector).map_err(|e| Fault::at(expr.pos, e))
            }
            _ => Err(Fault::at(expr.pos, "expression is not assignable")),
        }
    }

    fn member_place(&self, frame: &mut [Val], place: Place, selector: &Selector) -> Result<Place, String> {
        match place {
            Place::Slot { slot, mut path } => {
                let current = follow_path(&frame[slot].clone().data()?, &path)?;
                match &current {
                    Value::Struct(s, _) => match s.field(&selector.name) {
                        Some((index, _)) => path.push(Step::Field(index)),
                        None => return Err(format!("no member named '{}' in {}", selector.name, s.name)),
                    },
                    Value::Vector(_, components) => path.push(Step::Lanes(select_lanes(selector, components.len())?)),
                    _ => path.push(Step::Lanes(select_lanes(selector, 1)?)),
                }
                Ok(Place::Slot { slot, path })
            }
            Place::Mem(ptr) => match &ptr.elem {
                DType::Struct(s) => match s.field(&selector.name) {
                    Some((index, field)) => Ok(Place::Mem(Pointer {
                        offset: ptr.offset + s.offset_of(index) as isize,
                        elem: field.dtype.clone(),
                        ..ptr.clone()
                    })),
                    None => Err(format!("no member named '{}' in {}", selector.name, s.name)),
                },
                elem => {
                    let lanes = select_lanes(selector, elem.lanes())?;
                    Ok(Place::MemLanes(ptr, lanes))
                }
            },
            Place::MemLanes(ptr, lanes) => {
                let inner = select_lanes(selector, lanes.len())?;
                let composed = inner.iter().map(|&i| lanes[i as usize]).collect();
                Ok(Place::MemLanes(ptr, composed))
            }
        }
    }

    fn read(&self, frame: &[Val], place: &Place) -> Result<Val> {
        Ok(match place {
            Place::Slot { slot, path } if path.is_empty() => frame[*slot].clone(),
            Place::Slot { slot, path } => Val::Data(follow_path(&frame[*slot].clone().data()?, path)?),
            Place::Mem(ptr) => Val::Data(ptr.load()?),
            Place::MemLanes(ptr, lanes) => Val::Data(pick_lanes(&ptr.load()?, lanes)?),
        })
    }

    fn write(&self, frame: &mut [Val], place: &Place, new: Val) -> Result<()> {
        match place {
            Place::Slot { slot, path } => {
                let slot = &mut frame[*slot];
                match slot {
                    Val::Data(current) => set_path(current, path, &new.data()?)?,
                    other if path.is_empty() => {
                        let replacement = match (&*other, new) {
                            (Val::Ptr(old), Val::Ptr(ptr)) => Val::Ptr(Pointer { elem: old.elem.clone(), ..ptr }),
                            (_, new) => new,
                        };
                        *other = replacement;
                    }
                    other => return Err(format!("member access on {}", other.describe()).into()),
                }
            }
            Place::Mem(ptr) => ptr.store(&convert(&new.data()?, &ptr.elem)?)?,
            Place::MemLanes(ptr, lanes) => {
                let mut current = ptr.load()?;
                assign_lanes(&mut current, lanes, &new.data()?)?;
                ptr.store(&current)?;
            }
        }
        Ok(())
    }

    fn dimension(&self, frame: &mut [Val], args: &[Expr], of: [usize; 3], beyond: usize) -> Result<Val> {
        let dim = as_u64(&self.eval(frame, &args[0])?.data()?)? as usize;
        let v = if dim < 3 { of[dim] } else { beyond };
        Ok(Val::Data(Value::UInt(ScalarType::ULong, v as u64)))
    }

    fn builtin(&self, frame: &mut [Val], builtin: &Builtin, args: &[Expr]) -> Result<Val> {
        let item = &self.item;
        let func = match builtin {
            Builtin::Func(func) => *func,
            Builtin::Convert { to, saturate, rounding } => {
                let v = self.eval(frame, &args[0])?.data()?;
                return Ok(Val::Data(builtins::convert(&v, to, *saturate, *rounding)?));
            }
            Builtin::As(to) => {
                let v = self.eval(frame, &args[0])?.data()?;
                return Ok(Val::Data(builtins::reinterpret(&v, to)?));
            }
        };
        match func {
            Func::GetGlobalId => self.dimension(frame, args, item.global_id, 0),
            Func::GetLocalId => self.dimension(frame, args, item.local_id, 0),
            Func::GetGroupId => self.dimension(frame, args, item.group_id, 0),
            Func::GetGlobalSize => self.dimension(frame, args, item.global_size, 1),
            Func::GetLocalSize => self.dimension(frame, args, item.local_size, 1),
            Func::GetGlobalOffset => self.dimension(frame, args, item.global_offset, 0),
            Func::GetNumGroups => {
                let groups = std::array::from_fn(|d| item.global_size[d] / item.local_size[d].max(1));
                self.dimension(frame, args, groups, 1)
            }
            Func::GetWorkDim => Ok(Val::Data(Value::UInt(ScalarType::UInt, item.dims as u64))),
            Func::Barrier => {
                if let Some(barrier) = item.barrier {
                    barrier.wait()?;
                }
                Ok(Val::Void)
            }
            Func::MemFence | Func::ReadMemFence | Func::WriteMemFence => Ok(Val::Void),
            Func::ReadImagef | Func::ReadImageui | Func::ReadImagei => {
                let Val::Image(image) = self.eval(frame, &args[0])? else {
                    return Err(Fault::at(args[0].pos, "expected an image"));
                };
                let sampler = match self.eval(frame, &args[1])? {
                    Val::Sampler(flags) => flags,
                    other => as_u64(&other.data()?)? as u32,
                };
                let coord = self.eval(frame, &args[2])?.data()?;
                Ok(Val::Data(builtins::read_image(func, &image, sampler, &coord)?))
            }
            Func::GetImageWidth | Func::GetImageHeight => {
                let Val::Image(image) = self.eval(frame, &args[0])? else {
                    return Err(Fault::at(args[0].pos, "expected an image"));
                };
                let v = if func == Func::GetImageWidth { image.width } else { image.height };
                Ok(Val::Data(Value::Int(ScalarType::Int, v as i64)))
            }
            atomic if atomic.is_atomic() => {
                let ptr = self.pointer(frame, &args[0])?;
                let mut operands = Vec::with_capacity(args.len() - 1);
                for arg in &args[1..] {
                    operands.push(self.eval(frame, arg)?.data()?);
                }
                Ok(Val::Data(builtins::atomic(atomic, &ptr, &operands)?))
            }
            math => {
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    operands.push(self.eval(frame, arg)?.data()?);
                }
                Ok(Val::Data(builtins::math(math, &operands)?))
            }
        }
    }
}
