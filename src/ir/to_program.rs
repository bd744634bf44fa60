//! Raising: IR module → program.
//!
//! The inverse of `from_program`, for feeding a transformed module back
//! to anything that consumes programs. Pointers become references again:
//! a `Var` is a `var` declaration, a pointer `Access` is a member or index
//! chain on it, and loads and stores read and assign through that chain.
//! Values used once are inlined into their user under the same rules the
//! printer uses, so a load never moves across a store or a call.
//!
//! Programs have no conditional statement. An `If` on a constant `true`
//! raises to a nested block, and the guarded assignment `from_program`
//! emits for a short-circuit `&&` / `||` raises back to the operator.
//! Any other `If` is reported.

use std::collections::{HashMap, HashSet};

use crate::diagnostic::{Diagnostic, System};
use crate::program::{
    Attribute, BinaryOp, Expr, ExprId, FnId, GlobalDecl, Literal, Program, ProgramBuilder, Stmt,
    StmtId, UnaryOp, VarId,
};
use crate::types::Type;

use super::*;

/// Raise a module into a fresh program.
pub fn build(module: &Module) -> Result<Program, Vec<Diagnostic>> {
    validator::validate(module)?;
    let mut p = ProgramBuilder::new();
    *p.types() = module.types.clone();
    let mut raise = Raising {
        module,
        p,
        functions: HashMap::new(),
        module_scope: Scope::default(),
        scope: Scope::default(),
        out: Vec::new(),
        errors: Vec::new(),
    };
    raise.module();
    if raise.errors.is_empty() {
        Ok(raise.p.build())
    } else {
        Err(raise.errors)
    }
}

/// Where a pointer value points, rebuilt into a fresh expression at each use.
#[derive(Clone, Debug)]
enum Reference {
    /// A declared `var`.
    Var(VarId),
    /// A `let` or parameter holding a pointer.
    Deref(VarId),
    /// A member or index chain below another reference.
    Access { base: Box<Reference>, steps: Vec<Step> },
}

#[derive(Clone, Debug)]
enum Step {
    Member(String),
    Index(Index),
}

/// Index operands are pinned so a rebuilt chain never repeats a computation.
#[derive(Clone, Copy, Debug)]
enum Index {
    Literal(Literal),
    Var(VarId),
}

const SWIZZLE: [&str; 4] = ["x", "y", "z", "w"];

struct Pending {
    value: ValueId,
    expr: ExprId,
    has_call: bool,
}

#[derive(Default)]
struct Scope {
    refs: HashMap<ValueId, Reference>,
    /// Non-pointer values held by a `let` or parameter.
    names: HashMap<ValueId, VarId>,
    taken: HashSet<String>,
    uses: HashMap<ValueId, usize>,
    pending: Vec<Pending>,
    consumed_call: bool,
}

impl Scope {
    fn for_function(&self) -> Scope {
        Scope {
            refs: self.refs.clone(),
            names: self.names.clone(),
            taken: self.taken.clone(),
            ..Scope::default()
        }
    }
}

struct Raising<'m> {
    module: &'m Module,
    p: ProgramBuilder,
    functions: HashMap<FunctionId, FnId>,
    module_scope: Scope,
    scope: Scope,
    /// Statements of the block being raised.
    out: Vec<StmtId>,
    errors: Vec<Diagnostic>,
}

type Raised<T> = Result<T, Diagnostic>;

impl Raising<'_> {
    fn module(&mut self) {
        let module = self.module;
        for s in self.used_structs() {
            if let Some(st) = module.types.as_struct(s) {
                self.scope.taken.insert(st.name.clone());
                self.p.symbols().register(&st.name);
            }
            self.p.push_global(GlobalDecl::Struct(s));
        }
        for f in module.functions() {
            let function = module.function(f);
            self.scope.taken.insert(function.name.clone());
            let id = self.p.reserve_function(&function.name, function.return_type);
            self.functions.insert(f, id);
        }
        for id in &module.block(module.root_block()).instructions {
            if let Err(e) = self.global(*id) {
                self.errors.push(e);
            }
        }
        self.module_scope = std::mem::take(&mut self.scope);

        for f in module.functions() {
            match self.function(f) {
                Ok(()) => self.p.push_global(GlobalDecl::Function(self.functions[&f])),
                Err(e) => self.errors.push(e.with_note(format!(
                    "while raising '{}'",
                    module.function(f).name
                ))),
            }
        }
    }

    /// Struct types reachable from any value, in interning order.
    fn used_structs(&self) -> Vec<TypeId> {
        let types = &self.module.types;
        let mut seen = HashSet::new();
        let mut work: Vec<TypeId> = self.module.values.iter().map(|v| v.ty()).collect();
        work.extend(self.module.functions.iter().map(|f| f.return_type));
        while let Some(ty) = work.pop() {
            if !seen.insert(ty) {
                continue;
            }
            match &types[ty] {
                Type::Pointer { store, .. } => work.push(*store),
                Type::Atomic { inner } => work.push(*inner),
                Type::Array { elem, .. } | Type::Vector { elem, .. } | Type::Matrix { elem, .. } => {
                    work.push(*elem)
                }
                Type::Struct(s) => work.extend(s.members.iter().map(|m| m.ty)),
                _ => {}
            }
        }
        types
            .iter()
            .filter(|(id, t)| {
                seen.contains(id) && matches!(t, Type::Struct(s) if !s.name.starts_with("__"))
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn global(&mut self, id: InstId) -> Raised<()> {
        let module = self.module;
        let inst = module.inst(id);
        let InstKind::Var { binding } = inst.kind else {
            return Err(Diagnostic::internal(
                System::Ir,
                format!("'{}' at module scope", inst.kind.name()),
            ));
        };
        let ptr = result_of(inst)?;
        let Type::Pointer { space, access, store } = module.types[module.type_of(ptr)] else {
            return Err(Diagnostic::internal(System::Ir, "var result is not a pointer"));
        };
        let init = match inst.operands.first() {
            Some(v) => Some(self.constant(*v)?),
            None => None,
        };
        let name = self.fresh_name(ptr);
        let access = (access != space.default_access()).then_some(access);
        let var = match binding {
            Some(binding) => self.p.resource(name, space, store, access, binding),
            None => self.p.global_var(name, space, store, init),
        };
        self.scope.refs.insert(ptr, Reference::Var(var));
        Ok(())
    }

    // ── Functions ──

    fn function(&mut self, f: FunctionId) -> Raised<()> {
        let module = self.module;
        let function = module.function(f);
        self.scope = self.module_scope.for_function();

        let uses = &mut self.scope.uses;
        module.walk_block(function.block, &mut |inst| {
            for op in &inst.operands {
                *uses.entry(*op).or_insert(0) += 1;
            }
        });

        let mut params = Vec::with_capacity(function.params.len());
        for (value, builtin) in function.params.iter().zip(&function.param_builtins) {
            let name = self.fresh_name(*value);
            let ty = module.type_of(*value);
            let var = match builtin {
                Some(b) => self.p.builtin_param(name, ty, *b),
                None => self.p.param(name, ty),
            };
            if self.is_pointer(*value) {
                self.scope.refs.insert(*value, Reference::Deref(var));
            } else {
                self.scope.names.insert(*value, var);
            }
            params.push(var);
        }

        let mut attributes = Vec::new();
        if let Some(stage) = function.stage {
            attributes.push(Attribute::Stage(stage));
        }
        if let Some([x, y, z]) = function.workgroup_size {
            attributes.push(Attribute::WorkgroupSize(x, y, z));
        }

        let body = self.block(function.block, true)?;
        let target = self.p.function_mut(self.functions[&f]);
        target.params = params;
        target.body = body;
        target.attributes = attributes;
        Ok(())
    }

    /// Raise a block into its own statement list.
    fn block(&mut self, block: BlockId, function_level: bool) -> Raised<Vec<StmtId>> {
        let module = self.module;
        let outer = std::mem::take(&mut self.out);
        let insts = &module.block(block).instructions;
        let raised = insts.iter().enumerate().try_for_each(|(i, id)| {
            let next = insts.get(i + 1).copied();
            self.inst(*id, next, function_level && next.is_none())
        });
        let raised = raised.and_then(|()| self.flush());
        let stmts = std::mem::replace(&mut self.out, outer);
        raised.map(|()| stmts)
    }

    fn inst(&mut self, id: InstId, next: Option<InstId>, function_end: bool) -> Raised<()> {
        let module = self.module;
        let types = &module.types;
        let inst = module.inst(id);
        self.scope.consumed_call = false;
        match &inst.kind {
            InstKind::Var { .. } => {
                let ptr = result_of(inst)?;
                let store = types
                    .store_type(module.type_of(ptr))
                    .ok_or_else(|| Diagnostic::internal(System::Ir, "var result is not a pointer"))?;
                let init = match inst.operands.first() {
                    Some(v) => Some(self.value(*v)?),
                    None => None,
                };
                self.flush()?;
                let name = self.fresh_name(ptr);
                let var = self.p.var(name, Some(store), init);
                let stmt = self.p.decl(var);
                self.out.push(stmt);
                self.scope.refs.insert(ptr, Reference::Var(var));
            }
            InstKind::Let => {
                let result = result_of(inst)?;
                let value = operand(inst, 0)?;
                if self.is_pointer(value) {
                    let reference = self.reference(value)?;
                    self.scope.refs.insert(result, reference);
                    return Ok(());
                }
                let expr = self.value(value)?;
                self.flush()?;
                self.emit_let(result, expr);
            }
            InstKind::Load => {
                let place = self.place(operand(inst, 0)?)?;
                self.define(inst, place, next)?;
            }
            InstKind::Store => {
                let lhs = self.place(operand(inst, 0)?)?;
                let rhs = self.value(operand(inst, 1)?)?;
                self.flush()?;
                let stmt = self.p.assign(lhs, rhs);
                self.out.push(stmt);
            }
            InstKind::Access => {
                let base = operand(inst, 0)?;
                let result = result_of(inst)?;
                if self.is_pointer(base) {
                    let mut current = types.store_type(module.type_of(base));
                    let mut steps = Vec::with_capacity(inst.operands.len() - 1);
                    for index in &inst.operands[1..] {
                        let (step, ty) = self.step(current, *index)?;
                        steps.push(step);
                        current = ty;
                    }
                    let base = Box::new(self.reference(base)?);
                    self.scope.refs.insert(result, Reference::Access { base, steps });
                } else {
                    let mut current = Some(module.type_of(base));
                    let mut expr = self.value(base)?;
                    for index in &inst.operands[1..] {
                        let (step, ty) = self.step(current, *index)?;
                        expr = self.apply(expr, &step);
                        current = ty;
                    }
                    self.define(inst, expr, next)?;
                }
            }
            InstKind::Binary(kind) => {
                let lhs = self.value(operand(inst, 0)?)?;
                let rhs = self.value(operand(inst, 1)?)?;
                let expr = self.p.binary(binary_op(*kind), lhs, rhs);
                self.define(inst, expr, next)?;
            }
            InstKind::Unary(kind) => {
                let op = match kind {
                    UnaryKind::Negation => UnaryOp::Negation,
                    UnaryKind::Complement => UnaryOp::Complement,
                    UnaryKind::Not => UnaryOp::Not,
                };
                let operand = self.value(operand(inst, 0)?)?;
                let expr = self.p.unary(op, operand);
                self.define(inst, expr, next)?;
            }
            InstKind::UserCall(callee) => {
                let args = self.args(inst)?;
                let target = self.functions.get(callee).copied().ok_or_else(|| {
                    Diagnostic::internal(System::Ir, "call to an undeclared function")
                })?;
                let expr = self.p.call(target, args);
                self.call(inst, expr, next)?;
            }
            InstKind::BuiltinCall(builtin) => {
                let args = self.args(inst)?;
                let expr = self.p.call_builtin(*builtin, args);
                self.call(inst, expr, next)?;
            }
            InstKind::If {
                true_block,
                false_block: None,
            } if inst
                .operands
                .first()
                .is_some_and(|c| module.value(*c).as_constant() == Some(Constant::Bool(true))) =>
            {
                self.flush()?;
                let stmts = self.block(*true_block, false)?;
                let stmt = self.p.block(stmts);
                self.out.push(stmt);
            }
            InstKind::If {
                true_block,
                false_block: None,
            } => self.short_circuit(operand(inst, 0)?, *true_block)?,
            InstKind::If { .. } => {
                return Err(Diagnostic::error(
                    System::Ir,
                    "an 'if' with an else block has no program form",
                ))
            }
            InstKind::ExitIf | InstKind::Unreachable => self.flush()?,
            InstKind::Return => {
                let value = match inst.operands.first() {
                    Some(v) => Some(self.value(*v)?),
                    None => None,
                };
                self.flush()?;
                if value.is_some() || !function_end {
                    let stmt = self.p.ret(value);
                    self.out.push(stmt);
                }
            }
        }
        Ok(())
    }

    /// `if (t) { t = rhs; }` back to `t = t && rhs`, and the negated
    /// condition back to `||`.
    fn short_circuit(&mut self, cond: ValueId, then: BlockId) -> Raised<()> {
        let module = self.module;
        let unsupported = || Diagnostic::error(System::Ir, "a conditional 'if' has no program form");
        let (and, load) = match module.defining_inst(cond).map(|i| module.inst(i)) {
            Some(i) if i.kind == InstKind::Unary(UnaryKind::Not) => {
                let negated = i.operands.first().copied().ok_or_else(unsupported)?;
                (false, module.defining_inst(negated).map(|i| module.inst(i)))
            }
            other => (true, other),
        };
        let flag = match load {
            Some(i) if i.kind == InstKind::Load => i.operands.first().copied().ok_or_else(unsupported)?,
            _ => return Err(unsupported()),
        };
        let Some(Reference::Var(var)) = self.scope.refs.get(&flag).cloned() else {
            return Err(unsupported());
        };
        // The condition is rebuilt from the flag below.
        self.scope.pending.retain(|p| p.value != cond);
        self.flush()?;

        let stmts = self.block(then, false)?;
        let rhs = match stmts.as_slice() {
            [only] => match self.p.stmts[only.index()] {
                Stmt::Assign { lhs, rhs } if self.p.exprs[lhs.index()] == Expr::Ident(var) => rhs,
                _ => return Err(unsupported()),
            },
            _ => return Err(unsupported()),
        };
        let current = self.p.ident(var);
        let op = if and { BinaryOp::LogicalAnd } else { BinaryOp::LogicalOr };
        let value = self.p.binary(op, current, rhs);
        let lhs = self.p.ident(var);
        let stmt = self.p.assign(lhs, value);
        self.out.push(stmt);
        Ok(())
    }

    // ── References ──

    fn reference(&self, pointer: ValueId) -> Raised<Reference> {
        self.scope.refs.get(&pointer).cloned().ok_or_else(|| {
            Diagnostic::internal(System::Ir, format!("{} does not point at raised memory", pointer))
        })
    }

    /// A fresh reference expression for the memory `pointer` points at.
    fn place(&mut self, pointer: ValueId) -> Raised<ExprId> {
        let reference = self.reference(pointer)?;
        Ok(self.rebuild(&reference))
    }

    fn rebuild(&mut self, reference: &Reference) -> ExprId {
        match reference {
            Reference::Var(v) => self.p.ident(*v),
            Reference::Deref(v) => {
                let pointer = self.p.ident(*v);
                self.p.deref(pointer)
            }
            Reference::Access { base, steps } => {
                let mut expr = self.rebuild(base);
                for step in steps {
                    expr = self.apply(expr, step);
                }
                expr
            }
        }
    }

    fn apply(&mut self, object: ExprId, step: &Step) -> ExprId {
        match step {
            Step::Member(name) => self.p.member(object, name.clone()),
            Step::Index(Index::Literal(lit)) => {
                let index = self.p.push_expr(Expr::Literal(*lit));
                self.p.index(object, index)
            }
            Step::Index(Index::Var(v)) => {
                let index = self.p.ident(*v);
                self.p.index(object, index)
            }
        }
    }

    /// One access index into a value of type `ty`, and the type it yields.
    fn step(&mut self, ty: Option<TypeId>, index: ValueId) -> Raised<(Step, Option<TypeId>)> {
        let module = self.module;
        let types = &module.types;
        let constant = module.value(index).as_constant();
        let Some(ty) = ty else {
            return Err(Diagnostic::internal(System::Ir, "access into an unknown type"));
        };
        match &types[ty] {
            Type::Struct(s) => {
                let member = constant
                    .and_then(|c| c.as_u64())
                    .and_then(|i| s.members.get(i as usize))
                    .ok_or_else(|| {
                        Diagnostic::internal(System::Ir, format!("invalid member index into '{}'", s.name))
                    })?;
                Ok((Step::Member(member.name.clone()), Some(member.ty)))
            }
            Type::Vector { elem, .. } => {
                let swizzle = constant
                    .and_then(|c| c.as_u64())
                    .and_then(|i| SWIZZLE.get(i as usize).copied());
                let step = match swizzle {
                    Some(name) => Step::Member(name.to_string()),
                    None => Step::Index(self.index(index)?),
                };
                Ok((step, Some(*elem)))
            }
            Type::Array { elem, .. } => Ok((Step::Index(self.index(index)?), Some(*elem))),
            Type::Matrix { rows, elem, .. } => Ok((
                Step::Index(self.index(index)?),
                types.find(&Type::Vector { elem: *elem, width: *rows }),
            )),
            _ => Err(Diagnostic::internal(
                System::Ir,
                format!("cannot index into '{}'", types.friendly_name(ty)),
            )),
        }
    }

    /// Pin an index operand to a literal or a named value.
    fn index(&mut self, index: ValueId) -> Raised<Index> {
        if let Some(c) = self.module.value(index).as_constant() {
            return Ok(Index::Literal(literal(c)));
        }
        if let Some(i) = self.scope.pending.iter().position(|p| p.value == index) {
            let pending = self.scope.pending.remove(i);
            self.emit_let(index, pending.expr);
        }
        self.scope.names.get(&index).map(|v| Index::Var(*v)).ok_or_else(|| {
            Diagnostic::internal(System::Ir, format!("{} used before it was raised", index))
        })
    }

    // ── Values ──

    /// Expression for a value; takes the pending expression if there is one.
    fn value(&mut self, value: ValueId) -> Raised<ExprId> {
        if let Some(i) = self.scope.pending.iter().position(|p| p.value == value) {
            let pending = self.scope.pending.remove(i);
            self.scope.consumed_call |= pending.has_call;
            return Ok(pending.expr);
        }
        if self.module.value(value).as_constant().is_some() {
            return self.constant(value);
        }
        if self.is_pointer(value) {
            return match self.reference(value)? {
                Reference::Deref(v) => Ok(self.p.ident(v)),
                reference => {
                    let place = self.rebuild(&reference);
                    Ok(self.p.address_of(place))
                }
            };
        }
        match self.scope.names.get(&value) {
            Some(v) => Ok(self.p.ident(*v)),
            None => Err(Diagnostic::internal(
                System::Ir,
                format!("{} used before it was raised", value),
            )),
        }
    }

    fn constant(&mut self, value: ValueId) -> Raised<ExprId> {
        let module = self.module;
        let Value::Constant { value: c, ty } = module.value(value) else {
            return Err(Diagnostic::internal(System::Ir, format!("{} is not a constant", value)));
        };
        if matches!(module.types[*ty], Type::Vector { .. }) {
            return Err(Diagnostic::error(
                System::Ir,
                format!("splatted '{}' constant has no program form", module.types.friendly_name(*ty)),
            ));
        }
        Ok(self.p.push_expr(Expr::Literal(literal(*c))))
    }

    fn args(&mut self, inst: &Instruction) -> Raised<Vec<ExprId>> {
        inst.operands.iter().map(|op| self.value(*op)).collect()
    }

    fn is_pointer(&self, value: ValueId) -> bool {
        matches!(self.module.types[self.module.type_of(value)], Type::Pointer { .. })
    }

    fn fresh_name(&mut self, value: ValueId) -> String {
        let base = match self.module.name(value) {
            Some(name) => name.to_string(),
            None => format!("v{}", value.index()),
        };
        let mut name = base.clone();
        let mut n = 1;
        while !self.scope.taken.insert(name.clone()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        name
    }

    fn feeds(&self, value: ValueId, next: Option<InstId>) -> bool {
        next.is_some_and(|n| self.module.inst(n).operands.contains(&value))
    }

    /// Record a side-effect-free result: inline it if it has one user.
    fn define(&mut self, inst: &Instruction, expr: ExprId, next: Option<InstId>) -> Raised<()> {
        let result = result_of(inst)?;
        let has_call = self.scope.consumed_call;
        let single_use = self.scope.uses.get(&result) == Some(&1);
        if single_use && (!has_call || self.feeds(result, next)) {
            self.scope.pending.push(Pending {
                value: result,
                expr,
                has_call,
            });
        } else {
            self.emit_let(result, expr);
        }
        Ok(())
    }

    fn call(&mut self, inst: &Instruction, expr: ExprId, next: Option<InstId>) -> Raised<()> {
        self.flush()?;
        let uses = inst
            .result
            .map_or(0, |r| self.scope.uses.get(&r).copied().unwrap_or(0));
        match inst.result {
            Some(r) if uses == 1 && self.feeds(r, next) => self.scope.pending.push(Pending {
                value: r,
                expr,
                has_call: true,
            }),
            Some(r) if uses > 0 => self.emit_let(r, expr),
            _ => {
                let stmt = self.p.call_stmt(expr);
                self.out.push(stmt);
            }
        }
        Ok(())
    }

    fn emit_let(&mut self, value: ValueId, expr: ExprId) {
        let name = self.fresh_name(value);
        let var = self.p.let_(name, None, expr);
        let stmt = self.p.decl(var);
        self.out.push(stmt);
        self.scope.names.insert(value, var);
    }

    /// Declare every pending value, in definition order.
    fn flush(&mut self) -> Raised<()> {
        for p in std::mem::take(&mut self.scope.pending) {
            self.emit_let(p.value, p.expr);
        }
        Ok(())
    }
}

fn result_of(inst: &Instruction) -> Raised<ValueId> {
    inst.result.ok_or_else(|| {
        Diagnostic::internal(System::Ir, format!("'{}' has no result", inst.kind.name()))
    })
}

fn operand(inst: &Instruction, i: usize) -> Raised<ValueId> {
    inst.operands.get(i).copied().ok_or_else(|| {
        Diagnostic::internal(
            System::Ir,
            format!("'{}' is missing operand {}", inst.kind.name(), i),
        )
    })
}

fn literal(c: Constant) -> Literal {
    match c {
        Constant::Bool(v) => Literal::Bool(v),
        Constant::I32(v) => Literal::I32(v),
        Constant::U32(v) => Literal::U32(v),
        Constant::F32(v) => Literal::F32(v),
        Constant::F16(v) => Literal::F16(v),
    }
}

fn binary_op(kind: BinaryKind) -> BinaryOp {
    match kind {
        BinaryKind::Add => BinaryOp::Add,
        BinaryKind::Subtract => BinaryOp::Subtract,
        BinaryKind::Multiply => BinaryOp::Multiply,
        BinaryKind::Divide => BinaryOp::Divide,
        BinaryKind::Modulo => BinaryOp::Modulo,
        BinaryKind::And => BinaryOp::And,
        BinaryKind::Or => BinaryOp::Or,
        BinaryKind::Xor => BinaryOp::Xor,
        BinaryKind::Equal => BinaryOp::Equal,
        BinaryKind::NotEqual => BinaryOp::NotEqual,
        BinaryKind::LessThan => BinaryOp::LessThan,
        BinaryKind::GreaterThan => BinaryOp::GreaterThan,
        BinaryKind::LessThanEqual => BinaryOp::LessThanEqual,
        BinaryKind::GreaterThanEqual => BinaryOp::GreaterThanEqual,
        BinaryKind::ShiftLeft => BinaryOp::ShiftLeft,
        BinaryKind::ShiftRight => BinaryOp::ShiftRight,
    }
}
