//! SpirvAtomic: resolves atomic stubs left by the SPIR-V ingestion stage.
//!
//! SPIR-V ingestion cannot pass references to functions, so it emits each
//! atomic operation as a call to a stub function taking the atomic object
//! by value. This transform rewrites every such call into the real atomic
//! builtin applied to the object's address, then makes every variable and
//! struct member that feeds one of those calls atomic:
//!
//! 1. stub calls become builtin calls; the stub declarations are removed
//! 2. no stubs means `Skip`
//! 3. atomic-ness propagates from each first argument back to its roots
//! 4. each struct with a touched member is forked; the original stays
//! 5. reached variables get their atomic (or forked) type
//! 6. remaining plain reads and writes become `atomicLoad`/`atomicStore`

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::builtin::BuiltinFn;
use crate::diagnostic::{Diagnostic, System};
use crate::program::{CallTarget, CloneContext, Expr, ExprId, FnId, GlobalDecl, Program, Sem, Stmt, StmtId, UnaryOp, VarId};
use crate::types::{ArrayCount, Type, TypeId};

use super::{Applied, ApplyResult, DataMap, Transform};

#[cfg(test)]
mod tests;

pub const OVERRIDE_COUNT_UNSUPPORTED: &str =
    "the SpirvAtomic transform does not currently support array counts that use override values";

#[derive(Clone, Copy, Debug, Default)]
pub struct SpirvAtomic;

impl Transform for SpirvAtomic {
    fn name(&self) -> &'static str {
        "SpirvAtomic"
    }

    fn apply(&self, input: &Program, _inputs: &DataMap, _outputs: &mut DataMap) -> ApplyResult<Program> {
        let stubs: Vec<(FnId, BuiltinFn)> = input
            .functions()
            .filter_map(|f| input.function(f).atomic_stub().map(|b| (f, b)))
            .collect();
        if stubs.is_empty() {
            return Ok(Applied::Skip);
        }

        let sem = Sem::analyze(input)?;
        let mut state = State::new(input, &sem, &stubs);
        state.replace_stubs(&stubs)?;
        state.propagate();
        state.fork_structs();
        state.retype_variables();
        state.rewrite_uses();

        let (output, diagnostics) = state.ctx.finish();
        Ok(Applied::Changed { output, diagnostics })
    }
}

struct State<'a> {
    program: &'a Program,
    sem: &'a Sem,
    ctx: CloneContext<'a>,
    stubs: HashSet<FnId>,
    work_list: VecDeque<ExprId>,
    visited: HashSet<ExprId>,
    /// Variables reached by propagation, in discovery order.
    reached: Vec<VarId>,
    reached_set: HashSet<VarId>,
    /// Source struct → indices of members that become atomic.
    forked_members: HashMap<TypeId, BTreeSet<usize>>,
    fork_order: Vec<TypeId>,
    /// Source struct → its fork in the destination registry.
    forks: HashMap<TypeId, TypeId>,
}

impl<'a> State<'a> {
    fn new(program: &'a Program, sem: &'a Sem, stubs: &[(FnId, BuiltinFn)]) -> Self {
        Self {
            program,
            sem,
            ctx: CloneContext::new(program, sem),
            stubs: stubs.iter().map(|(f, _)| *f).collect(),
            work_list: VecDeque::new(),
            visited: HashSet::new(),
            reached: Vec::new(),
            reached_set: HashSet::new(),
            forked_members: HashMap::new(),
            fork_order: Vec::new(),
            forks: HashMap::new(),
        }
    }

    // ── Step 1: stub calls ──

    fn replace_stubs(&mut self, stubs: &[(FnId, BuiltinFn)]) -> Result<(), Vec<Diagnostic>> {
        let program = self.program;
        let sem = self.sem;
        for &(stub, builtin) in stubs {
            for site in sem.call_sites(stub) {
                // Calls inside other stubs go away with them.
                if self.stubs.contains(&site.caller) {
                    continue;
                }
                let Expr::Call { args, .. } = program.expr(site.call) else {
                    continue;
                };
                let Some((&object, rest)) = args.split_first() else {
                    return Err(vec![Diagnostic::error(
                        System::Transform,
                        format!("call to atomic stub '{}' has no arguments", program.function(stub).name),
                    )]);
                };
                let rest = rest.to_vec();
                self.work_list.push_back(object);

                if builtin == BuiltinFn::AtomicCompareExchangeWeak {
                    self.replace_compare_exchange(site.call, site.stmt, object, rest);
                } else {
                    self.ctx
                        .replace_expr(site.call, move |ctx| atomic_call(ctx, builtin, object, &rest));
                }
            }
            self.ctx.remove(GlobalDecl::Function(stub));
        }
        Ok(())
    }

    /// The builtin returns a result struct, so its call moves into a `let`
    /// ahead of the statement and the stub call reads `old_value` from it.
    fn replace_compare_exchange(&mut self, call: ExprId, stmt: StmtId, object: ExprId, rest: Vec<ExprId>) {
        let slot: Rc<Cell<Option<VarId>>> = Rc::new(Cell::new(None));
        let declared = Rc::clone(&slot);
        self.ctx.insert_before(stmt, move |ctx| {
            let result = atomic_call(ctx, BuiltinFn::AtomicCompareExchangeWeak, object, &rest);
            let old_value = ctx.dst.member(result, "old_value");
            let name = ctx.dst.symbols().fresh("old_value");
            let var = ctx.dst.let_(name, None, old_value);
            declared.set(Some(var));
            ctx.dst.decl(var)
        });
        self.ctx.replace_expr(call, move |ctx| match slot.get() {
            Some(var) => ctx.dst.ident(var),
            None => {
                ctx.diagnostics.push(Diagnostic::internal(
                    System::Transform,
                    "compare-exchange result used before its declaration was cloned",
                ));
                ctx.clone_expr_without_transform(call)
            }
        });
    }

    // ── Step 3: propagation ──

    fn propagate(&mut self) {
        let program = self.program;
        let sem = self.sem;
        while let Some(expr) = self.work_list.pop_front() {
            if !self.visited.insert(expr) {
                continue;
            }
            match program.expr(expr) {
                Expr::Ident(v) => {
                    if self.reached_set.insert(*v) {
                        self.reached.push(*v);
                        if let Some(init) = program.var(*v).initializer {
                            self.work_list.push_back(init);
                        }
                    }
                }
                Expr::Member { object, .. } => {
                    if let Some((s, index)) = sem.struct_member(expr) {
                        if !self.forked_members.contains_key(&s) {
                            self.fork_order.push(s);
                        }
                        self.forked_members.entry(s).or_default().insert(index);
                    }
                    self.work_list.push_back(*object);
                }
                Expr::Index { object, .. } => self.work_list.push_back(*object),
                Expr::Unary {
                    op: UnaryOp::AddressOf | UnaryOp::Indirection,
                    expr: operand,
                } => self.work_list.push_back(*operand),
                _ => {}
            }
        }
    }

    // ── Steps 4 and 5: types ──

    fn fork_structs(&mut self) {
        for s in self.fork_order.clone() {
            self.fork(s);
        }
    }

    fn fork(&mut self, s: TypeId) -> TypeId {
        if let Some(fork) = self.forks.get(&s) {
            return *fork;
        }
        let sem = self.sem;
        let Some(st) = sem.types().as_struct(s) else {
            self.ctx.diagnostics.push(Diagnostic::internal(
                System::Transform,
                format!("cannot fork non-struct type '{}'", sem.types().friendly_name(s)),
            ));
            return self.ctx.clone_type(s);
        };
        let marked = self.forked_members.get(&s).cloned().unwrap_or_default();
        let mut members = Vec::with_capacity(st.members.len());
        for (i, member) in st.members.iter().enumerate() {
            let ty = if marked.contains(&i) {
                self.atomic_type(member.ty)
            } else {
                self.ctx.clone_type(member.ty)
            };
            members.push((member.name.clone(), ty));
        }
        let name = self.ctx.dst.symbols().fresh(&format!("{}_atomic", st.name));
        let fork = self.ctx.dst.types().structure(name, members);
        self.ctx.declare_struct_before(s, fork);
        self.forks.insert(s, fork);
        fork
    }

    /// The destination type a value of source type `ty` takes once atomic.
    fn atomic_type(&mut self, ty: TypeId) -> TypeId {
        let sem = self.sem;
        match &sem.types()[ty] {
            Type::I32 | Type::U32 => {
                let inner = self.ctx.clone_type(ty);
                self.ctx.dst.types().atomic(inner)
            }
            Type::Atomic { .. } => self.ctx.clone_type(ty),
            Type::Struct(_) => self.fork(ty),
            Type::Array { elem, count } => {
                let elem = self.atomic_type(*elem);
                let count = match count {
                    ArrayCount::Override(_) => {
                        self.ctx
                            .diagnostics
                            .push(Diagnostic::error(System::Transform, OVERRIDE_COUNT_UNSUPPORTED));
                        ArrayCount::Constant(1)
                    }
                    other => other.clone(),
                };
                self.ctx.dst.types().array(elem, count)
            }
            Type::Pointer {
                space,
                access,
                store,
            } => {
                let (space, access) = (*space, *access);
                let store = self.atomic_type(*store);
                self.ctx.dst.types().pointer(space, store, access)
            }
            _ => {
                self.ctx.diagnostics.push(Diagnostic::internal(
                    System::Transform,
                    format!("cannot make a value of type '{}' atomic", sem.types().friendly_name(ty)),
                ));
                self.ctx.clone_type(ty)
            }
        }
    }

    /// Variables without a declared type pick theirs up from the rewritten initializer.
    fn retype_variables(&mut self) {
        let program = self.program;
        for v in self.reached.clone() {
            if let Some(ty) = program.var(v).ty {
                let atomic = self.atomic_type(ty);
                self.ctx.set_var_type(v, atomic);
            }
        }
    }

    // ── Step 6: plain loads and stores ──

    fn rewrite_uses(&mut self) {
        let program = self.program;
        for f in program.functions() {
            if self.stubs.contains(&f) {
                continue;
            }
            for s in &program.function(f).body {
                self.stmt(*s);
            }
        }
    }

    fn stmt(&mut self, id: StmtId) {
        let program = self.program;
        match program.stmt(id) {
            Stmt::Decl(v) => {
                if let Some(init) = program.var(*v).initializer {
                    self.reads(init);
                }
            }
            Stmt::Assign { lhs, rhs } => {
                let (lhs, rhs) = (*lhs, *rhs);
                self.reads(rhs);
                self.reference_operands(lhs);
                if self.is_atomic_scalar(lhs) {
                    self.ctx.replace_stmt(id, move |ctx| {
                        let pointer = pointer_to(ctx, lhs);
                        let value = ctx.clone_expr(rhs);
                        let call = ctx.dst.call_builtin(BuiltinFn::AtomicStore, vec![pointer, value]);
                        Some(ctx.dst.call_stmt(call))
                    });
                }
            }
            Stmt::Call(e) => self.reads(*e),
            Stmt::Return(v) => {
                if let Some(v) = v {
                    self.reads(*v);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.stmt(*s);
                }
            }
        }
    }

    /// Register loads for every maximal atomic read inside a value expression.
    fn reads(&mut self, expr: ExprId) {
        if self.is_atomic_scalar(expr) {
            self.ctx.replace_expr(expr, move |ctx| {
                let pointer = pointer_to(ctx, expr);
                ctx.dst.call_builtin(BuiltinFn::AtomicLoad, vec![pointer])
            });
            self.reference_operands(expr);
            return;
        }
        let program = self.program;
        match program.expr(expr) {
            Expr::Literal(_) | Expr::Ident(_) => {}
            Expr::Member { object, .. } => self.reads(*object),
            Expr::Index { object, index } => {
                self.reads(*object);
                self.reads(*index);
            }
            Expr::Unary {
                op: UnaryOp::AddressOf,
                expr: operand,
            } => self.reference_operands(*operand),
            Expr::Unary { expr: operand, .. } => self.reads(*operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.reads(*lhs);
                self.reads(*rhs);
            }
            Expr::Call { target, args } => {
                let takes_pointer = match target {
                    CallTarget::Builtin(b) => b.is_atomic(),
                    CallTarget::Function(f) => self.stubs.contains(f),
                };
                for (i, arg) in args.iter().enumerate() {
                    if takes_pointer && i == 0 {
                        self.reference_operands(*arg);
                    } else {
                        self.reads(*arg);
                    }
                }
            }
        }
    }

    /// A reference that is not itself loaded still reads its index values.
    fn reference_operands(&mut self, expr: ExprId) {
        let program = self.program;
        match program.expr(expr) {
            Expr::Member { object, .. } => self.reference_operands(*object),
            Expr::Index { object, index } => {
                self.reference_operands(*object);
                self.reads(*index);
            }
            Expr::Unary {
                op: UnaryOp::AddressOf,
                expr: operand,
            } => self.reference_operands(*operand),
            Expr::Unary {
                op: UnaryOp::Indirection,
                expr: operand,
            } => self.reads(*operand),
            _ => {}
        }
    }

    /// True if `expr` is a reference to an `i32`/`u32` that becomes atomic.
    fn is_atomic_scalar(&self, expr: ExprId) -> bool {
        let sem = self.sem;
        sem.is_reference(expr)
            && matches!(sem.types()[sem.type_of(expr)], Type::I32 | Type::U32)
            && self.becomes_atomic(expr)
    }

    fn becomes_atomic(&self, expr: ExprId) -> bool {
        match self.program.expr(expr) {
            Expr::Ident(v) => self.reached_set.contains(v),
            Expr::Member { object, .. } => {
                let marked = self.sem.struct_member(expr).is_some_and(|(s, index)| {
                    self.forked_members
                        .get(&s)
                        .is_some_and(|members| members.contains(&index))
                });
                marked && self.becomes_atomic(*object)
            }
            Expr::Index { object, .. } => self.becomes_atomic(*object),
            Expr::Unary {
                op: UnaryOp::AddressOf | UnaryOp::Indirection,
                expr: operand,
            } => self.becomes_atomic(*operand),
            _ => false,
        }
    }
}

// ─── Clone-time helpers ───────────────────────────────────────────

fn atomic_call(ctx: &mut CloneContext<'_>, builtin: BuiltinFn, object: ExprId, rest: &[ExprId]) -> ExprId {
    let mut args = Vec::with_capacity(rest.len() + 1);
    args.push(pointer_to(ctx, object));
    for arg in rest {
        args.push(ctx.clone_expr(*arg));
    }
    ctx.dst.call_builtin(builtin, args)
}

/// `&e`, or `p` when `e` is `*p`.
fn pointer_to(ctx: &mut CloneContext<'_>, reference: ExprId) -> ExprId {
    let program = ctx.src;
    match program.expr(reference) {
        Expr::Unary {
            op: UnaryOp::Indirection,
            expr,
        } => ctx.clone_expr(*expr),
        _ => {
            let cloned = ctx.clone_expr_without_transform(reference);
            ctx.dst.address_of(cloned)
        }
    }
}
