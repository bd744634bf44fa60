//! CloneContext: clone-and-rewrite from a source program into a new one.
//!
//! A transform registers replacements against nodes of the source program
//! (expressions, statements, variable types, removed declarations), then
//! calls `finish`, which walks the source module-scope declarations in
//! order and copies each node into a fresh `ProgramBuilder`, substituting
//! the registered replacement wherever one exists. The source program is
//! only ever read.
//!
//! Replacements are closures run at clone time, so they can clone other
//! source nodes through the same context and pick up every other
//! registered rewrite.

use std::collections::{HashMap, HashSet};

use crate::diagnostic::{Diagnostic, System};
use crate::types::{StructMember, StructType, Type, TypeId};

use super::*;

type ExprReplacer<'a> = Box<dyn FnOnce(&mut CloneContext<'a>) -> ExprId + 'a>;
type StmtReplacer<'a> = Box<dyn FnOnce(&mut CloneContext<'a>) -> Option<StmtId> + 'a>;
type StmtInserter<'a> = Box<dyn FnOnce(&mut CloneContext<'a>) -> StmtId + 'a>;
type VarEdit<'a> = Box<dyn FnOnce(&mut Variable) + 'a>;

pub struct CloneContext<'a> {
    pub src: &'a Program,
    pub sem: &'a Sem,
    pub dst: ProgramBuilder,
    pub diagnostics: Vec<Diagnostic>,
    type_map: HashMap<TypeId, TypeId>,
    var_map: HashMap<VarId, VarId>,
    fn_map: HashMap<FnId, FnId>,
    expr_replacements: HashMap<ExprId, ExprReplacer<'a>>,
    stmt_replacements: HashMap<StmtId, StmtReplacer<'a>>,
    inserts_before: HashMap<StmtId, Vec<StmtInserter<'a>>>,
    var_types: HashMap<VarId, TypeId>,
    var_edits: HashMap<VarId, VarEdit<'a>>,
    structs_before: HashMap<TypeId, Vec<TypeId>>,
    removed: HashSet<GlobalDecl>,
}

impl<'a> CloneContext<'a> {
    pub fn new(src: &'a Program, sem: &'a Sem) -> Self {
        let mut dst = ProgramBuilder::new();
        // Every source name stays taken so synthesized names never shadow one.
        for var in &src.vars {
            dst.symbols().register(&var.name);
        }
        for function in &src.functions {
            dst.symbols().register(&function.name);
        }
        for s in src.structs() {
            if let Some(st) = src.types.as_struct(s) {
                dst.symbols().register(&st.name);
            }
        }
        Self {
            src,
            sem,
            dst,
            diagnostics: Vec::new(),
            type_map: HashMap::new(),
            var_map: HashMap::new(),
            fn_map: HashMap::new(),
            expr_replacements: HashMap::new(),
            stmt_replacements: HashMap::new(),
            inserts_before: HashMap::new(),
            var_types: HashMap::new(),
            var_edits: HashMap::new(),
            structs_before: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    // ── Registration ──

    /// Replace every clone of `expr` with the result of `f`.
    pub fn replace_expr(
        &mut self,
        expr: ExprId,
        f: impl FnOnce(&mut CloneContext<'a>) -> ExprId + 'a,
    ) {
        self.expr_replacements.insert(expr, Box::new(f));
    }

    /// Replace a statement; returning `None` drops it.
    pub fn replace_stmt(
        &mut self,
        stmt: StmtId,
        f: impl FnOnce(&mut CloneContext<'a>) -> Option<StmtId> + 'a,
    ) {
        self.stmt_replacements.insert(stmt, Box::new(f));
    }

    /// Insert a statement immediately before `stmt` in whichever block holds it.
    pub fn insert_before(
        &mut self,
        stmt: StmtId,
        f: impl FnOnce(&mut CloneContext<'a>) -> StmtId + 'a,
    ) {
        self.inserts_before
            .entry(stmt)
            .or_default()
            .push(Box::new(f));
    }

    /// Drop a module-scope declaration from the output.
    pub fn remove(&mut self, decl: GlobalDecl) {
        self.removed.insert(decl);
    }

    /// Give a variable a new declared type (a type of the destination program).
    pub fn set_var_type(&mut self, var: VarId, ty: TypeId) {
        self.var_types.insert(var, ty);
    }

    /// Edit the cloned declaration of `var` (binding, access, ...) before it is added.
    pub fn update_var(&mut self, var: VarId, f: impl FnOnce(&mut Variable) + 'a) {
        self.var_edits.insert(var, Box::new(f));
    }

    /// Declare the destination struct `extra` right before the source struct `before`.
    pub fn declare_struct_before(&mut self, before: TypeId, extra: TypeId) {
        self.structs_before.entry(before).or_default().push(extra);
    }

    // ── Cloning ──

    /// Map a source type into the destination registry.
    pub fn clone_type(&mut self, ty: TypeId) -> TypeId {
        if let Some(mapped) = self.type_map.get(&ty) {
            return *mapped;
        }
        let cloned = match self.sem.types()[ty].clone() {
            Type::Vector { elem, width } => Type::Vector {
                elem: self.clone_type(elem),
                width,
            },
            Type::Matrix {
                columns,
                rows,
                elem,
            } => Type::Matrix {
                columns,
                rows,
                elem: self.clone_type(elem),
            },
            Type::Pointer {
                space,
                access,
                store,
            } => Type::Pointer {
                space,
                access,
                store: self.clone_type(store),
            },
            Type::Atomic { inner } => Type::Atomic {
                inner: self.clone_type(inner),
            },
            Type::Array { elem, count } => Type::Array {
                elem: self.clone_type(elem),
                count,
            },
            Type::Struct(s) => Type::Struct(StructType {
                name: s.name,
                members: s
                    .members
                    .into_iter()
                    .map(|m| StructMember {
                        name: m.name,
                        ty: self.clone_type(m.ty),
                    })
                    .collect(),
            }),
            scalar => scalar,
        };
        let mapped = self.dst.types().get(cloned);
        self.type_map.insert(ty, mapped);
        mapped
    }

    pub fn clone_var(&mut self, var: VarId) -> VarId {
        if let Some(mapped) = self.var_map.get(&var) {
            return *mapped;
        }
        let src = self.src.var(var).clone();
        let ty = match self.var_types.get(&var) {
            Some(ty) => Some(*ty),
            None => src.ty.map(|t| self.clone_type(t)),
        };
        let initializer = src.initializer.map(|e| self.clone_expr(e));
        let mut cloned = Variable {
            ty,
            initializer,
            ..src
        };
        if let Some(edit) = self.var_edits.remove(&var) {
            edit(&mut cloned);
        }
        let id = self.dst.push_var(cloned);
        self.var_map.insert(var, id);
        id
    }

    pub fn clone_function_ref(&mut self, function: FnId) -> FnId {
        if let Some(mapped) = self.fn_map.get(&function) {
            return *mapped;
        }
        let program = self.src;
        let src = program.function(function);
        self.diagnostics.push(Diagnostic::internal(
            System::Transform,
            format!("call to removed function '{}' survived cloning", src.name),
        ));
        let return_type = self.clone_type(src.return_type);
        let id = self.dst.reserve_function(&src.name, return_type);
        self.fn_map.insert(function, id);
        id
    }

    /// Clone an expression, applying any registered replacement.
    pub fn clone_expr(&mut self, expr: ExprId) -> ExprId {
        if let Some(replace) = self.expr_replacements.remove(&expr) {
            let id = replace(self);
            if let Some(span) = self.src.expr_span(expr) {
                self.dst.expr_spans.entry(id).or_insert(span);
            }
            return id;
        }
        self.clone_expr_without_transform(expr)
    }

    /// Clone an expression ignoring a replacement registered for it.
    /// Its operands are still cloned with replacements applied.
    pub fn clone_expr_without_transform(&mut self, expr: ExprId) -> ExprId {
        let cloned = match self.src.expr(expr).clone() {
            Expr::Literal(lit) => Expr::Literal(lit),
            Expr::Ident(v) => Expr::Ident(self.clone_var(v)),
            Expr::Member { object, member } => Expr::Member {
                object: self.clone_expr(object),
                member,
            },
            Expr::Index { object, index } => Expr::Index {
                object: self.clone_expr(object),
                index: self.clone_expr(index),
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: self.clone_expr(expr),
            },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op,
                lhs: self.clone_expr(lhs),
                rhs: self.clone_expr(rhs),
            },
            Expr::Call { target, args } => Expr::Call {
                target: match target {
                    CallTarget::Function(f) => CallTarget::Function(self.clone_function_ref(f)),
                    builtin => builtin,
                },
                args: args.into_iter().map(|a| self.clone_expr(a)).collect(),
            },
        };
        let id = self.dst.push_expr(cloned);
        if let Some(span) = self.src.expr_span(expr) {
            self.dst.span_expr(id, span);
        }
        id
    }

    /// Clone a statement, applying any registered replacement.
    pub fn clone_stmt(&mut self, stmt: StmtId) -> Option<StmtId> {
        if let Some(replace) = self.stmt_replacements.remove(&stmt) {
            let id = replace(self);
            if let (Some(id), Some(span)) = (id, self.src.stmt_span(stmt)) {
                self.dst.stmt_spans.entry(id).or_insert(span);
            }
            return id;
        }
        let cloned = match self.src.stmt(stmt).clone() {
            Stmt::Decl(v) => Stmt::Decl(self.clone_var(v)),
            Stmt::Assign { lhs, rhs } => Stmt::Assign {
                lhs: self.clone_expr(lhs),
                rhs: self.clone_expr(rhs),
            },
            Stmt::Call(e) => Stmt::Call(self.clone_expr(e)),
            Stmt::Return(v) => Stmt::Return(v.map(|v| self.clone_expr(v))),
            Stmt::Block(stmts) => Stmt::Block(self.clone_stmts(&stmts)),
        };
        let id = self.dst.push_stmt(cloned);
        if let Some(span) = self.src.stmt_span(stmt) {
            self.dst.span_stmt(id, span);
        }
        Some(id)
    }

    /// Clone a statement list, honouring inserts and removals.
    pub fn clone_stmts(&mut self, stmts: &[StmtId]) -> Vec<StmtId> {
        let mut out = Vec::with_capacity(stmts.len());
        for s in stmts {
            if let Some(inserts) = self.inserts_before.remove(s) {
                for insert in inserts {
                    out.push(insert(self));
                }
            }
            if let Some(cloned) = self.clone_stmt(*s) {
                out.push(cloned);
            }
        }
        out
    }

    fn clone_function(&mut self, function: FnId) -> FnId {
        let dst_id = self.clone_function_ref(function);
        let program = self.src;
        let src = program.function(function);
        let params: Vec<VarId> = src.params.iter().map(|p| self.clone_var(*p)).collect();
        let body = self.clone_stmts(&src.body);
        let f = self.dst.function_mut(dst_id);
        f.params = params;
        f.body = body;
        f.attributes = src.attributes.clone();
        dst_id
    }

    /// Clone every module-scope declaration that was not removed.
    pub fn finish(mut self) -> (Program, Vec<Diagnostic>) {
        let src = self.src;
        for f in src.functions() {
            if self.removed.contains(&GlobalDecl::Function(f)) {
                continue;
            }
            let function = src.function(f);
            let return_type = self.clone_type(function.return_type);
            let id = self.dst.reserve_function(&function.name, return_type);
            self.fn_map.insert(f, id);
        }

        for decl in src.globals() {
            if self.removed.contains(decl) {
                continue;
            }
            match *decl {
                GlobalDecl::Struct(ty) => {
                    if let Some(extra) = self.structs_before.remove(&ty) {
                        for s in extra {
                            self.dst.push_global(GlobalDecl::Struct(s));
                        }
                    }
                    let cloned = self.clone_type(ty);
                    self.dst.push_global(GlobalDecl::Struct(cloned));
                }
                GlobalDecl::Var(v) => {
                    let cloned = self.clone_var(v);
                    self.dst.push_global(GlobalDecl::Var(cloned));
                }
                GlobalDecl::Function(f) => {
                    let cloned = self.clone_function(f);
                    self.dst.push_global(GlobalDecl::Function(cloned));
                }
            }
        }
        (self.dst.build(), self.diagnostics)
    }
}
