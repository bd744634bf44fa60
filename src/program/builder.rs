//! ProgramBuilder: fluent construction of a `Program`.
//!
//! Used by the front-end adapter, by tests, and as the write side of a
//! `CloneContext`. Children are always created before their parents, so
//! every id a node refers to already exists.

use std::collections::{HashMap, HashSet};

use crate::builtin::BuiltinFn;
use crate::number::quantize_f16;
use crate::span::Span;
use crate::types::{Access, AddressSpace, TypeId, TypeRegistry};

use super::*;

/// Tracks declared names so synthesized declarations never collide.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    used: HashSet<String>,
}

impl SymbolTable {
    pub fn register(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Reserve a name derived from `base` that no other declaration uses.
    pub fn fresh(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 1;
        while self.used.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.used.insert(name.clone());
        name
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    pub(crate) types: TypeRegistry,
    pub(crate) exprs: Vec<Expr>,
    pub(crate) stmts: Vec<Stmt>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) functions: Vec<Function>,
    pub(crate) globals: Vec<GlobalDecl>,
    pub(crate) expr_spans: HashMap<ExprId, Span>,
    pub(crate) stmt_spans: HashMap<StmtId, Span>,
    symbols: SymbolTable,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn symbols(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn build(self) -> Program {
        Program {
            types: self.types,
            exprs: self.exprs,
            stmts: self.stmts,
            vars: self.vars,
            functions: self.functions,
            globals: self.globals,
            expr_spans: self.expr_spans,
            stmt_spans: self.stmt_spans,
        }
    }

    // ── Source locations ──

    /// Record where `expr` came from; diagnostics about it point there.
    pub fn span_expr(&mut self, expr: ExprId, span: Span) -> ExprId {
        self.expr_spans.insert(expr, span);
        expr
    }

    pub fn span_stmt(&mut self, stmt: StmtId, span: Span) -> StmtId {
        self.stmt_spans.insert(stmt, span);
        stmt
    }

    // ── Expressions ──

    pub(crate) fn push_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn lit_bool(&mut self, v: bool) -> ExprId {
        self.push_expr(Expr::Literal(Literal::Bool(v)))
    }

    pub fn lit_i32(&mut self, v: i32) -> ExprId {
        self.push_expr(Expr::Literal(Literal::I32(v)))
    }

    pub fn lit_u32(&mut self, v: u32) -> ExprId {
        self.push_expr(Expr::Literal(Literal::U32(v)))
    }

    pub fn lit_f32(&mut self, v: f32) -> ExprId {
        self.push_expr(Expr::Literal(Literal::F32(v)))
    }

    /// Half-precision literal; the value is quantized on construction.
    pub fn lit_f16(&mut self, v: f32) -> ExprId {
        self.push_expr(Expr::Literal(Literal::F16(quantize_f16(v))))
    }

    pub fn ident(&mut self, var: VarId) -> ExprId {
        self.push_expr(Expr::Ident(var))
    }

    pub fn member(&mut self, object: ExprId, member: impl Into<String>) -> ExprId {
        self.push_expr(Expr::Member {
            object,
            member: member.into(),
        })
    }

    pub fn index(&mut self, object: ExprId, index: ExprId) -> ExprId {
        self.push_expr(Expr::Index { object, index })
    }

    pub fn unary(&mut self, op: UnaryOp, expr: ExprId) -> ExprId {
        self.push_expr(Expr::Unary { op, expr })
    }

    pub fn address_of(&mut self, expr: ExprId) -> ExprId {
        self.unary(UnaryOp::AddressOf, expr)
    }

    pub fn deref(&mut self, expr: ExprId) -> ExprId {
        self.unary(UnaryOp::Indirection, expr)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.push_expr(Expr::Binary { op, lhs, rhs })
    }

    pub fn add(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn call(&mut self, function: FnId, args: Vec<ExprId>) -> ExprId {
        self.push_expr(Expr::Call {
            target: CallTarget::Function(function),
            args,
        })
    }

    pub fn call_builtin(&mut self, builtin: BuiltinFn, args: Vec<ExprId>) -> ExprId {
        self.push_expr(Expr::Call {
            target: CallTarget::Builtin(builtin),
            args,
        })
    }

    // ── Variables ──

    pub(crate) fn push_var(&mut self, var: Variable) -> VarId {
        self.symbols.register(&var.name);
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    fn local(
        &mut self,
        name: impl Into<String>,
        kind: VarKind,
        ty: Option<TypeId>,
        initializer: Option<ExprId>,
    ) -> VarId {
        self.push_var(Variable {
            name: name.into(),
            kind,
            ty,
            space: None,
            access: None,
            initializer,
            binding: None,
            builtin: None,
        })
    }

    /// Declare a module-scope `var` and add it to the global declarations.
    pub fn global_var(
        &mut self,
        name: impl Into<String>,
        space: AddressSpace,
        ty: TypeId,
        initializer: Option<ExprId>,
    ) -> VarId {
        let id = self.push_var(Variable {
            name: name.into(),
            kind: VarKind::Var,
            ty: Some(ty),
            space: Some(space),
            access: None,
            initializer,
            binding: None,
            builtin: None,
        });
        self.globals.push(GlobalDecl::Var(id));
        id
    }

    /// Declare a module-scope resource bound at `@group(g) @binding(b)`.
    pub fn resource(
        &mut self,
        name: impl Into<String>,
        space: AddressSpace,
        ty: TypeId,
        access: Option<Access>,
        binding: BindingPoint,
    ) -> VarId {
        let id = self.global_var(name, space, ty, None);
        let var = &mut self.vars[id.index()];
        var.access = access;
        var.binding = Some(binding);
        id
    }

    pub fn var(&mut self, name: impl Into<String>, ty: Option<TypeId>, init: Option<ExprId>) -> VarId {
        self.local(name, VarKind::Var, ty, init)
    }

    pub fn let_(&mut self, name: impl Into<String>, ty: Option<TypeId>, init: ExprId) -> VarId {
        self.local(name, VarKind::Let, ty, Some(init))
    }

    pub fn const_(&mut self, name: impl Into<String>, ty: Option<TypeId>, init: ExprId) -> VarId {
        self.local(name, VarKind::Const, ty, Some(init))
    }

    pub fn param(&mut self, name: impl Into<String>, ty: TypeId) -> VarId {
        self.local(name, VarKind::Param, Some(ty), None)
    }

    pub fn builtin_param(&mut self, name: impl Into<String>, ty: TypeId, builtin: BuiltinValue) -> VarId {
        let id = self.param(name, ty);
        self.vars[id.index()].builtin = Some(builtin);
        id
    }

    // ── Statements ──

    pub(crate) fn push_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn decl(&mut self, var: VarId) -> StmtId {
        self.push_stmt(Stmt::Decl(var))
    }

    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> StmtId {
        self.push_stmt(Stmt::Assign { lhs, rhs })
    }

    pub fn call_stmt(&mut self, call: ExprId) -> StmtId {
        self.push_stmt(Stmt::Call(call))
    }

    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        self.push_stmt(Stmt::Return(value))
    }

    pub fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.push_stmt(Stmt::Block(stmts))
    }

    // ── Module-scope declarations ──

    /// Intern a struct type and declare it at module scope.
    pub fn structure(&mut self, name: impl Into<String>, members: Vec<(&str, TypeId)>) -> TypeId {
        let name = name.into();
        self.symbols.register(&name);
        let members = members
            .into_iter()
            .map(|(n, t)| (n.to_string(), t))
            .collect();
        let ty = self.types.structure(name, members);
        self.globals.push(GlobalDecl::Struct(ty));
        ty
    }

    /// Add a function's arena slot without declaring it at module scope.
    pub(crate) fn reserve_function(&mut self, name: &str, return_type: TypeId) -> FnId {
        self.symbols.register(name);
        let id = FnId(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.to_string(),
            params: Vec::new(),
            return_type,
            body: Vec::new(),
            attributes: Vec::new(),
        });
        id
    }

    pub(crate) fn function_mut(&mut self, id: FnId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub(crate) fn push_global(&mut self, decl: GlobalDecl) {
        self.globals.push(decl);
    }

    /// Declare a function at module scope.
    pub fn function(
        &mut self,
        name: impl Into<String>,
        params: Vec<VarId>,
        return_type: TypeId,
        body: Vec<StmtId>,
        attributes: Vec<Attribute>,
    ) -> FnId {
        let name = name.into();
        let id = self.reserve_function(&name, return_type);
        let f = self.function_mut(id);
        f.params = params;
        f.body = body;
        f.attributes = attributes;
        self.globals.push(GlobalDecl::Function(id));
        id
    }
}
