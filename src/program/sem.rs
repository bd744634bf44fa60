//! Semantic queries over a validated program.
//!
//! `Sem` answers the questions transforms ask while pattern-matching a
//! program: the type of every expression, whether it denotes a memory
//! reference, which variable it is rooted at, which struct member an
//! accessor selects, and where each function is called from.
//!
//! Types synthesized here (pointer types of `&x`, comparison results)
//! are interned into a copy of the program's registry. Ids from the
//! program stay valid in it, so `sem.types()` can be used everywhere a
//! program type is looked up.

use std::collections::HashMap;

use crate::builtin::BuiltinFn;
use crate::diagnostic::{Diagnostic, System};
use crate::span::Span;
use crate::types::{Access, AddressSpace, Type, TypeId, TypeRegistry};

use super::*;

/// Address space and access mode of a reference expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefInfo {
    pub space: AddressSpace,
    pub access: Access,
}

/// A call expression and the statement that contains it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub call: ExprId,
    pub stmt: StmtId,
    pub caller: FnId,
}

/// A use of a variable: the identifier expression and its enclosing statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarUser {
    pub expr: ExprId,
    pub stmt: Option<StmtId>,
}

#[derive(Clone, Debug)]
pub struct Sem {
    types: TypeRegistry,
    void: TypeId,
    expr_types: Vec<Option<TypeId>>,
    expr_refs: Vec<Option<RefInfo>>,
    root_idents: Vec<Option<VarId>>,
    expr_stmts: Vec<Option<StmtId>>,
    members: HashMap<ExprId, (TypeId, usize)>,
    var_types: Vec<Option<TypeId>>,
    var_users: Vec<Vec<VarUser>>,
    call_sites: Vec<Vec<CallSite>>,
    stmt_functions: Vec<Option<FnId>>,
}

impl Sem {
    /// Resolve every reachable expression of `program`.
    pub fn analyze(program: &Program) -> Result<Sem, Vec<Diagnostic>> {
        let mut types = program.types.clone();
        let void = types.void();
        let mut sem = Sem {
            types,
            void,
            expr_types: vec![None; program.exprs.len()],
            expr_refs: vec![None; program.exprs.len()],
            root_idents: vec![None; program.exprs.len()],
            expr_stmts: vec![None; program.exprs.len()],
            members: HashMap::new(),
            var_types: vec![None; program.vars.len()],
            var_users: vec![Vec::new(); program.vars.len()],
            call_sites: vec![Vec::new(); program.functions.len()],
            stmt_functions: vec![None; program.stmts.len()],
        };
        let mut resolver = Resolver {
            program,
            sem: &mut sem,
            errors: Vec::new(),
            current_fn: None,
            current_stmt: None,
            spans: Vec::new(),
        };
        // Module-scope declarations are order-independent, so resolve all
        // variables before any function body refers to them.
        for v in program.global_vars() {
            resolver.variable(v);
        }
        for f in program.functions() {
            resolver.function(f);
        }
        let errors = std::mem::take(&mut resolver.errors);
        if errors.is_empty() {
            Ok(sem)
        } else {
            Err(errors)
        }
    }

    /// The registry holding every program type plus the ones synthesized here.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Value type of an expression. For references this is the store type.
    pub fn type_of(&self, expr: ExprId) -> TypeId {
        self.expr_types[expr.index()].unwrap_or(self.void)
    }

    /// `Some` if the expression denotes memory rather than a value.
    pub fn reference(&self, expr: ExprId) -> Option<RefInfo> {
        self.expr_refs[expr.index()]
    }

    pub fn is_reference(&self, expr: ExprId) -> bool {
        self.reference(expr).is_some()
    }

    /// The variable an access chain is rooted at, looking through `&` and `*`.
    pub fn root_identifier(&self, expr: ExprId) -> Option<VarId> {
        self.root_idents[expr.index()]
    }

    /// The struct type and member index a member accessor selects.
    pub fn struct_member(&self, expr: ExprId) -> Option<(TypeId, usize)> {
        self.members.get(&expr).copied()
    }

    pub fn stmt_of(&self, expr: ExprId) -> Option<StmtId> {
        self.expr_stmts[expr.index()]
    }

    pub fn function_of(&self, stmt: StmtId) -> Option<FnId> {
        self.stmt_functions[stmt.index()]
    }

    /// Resolved type of a variable: declared, or inferred from the initializer.
    pub fn var_type(&self, var: VarId) -> TypeId {
        self.var_types[var.index()].unwrap_or(self.void)
    }

    pub fn users(&self, var: VarId) -> &[VarUser] {
        &self.var_users[var.index()]
    }

    pub fn call_sites(&self, function: FnId) -> &[CallSite] {
        &self.call_sites[function.index()]
    }
}

// ─── Resolver ─────────────────────────────────────────────────────

struct Resolver<'a> {
    program: &'a Program,
    sem: &'a mut Sem,
    errors: Vec<Diagnostic>,
    current_fn: Option<FnId>,
    current_stmt: Option<StmtId>,
    /// Locations of the enclosing nodes that have one, innermost last.
    spans: Vec<Span>,
}

impl Resolver<'_> {
    fn error(&mut self, message: String) {
        let mut diagnostic = Diagnostic::error(System::Program, message);
        if let Some(span) = self.spans.last() {
            diagnostic = diagnostic.with_span(*span);
        }
        self.errors.push(diagnostic);
    }

    fn variable(&mut self, id: VarId) {
        let program = self.program;
        let var = program.var(id);
        let init_ty = var.initializer.map(|init| self.expr(init));
        let ty = match (var.ty, init_ty) {
            (Some(ty), _) => ty,
            (None, Some(ty)) => ty,
            (None, None) => {
                self.error(format!("cannot infer the type of '{}'", var.name));
                self.sem.types.void()
            }
        };
        self.sem.var_types[id.index()] = Some(ty);
    }

    fn function(&mut self, id: FnId) {
        self.current_fn = Some(id);
        let program = self.program;
        let function = program.function(id);
        for p in &function.params {
            self.variable(*p);
        }
        for s in &function.body {
            self.stmt(*s);
        }
        self.current_fn = None;
    }

    fn stmt(&mut self, id: StmtId) {
        let outer = self.current_stmt.replace(id);
        self.sem.stmt_functions[id.index()] = self.current_fn;
        let program = self.program;
        let span = program.stmt_span(id);
        if let Some(span) = span {
            self.spans.push(span);
        }
        match program.stmt(id) {
            Stmt::Decl(v) => self.variable(*v),
            Stmt::Assign { lhs, rhs } => {
                self.expr(*lhs);
                self.expr(*rhs);
                if !self.sem.is_reference(*lhs) {
                    self.error("left side of assignment is not a reference".to_string());
                }
            }
            Stmt::Call(e) => {
                self.expr(*e);
            }
            Stmt::Return(v) => {
                if let Some(v) = v {
                    self.expr(*v);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.stmt(*s);
                }
            }
        }
        if span.is_some() {
            self.spans.pop();
        }
        self.current_stmt = outer;
    }

    fn expr(&mut self, id: ExprId) -> TypeId {
        if let Some(ty) = self.sem.expr_types[id.index()] {
            return ty;
        }
        self.sem.expr_stmts[id.index()] = self.current_stmt;
        let span = self.program.expr_span(id);
        if let Some(span) = span {
            self.spans.push(span);
        }
        let (ty, reference, root) = self.resolve(id);
        if span.is_some() {
            self.spans.pop();
        }
        self.sem.expr_types[id.index()] = Some(ty);
        self.sem.expr_refs[id.index()] = reference;
        self.sem.root_idents[id.index()] = root;
        ty
    }

    fn resolve(&mut self, id: ExprId) -> (TypeId, Option<RefInfo>, Option<VarId>) {
        let program = self.program;
        match program.expr(id) {
            Expr::Literal(lit) => {
                let types = &mut self.sem.types;
                let ty = match lit {
                    Literal::Bool(_) => types.bool(),
                    Literal::I32(_) => types.i32(),
                    Literal::U32(_) => types.u32(),
                    Literal::F32(_) => types.f32(),
                    Literal::F16(_) => types.f16(),
                };
                (ty, None, None)
            }
            Expr::Ident(v) => {
                let var = program.var(*v);
                self.sem.var_users[v.index()].push(VarUser {
                    expr: id,
                    stmt: self.current_stmt,
                });
                let ty = match self.sem.var_types[v.index()] {
                    Some(ty) => ty,
                    None => {
                        self.error(format!("'{}' used before its declaration", var.name));
                        self.sem.types.void()
                    }
                };
                let reference = var.is_var().then(|| {
                    let space = var.space.unwrap_or(AddressSpace::Function);
                    RefInfo {
                        space,
                        access: var.access.unwrap_or_else(|| space.default_access()),
                    }
                });
                (ty, reference, Some(*v))
            }
            Expr::Member { object, member } => {
                let object = *object;
                let object_ty = self.expr(object);
                let (struct_ty, reference) = self.through_pointer(object, object_ty);
                let root = self.sem.root_idents[object.index()];
                let resolved = match &self.sem.types[struct_ty] {
                    Type::Struct(s) => s
                        .member_index(member)
                        .map(|index| (s.members[index].ty, Some(index)))
                        .ok_or_else(|| format!("struct '{}' has no member '{}'", s.name, member)),
                    // Single-component swizzle.
                    Type::Vector { elem, .. } => Ok((*elem, None)),
                    _ => Err(format!(
                        "type '{}' has no member '{}'",
                        self.sem.types.friendly_name(struct_ty),
                        member
                    )),
                };
                match resolved {
                    Ok((ty, index)) => {
                        if let Some(index) = index {
                            self.sem.members.insert(id, (struct_ty, index));
                        }
                        (ty, reference, root)
                    }
                    Err(msg) => {
                        self.error(msg);
                        (self.sem.types.void(), None, root)
                    }
                }
            }
            Expr::Index { object, index } => {
                let (object, index) = (*object, *index);
                let object_ty = self.expr(object);
                self.expr(index);
                let (container, reference) = self.through_pointer(object, object_ty);
                let root = self.sem.root_idents[object.index()];
                match self.sem.types.element_of(container) {
                    Some(elem) => (elem, reference, root),
                    None => {
                        let name = self.sem.types.friendly_name(container);
                        self.error(format!("cannot index into '{}'", name));
                        (self.sem.types.void(), None, root)
                    }
                }
            }
            Expr::Unary { op, expr } => {
                let (op, operand) = (*op, *expr);
                let ty = self.expr(operand);
                let root = self.sem.root_idents[operand.index()];
                match op {
                    UnaryOp::AddressOf => match self.sem.reference(operand) {
                        Some(r) => {
                            let ptr = self.sem.types.pointer(r.space, ty, r.access);
                            (ptr, None, root)
                        }
                        None => {
                            self.error("cannot take the address of a value".to_string());
                            (ty, None, root)
                        }
                    },
                    UnaryOp::Indirection => {
                        let pointee = match self.sem.types[ty] {
                            Type::Pointer {
                                space,
                                access,
                                store,
                            } => Some((store, RefInfo { space, access })),
                            _ => None,
                        };
                        match pointee {
                            Some((store, r)) => (store, Some(r), root),
                            None => {
                                self.error("cannot dereference a non-pointer".to_string());
                                (ty, None, root)
                            }
                        }
                    }
                    UnaryOp::Negation | UnaryOp::Complement | UnaryOp::Not => (ty, None, None),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let l = self.expr(lhs);
                let r = self.expr(rhs);
                let types = &mut self.sem.types;
                let ty = if op.is_comparison() {
                    types.bool_like(l)
                } else {
                    match op {
                        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => types.bool(),
                        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => l,
                        _ => arithmetic_result(types, op, l, r),
                    }
                };
                (ty, None, None)
            }
            Expr::Call { target, args } => {
                let (target, args) = (*target, args.clone());
                let arg_types: Vec<TypeId> = args.iter().map(|a| self.expr(*a)).collect();
                let ty = match target {
                    CallTarget::Function(f) => {
                        if let (Some(caller), Some(stmt)) = (self.current_fn, self.current_stmt) {
                            self.sem.call_sites[f.index()].push(CallSite {
                                call: id,
                                stmt,
                                caller,
                            });
                        }
                        program.function(f).return_type
                    }
                    CallTarget::Builtin(b) => match builtin_result_type(&mut self.sem.types, b, &arg_types) {
                        Ok(ty) => ty,
                        Err(msg) => {
                            self.error(msg);
                            self.sem.types.void()
                        }
                    },
                };
                (ty, None, None)
            }
        }
    }

    /// WGSL lets `p.member` and `p[i]` look through a pointer value.
    fn through_pointer(&self, object: ExprId, object_ty: TypeId) -> (TypeId, Option<RefInfo>) {
        match self.sem.types[object_ty] {
            Type::Pointer {
                space,
                access,
                store,
            } if !self.sem.is_reference(object) => (store, Some(RefInfo { space, access })),
            _ => (object_ty, self.sem.reference(object)),
        }
    }
}

fn arithmetic_result(types: &mut TypeRegistry, op: BinaryOp, l: TypeId, r: TypeId) -> TypeId {
    match (types[l].clone(), types[r].clone()) {
        (Type::Matrix { rows, elem, .. }, Type::Vector { .. }) if op == BinaryOp::Multiply => {
            types.vec(elem, rows)
        }
        (Type::Vector { .. }, Type::Matrix { columns, elem, .. }) if op == BinaryOp::Multiply => {
            types.vec(elem, columns)
        }
        (Type::Vector { .. } | Type::Matrix { .. }, _) => l,
        (_, Type::Vector { .. } | Type::Matrix { .. }) => r,
        _ => l,
    }
}

/// Result type of a builtin call given its argument types.
pub(crate) fn builtin_result_type(
    types: &mut TypeRegistry,
    builtin: BuiltinFn,
    args: &[TypeId],
) -> Result<TypeId, String> {
    let first = args.first().copied();
    if builtin.is_atomic() {
        let inner = first
            .and_then(|p| types.store_type(p))
            .and_then(|s| match types[s] {
                Type::Atomic { inner } => Some(inner),
                _ => None,
            })
            .ok_or_else(|| {
                format!(
                    "first argument of '{}' must be a pointer to an atomic",
                    builtin.name()
                )
            })?;
        return Ok(match builtin {
            BuiltinFn::AtomicStore => types.void(),
            BuiltinFn::AtomicCompareExchangeWeak => atomic_compare_exchange_result(types, inner),
            _ => inner,
        });
    }
    let ty = match builtin {
        BuiltinFn::All | BuiltinFn::Any => types.bool(),
        BuiltinFn::Dot | BuiltinFn::Length | BuiltinFn::Distance => {
            match first.and_then(|t| types.scalar_of(t)) {
                Some(s) => s,
                None => return Err(format!("'{}' expects a vector argument", builtin.name())),
            }
        }
        BuiltinFn::ArrayLength
        | BuiltinFn::Dot4U8Packed
        | BuiltinFn::TextureNumLayers
        | BuiltinFn::TextureNumLevels
        | BuiltinFn::TextureNumSamples
        | BuiltinFn::TextureDimensions => types.u32(),
        BuiltinFn::Dot4I8Packed => types.i32(),
        b if b.is_data_packing() || b == BuiltinFn::Pack4XI8 || b == BuiltinFn::Pack4XU8 => types.u32(),
        BuiltinFn::Unpack2X16Float | BuiltinFn::Unpack2X16Snorm | BuiltinFn::Unpack2X16Unorm => {
            let f = types.f32();
            types.vec(f, 2)
        }
        BuiltinFn::Unpack4X8Snorm | BuiltinFn::Unpack4X8Unorm => {
            let f = types.f32();
            types.vec(f, 4)
        }
        BuiltinFn::Unpack4XI8 => {
            let i = types.i32();
            types.vec(i, 4)
        }
        BuiltinFn::Unpack4XU8 | BuiltinFn::SubgroupBallot => {
            let u = types.u32();
            types.vec(u, 4)
        }
        BuiltinFn::TextureSample
        | BuiltinFn::TextureSampleLevel
        | BuiltinFn::TextureLoad
        | BuiltinFn::TextureGather => {
            let f = types.f32();
            types.vec(f, 4)
        }
        b if b.is_barrier() || b == BuiltinFn::TextureStore => types.void(),
        _ => match first {
            Some(t) => t,
            None => types.void(),
        },
    };
    Ok(ty)
}

/// `__atomic_compare_exchange_result_<T> { old_value : T, exchanged : bool }`.
pub(crate) fn atomic_compare_exchange_result(types: &mut TypeRegistry, inner: TypeId) -> TypeId {
    let name = format!(
        "__atomic_compare_exchange_result_{}",
        types.friendly_name(inner)
    );
    let b = types.bool();
    types.structure(name, vec![("old_value".into(), inner), ("exchanged".into(), b)])
}
