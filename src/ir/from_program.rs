//! Lowering: validated program → IR module.
//!
//! Memory is explicit in the IR. Every program `var` becomes a `Var`
//! instruction producing a pointer; reading a reference expression is a
//! `Load`, assigning to one is a `Store`, and member or index chains on
//! references become `Access` instructions on pointers. `let` and
//! `const` become `Let`. Nested statement blocks become an `If` on a
//! constant `true`, which keeps their scoping and lets a `return` inside
//! them stay a terminator of its own block. A `&&` or `||` whose right
//! side calls a function is lowered through a `bool` var and an `If`, so
//! the call only runs when it decides the result.

use std::collections::HashMap;

use crate::diagnostic::{Diagnostic, System};
use crate::program::{
    self, Attribute, BinaryOp, CallTarget, Expr, FnId, GlobalDecl, Literal, Program, Sem, Stmt,
    UnaryOp, VarId, VarKind,
};
use crate::types::{Access, AddressSpace, Type};

use super::*;

/// Lower a program into a fresh module.
pub fn build(program: &Program) -> Result<Module, Vec<Diagnostic>> {
    let sem = Sem::analyze(program)?;
    let mut lower = Lowering {
        program,
        sem: &sem,
        b: Builder::with_types(sem.types().clone()),
        vars: HashMap::new(),
        functions: HashMap::new(),
        errors: Vec::new(),
    };
    lower.module();
    if lower.errors.is_empty() {
        Ok(lower.b.finish())
    } else {
        Err(lower.errors)
    }
}

/// What a program variable lowered to.
#[derive(Clone, Copy)]
enum Binding {
    /// A `var`: the pointer to its memory.
    Memory(ValueId),
    /// A `let`, `const` or parameter: the value itself.
    Value(ValueId),
}

struct Lowering<'a> {
    program: &'a Program,
    sem: &'a Sem,
    b: Builder,
    vars: HashMap<VarId, Binding>,
    functions: HashMap<FnId, FunctionId>,
    errors: Vec<Diagnostic>,
}

type Lowered<T> = Result<T, Diagnostic>;

impl Lowering<'_> {
    fn module(&mut self) {
        let program = self.program;
        // Declare every function first so calls can refer to any of them.
        for f in program.functions() {
            let function = program.function(f);
            let param_types: Vec<TypeId> = function.params.iter().map(|p| self.sem.var_type(*p)).collect();
            let id = self.b.add_function(&function.name, function.return_type, &param_types);
            for (i, p) in function.params.iter().enumerate() {
                let value = self.b.param(id, i);
                let var = program.var(*p);
                self.b.set_name(value, &var.name);
                if let Some(builtin) = var.builtin {
                    self.b.set_param_builtin(id, i, builtin);
                }
                self.vars.insert(*p, Binding::Value(value));
            }
            for attr in &function.attributes {
                match attr {
                    Attribute::Stage(stage) => self.b.set_stage(id, *stage),
                    Attribute::WorkgroupSize(x, y, z) => self.b.set_workgroup_size(id, [*x, *y, *z]),
                    Attribute::AtomicStub(stub) => self.errors.push(
                        Diagnostic::error(
                            System::Ir,
                            format!("'{}' is an unresolved {} stub", function.name, stub.name()),
                        )
                        .with_help("run the SpirvAtomic transform before building IR"),
                    ),
                }
            }
            self.functions.insert(f, id);
        }

        let root = self.b.root_block();
        for decl in program.globals() {
            if let GlobalDecl::Var(v) = decl {
                if let Err(e) = self.declare(root, *v) {
                    self.errors.push(e);
                }
            }
        }

        for f in program.functions() {
            if let Err(e) = self.function(f) {
                self.errors.push(e);
            }
        }
    }

    fn function(&mut self, f: FnId) -> Lowered<()> {
        let program = self.program;
        let function = program.function(f);
        let id = self.functions[&f];
        let block = self.b.function_block(id);
        let terminated = self.stmts(block, &function.body)?;
        if !terminated {
            if self.b.types()[function.return_type] == Type::Void {
                self.b.return_(block, None)?;
            } else {
                self.b.unreachable(block)?;
            }
        }
        Ok(())
    }

    /// Lower statements into `block`. Returns true if the block is now terminated.
    fn stmts(&mut self, block: BlockId, stmts: &[program::StmtId]) -> Lowered<bool> {
        for s in stmts {
            if self.stmt(block, *s).map_err(|e| self.locate(e, *s))? {
                // Statements after a return are dead.
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Point `e` at the statement it came from unless it already points somewhere.
    fn locate(&self, e: Diagnostic, stmt: program::StmtId) -> Diagnostic {
        match (e.span, self.program.stmt_span(stmt)) {
            (None, Some(span)) => e.with_span(span),
            _ => e,
        }
    }

    fn stmt(&mut self, block: BlockId, id: program::StmtId) -> Lowered<bool> {
        let program = self.program;
        match program.stmt(id) {
            Stmt::Decl(v) => {
                self.declare(block, *v)?;
                Ok(false)
            }
            Stmt::Assign { lhs, rhs } => {
                let ptr = self.reference(block, *lhs)?;
                let value = self.value(block, *rhs)?;
                self.b.store(block, ptr, value)?;
                Ok(false)
            }
            Stmt::Call(e) => {
                self.call(block, *e)?;
                Ok(false)
            }
            Stmt::Return(v) => {
                let value = match v {
                    Some(v) => Some(self.value(block, *v)?),
                    None => None,
                };
                self.b.return_(block, value)?;
                Ok(true)
            }
            Stmt::Block(stmts) => {
                let cond = self.b.constant(Constant::Bool(true));
                let (_, inner, _) = self.b.if_(block, cond, false)?;
                if !self.stmts(inner, stmts)? {
                    self.b.exit_if(inner)?;
                }
                Ok(false)
            }
        }
    }

    fn declare(&mut self, block: BlockId, v: VarId) -> Lowered<()> {
        let program = self.program;
        let var = program.var(v);
        let init = match var.initializer {
            Some(e) => Some(self.value(block, e)?),
            None => None,
        };
        let binding = match var.kind {
            VarKind::Var => {
                let space = var.space.unwrap_or(AddressSpace::Function);
                let access = var.access.unwrap_or_else(|| space.default_access());
                let store = self.sem.var_type(v);
                let ptr = self.b.var(block, space, store, access, init, var.binding)?;
                Binding::Memory(ptr)
            }
            VarKind::Let | VarKind::Const | VarKind::Param => {
                let init = init.ok_or_else(|| {
                    Diagnostic::error(System::Ir, format!("'{}' has no initializer", var.name))
                })?;
                Binding::Value(self.b.let_(block, init)?)
            }
        };
        let (Binding::Memory(value) | Binding::Value(value)) = binding;
        self.b.set_name(value, &var.name);
        self.vars.insert(v, binding);
        Ok(())
    }

    fn binding(&self, v: VarId) -> Lowered<Binding> {
        self.vars.get(&v).copied().ok_or_else(|| {
            Diagnostic::internal(
                System::Ir,
                format!("'{}' used before it was lowered", self.program.var(v).name),
            )
        })
    }

    /// Lower a reference expression to a pointer.
    fn reference(&mut self, block: BlockId, e: program::ExprId) -> Lowered<ValueId> {
        let program = self.program;
        match program.expr(e) {
            Expr::Ident(v) => match self.binding(*v)? {
                Binding::Memory(ptr) => Ok(ptr),
                // A `let` holding a pointer is a reference once dereferenced.
                Binding::Value(value) => Ok(value),
            },
            Expr::Member { object, .. } => {
                let base = self.pointer_base(block, *object)?;
                let index = self.member_index(e)?;
                self.b.access(block, base, &[index])
            }
            Expr::Index { object, index } => {
                let base = self.pointer_base(block, *object)?;
                let index = self.value(block, *index)?;
                self.b.access(block, base, &[index])
            }
            Expr::Unary {
                op: UnaryOp::Indirection,
                expr,
            } => self.value(block, *expr),
            _ => Err(Diagnostic::internal(System::Ir, "expression is not a reference")),
        }
    }

    /// The pointer an accessor applies to: the object's reference, or the
    /// object itself when it is a pointer value (`p.member`).
    fn pointer_base(&mut self, block: BlockId, object: program::ExprId) -> Lowered<ValueId> {
        if self.sem.is_reference(object) {
            self.reference(block, object)
        } else {
            self.value(block, object)
        }
    }

    fn member_index(&mut self, e: program::ExprId) -> Lowered<ValueId> {
        let index = match (self.sem.struct_member(e), self.program.expr(e)) {
            (Some((_, index)), _) => index as u32,
            (None, Expr::Member { member, .. }) => match member.as_str() {
                "x" | "r" => 0,
                "y" | "g" => 1,
                "z" | "b" => 2,
                "w" | "a" => 3,
                other => {
                    return Err(Diagnostic::error(
                        System::Ir,
                        format!("unsupported swizzle '{}'", other),
                    ))
                }
            },
            _ => return Err(Diagnostic::internal(System::Ir, "member index of a non-member")),
        };
        Ok(self.b.constant(Constant::U32(index)))
    }

    /// Lower an expression to the value it produces.
    fn value(&mut self, block: BlockId, e: program::ExprId) -> Lowered<ValueId> {
        if self.sem.is_reference(e) {
            let ptr = self.reference(block, e)?;
            return self.b.load(block, ptr);
        }
        let program = self.program;
        match program.expr(e) {
            Expr::Literal(lit) => Ok(self.b.constant(match *lit {
                Literal::Bool(v) => Constant::Bool(v),
                Literal::I32(v) => Constant::I32(v),
                Literal::U32(v) => Constant::U32(v),
                Literal::F32(v) => Constant::F32(v),
                Literal::F16(v) => Constant::F16(v),
            })),
            Expr::Ident(v) => match self.binding(*v)? {
                Binding::Value(value) => Ok(value),
                Binding::Memory(ptr) => self.b.load(block, ptr),
            },
            Expr::Member { object, .. } => {
                let base = self.value(block, *object)?;
                let index = self.member_index(e)?;
                self.b.access(block, base, &[index])
            }
            Expr::Index { object, index } => {
                let base = self.value(block, *object)?;
                let index = self.value(block, *index)?;
                self.b.access(block, base, &[index])
            }
            Expr::Unary { op, expr } => match op {
                UnaryOp::AddressOf => self.reference(block, *expr),
                UnaryOp::Indirection => {
                    let ptr = self.value(block, *expr)?;
                    self.b.load(block, ptr)
                }
                UnaryOp::Negation => self.unary(block, UnaryKind::Negation, *expr),
                UnaryOp::Complement => self.unary(block, UnaryKind::Complement, *expr),
                UnaryOp::Not => self.unary(block, UnaryKind::Not, *expr),
            },
            Expr::Binary { op, lhs, rhs } => {
                let kind = match op {
                    BinaryOp::Add => BinaryKind::Add,
                    BinaryOp::Subtract => BinaryKind::Subtract,
                    BinaryOp::Multiply => BinaryKind::Multiply,
                    BinaryOp::Divide => BinaryKind::Divide,
                    BinaryOp::Modulo => BinaryKind::Modulo,
                    BinaryOp::And => BinaryKind::And,
                    BinaryOp::Or => BinaryKind::Or,
                    BinaryOp::Xor => BinaryKind::Xor,
                    BinaryOp::Equal => BinaryKind::Equal,
                    BinaryOp::NotEqual => BinaryKind::NotEqual,
                    BinaryOp::LessThan => BinaryKind::LessThan,
                    BinaryOp::GreaterThan => BinaryKind::GreaterThan,
                    BinaryOp::LessThanEqual => BinaryKind::LessThanEqual,
                    BinaryOp::GreaterThanEqual => BinaryKind::GreaterThanEqual,
                    BinaryOp::ShiftLeft => BinaryKind::ShiftLeft,
                    BinaryOp::ShiftRight => BinaryKind::ShiftRight,
                    // Without side effects on the right, `&&` and `||` on
                    // bools evaluate the same as `&` and `|`.
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr if !self.has_call(*rhs) => {
                        if *op == BinaryOp::LogicalAnd {
                            BinaryKind::And
                        } else {
                            BinaryKind::Or
                        }
                    }
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                        return self.short_circuit(block, *op == BinaryOp::LogicalAnd, *lhs, *rhs)
                    }
                };
                let l = self.value(block, *lhs)?;
                let r = self.value(block, *rhs)?;
                self.b.binary(block, kind, l, r)
            }
            Expr::Call { .. } => self.call(block, e)?.ok_or_else(|| {
                Diagnostic::error(System::Ir, "a call without a result used as a value")
            }),
        }
    }

    /// `a && b` as `var t = a; if (t) { t = b; }`, and `a || b` with the
    /// condition negated, so `b` only runs when it decides the result.
    fn short_circuit(
        &mut self,
        block: BlockId,
        and: bool,
        lhs: program::ExprId,
        rhs: program::ExprId,
    ) -> Lowered<ValueId> {
        let l = self.value(block, lhs)?;
        let bool_ty = self.b.types().bool();
        let result = self
            .b
            .var(block, AddressSpace::Function, bool_ty, Access::ReadWrite, Some(l), None)?;
        let current = self.b.load(block, result)?;
        let cond = if and {
            current
        } else {
            self.b.unary(block, UnaryKind::Not, current)?
        };
        let (_, then, _) = self.b.if_(block, cond, false)?;
        let r = self.value(then, rhs)?;
        self.b.store(then, result, r)?;
        self.b.exit_if(then)?;
        self.b.load(block, result)
    }

    fn unary(&mut self, block: BlockId, kind: UnaryKind, operand: program::ExprId) -> Lowered<ValueId> {
        let v = self.value(block, operand)?;
        self.b.unary(block, kind, v)
    }

    fn call(&mut self, block: BlockId, e: program::ExprId) -> Lowered<Option<ValueId>> {
        let program = self.program;
        let Expr::Call { target, args } = program.expr(e) else {
            return Err(Diagnostic::internal(System::Ir, "expected a call"));
        };
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.value(block, *a)?);
        }
        match target {
            CallTarget::Function(f) => {
                let id = *self.functions.get(f).ok_or_else(|| {
                    Diagnostic::internal(System::Ir, "call to an undeclared function")
                })?;
                self.b.call(block, id, values)
            }
            CallTarget::Builtin(builtin) => self.b.call_builtin(block, *builtin, values),
        }
    }

    fn has_call(&self, e: program::ExprId) -> bool {
        match self.program.expr(e) {
            Expr::Call { .. } => true,
            Expr::Literal(_) | Expr::Ident(_) => false,
            Expr::Member { object, .. } => self.has_call(*object),
            Expr::Unary { expr, .. } => self.has_call(*expr),
            Expr::Index { object, index } => self.has_call(*object) || self.has_call(*index),
            Expr::Binary { lhs, rhs, .. } => self.has_call(*lhs) || self.has_call(*rhs),
        }
    }
}
