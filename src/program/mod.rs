//! Validated program: the resolved, type-checked input to the compiler.
//!
//! The front-end that parses and type-checks shader source is an external
//! collaborator; it hands over a `Program` whose identifiers are already
//! resolved to their declarations. All nodes live in arenas owned by the
//! program and refer to each other by index.
//!
//! Transforms never mutate a `Program`. They read one through `Sem` and
//! write a fresh one through a `CloneContext`.

pub mod builder;
pub mod clone;
pub mod sem;
pub mod writer;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::builtin::BuiltinFn;
use crate::span::Span;
use crate::types::{Access, AddressSpace, TypeId, TypeRegistry};

pub use builder::ProgramBuilder;
pub use clone::CloneContext;
pub use sem::Sem;

// ─── Handles ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(pub(crate) u32);

macro_rules! impl_index {
    ($($id:ident),*) => {
        $(impl $id {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        })*
    };
}

impl_index!(ExprId, StmtId, VarId, FnId);

// ─── Expressions ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    /// Half-precision value, already quantized, in `f32` storage.
    F16(f32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    AddressOf,
    Indirection,
    Negation,
    Complement,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    pub fn token(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::LessThanEqual => "<=",
            BinaryOp::GreaterThanEqual => ">=",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::GreaterThan
                | BinaryOp::LessThanEqual
                | BinaryOp::GreaterThanEqual
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallTarget {
    Function(FnId),
    Builtin(BuiltinFn),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A resolved reference to a variable, `let`, constant or parameter.
    Ident(VarId),
    Member {
        object: ExprId,
        member: String,
    },
    Index {
        object: ExprId,
        index: ExprId,
    },
    Unary {
        op: UnaryOp,
        expr: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Call {
        target: CallTarget,
        args: Vec<ExprId>,
    },
}

// ─── Statements ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Decl(VarId),
    Assign { lhs: ExprId, rhs: ExprId },
    Call(ExprId),
    Return(Option<ExprId>),
    Block(Vec<StmtId>),
}

// ─── Declarations ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarKind {
    Var,
    Let,
    Const,
    Param,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

impl BindingPoint {
    pub fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinValue {
    VertexIndex,
    InstanceIndex,
    Position,
    GlobalInvocationId,
    LocalInvocationIndex,
}

impl BuiltinValue {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinValue::VertexIndex => "vertex_index",
            BuiltinValue::InstanceIndex => "instance_index",
            BuiltinValue::Position => "position",
            BuiltinValue::GlobalInvocationId => "global_invocation_id",
            BuiltinValue::LocalInvocationIndex => "local_invocation_index",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// Declared type. `None` when the declaration relies on inference.
    pub ty: Option<TypeId>,
    /// Address space of a `var`. `None` for function-scope vars and non-vars.
    pub space: Option<AddressSpace>,
    pub access: Option<Access>,
    pub initializer: Option<ExprId>,
    pub binding: Option<BindingPoint>,
    pub builtin: Option<BuiltinValue>,
}

impl Variable {
    pub fn is_var(&self) -> bool {
        self.kind == VarKind::Var
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Vertex,
    Fragment,
    Compute,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Vertex => "vertex",
            PipelineStage::Fragment => "fragment",
            PipelineStage::Compute => "compute",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Stage(PipelineStage),
    WorkgroupSize(u32, u32, u32),
    /// Placeholder emitted by the SPIR-V ingestion stage for an atomic
    /// builtin whose first argument had to be passed by value.
    AtomicStub(BuiltinFn),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<VarId>,
    pub return_type: TypeId,
    pub body: Vec<StmtId>,
    pub attributes: Vec<Attribute>,
}

impl Function {
    pub fn atomic_stub(&self) -> Option<BuiltinFn> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::AtomicStub(b) => Some(*b),
            _ => None,
        })
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Stage(s) => Some(*s),
            _ => None,
        })
    }

    pub fn is_entry_point(&self) -> bool {
        self.stage().is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalDecl {
    Struct(TypeId),
    Var(VarId),
    Function(FnId),
}

// ─── Program ──────────────────────────────────────────────────────

/// A validated program. Immutable once built.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) types: TypeRegistry,
    pub(crate) exprs: Vec<Expr>,
    pub(crate) stmts: Vec<Stmt>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) functions: Vec<Function>,
    pub(crate) globals: Vec<GlobalDecl>,
    pub(crate) expr_spans: HashMap<ExprId, Span>,
    pub(crate) stmt_spans: HashMap<StmtId, Span>,
}

impl Program {
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    /// Where the front-end found an expression, if it said.
    pub fn expr_span(&self, id: ExprId) -> Option<Span> {
        self.expr_spans.get(&id).copied()
    }

    pub fn stmt_span(&self, id: StmtId) -> Option<Span> {
        self.stmt_spans.get(&id).copied()
    }

    pub fn function(&self, id: FnId) -> &Function {
        &self.functions[id.index()]
    }

    /// Module-scope declarations in source order.
    pub fn globals(&self) -> &[GlobalDecl] {
        &self.globals
    }

    /// Declared functions in source order.
    pub fn functions(&self) -> impl Iterator<Item = FnId> + '_ {
        self.globals.iter().filter_map(|g| match g {
            GlobalDecl::Function(f) => Some(*f),
            _ => None,
        })
    }

    /// Module-scope variables in source order.
    pub fn global_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.globals.iter().filter_map(|g| match g {
            GlobalDecl::Var(v) => Some(*v),
            _ => None,
        })
    }

    /// Declared structs in source order.
    pub fn structs(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.globals.iter().filter_map(|g| match g {
            GlobalDecl::Struct(s) => Some(*s),
            _ => None,
        })
    }

    pub fn find_function(&self, name: &str) -> Option<FnId> {
        self.functions().find(|f| self.function(*f).name == name)
    }

    pub fn find_global_var(&self, name: &str) -> Option<VarId> {
        self.global_vars().find(|v| self.var(*v).name == name)
    }

    pub fn find_struct(&self, name: &str) -> Option<TypeId> {
        self.structs()
            .find(|s| self.types.as_struct(*s).is_some_and(|st| st.name == name))
    }

    /// True if the program declares nothing.
    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}
