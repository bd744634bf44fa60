//! IR: the typed, block-structured intermediate representation.
//!
//! A `Module` owns every node in flat arenas. Values, instructions,
//! blocks and functions refer to each other through `Copy` handles, so
//! the graph has no ownership cycles and cloning a module is a plain
//! copy of its vectors.
//!
//! Control flow is structured: a block is a straight-line list of
//! instructions ending in exactly one terminator, and the only branching
//! construct is `If`, which owns its nested blocks. The root block holds
//! module-scope declarations and has no terminator.

pub mod builder;
pub mod clone;
pub mod disassembler;
pub mod from_program;
pub mod to_program;
pub mod validator;

use std::collections::HashMap;
use std::fmt;

use crate::builtin::BuiltinFn;
use crate::program::{BindingPoint, BuiltinValue, PipelineStage};
use crate::types::{Type, TypeId, TypeRegistry};

pub use builder::Builder;

// ─── Handles ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub(crate) u32);

macro_rules! impl_handle {
    ($($id:ident => $prefix:literal),*) => {
        $(impl $id {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        })*
    };
}

impl_handle!(ValueId => "%", InstId => "i", BlockId => "$B", FunctionId => "fn");

// ─── Values ───────────────────────────────────────────────────────

/// A scalar constant. Typed by the owning `Value`; a vector-typed
/// constant is the scalar splatted across every component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    /// Already quantized to half precision.
    F16(f32),
}

impl Constant {
    /// The scalar type of the constant.
    pub fn scalar_type(&self, types: &mut TypeRegistry) -> TypeId {
        match self {
            Constant::Bool(_) => types.bool(),
            Constant::I32(_) => types.i32(),
            Constant::U32(_) => types.u32(),
            Constant::F32(_) => types.f32(),
            Constant::F16(_) => types.f16(),
        }
    }

    /// Integer value of an integer constant.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Constant::I32(v) if v >= 0 => Some(v as u64),
            Constant::U32(v) => Some(v as u64),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::I32(v) => write!(f, "{}i", v),
            Constant::U32(v) => write!(f, "{}u", v),
            Constant::F32(v) => write!(f, "{:?}f", v),
            Constant::F16(v) => write!(f, "{:?}h", v),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Constant { value: Constant, ty: TypeId },
    FunctionParam { function: FunctionId, index: u32, ty: TypeId },
    InstructionResult { inst: InstId, ty: TypeId },
}

impl Value {
    pub fn ty(&self) -> TypeId {
        match self {
            Value::Constant { ty, .. }
            | Value::FunctionParam { ty, .. }
            | Value::InstructionResult { ty, .. } => *ty,
        }
    }

    pub fn as_constant(&self) -> Option<Constant> {
        match self {
            Value::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }
}

// ─── Instructions ─────────────────────────────────────────────────

/// Binary operators. Each is its own tag so every consumer matches
/// them exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    // ── Arithmetic ──
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    // ── Bitwise ──
    And,
    Or,
    Xor,
    // ── Comparison ──
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    // ── Shift ──
    ShiftLeft,
    ShiftRight,
}

impl BinaryKind {
    pub const ALL: [BinaryKind; 16] = [
        BinaryKind::Add,
        BinaryKind::Subtract,
        BinaryKind::Multiply,
        BinaryKind::Divide,
        BinaryKind::Modulo,
        BinaryKind::And,
        BinaryKind::Or,
        BinaryKind::Xor,
        BinaryKind::Equal,
        BinaryKind::NotEqual,
        BinaryKind::LessThan,
        BinaryKind::GreaterThan,
        BinaryKind::LessThanEqual,
        BinaryKind::GreaterThanEqual,
        BinaryKind::ShiftLeft,
        BinaryKind::ShiftRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryKind::Add => "add",
            BinaryKind::Subtract => "sub",
            BinaryKind::Multiply => "mul",
            BinaryKind::Divide => "div",
            BinaryKind::Modulo => "mod",
            BinaryKind::And => "and",
            BinaryKind::Or => "or",
            BinaryKind::Xor => "xor",
            BinaryKind::Equal => "eq",
            BinaryKind::NotEqual => "neq",
            BinaryKind::LessThan => "lt",
            BinaryKind::GreaterThan => "gt",
            BinaryKind::LessThanEqual => "lte",
            BinaryKind::GreaterThanEqual => "gte",
            BinaryKind::ShiftLeft => "shl",
            BinaryKind::ShiftRight => "shr",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryKind::Add
                | BinaryKind::Subtract
                | BinaryKind::Multiply
                | BinaryKind::Divide
                | BinaryKind::Modulo
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryKind::And | BinaryKind::Or | BinaryKind::Xor)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryKind::Equal | BinaryKind::NotEqual)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryKind::LessThan
                | BinaryKind::GreaterThan
                | BinaryKind::LessThanEqual
                | BinaryKind::GreaterThanEqual
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryKind::ShiftLeft | BinaryKind::ShiftRight)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryKind {
    Negation,
    Complement,
    Not,
}

impl UnaryKind {
    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Negation => "negation",
            UnaryKind::Complement => "complement",
            UnaryKind::Not => "not",
        }
    }
}

/// Instruction kinds: a closed set, matched exhaustively everywhere.
///
/// Operand layouts:
///   `Var`          [initializer?]          result: pointer
///   `Let`          [value]                 result: value's type
///   `Load`         [pointer]               result: store type
///   `Store`        [pointer, value]
///   `Access`       [base, index+]          result: pointer if base is one
///   `Binary`       [lhs, rhs]
///   `Unary`        [operand]
///   `UserCall`     [args..]                result unless void
///   `BuiltinCall`  [args..]                result unless void
///   `If`           [condition]
///   `ExitIf`       []                      terminator of an `If` block
///   `Return`       [value?]                terminator
///   `Unreachable`  []                      terminator
#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Var { binding: Option<BindingPoint> },
    Let,
    Load,
    Store,
    Access,
    Binary(BinaryKind),
    Unary(UnaryKind),
    UserCall(FunctionId),
    BuiltinCall(BuiltinFn),
    If {
        true_block: BlockId,
        false_block: Option<BlockId>,
    },
    ExitIf,
    Return,
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::ExitIf | InstKind::Return | InstKind::Unreachable)
    }

    /// Short name used by the disassembler and in diagnostics.
    pub fn name(&self) -> String {
        match self {
            InstKind::Var { .. } => "var".to_string(),
            InstKind::Let => "let".to_string(),
            InstKind::Load => "load".to_string(),
            InstKind::Store => "store".to_string(),
            InstKind::Access => "access".to_string(),
            InstKind::Binary(k) => k.name().to_string(),
            InstKind::Unary(k) => k.name().to_string(),
            InstKind::UserCall(_) => "call".to_string(),
            InstKind::BuiltinCall(b) => b.name().to_string(),
            InstKind::If { .. } => "if".to_string(),
            InstKind::ExitIf => "exit_if".to_string(),
            InstKind::Return => "ret".to_string(),
            InstKind::Unreachable => "unreachable".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub kind: InstKind,
    pub operands: Vec<ValueId>,
    pub result: Option<ValueId>,
    pub block: BlockId,
}

// ─── Blocks and functions ─────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub instructions: Vec<InstId>,
    /// Function whose body (directly or through `If`) contains the block.
    pub function: Option<FunctionId>,
    /// The `If` instruction owning this block, for nested blocks.
    pub parent: Option<InstId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub return_type: TypeId,
    pub params: Vec<ValueId>,
    pub param_builtins: Vec<Option<BuiltinValue>>,
    pub block: BlockId,
    pub stage: Option<PipelineStage>,
    pub workgroup_size: Option<[u32; 3]>,
}

impl Function {
    pub fn is_entry_point(&self) -> bool {
        self.stage.is_some()
    }
}

// ─── Module ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Module {
    pub types: TypeRegistry,
    pub(crate) values: Vec<Value>,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) functions: Vec<Function>,
    pub(crate) root_block: BlockId,
    pub(crate) names: HashMap<ValueId, String>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Self {
            types: TypeRegistry::new(),
            values: Vec::new(),
            instructions: Vec::new(),
            blocks: vec![Block::default()],
            functions: Vec::new(),
            root_block: BlockId(0),
            names: HashMap::new(),
        }
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.instructions[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn root_block(&self) -> BlockId {
        self.root_block
    }

    /// Functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        (0..self.functions.len() as u32).map(FunctionId)
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn name(&self, value: ValueId) -> Option<&str> {
        self.names.get(&value).map(|s| s.as_str())
    }

    pub fn type_of(&self, value: ValueId) -> TypeId {
        self.value(value).ty()
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.functions().find(|f| self.function(*f).name == name)
    }

    /// The instruction defining `value`, if it is an instruction result.
    pub fn defining_inst(&self, value: ValueId) -> Option<InstId> {
        match self.value(value) {
            Value::InstructionResult { inst, .. } => Some(*inst),
            _ => None,
        }
    }

    /// The terminator of a block, if it has one in last position.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.block(block)
            .instructions
            .last()
            .copied()
            .filter(|i| self.inst(*i).kind.is_terminator())
    }

    /// The function a block belongs to.
    pub fn function_of(&self, block: BlockId) -> Option<FunctionId> {
        self.block(block).function
    }

    /// User functions called from `function`, in call order, with repeats.
    pub fn callees(&self, function: FunctionId) -> Vec<FunctionId> {
        let mut out = Vec::new();
        self.walk_block(self.function(function).block, &mut |inst| {
            if let InstKind::UserCall(f) = inst.kind {
                out.push(f);
            }
        });
        out
    }

    /// Visit every instruction of a block and its nested blocks, in order.
    pub fn walk_block(&self, block: BlockId, visit: &mut impl FnMut(&Instruction)) {
        for id in &self.block(block).instructions {
            let inst = self.inst(*id);
            visit(inst);
            if let InstKind::If {
                true_block,
                false_block,
            } = inst.kind
            {
                self.walk_block(true_block, visit);
                if let Some(f) = false_block {
                    self.walk_block(f, visit);
                }
            }
        }
    }
}

// ─── Operand type rules ───────────────────────────────────────────
//
// Shared by the builder, which refuses to construct an ill-typed
// instruction, and the validator, which re-checks transform output.

fn same_shape(types: &TypeRegistry, a: TypeId, b: TypeId) -> bool {
    a == b
        || match (&types[a], &types[b]) {
            (Type::Vector { .. }, Type::Vector { .. }) => false,
            (Type::Vector { elem, .. }, _) => *elem == b,
            (_, Type::Vector { elem, .. }) => *elem == a,
            _ => false,
        }
}

/// Result type of `lhs <kind> rhs`, or why the operands are rejected.
pub(crate) fn binary_result(
    types: &mut TypeRegistry,
    kind: BinaryKind,
    lhs: TypeId,
    rhs: TypeId,
) -> Result<TypeId, String> {
    let reject = |types: &TypeRegistry, what: &str| {
        Err(format!(
            "'{}' {} operands, got '{}' and '{}'",
            kind.name(),
            what,
            types.friendly_name(lhs),
            types.friendly_name(rhs)
        ))
    };
    match kind {
        BinaryKind::Add
        | BinaryKind::Subtract
        | BinaryKind::Multiply
        | BinaryKind::Divide
        | BinaryKind::Modulo => {
            if !types.is_numeric(lhs) || !types.is_numeric(rhs) {
                return reject(types, "requires numeric");
            }
            match (types[lhs].clone(), types[rhs].clone()) {
                (
                    Type::Matrix {
                        columns, rows, elem, ..
                    },
                    Type::Vector { width, elem: ve },
                ) if kind == BinaryKind::Multiply && width == columns && elem == ve => {
                    Ok(types.vec(elem, rows))
                }
                (
                    Type::Vector { width, elem: ve },
                    Type::Matrix {
                        columns, rows, elem, ..
                    },
                ) if kind == BinaryKind::Multiply && width == rows && elem == ve => {
                    Ok(types.vec(elem, columns))
                }
                (Type::Matrix { .. }, Type::Matrix { .. }) if lhs == rhs => Ok(lhs),
                (Type::Matrix { .. }, _) | (_, Type::Matrix { .. }) => {
                    reject(types, "requires matching matrix")
                }
                (Type::Vector { .. }, _) if same_shape(types, lhs, rhs) => Ok(lhs),
                (_, Type::Vector { .. }) if same_shape(types, lhs, rhs) => Ok(rhs),
                _ if lhs == rhs => Ok(lhs),
                _ => reject(types, "requires matching"),
            }
        }
        BinaryKind::And | BinaryKind::Or | BinaryKind::Xor => {
            let ok = lhs == rhs
                && (types.is_integer_scalar_or_vector(lhs) || types.is_bool_scalar_or_vector(lhs));
            if ok {
                Ok(lhs)
            } else {
                reject(types, "requires matching integer or bool")
            }
        }
        BinaryKind::Equal | BinaryKind::NotEqual => {
            if lhs == rhs && types.is_equality_comparable(lhs) {
                Ok(types.bool_like(lhs))
            } else {
                reject(types, "requires matching comparable")
            }
        }
        BinaryKind::LessThan
        | BinaryKind::GreaterThan
        | BinaryKind::LessThanEqual
        | BinaryKind::GreaterThanEqual => {
            if lhs == rhs && types.is_ordered(lhs) {
                Ok(types.bool_like(lhs))
            } else {
                reject(types, "requires matching ordered")
            }
        }
        BinaryKind::ShiftLeft | BinaryKind::ShiftRight => {
            let u = types.u32();
            let amount_ok = types.scalar_of(rhs) == Some(u)
                && match (&types[lhs], &types[rhs]) {
                    (Type::Vector { width: a, .. }, Type::Vector { width: b, .. }) => a == b,
                    (Type::Vector { .. }, _) | (_, Type::Vector { .. }) => false,
                    _ => true,
                };
            if types.is_integer_scalar_or_vector(lhs) && amount_ok {
                Ok(lhs)
            } else {
                reject(types, "requires an integer and a matching u32")
            }
        }
    }
}

pub(crate) fn unary_result(types: &TypeRegistry, kind: UnaryKind, operand: TypeId) -> Result<TypeId, String> {
    let ok = match kind {
        UnaryKind::Negation => {
            types.is_numeric(operand)
                && types
                    .scalar_of(operand)
                    .map_or(true, |s| types[s] != Type::U32)
        }
        UnaryKind::Complement => types.is_integer_scalar_or_vector(operand),
        UnaryKind::Not => types.is_bool_scalar_or_vector(operand),
    };
    if ok {
        Ok(operand)
    } else {
        Err(format!(
            "'{}' does not accept '{}'",
            kind.name(),
            types.friendly_name(operand)
        ))
    }
}

/// Result type of an access chain. `indices` carries each index's type
/// and, when the index is a constant, its value.
pub(crate) fn access_result(
    types: &mut TypeRegistry,
    base: TypeId,
    indices: &[(TypeId, Option<u64>)],
) -> Result<TypeId, String> {
    if indices.is_empty() {
        return Err("'access' needs at least one index".to_string());
    }
    let (mut current, pointer) = match types[base] {
        Type::Pointer {
            space,
            access,
            store,
        } => (store, Some((space, access))),
        _ => (base, None),
    };
    for (ty, constant) in indices {
        if !types.is_integer_scalar(*ty) {
            return Err(format!(
                "access index must be an integer, got '{}'",
                types.friendly_name(*ty)
            ));
        }
        current = match types[current].clone() {
            Type::Struct(s) => {
                let i = constant.ok_or_else(|| {
                    format!("struct '{}' must be indexed by a constant", s.name)
                })?;
                s.members
                    .get(i as usize)
                    .map(|m| m.ty)
                    .ok_or_else(|| format!("struct '{}' has no member {}", s.name, i))?
            }
            Type::Array { .. } | Type::Vector { .. } | Type::Matrix { .. } => types
                .element_of(current)
                .ok_or_else(|| "cannot index".to_string())?,
            _ => {
                return Err(format!(
                    "cannot index into '{}'",
                    types.friendly_name(current)
                ))
            }
        };
    }
    Ok(match pointer {
        Some((space, access)) => types.pointer(space, current, access),
        None => current,
    })
}
