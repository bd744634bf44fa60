//! IR builder: validating constructors for every instruction kind.
//!
//! Each constructor checks operand arity and types before touching the
//! module. On failure it returns a diagnostic and appends nothing, so a
//! half-built instruction never exists.

use crate::builtin::BuiltinFn;
use crate::diagnostic::{Diagnostic, System};
use crate::program::sem::builtin_result_type;
use crate::program::{BindingPoint, BuiltinValue, PipelineStage};
use crate::types::{Access, AddressSpace, Type, TypeId, TypeRegistry};

use super::*;

pub struct Builder {
    module: Module,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            module: Module::new(),
        }
    }

    /// Start from an empty module sharing the type registry of `types`.
    pub fn with_types(types: TypeRegistry) -> Self {
        let mut module = Module::new();
        module.types = types;
        Self { module }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn types(&mut self) -> &mut TypeRegistry {
        &mut self.module.types
    }

    pub fn root_block(&self) -> BlockId {
        self.module.root_block
    }

    pub fn finish(self) -> Module {
        self.module
    }

    fn error(message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(System::Ir, message)
    }

    // ── Module structure ──

    pub fn add_block(&mut self, function: Option<FunctionId>, parent: Option<InstId>) -> BlockId {
        let id = BlockId(self.module.blocks.len() as u32);
        self.module.blocks.push(Block {
            instructions: Vec::new(),
            function,
            parent,
        });
        id
    }

    /// Declare a function with an empty entry block.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        return_type: TypeId,
        param_types: &[TypeId],
    ) -> FunctionId {
        let id = FunctionId(self.module.functions.len() as u32);
        let block = self.add_block(Some(id), None);
        let params = param_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                self.push_value(Value::FunctionParam {
                    function: id,
                    index: i as u32,
                    ty: *ty,
                })
            })
            .collect();
        self.module.functions.push(Function {
            name: name.into(),
            return_type,
            params,
            param_builtins: vec![None; param_types.len()],
            block,
            stage: None,
            workgroup_size: None,
        });
        id
    }

    pub fn set_stage(&mut self, function: FunctionId, stage: PipelineStage) {
        self.module.functions[function.index()].stage = Some(stage);
    }

    pub fn set_workgroup_size(&mut self, function: FunctionId, size: [u32; 3]) {
        self.module.functions[function.index()].workgroup_size = Some(size);
    }

    pub fn set_param_builtin(&mut self, function: FunctionId, index: usize, builtin: BuiltinValue) {
        self.module.functions[function.index()].param_builtins[index] = Some(builtin);
    }

    pub fn function_block(&self, function: FunctionId) -> BlockId {
        self.module.function(function).block
    }

    pub fn param(&self, function: FunctionId, index: usize) -> ValueId {
        self.module.function(function).params[index]
    }

    pub fn set_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.module.names.insert(value, name.into());
    }

    // ── Values ──

    fn push_value(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.module.values.len() as u32);
        self.module.values.push(value);
        id
    }

    pub fn constant(&mut self, value: Constant) -> ValueId {
        let ty = value.scalar_type(&mut self.module.types);
        self.push_value(Value::Constant { value, ty })
    }

    /// A constant of vector type with `value` in every component.
    pub fn splat(&mut self, value: Constant, ty: TypeId) -> Result<ValueId, Diagnostic> {
        let scalar = value.scalar_type(&mut self.module.types);
        if self.module.types.scalar_of(ty) != Some(scalar) {
            return Err(Self::error(format!(
                "cannot splat '{}' into '{}'",
                value,
                self.module.types.friendly_name(ty)
            )));
        }
        Ok(self.push_value(Value::Constant { value, ty }))
    }

    fn ty(&self, value: ValueId) -> TypeId {
        self.module.value(value).ty()
    }

    // ── Appending ──

    fn append(
        &mut self,
        block: BlockId,
        kind: InstKind,
        operands: Vec<ValueId>,
        result_type: Option<TypeId>,
    ) -> Result<(InstId, Option<ValueId>), Diagnostic> {
        self.ensure_open(block, &kind)?;
        let inst = InstId(self.module.instructions.len() as u32);
        let result = result_type.map(|ty| self.push_value(Value::InstructionResult { inst, ty }));
        self.module.instructions.push(Instruction {
            kind,
            operands,
            result,
            block,
        });
        self.module.blocks[block.index()].instructions.push(inst);
        Ok((inst, result))
    }

    fn ensure_open(&self, block: BlockId, kind: &InstKind) -> Result<(), Diagnostic> {
        match self.module.terminator(block) {
            Some(term) => Err(Self::error(format!(
                "cannot append '{}' to {}: block already ends in '{}'",
                kind.name(),
                block,
                self.module.inst(term).kind.name()
            ))),
            None => Ok(()),
        }
    }

    fn value_inst(
        &mut self,
        block: BlockId,
        kind: InstKind,
        operands: Vec<ValueId>,
        ty: TypeId,
    ) -> Result<ValueId, Diagnostic> {
        let (inst, result) = self.append(block, kind, operands, Some(ty))?;
        result.ok_or_else(|| {
            Diagnostic::internal(System::Ir, format!("{} produced no result", inst))
        })
    }

    // ── Memory ──

    /// Declare memory holding a `store`; the result is a pointer to it.
    pub fn var(
        &mut self,
        block: BlockId,
        space: AddressSpace,
        store: TypeId,
        access: Access,
        initializer: Option<ValueId>,
        binding: Option<BindingPoint>,
    ) -> Result<ValueId, Diagnostic> {
        if let Some(init) = initializer {
            if self.ty(init) != store {
                return Err(Self::error(format!(
                    "var initializer of type '{}' does not match '{}'",
                    self.module.types.friendly_name(self.ty(init)),
                    self.module.types.friendly_name(store)
                )));
            }
        }
        let ptr = self.module.types.pointer(space, store, access);
        self.value_inst(
            block,
            InstKind::Var { binding },
            initializer.into_iter().collect(),
            ptr,
        )
    }

    pub fn let_(&mut self, block: BlockId, value: ValueId) -> Result<ValueId, Diagnostic> {
        let ty = self.ty(value);
        self.value_inst(block, InstKind::Let, vec![value], ty)
    }

    pub fn load(&mut self, block: BlockId, pointer: ValueId) -> Result<ValueId, Diagnostic> {
        let store = match self.module.types[self.ty(pointer)] {
            Type::Pointer { access, store, .. } if access.can_read() => store,
            _ => {
                return Err(Self::error(format!(
                    "cannot load from '{}'",
                    self.module.types.friendly_name(self.ty(pointer))
                )))
            }
        };
        if matches!(self.module.types[store], Type::Atomic { .. }) {
            return Err(Self::error("atomics can only be read with atomicLoad"));
        }
        self.value_inst(block, InstKind::Load, vec![pointer], store)
    }

    pub fn store(&mut self, block: BlockId, pointer: ValueId, value: ValueId) -> Result<InstId, Diagnostic> {
        let ok = match self.module.types[self.ty(pointer)] {
            Type::Pointer { access, store, .. } => {
                access.can_write()
                    && store == self.ty(value)
                    && !matches!(self.module.types[store], Type::Atomic { .. })
            }
            _ => false,
        };
        if !ok {
            return Err(Self::error(format!(
                "cannot store '{}' through '{}'",
                self.module.types.friendly_name(self.ty(value)),
                self.module.types.friendly_name(self.ty(pointer))
            )));
        }
        Ok(self.append(block, InstKind::Store, vec![pointer, value], None)?.0)
    }

    pub fn access(&mut self, block: BlockId, base: ValueId, indices: &[ValueId]) -> Result<ValueId, Diagnostic> {
        let index_info: Vec<(TypeId, Option<u64>)> = indices
            .iter()
            .map(|i| {
                let v = self.module.value(*i);
                (v.ty(), v.as_constant().and_then(|c| c.as_u64()))
            })
            .collect();
        let base_ty = self.ty(base);
        let ty = access_result(&mut self.module.types, base_ty, &index_info).map_err(Self::error)?;
        let mut operands = vec![base];
        operands.extend_from_slice(indices);
        self.value_inst(block, InstKind::Access, operands, ty)
    }

    // ── Arithmetic ──

    pub fn binary(&mut self, block: BlockId, kind: BinaryKind, lhs: ValueId, rhs: ValueId) -> Result<ValueId, Diagnostic> {
        let (l, r) = (self.ty(lhs), self.ty(rhs));
        let ty = binary_result(&mut self.module.types, kind, l, r).map_err(Self::error)?;
        self.value_inst(block, InstKind::Binary(kind), vec![lhs, rhs], ty)
    }

    pub fn unary(&mut self, block: BlockId, kind: UnaryKind, operand: ValueId) -> Result<ValueId, Diagnostic> {
        let ty = unary_result(&self.module.types, kind, self.ty(operand)).map_err(Self::error)?;
        self.value_inst(block, InstKind::Unary(kind), vec![operand], ty)
    }

    // ── Calls ──

    /// Call a user function. Returns the result value unless the callee is void.
    pub fn call(&mut self, block: BlockId, function: FunctionId, args: Vec<ValueId>) -> Result<Option<ValueId>, Diagnostic> {
        let callee = self.module.function(function);
        let expected: Vec<TypeId> = callee.params.iter().map(|p| self.ty(*p)).collect();
        let actual: Vec<TypeId> = args.iter().map(|a| self.ty(*a)).collect();
        if expected != actual {
            return Err(Self::error(format!(
                "call to '{}' expects {} argument(s) of matching type",
                callee.name,
                expected.len()
            )));
        }
        let ret = callee.return_type;
        let result_type = (self.module.types[ret] != Type::Void).then_some(ret);
        Ok(self.append(block, InstKind::UserCall(function), args, result_type)?.1)
    }

    pub fn call_builtin(&mut self, block: BlockId, builtin: BuiltinFn, args: Vec<ValueId>) -> Result<Option<ValueId>, Diagnostic> {
        let arg_types: Vec<TypeId> = args.iter().map(|a| self.ty(*a)).collect();
        let ret = builtin_result_type(&mut self.module.types, builtin, &arg_types).map_err(Self::error)?;
        let result_type = (self.module.types[ret] != Type::Void).then_some(ret);
        Ok(self.append(block, InstKind::BuiltinCall(builtin), args, result_type)?.1)
    }

    // ── Control flow ──

    /// Append an `If`; returns it with its true and (optional) false blocks.
    pub fn if_(
        &mut self,
        block: BlockId,
        condition: ValueId,
        with_false: bool,
    ) -> Result<(InstId, BlockId, Option<BlockId>), Diagnostic> {
        if self.module.types[self.ty(condition)] != Type::Bool {
            return Err(Self::error(format!(
                "if condition must be 'bool', got '{}'",
                self.module.types.friendly_name(self.ty(condition))
            )));
        }
        let function = self.module.block(block).function;
        if function.is_none() {
            return Err(Self::error("'if' is not allowed at module scope"));
        }
        // Blocks are created before the instruction that names them, so
        // rule out every failure first.
        let placeholder = InstKind::If {
            true_block: block,
            false_block: None,
        };
        self.ensure_open(block, &placeholder)?;
        let next_inst = InstId(self.module.instructions.len() as u32);
        let true_block = self.add_block(function, Some(next_inst));
        let false_block = with_false.then(|| self.add_block(function, Some(next_inst)));
        let (inst, _) = self.append(
            block,
            InstKind::If {
                true_block,
                false_block,
            },
            vec![condition],
            None,
        )?;
        Ok((inst, true_block, false_block))
    }

    pub fn exit_if(&mut self, block: BlockId) -> Result<InstId, Diagnostic> {
        if self.module.block(block).parent.is_none() {
            return Err(Self::error("'exit_if' outside of an 'if' block"));
        }
        Ok(self.append(block, InstKind::ExitIf, Vec::new(), None)?.0)
    }

    pub fn return_(&mut self, block: BlockId, value: Option<ValueId>) -> Result<InstId, Diagnostic> {
        let function = self
            .module
            .block(block)
            .function
            .ok_or_else(|| Self::error("'ret' is not allowed at module scope"))?;
        let expected = self.module.function(function).return_type;
        let ok = match value {
            Some(v) => self.ty(v) == expected,
            None => self.module.types[expected] == Type::Void,
        };
        if !ok {
            return Err(Self::error(format!(
                "return value does not match return type '{}' of '{}'",
                self.module.types.friendly_name(expected),
                self.module.function(function).name
            )));
        }
        Ok(self.append(block, InstKind::Return, value.into_iter().collect(), None)?.0)
    }

    pub fn unreachable(&mut self, block: BlockId) -> Result<InstId, Diagnostic> {
        Ok(self.append(block, InstKind::Unreachable, Vec::new(), None)?.0)
    }
}
