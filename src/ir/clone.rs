//! Node-by-node copy of a module with per-instruction substitution.
//!
//! The destination starts from the source's type registry, so type ids
//! carry over unchanged. Values, instructions and blocks are re-created
//! through the validating `Builder` in source order; a registered
//! substitution builds replacement instructions in place of the original
//! and returns the value that stands in for its result.

use std::collections::HashMap;

use crate::diagnostic::{Diagnostic, System};

use super::*;

type Substitution<'a> =
    Box<dyn FnOnce(&mut CloneContext<'a>, BlockId, Vec<ValueId>) -> Result<Option<ValueId>, Diagnostic> + 'a>;

pub struct CloneContext<'a> {
    pub src: &'a Module,
    pub dst: Builder,
    values: HashMap<ValueId, ValueId>,
    functions: HashMap<FunctionId, FunctionId>,
    substitutions: HashMap<InstId, Substitution<'a>>,
}

impl<'a> CloneContext<'a> {
    pub fn new(src: &'a Module) -> Self {
        Self {
            src,
            dst: Builder::with_types(src.types.clone()),
            values: HashMap::new(),
            functions: HashMap::new(),
            substitutions: HashMap::new(),
        }
    }

    /// Replace `inst`. The closure receives the destination block and the
    /// already-mapped operands, appends whatever it needs, and returns the
    /// value that replaces the original result.
    pub fn substitute(
        &mut self,
        inst: InstId,
        f: impl FnOnce(&mut CloneContext<'a>, BlockId, Vec<ValueId>) -> Result<Option<ValueId>, Diagnostic> + 'a,
    ) {
        self.substitutions.insert(inst, Box::new(f));
    }

    /// The destination value standing in for a source value.
    pub fn map_value(&mut self, value: ValueId) -> Result<ValueId, Diagnostic> {
        if let Some(mapped) = self.values.get(&value) {
            return Ok(*mapped);
        }
        match self.src.value(value) {
            Value::Constant { value: c, ty } => {
                let (c, ty) = (*c, *ty);
                let mapped = if self.src.types.scalar_of(ty) == Some(ty) {
                    self.dst.constant(c)
                } else {
                    self.dst.splat(c, ty)?
                };
                self.values.insert(value, mapped);
                Ok(mapped)
            }
            _ => Err(Diagnostic::internal(
                System::Ir,
                format!("{} used before its definition was cloned", value),
            )),
        }
    }

    fn map_result(&mut self, src: Option<ValueId>, dst: Option<ValueId>) {
        if let (Some(s), Some(d)) = (src, dst) {
            if let Some(name) = self.src.name(s) {
                let name = name.to_string();
                self.dst.set_name(d, name);
            }
            self.values.insert(s, d);
        }
    }

    /// Clone the whole module.
    pub fn finish(mut self) -> Result<Module, Vec<Diagnostic>> {
        let src = self.src;
        for f in src.functions() {
            let function = src.function(f);
            let param_types: Vec<TypeId> = function.params.iter().map(|p| src.type_of(*p)).collect();
            let id = self.dst.add_function(&function.name, function.return_type, &param_types);
            if let Some(stage) = function.stage {
                self.dst.set_stage(id, stage);
            }
            if let Some(size) = function.workgroup_size {
                self.dst.set_workgroup_size(id, size);
            }
            for (i, p) in function.params.iter().enumerate() {
                let param = self.dst.param(id, i);
                self.map_result(Some(*p), Some(param));
                if let Some(b) = function.param_builtins[i] {
                    self.dst.set_param_builtin(id, i, b);
                }
            }
            self.functions.insert(f, id);
        }

        let root = self.dst.root_block();
        self.block(src.root_block(), root).map_err(|e| vec![e])?;
        for f in src.functions() {
            let dst_block = self.dst.function_block(self.functions[&f]);
            self.block(src.function(f).block, dst_block).map_err(|e| vec![e])?;
        }
        Ok(self.dst.finish())
    }

    fn block(&mut self, src_block: BlockId, dst_block: BlockId) -> Result<(), Diagnostic> {
        let src = self.src;
        for id in &src.block(src_block).instructions {
            self.inst(*id, dst_block)?;
        }
        Ok(())
    }

    fn inst(&mut self, id: InstId, block: BlockId) -> Result<(), Diagnostic> {
        let src = self.src;
        let inst = src.inst(id);
        let mut operands = Vec::with_capacity(inst.operands.len());
        for op in &inst.operands {
            operands.push(self.map_value(*op)?);
        }

        if let Some(substitute) = self.substitutions.remove(&id) {
            let result = substitute(self, block, operands)?;
            self.map_result(inst.result, result);
            return Ok(());
        }

        let result = match &inst.kind {
            InstKind::Var { binding } => {
                let (space, access, store) = match src.types[src.type_of(inst.result.ok_or_else(no_result)?)] {
                    crate::types::Type::Pointer {
                        space,
                        access,
                        store,
                    } => (space, access, store),
                    _ => return Err(Diagnostic::internal(System::Ir, "var without a pointer type")),
                };
                Some(self.dst.var(block, space, store, access, operands.first().copied(), *binding)?)
            }
            InstKind::Let => Some(self.dst.let_(block, operands[0])?),
            InstKind::Load => Some(self.dst.load(block, operands[0])?),
            InstKind::Store => {
                self.dst.store(block, operands[0], operands[1])?;
                None
            }
            InstKind::Access => Some(self.dst.access(block, operands[0], &operands[1..])?),
            InstKind::Binary(kind) => Some(self.dst.binary(block, *kind, operands[0], operands[1])?),
            InstKind::Unary(kind) => Some(self.dst.unary(block, *kind, operands[0])?),
            InstKind::UserCall(f) => {
                let callee = self.functions[f];
                self.dst.call(block, callee, operands)?
            }
            InstKind::BuiltinCall(b) => self.dst.call_builtin(block, *b, operands)?,
            InstKind::If {
                true_block,
                false_block,
            } => {
                let (_, t, f) = self.dst.if_(block, operands[0], false_block.is_some())?;
                self.block(*true_block, t)?;
                if let (Some(src_f), Some(dst_f)) = (false_block, f) {
                    self.block(*src_f, dst_f)?;
                }
                None
            }
            InstKind::ExitIf => {
                self.dst.exit_if(block)?;
                None
            }
            InstKind::Return => {
                self.dst.return_(block, operands.first().copied())?;
                None
            }
            InstKind::Unreachable => {
                self.dst.unreachable(block)?;
                None
            }
        };
        self.map_result(inst.result, result);
        Ok(())
    }
}

fn no_result() -> Diagnostic {
    Diagnostic::internal(System::Ir, "value-producing instruction without a result")
}
