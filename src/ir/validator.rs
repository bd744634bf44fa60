//! IR validator: checks the structural invariants of a module.
//!
//! Run before emission and after IR transforms. The builder already
//! refuses ill-formed instructions, but transforms may assemble a module
//! from pieces, so everything is re-checked here from scratch.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::diagnostic::{Diagnostic, System};
use crate::program::sem::builtin_result_type;
use crate::types::{Type, TypeId, TypeRegistry};

use super::disassembler::disassemble;
use super::*;

/// Environment variable that makes `validate_and_dump_if_needed` print
/// the module to stderr.
pub const DUMP_ENV: &str = "GLINT_DUMP_IR";

/// Check every invariant; returns all violations found.
pub fn validate(module: &Module) -> Result<(), Vec<Diagnostic>> {
    let mut v = Validator {
        module,
        types: module.types.clone(),
        errors: Vec::new(),
        owners: HashMap::new(),
        scopes: Vec::new(),
    };
    v.check_root();
    for f in module.functions() {
        v.check_function(f);
    }
    v.check_call_graph();
    if v.errors.is_empty() {
        Ok(())
    } else {
        Err(v.errors)
    }
}

/// `validate`, dumping the disassembly first when `GLINT_DUMP_IR` is set.
pub fn validate_and_dump_if_needed(module: &Module, msg: &str) -> Result<(), Vec<Diagnostic>> {
    if std::env::var_os(DUMP_ENV).is_some() {
        eprintln!("=== IR after {} ===\n{}", msg, disassemble(module));
    }
    validate(module)
}

/// Functions ordered so that every callee precedes its callers.
/// Fails if the call graph has a cycle.
pub fn callee_first_order(module: &Module) -> Result<Vec<FunctionId>, FunctionId> {
    let mut graph: DiGraph<FunctionId, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = module.functions().map(|f| graph.add_node(f)).collect();
    for f in module.functions() {
        for callee in module.callees(f) {
            if let Some(to) = nodes.get(callee.index()) {
                graph.update_edge(*to, nodes[f.index()], ());
            }
        }
    }
    toposort(&graph, None).map_err(|cycle| graph[cycle.node_id()])?;

    // Among the functions whose callees are all placed, take the one declared first.
    let mut placed = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(f) = module.functions().find(|f| {
        !placed[f.index()]
            && graph
                .neighbors_directed(nodes[f.index()], Direction::Incoming)
                .all(|callee| placed[graph[callee].index()])
    }) {
        placed[f.index()] = true;
        order.push(f);
    }
    Ok(order)
}

struct Validator<'a> {
    module: &'a Module,
    /// Scratch registry for result-type checks that intern new types.
    types: TypeRegistry,
    errors: Vec<Diagnostic>,
    owners: HashMap<ValueId, InstId>,
    /// Values visible at the current point, one set per open block.
    scopes: Vec<HashSet<ValueId>>,
}

impl Validator<'_> {
    fn error(&mut self, inst: Option<InstId>, message: String) {
        let mut d = Diagnostic::error(System::Validator, message);
        if let Some(i) = inst {
            d = d.with_note(format!("in instruction {} ('{}')", i, self.module.inst(i).kind.name()));
        }
        self.errors.push(d);
    }

    fn friendly(&self, ty: TypeId) -> String {
        self.types.friendly_name(ty)
    }

    fn is_visible(&self, value: ValueId) -> bool {
        self.scopes.iter().any(|s| s.contains(&value))
    }

    fn define(&mut self, value: ValueId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(value);
        }
    }

    // ── Blocks ──

    fn check_root(&mut self) {
        let module = self.module;
        let root = module.root_block();
        self.scopes.push(HashSet::new());
        for &id in &module.block(root).instructions {
            let kind = &module.inst(id).kind;
            if !matches!(kind, InstKind::Var { .. } | InstKind::Let) {
                let name = kind.name();
                self.error(Some(id), format!("'{}' is not allowed at module scope", name));
            }
            self.check_inst(id, root);
        }
        // The root scope stays open: module-scope values are visible everywhere.
    }

    fn check_function(&mut self, function: FunctionId) {
        let module = self.module;
        let f = module.function(function);
        let mut params = HashSet::new();
        for (i, p) in f.params.iter().enumerate() {
            let ok = matches!(
                module.value(*p),
                Value::FunctionParam { function: owner, index, .. }
                    if *owner == function && *index as usize == i
            );
            if !ok {
                self.error(None, format!("parameter {} of '{}' is not owned by it", i, f.name));
            }
            params.insert(*p);
        }
        self.scopes.push(params);
        self.check_block(f.block, function);
        self.scopes.pop();
    }

    fn check_block(&mut self, block: BlockId, function: FunctionId) {
        let module = self.module;
        let b = module.block(block);
        if b.function != Some(function) {
            self.error(
                None,
                format!("{} is not owned by '{}'", block, module.function(function).name),
            );
        }
        let instructions = &b.instructions;
        match instructions.last() {
            Some(last) if module.inst(*last).kind.is_terminator() => {}
            _ => self.error(None, format!("{} does not end in a terminator", block)),
        }
        self.scopes.push(HashSet::new());
        for (pos, id) in instructions.iter().enumerate() {
            let inst = module.inst(*id);
            if inst.block != block {
                self.error(Some(*id), format!("instruction is listed in {} but claims {}", block, inst.block));
            }
            if inst.kind.is_terminator() && pos + 1 != instructions.len() {
                self.error(Some(*id), "terminator is not the last instruction of its block".to_string());
            }
            self.check_inst(*id, block);
            if let InstKind::If {
                true_block,
                false_block,
            } = inst.kind
            {
                for nested in std::iter::once(true_block).chain(false_block) {
                    if module.block(nested).parent != Some(*id) {
                        self.error(Some(*id), format!("{} is not owned by this 'if'", nested));
                    }
                    self.check_block(nested, function);
                }
            }
        }
        self.scopes.pop();
    }

    // ── Instructions ──

    fn check_inst(&mut self, id: InstId, block: BlockId) {
        let module = self.module;
        let inst = module.inst(id).clone();

        for op in &inst.operands {
            if op.index() >= module.values.len() {
                self.error(Some(id), format!("operand {} does not exist", op));
                return;
            }
            let visible = matches!(module.value(*op), Value::Constant { .. }) || self.is_visible(*op);
            if !visible {
                self.error(Some(id), format!("operand {} is not defined before this use", op));
            }
        }

        if let Some(result) = inst.result {
            match module.value(result) {
                Value::InstructionResult { inst: owner, .. } if *owner == id => {}
                _ => self.error(Some(id), format!("result {} is not owned by this instruction", result)),
            }
            if let Some(previous) = self.owners.insert(result, id) {
                self.error(Some(id), format!("result {} is also produced by {}", result, previous));
            }
        }

        let arity_ok = match &inst.kind {
            InstKind::Var { .. } | InstKind::Return => inst.operands.len() <= 1,
            InstKind::Let | InstKind::Load | InstKind::Unary(_) | InstKind::If { .. } => {
                inst.operands.len() == 1
            }
            InstKind::Store | InstKind::Binary(_) => inst.operands.len() == 2,
            InstKind::Access => inst.operands.len() >= 2,
            InstKind::UserCall(f) => {
                f.index() < module.functions.len()
                    && inst.operands.len() == module.function(*f).params.len()
            }
            InstKind::BuiltinCall(_) => true,
            InstKind::ExitIf | InstKind::Unreachable => inst.operands.is_empty(),
        };
        if !arity_ok {
            self.error(
                Some(id),
                format!("'{}' has {} operand(s)", inst.kind.name(), inst.operands.len()),
            );
            return;
        }

        self.check_types(id, &inst, block);

        if let Some(result) = inst.result {
            self.define(result);
        }
    }

    fn check_types(&mut self, id: InstId, inst: &Instruction, block: BlockId) {
        let ty = |v: &ValueId| self.module.value(*v).ty();
        let operand_types: Vec<TypeId> = inst.operands.iter().map(ty).collect();
        let result_type = inst.result.map(|r| self.module.value(r).ty());

        let expected: Result<Option<TypeId>, String> = match &inst.kind {
            InstKind::Var { .. } => match (result_type.map(|r| self.types[r].clone()), operand_types.first()) {
                (Some(Type::Pointer { store, .. }), Some(init)) if store != *init => {
                    Err(format!("initializer '{}' does not match '{}'", self.friendly(*init), self.friendly(store)))
                }
                (Some(Type::Pointer { .. }), _) => Ok(result_type),
                _ => Err("'var' must produce a pointer".to_string()),
            },
            InstKind::Let => Ok(Some(operand_types[0])),
            InstKind::Load => match self.types[operand_types[0]].clone() {
                Type::Pointer { store, .. } if matches!(self.types[store], Type::Atomic { .. }) => {
                    Err("atomics can only be read with atomicLoad".to_string())
                }
                Type::Pointer { store, access, .. } if access.can_read() => Ok(Some(store)),
                _ => Err(format!("cannot load from '{}'", self.friendly(operand_types[0]))),
            },
            InstKind::Store => match self.types[operand_types[0]].clone() {
                Type::Pointer { store, .. } if matches!(self.types[store], Type::Atomic { .. }) => {
                    Err("atomics can only be written with atomicStore".to_string())
                }
                Type::Pointer { store, access, .. } if access.can_write() && store == operand_types[1] => Ok(None),
                _ => Err(format!(
                    "cannot store '{}' through '{}'",
                    self.friendly(operand_types[1]),
                    self.friendly(operand_types[0])
                )),
            },
            InstKind::Access => {
                let indices: Vec<(TypeId, Option<u64>)> = inst.operands[1..]
                    .iter()
                    .map(|v| {
                        let value = self.module.value(*v);
                        (value.ty(), value.as_constant().and_then(|c| c.as_u64()))
                    })
                    .collect();
                access_result(&mut self.types, operand_types[0], &indices).map(Some)
            }
            InstKind::Binary(kind) => {
                binary_result(&mut self.types, *kind, operand_types[0], operand_types[1]).map(Some)
            }
            InstKind::Unary(kind) => unary_result(&self.types, *kind, operand_types[0]).map(Some),
            InstKind::UserCall(f) => {
                let callee = self.module.function(*f);
                let params: Vec<TypeId> = callee.params.iter().map(ty).collect();
                if params != operand_types {
                    Err(format!("arguments do not match the parameters of '{}'", callee.name))
                } else {
                    Ok(self.non_void(callee.return_type))
                }
            }
            InstKind::BuiltinCall(b) => {
                builtin_result_type(&mut self.types, *b, &operand_types).map(|t| self.non_void(t))
            }
            InstKind::If { .. } => {
                if self.types[operand_types[0]] == Type::Bool {
                    Ok(None)
                } else {
                    Err("if condition must be 'bool'".to_string())
                }
            }
            InstKind::ExitIf => {
                if self.module.block(block).parent.is_some() {
                    Ok(None)
                } else {
                    Err("'exit_if' outside of an 'if' block".to_string())
                }
            }
            InstKind::Return => {
                let function = self.module.block(block).function;
                match function {
                    Some(f) => {
                        let ret = self.module.function(f).return_type;
                        let ok = match operand_types.first() {
                            Some(t) => *t == ret,
                            None => self.types[ret] == Type::Void,
                        };
                        if ok {
                            Ok(None)
                        } else {
                            Err(format!("return value does not match '{}'", self.friendly(ret)))
                        }
                    }
                    None => Err("'ret' outside of a function".to_string()),
                }
            }
            InstKind::Unreachable => Ok(None),
        };

        match expected {
            Ok(expected) if expected == result_type => {}
            Ok(expected) => {
                let show = |t: Option<TypeId>| t.map_or("nothing".to_string(), |t| self.friendly(t));
                let message = format!(
                    "result type is {} but operands give {}",
                    show(result_type),
                    show(expected)
                );
                self.error(Some(id), message);
            }
            Err(message) => self.error(Some(id), message),
        }
    }

    fn non_void(&self, ty: TypeId) -> Option<TypeId> {
        (self.types[ty] != Type::Void).then_some(ty)
    }

    // ── Module ──

    fn check_call_graph(&mut self) {
        if let Err(f) = callee_first_order(self.module) {
            let name = self.module.function(f).name.clone();
            self.errors.push(
                Diagnostic::error(System::Validator, format!("recursive call involving '{}'", name))
                    .with_help("the call graph of a shader must be acyclic"),
            );
        }
    }
}
