//! Backend emission: prints a validated IR module as shading-language text.
//!
//! `Printer` owns the walk over the module and everything dialects share:
//! validation, callee-first ordering, naming, expression inlining and the
//! statement layout. A `Backend` supplies the spelling. Hooks return
//! `Option`; `None` means the dialect has no way to express the construct,
//! and the printer turns it into a fatal "unhandled case" diagnostic
//! instead of emitting something wrong.
//!
//! Expression inlining: a value used exactly once is kept as pending text
//! and substituted into its user instead of getting its own `let`. Pending
//! text is flushed into declarations before anything with side effects,
//! so a load is never moved across a store or a call. A call result is
//! only inlined into the instruction right after it.
//!
//! A builtin the dialect cannot spell as an expression may still be
//! printed as statements through `Backend::builtin_statements`; its
//! result then lives in a declared variable.

mod glsl;
mod hlsl;
mod msl;
pub mod text;
mod wgsl;
#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::builtin::BuiltinFn;
use crate::config::target::{Dialect, Target, Version};
use crate::diagnostic::{Diagnostic, System};
use crate::ir::validator::{callee_first_order, validate};
use crate::ir::{
    BinaryKind, BlockId, Constant, FunctionId, InstId, InstKind, Instruction, Module, UnaryKind,
    Value, ValueId,
};
use crate::program::{BindingPoint, BuiltinValue, PipelineStage};
use crate::types::{Access, AddressSpace, StructType, Type, TypeId, TypeRegistry};

pub use glsl::GlslBackend;
pub use hlsl::HlslBackend;
pub use msl::MslBackend;
pub use text::TextBuffer;
pub use wgsl::WgslBackend;

/// Print `module` for `target`.
pub fn generate(module: &Module, target: &Target) -> Result<String, Vec<Diagnostic>> {
    match target.dialect {
        Dialect::Glsl => print(module, GlslBackend::desktop(), &target.version),
        Dialect::GlslEs => print(module, GlslBackend::es(), &target.version),
        Dialect::Hlsl => print(module, HlslBackend, &target.version),
        Dialect::Msl => print(module, MslBackend, &target.version),
        Dialect::Wgsl => print(module, WgslBackend, &target.version),
    }
}

fn print<B: Backend>(module: &Module, backend: B, version: &Version) -> Result<String, Vec<Diagnostic>> {
    let mut printer = Printer::new(module, backend);
    printer.generate(version)?;
    Ok(printer.result())
}

// ─── Backend hooks ────────────────────────────────────────────────

/// A module-scope variable as the backend sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalVar {
    pub name: String,
    pub space: AddressSpace,
    pub access: Access,
    pub store: TypeId,
    pub binding: Option<BindingPoint>,
    pub initializer: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
    pub builtin: Option<BuiltinValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionHeader {
    pub name: String,
    pub return_type: TypeId,
    pub params: Vec<Param>,
    pub stage: Option<PipelineStage>,
    pub workgroup_size: Option<[u32; 3]>,
    /// Module-scope variables the function body refers to directly.
    pub globals: Vec<GlobalVar>,
}

impl FunctionHeader {
    pub fn is_entry_point(&self) -> bool {
        self.stage.is_some()
    }
}

/// A printed operand and its IR type.
#[derive(Clone, Debug, PartialEq)]
pub struct Operand {
    pub text: String,
    pub ty: TypeId,
}

/// Per-dialect spelling. Everything returning `Option` may be a
/// capability gap of the dialect.
pub trait Backend {
    /// Dialect name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Header lines: version directives, includes, precision statements.
    fn preamble(&self, version: &Version) -> Vec<String>;

    fn type_name(&self, types: &TypeRegistry, ty: TypeId) -> Option<String>;

    /// `name` declared with type `ty`, without a terminator.
    fn declaration(&self, types: &TypeRegistry, ty: TypeId, name: &str) -> Option<String>;

    /// Builtin result structures (named `__...`) are declared by the dialect itself.
    fn predeclares_builtin_structs(&self) -> bool {
        false
    }

    fn struct_decl(&self, types: &TypeRegistry, s: &StructType) -> Option<Vec<String>> {
        let mut lines = vec![format!("struct {} {{", struct_name(s))];
        for m in &s.members {
            lines.push(format!("  {};", self.declaration(types, m.ty, &m.name)?));
        }
        lines.push("};".to_string());
        Some(lines)
    }

    fn global_var(&self, types: &TypeRegistry, var: &GlobalVar) -> Option<Vec<String>>;

    /// How function bodies refer to a module-scope variable.
    fn global_ref(&self, var: &GlobalVar) -> String {
        var.name.clone()
    }

    fn module_const(&self, types: &TypeRegistry, ty: TypeId, name: &str, value: &str) -> Option<String> {
        Some(format!("const {} = {};", self.declaration(types, ty, name)?, value))
    }

    /// Header lines of a function, the last one opening its body.
    fn function_header(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>>;

    /// Statements placed before the first instruction of the body.
    fn function_prologue(&self, _types: &TypeRegistry, _header: &FunctionHeader) -> Option<Vec<String>> {
        Some(Vec::new())
    }

    fn local_var(&self, types: &TypeRegistry, ty: TypeId, name: &str, init: Option<&str>) -> Option<String> {
        let decl = self.declaration(types, ty, name)?;
        Some(match init {
            Some(init) => format!("{} = {};", decl, init),
            None => format!("{};", decl),
        })
    }

    fn let_decl(&self, types: &TypeRegistry, ty: TypeId, name: &str, value: &str) -> Option<String> {
        Some(format!("{} = {};", self.declaration(types, ty, name)?, value))
    }

    fn constant(&self, types: &TypeRegistry, value: Constant, ty: TypeId) -> Option<String>;

    fn binary(&self, types: &TypeRegistry, kind: BinaryKind, lhs: &Operand, rhs: &Operand) -> Option<String>;

    fn unary(&self, types: &TypeRegistry, kind: UnaryKind, operand: &Operand) -> Option<String> {
        let _ = types;
        let token = match kind {
            UnaryKind::Negation => "-",
            UnaryKind::Complement => "~",
            UnaryKind::Not => "!",
        };
        Some(format!("{}{}", token, wrap(&operand.text)))
    }

    fn builtin_call(&self, types: &TypeRegistry, builtin: BuiltinFn, args: &[Operand]) -> Option<String>;

    /// Statements for a builtin with no expression form. They declare
    /// `result` and leave the call's value in it; `result_ty` is `None`
    /// for void builtins, where `result` is free for a scratch variable.
    /// Arguments are plain names or literals unless they are pointers.
    fn builtin_statements(
        &self,
        _types: &TypeRegistry,
        _builtin: BuiltinFn,
        _args: &[Operand],
        _result: &str,
        _result_ty: Option<TypeId>,
    ) -> Option<Vec<String>> {
        None
    }

    /// A pointer passed as an argument, given the memory it points at.
    fn pointer_arg(&self, reference: &str) -> String {
        match reference.strip_prefix("(*").and_then(|r| r.strip_suffix(')')) {
            Some(pointer) => pointer.to_string(),
            None => format!("&{}", reference),
        }
    }

    /// The memory a pointer parameter points at.
    fn pointer_param_ref(&self, name: &str) -> String {
        format!("(*{})", name)
    }

    fn unreachable(&self) -> String {
        "/* unreachable */".to_string()
    }
}

// ── Shared spelling helpers ──

pub(crate) fn operator(kind: BinaryKind) -> &'static str {
    match kind {
        BinaryKind::Add => "+",
        BinaryKind::Subtract => "-",
        BinaryKind::Multiply => "*",
        BinaryKind::Divide => "/",
        BinaryKind::Modulo => "%",
        BinaryKind::And => "&",
        BinaryKind::Or => "|",
        BinaryKind::Xor => "^",
        BinaryKind::Equal => "==",
        BinaryKind::NotEqual => "!=",
        BinaryKind::LessThan => "<",
        BinaryKind::GreaterThan => ">",
        BinaryKind::LessThanEqual => "<=",
        BinaryKind::GreaterThanEqual => ">=",
        BinaryKind::ShiftLeft => "<<",
        BinaryKind::ShiftRight => ">>",
    }
}

pub(crate) fn infix(lhs: &Operand, token: &str, rhs: &Operand) -> String {
    format!("({} {} {})", lhs.text, token, rhs.text)
}

/// A name, a member of one, or an unsigned number.
pub(crate) fn is_plain(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Parenthesize `text` unless it is plain or already enclosed.
pub(crate) fn wrap(text: &str) -> String {
    if is_plain(text) || bare(text).len() < text.len() {
        text.to_string()
    } else {
        format!("({})", text)
    }
}

/// `text` without one pair of enclosing parentheses, if it has them.
pub(crate) fn bare(text: &str) -> &str {
    let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
        return text;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return text;
        }
    }
    inner
}

/// A C-family `int` literal; `INT_MIN` has no literal spelling.
pub(crate) fn c_int(v: i32) -> String {
    if v == i32::MIN {
        "(-2147483647 - 1)".to_string()
    } else {
        v.to_string()
    }
}

/// A float literal, falling back to a bit cast for infinities and NaNs.
pub(crate) fn float_text(v: f32, suffix: &str, bitcast: &str) -> String {
    if v.is_finite() {
        format!("{:?}{}", v, suffix)
    } else {
        format!("{}(0x{:08x}u)", bitcast, v.to_bits())
    }
}

/// How a struct is spelled: builtin result structures lose their reserved prefix.
pub(crate) fn struct_name(s: &StructType) -> &str {
    s.name.strip_prefix("__").unwrap_or(&s.name)
}

pub(crate) fn is_vector(types: &TypeRegistry, ty: TypeId) -> bool {
    matches!(types[ty], Type::Vector { .. })
}

/// Value type of the atomic a builtin's pointer argument refers to.
pub(crate) fn atomic_inner(types: &TypeRegistry, pointer: TypeId) -> Option<&Type> {
    let store = types.store_type(pointer)?;
    match types[store] {
        Type::Atomic { inner } => Some(&types[inner]),
        _ => None,
    }
}

// ─── Printer ──────────────────────────────────────────────────────

/// Where the printer is in its walk over the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Preamble,
    ModuleScope,
    FunctionHeader,
    FunctionBody,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Preamble => "preamble",
            Stage::ModuleScope => "module scope",
            Stage::FunctionHeader => "function header",
            Stage::FunctionBody => "function body",
            Stage::Done => "done",
        })
    }
}

struct Pending {
    value: ValueId,
    expr: String,
    /// The text contains a call.
    has_call: bool,
}

/// Names visible while printing; reset to the module-scope snapshot for each function.
#[derive(Default)]
struct Scope {
    /// Pointer values mapped to the memory they point at.
    refs: HashMap<ValueId, String>,
    names: HashMap<ValueId, String>,
    taken: HashSet<String>,
    uses: HashMap<ValueId, usize>,
    pending: Vec<Pending>,
    consumed_call: bool,
}

impl Scope {
    fn for_function(&self) -> Scope {
        Scope {
            refs: self.refs.clone(),
            names: self.names.clone(),
            taken: self.taken.clone(),
            ..Scope::default()
        }
    }
}

pub struct Printer<'m, B: Backend> {
    module: &'m Module,
    backend: B,
    out: TextBuffer,
    stage: Stage,
    globals: Vec<(ValueId, GlobalVar)>,
    module_scope: Scope,
    scope: Scope,
}

impl<'m, B: Backend> Printer<'m, B> {
    pub fn new(module: &'m Module, backend: B) -> Self {
        Self {
            module,
            backend,
            out: TextBuffer::new(),
            stage: Stage::Preamble,
            globals: Vec::new(),
            module_scope: Scope::default(),
            scope: Scope::default(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Print the whole module. Validator failures are returned as they are;
    /// nothing is printed for an invalid module.
    pub fn generate(&mut self, version: &Version) -> Result<(), Vec<Diagnostic>> {
        self.out = TextBuffer::new();
        self.globals.clear();
        self.scope = Scope::default();
        self.stage = Stage::Preamble;

        validate(self.module)?;
        let module = self.module;
        let order = callee_first_order(module).map_err(|f| {
            vec![Diagnostic::internal(
                System::Writer,
                format!("'{}' is part of a call cycle", module.function(f).name),
            )]
        })?;

        let preamble = self.backend.preamble(version);
        self.out.lines(preamble);
        self.out.blank();

        self.stage = Stage::ModuleScope;
        let mut errors = self.module_decls();
        self.module_scope = std::mem::take(&mut self.scope);

        for f in order {
            if let Err(e) = self.function(f) {
                errors.push(e.with_note(format!(
                    "while printing the {} of '{}'",
                    self.stage,
                    module.function(f).name
                )));
                self.out = TextBuffer::new();
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        self.stage = Stage::Done;
        Ok(())
    }

    /// The generated text; empty unless `generate` succeeded.
    pub fn result(&self) -> String {
        if self.stage == Stage::Done {
            self.out.finish()
        } else {
            String::new()
        }
    }

    fn unhandled(&self, construct: impl fmt::Display) -> Diagnostic {
        Diagnostic::internal(
            System::Writer,
            format!("unhandled case in {} printer: {}", self.backend.name(), construct),
        )
    }

    fn type_construct(&self, what: &str, ty: TypeId) -> String {
        format!("{} of type '{}'", what, self.module.types.friendly_name(ty))
    }

    // ── Module scope ──

    fn module_decls(&mut self) -> Vec<Diagnostic> {
        let module = self.module;
        let types = &module.types;
        let mut errors = Vec::new();

        for f in module.functions() {
            self.scope.taken.insert(module.function(f).name.clone());
        }

        for (_, ty) in types.iter() {
            let Type::Struct(s) = ty else {
                continue;
            };
            if s.name.starts_with("__") && self.backend.predeclares_builtin_structs() {
                continue;
            }
            self.scope.taken.insert(struct_name(s).to_string());
            match self.backend.struct_decl(types, s) {
                Some(lines) => {
                    self.out.lines(lines);
                    self.out.blank();
                }
                None => errors.push(self.unhandled(format!("struct '{}'", s.name))),
            }
        }

        for id in &module.block(module.root_block()).instructions {
            if let Err(e) = self.module_decl(*id) {
                errors.push(e);
            }
        }
        errors
    }

    fn module_decl(&mut self, id: InstId) -> Result<(), Diagnostic> {
        let module = self.module;
        let types = &module.types;
        let inst = module.inst(id);
        let result = self.result_of(inst)?;
        let name = self.fresh_name(result);
        match inst.kind {
            InstKind::Var { binding } => {
                let Type::Pointer {
                    space,
                    access,
                    store,
                } = types[module.type_of(result)]
                else {
                    return Err(Diagnostic::internal(System::Writer, "module-scope var is not a pointer"));
                };
                let initializer = match inst.operands.first() {
                    Some(v) => Some(bare(&self.value(*v)?).to_string()),
                    None => None,
                };
                let var = GlobalVar {
                    name,
                    space,
                    access,
                    store,
                    binding,
                    initializer,
                };
                self.scope.refs.insert(result, self.backend.global_ref(&var));
                self.globals.push((result, var.clone()));
                let lines = self
                    .backend
                    .global_var(types, &var)
                    .ok_or_else(|| self.unhandled(format!("module-scope var<{}>", space.name())))?;
                self.out.lines(lines);
                self.out.blank();
            }
            InstKind::Let => {
                let value = self.operand(inst, 0)?;
                let text = self.value(value)?;
                let ty = module.type_of(result);
                let line = self
                    .backend
                    .module_const(types, ty, &name, bare(&text))
                    .ok_or_else(|| self.unhandled(self.type_construct("module-scope let", ty)))?;
                self.scope.names.insert(result, name);
                self.out.line(line);
                self.out.blank();
            }
            _ => {
                return Err(Diagnostic::internal(
                    System::Writer,
                    format!("'{}' at module scope", inst.kind.name()),
                ))
            }
        }
        Ok(())
    }

    // ── Functions ──

    fn function(&mut self, f: FunctionId) -> Result<(), Diagnostic> {
        let module = self.module;
        let types = &module.types;
        let function = module.function(f);
        self.stage = Stage::FunctionHeader;
        self.scope = self.module_scope.for_function();

        let uses = &mut self.scope.uses;
        module.walk_block(function.block, &mut |inst| {
            for op in &inst.operands {
                *uses.entry(*op).or_insert(0) += 1;
            }
        });

        let mut params = Vec::with_capacity(function.params.len());
        for (value, builtin) in function.params.iter().zip(&function.param_builtins) {
            let name = self.fresh_name(*value);
            let ty = module.type_of(*value);
            if self.is_pointer(*value) {
                let reference = self.backend.pointer_param_ref(&name);
                self.scope.refs.insert(*value, reference);
            } else {
                self.scope.names.insert(*value, name.clone());
            }
            params.push(Param {
                name,
                ty,
                builtin: *builtin,
            });
        }

        let header = FunctionHeader {
            name: function.name.clone(),
            return_type: function.return_type,
            params,
            stage: function.stage,
            workgroup_size: function.workgroup_size,
            globals: self.used_globals(f),
        };
        let lines = self
            .backend
            .function_header(types, &header)
            .ok_or_else(|| self.unhandled(format!("function header of '{}'", function.name)))?;
        self.out.lines(lines);
        self.out.indent();
        let prologue = self
            .backend
            .function_prologue(types, &header)
            .ok_or_else(|| self.unhandled(format!("prologue of '{}'", function.name)))?;
        self.out.lines(prologue);

        self.stage = Stage::FunctionBody;
        self.block(function.block, true)?;
        self.out.dedent();
        self.out.line("}");
        self.out.blank();
        Ok(())
    }

    fn used_globals(&self, f: FunctionId) -> Vec<GlobalVar> {
        let module = self.module;
        let mut used: Vec<ValueId> = Vec::new();
        module.walk_block(module.function(f).block, &mut |inst| {
            for op in &inst.operands {
                if !used.contains(op) && self.globals.iter().any(|(v, _)| v == op) {
                    used.push(*op);
                }
            }
        });
        self.globals
            .iter()
            .filter(|(v, _)| used.contains(v))
            .map(|(_, g)| g.clone())
            .collect()
    }

    fn block(&mut self, block: BlockId, function_level: bool) -> Result<(), Diagnostic> {
        let module = self.module;
        let insts = &module.block(block).instructions;
        for (i, id) in insts.iter().enumerate() {
            let next = insts.get(i + 1).copied();
            let function_end = function_level && next.is_none();
            self.inst(*id, next, function_end)?;
        }
        self.flush()
    }

    fn nested(&mut self, block: BlockId) -> Result<(), Diagnostic> {
        self.out.indent();
        self.block(block, false)?;
        self.out.dedent();
        Ok(())
    }

    fn inst(&mut self, id: InstId, next: Option<InstId>, function_end: bool) -> Result<(), Diagnostic> {
        let module = self.module;
        let types = &module.types;
        let inst = module.inst(id);
        self.scope.consumed_call = false;
        match &inst.kind {
            InstKind::Var { .. } => {
                let ptr = self.result_of(inst)?;
                let store = types
                    .store_type(module.type_of(ptr))
                    .ok_or_else(|| Diagnostic::internal(System::Writer, "var result is not a pointer"))?;
                let init = match inst.operands.first() {
                    Some(v) => Some(self.value(*v)?),
                    None => None,
                };
                self.flush()?;
                let name = self.fresh_name(ptr);
                let line = self
                    .backend
                    .local_var(types, store, &name, init.as_deref().map(bare))
                    .ok_or_else(|| self.unhandled(self.type_construct("var", store)))?;
                self.out.line(line);
                self.scope.refs.insert(ptr, name);
            }
            InstKind::Let => {
                let result = self.result_of(inst)?;
                let value = self.operand(inst, 0)?;
                if self.is_pointer(value) {
                    let reference = self.reference(value)?;
                    self.scope.refs.insert(result, reference);
                    return Ok(());
                }
                let expr = self.value(value)?;
                self.flush()?;
                self.emit_let(result, expr)?;
            }
            InstKind::Load => {
                let reference = self.reference(self.operand(inst, 0)?)?;
                self.define(inst, reference, next)?;
            }
            InstKind::Store => {
                let lhs = self.reference(self.operand(inst, 0)?)?;
                let rhs = self.value(self.operand(inst, 1)?)?;
                self.flush()?;
                self.out.line(format!("{} = {};", lhs, bare(&rhs)));
            }
            InstKind::Access => {
                let base = self.operand(inst, 0)?;
                let (text, ty) = if self.is_pointer(base) {
                    (self.reference(base)?, types.store_type(module.type_of(base)))
                } else {
                    (self.value(base)?, Some(module.type_of(base)))
                };
                let text = self.access_chain(text, ty, &inst.operands[1..])?;
                let result = self.result_of(inst)?;
                if self.is_pointer(result) {
                    self.scope.refs.insert(result, text);
                } else {
                    self.define(inst, text, next)?;
                }
            }
            InstKind::Binary(kind) => {
                let lhs = self.operand_text(inst, 0)?;
                let rhs = self.operand_text(inst, 1)?;
                let expr = self
                    .backend
                    .binary(types, *kind, &lhs, &rhs)
                    .ok_or_else(|| self.unhandled(self.type_construct(kind.name(), lhs.ty)))?;
                self.define(inst, expr, next)?;
            }
            InstKind::Unary(kind) => {
                let operand = self.operand_text(inst, 0)?;
                let expr = self
                    .backend
                    .unary(types, *kind, &operand)
                    .ok_or_else(|| self.unhandled(self.type_construct(kind.name(), operand.ty)))?;
                self.define(inst, expr, next)?;
            }
            InstKind::UserCall(callee) => {
                let args = self.operand_texts(inst)?;
                let args: Vec<&str> = args.iter().map(|a| a.text.as_str()).collect();
                let expr = format!("{}({})", module.function(*callee).name, args.join(", "));
                self.call(inst, expr, next)?;
            }
            InstKind::BuiltinCall(builtin) => {
                let args = self.operand_texts(inst)?;
                match self.backend.builtin_call(types, *builtin, &args) {
                    Some(expr) => self.call(inst, expr, next)?,
                    None => self.builtin_statements(inst, *builtin, args)?,
                }
            }
            InstKind::If {
                true_block,
                false_block: None,
            } if inst
                .operands
                .first()
                .is_some_and(|c| module.value(*c).as_constant() == Some(Constant::Bool(true))) =>
            {
                // A nested scope.
                self.flush()?;
                self.out.line("{");
                self.nested(*true_block)?;
                self.out.line("}");
            }
            InstKind::If {
                true_block,
                false_block,
            } => {
                let cond = self.value(self.operand(inst, 0)?)?;
                self.flush()?;
                self.out.line(format!("if ({}) {{", bare(&cond)));
                self.nested(*true_block)?;
                if let Some(f) = false_block {
                    self.out.line("} else {");
                    self.nested(*f)?;
                }
                self.out.line("}");
            }
            InstKind::ExitIf => self.flush()?,
            InstKind::Return => {
                let value = match inst.operands.first() {
                    Some(v) => Some(self.value(*v)?),
                    None => None,
                };
                self.flush()?;
                match value {
                    // Falling off the end returns anyway.
                    None if function_end => {}
                    None => self.out.line("return;"),
                    Some(v) => self.out.line(format!("return {};", bare(&v))),
                }
            }
            InstKind::Unreachable => {
                self.flush()?;
                let marker = self.backend.unreachable();
                self.out.line(marker);
            }
        }
        Ok(())
    }

    fn access_chain(&mut self, base: String, ty: Option<TypeId>, indices: &[ValueId]) -> Result<String, Diagnostic> {
        let module = self.module;
        let types = &module.types;
        let mut text = base;
        let mut current = ty;
        for index in indices {
            if let Some(s) = current.and_then(|c| types.as_struct(c)) {
                let member = module
                    .value(*index)
                    .as_constant()
                    .and_then(|c| c.as_u64())
                    .and_then(|i| s.members.get(i as usize))
                    .ok_or_else(|| {
                        Diagnostic::internal(System::Writer, format!("invalid member index into '{}'", s.name))
                    })?;
                text = format!("{}.{}", text, member.name);
                current = Some(member.ty);
            } else {
                let i = self.value(*index)?;
                text = format!("{}[{}]", text, i);
                current = current.and_then(|c| element_type(types, c));
            }
        }
        Ok(text)
    }

    // ── Values and names ──

    fn result_of(&self, inst: &Instruction) -> Result<ValueId, Diagnostic> {
        inst.result.ok_or_else(|| {
            Diagnostic::internal(System::Writer, format!("'{}' has no result", inst.kind.name()))
        })
    }

    fn operand(&self, inst: &Instruction, i: usize) -> Result<ValueId, Diagnostic> {
        inst.operands.get(i).copied().ok_or_else(|| {
            Diagnostic::internal(
                System::Writer,
                format!("'{}' is missing operand {}", inst.kind.name(), i),
            )
        })
    }

    fn operand_text(&mut self, inst: &Instruction, i: usize) -> Result<Operand, Diagnostic> {
        let value = self.operand(inst, i)?;
        Ok(Operand {
            text: self.value(value)?,
            ty: self.module.type_of(value),
        })
    }

    fn operand_texts(&mut self, inst: &Instruction) -> Result<Vec<Operand>, Diagnostic> {
        (0..inst.operands.len()).map(|i| self.operand_text(inst, i)).collect()
    }

    fn is_pointer(&self, value: ValueId) -> bool {
        matches!(self.module.types[self.module.type_of(value)], Type::Pointer { .. })
    }

    fn fresh_name(&mut self, value: ValueId) -> String {
        let base = match self.module.name(value) {
            Some(name) => name.to_string(),
            None => format!("v{}", value.index()),
        };
        self.unique(base)
    }

    /// `base`, suffixed with `_n` if it is already taken.
    fn unique(&mut self, base: String) -> String {
        let mut name = base.clone();
        let mut n = 1;
        while !self.scope.taken.insert(name.clone()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        name
    }

    /// Text of a value; takes pending text if there is some.
    fn value(&mut self, value: ValueId) -> Result<String, Diagnostic> {
        if let Some(i) = self.scope.pending.iter().position(|p| p.value == value) {
            let pending = self.scope.pending.remove(i);
            self.scope.consumed_call |= pending.has_call;
            return Ok(pending.expr);
        }
        let module = self.module;
        match module.value(value) {
            Value::Constant { value: c, ty } => self
                .backend
                .constant(&module.types, *c, *ty)
                .ok_or_else(|| self.unhandled(self.type_construct("constant", *ty))),
            _ if self.is_pointer(value) => {
                let reference = self.reference(value)?;
                Ok(self.backend.pointer_arg(&reference))
            }
            _ => self.scope.names.get(&value).cloned().ok_or_else(|| {
                Diagnostic::internal(System::Writer, format!("{} used before it was printed", value))
            }),
        }
    }

    fn reference(&self, pointer: ValueId) -> Result<String, Diagnostic> {
        self.scope.refs.get(&pointer).cloned().ok_or_else(|| {
            Diagnostic::internal(System::Writer, format!("{} does not point at printed memory", pointer))
        })
    }

    fn feeds(&self, value: ValueId, next: Option<InstId>) -> bool {
        next.is_some_and(|n| self.module.inst(n).operands.contains(&value))
    }

    /// Record a side-effect-free result: inline it if it has one user.
    fn define(&mut self, inst: &Instruction, expr: String, next: Option<InstId>) -> Result<(), Diagnostic> {
        let result = self.result_of(inst)?;
        let has_call = self.scope.consumed_call;
        let single_use = self.scope.uses.get(&result) == Some(&1);
        if single_use && (!has_call || self.feeds(result, next)) {
            self.scope.pending.push(Pending {
                value: result,
                expr,
                has_call,
            });
            Ok(())
        } else {
            self.emit_let(result, expr)
        }
    }

    fn call(&mut self, inst: &Instruction, expr: String, next: Option<InstId>) -> Result<(), Diagnostic> {
        self.flush()?;
        let uses = inst
            .result
            .map_or(0, |r| self.scope.uses.get(&r).copied().unwrap_or(0));
        match inst.result {
            Some(r) if uses == 1 && self.feeds(r, next) => {
                self.scope.pending.push(Pending {
                    value: r,
                    expr,
                    has_call: true,
                });
                Ok(())
            }
            Some(r) if uses > 0 => self.emit_let(r, expr),
            _ => {
                self.out.line(format!("{};", expr));
                Ok(())
            }
        }
    }

    fn emit_let(&mut self, value: ValueId, expr: String) -> Result<(), Diagnostic> {
        let module = self.module;
        let ty = module.type_of(value);
        let name = self.fresh_name(value);
        let line = self
            .backend
            .let_decl(&module.types, ty, &name, bare(&expr))
            .ok_or_else(|| self.unhandled(self.type_construct("let", ty)))?;
        self.out.line(line);
        self.scope.names.insert(value, name);
        Ok(())
    }

    /// Print a builtin as statements. Its arguments are pinned to names
    /// first, since the statements may use them more than once.
    fn builtin_statements(&mut self, inst: &Instruction, builtin: BuiltinFn, mut args: Vec<Operand>) -> Result<(), Diagnostic> {
        let module = self.module;
        self.flush()?;
        for (i, arg) in args.iter_mut().enumerate() {
            let value = self.operand(inst, i)?;
            if self.is_pointer(value) || is_plain(&arg.text) || module.value(value).as_constant().is_some() {
                continue;
            }
            self.emit_let(value, std::mem::take(&mut arg.text))?;
            arg.text = self.value(value)?;
        }
        let result_ty = inst.result.map(|r| module.type_of(r));
        let name = match inst.result {
            Some(r) => self.fresh_name(r),
            None => self.unique("original".to_string()),
        };
        let lines = self
            .backend
            .builtin_statements(&module.types, builtin, &args, &name, result_ty)
            .ok_or_else(|| self.unhandled(builtin.name()))?;
        self.out.lines(lines);
        if let Some(r) = inst.result {
            self.scope.names.insert(r, name);
        }
        Ok(())
    }

    /// Declare every pending value, in definition order.
    fn flush(&mut self) -> Result<(), Diagnostic> {
        for p in std::mem::take(&mut self.scope.pending) {
            self.emit_let(p.value, p.expr)?;
        }
        Ok(())
    }
}

/// Type produced by indexing into `ty`, without interning anything.
fn element_type(types: &TypeRegistry, ty: TypeId) -> Option<TypeId> {
    match types[ty] {
        Type::Vector { elem, .. } | Type::Array { elem, .. } => Some(elem),
        Type::Matrix { rows, elem, .. } => types.find(&Type::Vector { elem, width: rows }),
        _ => None,
    }
}
