//! Compile driver: program transforms → IR → IR transforms → text.
//!
//! `compile` is the one end-to-end entry point. The pieces it strings
//! together stay public so tools can stop at any stage.

use crate::config::target::Target;
use crate::diagnostic::Diagnostic;
use crate::ir::{self, Module};
use crate::program::Program;
use crate::transform::{
    BindingRemapper, BindingRemapperConfig, BoundArrayAccessors, DataMap, FirstIndexOffset,
    FirstIndexOffsetConfig, FirstIndexOffsetData, Manager, ShiftMask, SpirvAtomic,
};
use crate::writer;

#[cfg(test)]
mod tests;

/// Options controlling compilation: output target plus the optional
/// resource transforms.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub target: Target,
    /// Runs `BindingRemapper` when set.
    pub binding_remapper: Option<BindingRemapperConfig>,
    /// Runs `FirstIndexOffset` when set.
    pub first_index_offset: Option<FirstIndexOffsetConfig>,
    /// Runs `BoundArrayAccessors` last.
    pub bound_array_accessors: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: Target::wgsl(),
            binding_remapper: None,
            first_index_offset: None,
            bound_array_accessors: false,
        }
    }
}

impl CompileOptions {
    /// Options for a named built-in target (`hlsl`, `glsl-es@3.1`, ...).
    pub fn for_target(name: &str) -> Result<Self, Diagnostic> {
        Ok(Self {
            target: Target::resolve(name)?,
            ..Self::default()
        })
    }

    pub fn with_binding_remapper(mut self, config: BindingRemapperConfig) -> Self {
        self.binding_remapper = Some(config);
        self
    }

    pub fn with_first_index_offset(mut self, config: FirstIndexOffsetConfig) -> Self {
        self.first_index_offset = Some(config);
        self
    }

    pub fn with_bound_array_accessors(mut self) -> Self {
        self.bound_array_accessors = true;
        self
    }

    /// The program transforms these options call for, in run order,
    /// and the data map that configures them.
    pub fn program_transforms(&self) -> (Manager<Program>, DataMap) {
        let mut manager = Manager::new();
        let mut data = DataMap::new();
        manager.add(SpirvAtomic);
        if let Some(config) = &self.binding_remapper {
            manager.add(BindingRemapper);
            data.add(config.clone());
        }
        if let Some(config) = self.first_index_offset {
            manager.add(FirstIndexOffset);
            data.add(config);
        }
        if self.bound_array_accessors {
            manager.add(BoundArrayAccessors);
        }
        (manager, data)
    }

    /// The IR transforms the target dialect needs.
    pub fn ir_transforms(&self) -> Manager<Module> {
        let mut manager = Manager::new();
        if self.target.dialect.needs_shift_mask() {
            manager.add(ShiftMask);
        }
        manager
    }
}

/// A validated module ready for printing.
#[derive(Debug)]
pub struct Prepared {
    pub module: Module,
    /// Non-fatal diagnostics from every transform, in order.
    pub diagnostics: Vec<Diagnostic>,
    /// Names of the transforms that changed their input.
    pub changed: Vec<&'static str>,
    pub first_index_offset: Option<FirstIndexOffsetData>,
}

/// What `compile` produced.
#[derive(Debug)]
pub struct CompileOutput {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    pub changed: Vec<&'static str>,
    /// Offsets the host must upload when `FirstIndexOffset` ran.
    pub first_index_offset: Option<FirstIndexOffsetData>,
}

/// Run the program and IR transforms and validate the result.
///
/// On failure the error list also carries the non-fatal diagnostics
/// gathered before the failing stage.
pub fn prepare(program: &Program, options: &CompileOptions) -> Result<Prepared, Vec<Diagnostic>> {
    let (transforms, data) = options.program_transforms();
    let lowered = transforms.run(program.clone(), data)?;
    let mut diagnostics = lowered.diagnostics;
    let mut changed = lowered.changed;
    let mut data = lowered.data;

    let module = ir::from_program::build(&lowered.program).map_err(|errors| prepend(&diagnostics, errors))?;
    ir::validator::validate_and_dump_if_needed(&module, "lowering")
        .map_err(|errors| prepend(&diagnostics, errors))?;

    let transformed = options
        .ir_transforms()
        .run(module, DataMap::new())
        .map_err(|errors| prepend(&diagnostics, errors))?;
    diagnostics.extend(transformed.diagnostics);
    if !transformed.changed.is_empty() {
        ir::validator::validate_and_dump_if_needed(&transformed.program, "IR transforms")
            .map_err(|errors| prepend(&diagnostics, errors))?;
    }
    changed.extend(transformed.changed);

    Ok(Prepared {
        module: transformed.program,
        diagnostics,
        changed,
        first_index_offset: data.take::<FirstIndexOffsetData>(),
    })
}

/// Compile a validated program to shader text for `options.target`.
pub fn compile(program: &Program, options: &CompileOptions) -> Result<CompileOutput, Vec<Diagnostic>> {
    let prepared = prepare(program, options)?;
    let text = writer::generate(&prepared.module, &options.target)
        .map_err(|errors| prepend(&prepared.diagnostics, errors))?;
    Ok(CompileOutput {
        text,
        diagnostics: prepared.diagnostics,
        changed: prepared.changed,
        first_index_offset: prepared.first_index_offset,
    })
}

/// Compile the same program for several targets. Transforms run once
/// per target since the IR transforms depend on the dialect.
pub fn compile_all(
    program: &Program,
    options: &CompileOptions,
    targets: &[Target],
) -> Vec<(Target, Result<CompileOutput, Vec<Diagnostic>>)> {
    targets
        .iter()
        .map(|target| {
            let options = CompileOptions {
                target: *target,
                ..options.clone()
            };
            (*target, compile(program, &options))
        })
        .collect()
}

fn prepend(earlier: &[Diagnostic], errors: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut all = earlier.to_vec();
    all.extend(errors);
    all
}
