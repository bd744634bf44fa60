//! Transform pipeline: composable rewrites over programs and IR modules.
//!
//! A transform never mutates its input. It either reports `Skip` because
//! none of its patterns occur, or returns a freshly built replacement
//! along with any non-fatal diagnostics. Configuration comes in through a
//! `DataMap`; facts for later transforms go out through another.

pub mod binding_remapper;
pub mod bound_array_accessors;
pub mod data;
pub mod first_index_offset;
pub mod manager;
pub mod shift_mask;
pub mod spirv_atomic;
#[cfg(test)]
mod tests;

use crate::diagnostic::Diagnostic;
use crate::ir::{disassembler, Module};
use crate::program::{writer, Program};

pub use binding_remapper::{BindingRemapper, BindingRemapperConfig};
pub use bound_array_accessors::BoundArrayAccessors;
pub use data::DataMap;
pub use first_index_offset::{FirstIndexOffset, FirstIndexOffsetConfig, FirstIndexOffsetData};
pub use manager::{Manager, PipelineOutput};
pub use shift_mask::ShiftMask;
pub use spirv_atomic::SpirvAtomic;

/// What a transform did.
#[derive(Debug)]
pub enum Applied<P> {
    /// Nothing to do; the input carries forward unchanged.
    Skip,
    /// A rebuilt program and the non-fatal diagnostics raised while building it.
    Changed { output: P, diagnostics: Vec<Diagnostic> },
}

impl<P> Applied<P> {
    pub fn changed(output: P) -> Self {
        Applied::Changed {
            output,
            diagnostics: Vec::new(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Applied::Skip)
    }
}

/// `Err` is pipeline-fatal: the input cannot be salvaged.
pub type ApplyResult<P> = Result<Applied<P>, Vec<Diagnostic>>;

pub trait Transform<P = Program> {
    fn name(&self) -> &'static str;

    fn apply(&self, input: &P, inputs: &DataMap, outputs: &mut DataMap) -> ApplyResult<P>;
}

/// True if `transform` would produce a new program for `input`.
pub fn should_run<P, T: Transform<P> + ?Sized>(transform: &T, input: &P, data: &DataMap) -> bool {
    let mut scratch = DataMap::new();
    !matches!(transform.apply(input, data, &mut scratch), Ok(Applied::Skip))
}

// ─── Fingerprints ─────────────────────────────────────────────────

/// Content hash of a program's canonical text.
pub trait Fingerprint {
    fn fingerprint(&self) -> blake3::Hash;
}

impl Fingerprint for Program {
    fn fingerprint(&self) -> blake3::Hash {
        blake3::hash(writer::to_wgsl(self).as_bytes())
    }
}

impl Fingerprint for Module {
    fn fingerprint(&self) -> blake3::Hash {
        blake3::hash(disassembler::disassemble(self).as_bytes())
    }
}
