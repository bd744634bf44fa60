//! FirstIndexOffset: makes `vertex_index` and `instance_index` start at
//! the first vertex and instance of the draw.
//!
//! Some backends count both builtins from zero regardless of the draw's
//! base vertex or instance. The transform adds a uniform buffer holding
//! the offsets the host must upload and adds them to every read of the
//! builtin parameters.
//!
//! A program that already has the offsets buffer at the configured
//! binding point is left alone, so running the transform twice adds the
//! offsets once.

use serde::{Deserialize, Serialize};

use crate::program::{BinaryOp, BindingPoint, BuiltinValue, CloneContext, Program, Sem, VarId};
use crate::types::{AddressSpace, Type};

use super::{Applied, ApplyResult, DataMap, Transform};

/// Where the offsets buffer is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstIndexOffsetConfig {
    pub binding: u32,
    pub group: u32,
}

impl FirstIndexOffsetConfig {
    pub fn new(binding: u32, group: u32) -> Self {
        Self { binding, group }
    }
}

/// What the host must upload, written for later stages and the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FirstIndexOffsetData {
    pub has_vertex_index: bool,
    pub has_instance_index: bool,
    /// Byte offset of the first-vertex value in the buffer.
    pub first_vertex_offset: u32,
    /// Byte offset of the first-instance value in the buffer.
    pub first_instance_offset: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FirstIndexOffset;

const MEMBERS: [&str; 2] = ["first_vertex_index", "first_instance_index"];

/// Whether `input` declares a uniform struct at `at` holding index offsets.
fn has_offsets_buffer(input: &Program, at: BindingPoint) -> bool {
    input.global_vars().any(|v| {
        let var = input.var(v);
        if var.space != Some(AddressSpace::Uniform) || var.binding != Some(at) {
            return false;
        }
        match var.ty.map(|ty| &input.types()[ty]) {
            Some(Type::Struct(s)) => s.members.iter().any(|m| MEMBERS.contains(&m.name.as_str())),
            _ => false,
        }
    })
}

impl Transform for FirstIndexOffset {
    fn name(&self) -> &'static str {
        "FirstIndexOffset"
    }

    fn apply(&self, input: &Program, inputs: &DataMap, outputs: &mut DataMap) -> ApplyResult<Program> {
        let mut vertex: Vec<VarId> = Vec::new();
        let mut instance: Vec<VarId> = Vec::new();
        for f in input.functions() {
            let function = input.function(f);
            if !function.is_entry_point() {
                continue;
            }
            for p in &function.params {
                match input.var(*p).builtin {
                    Some(BuiltinValue::VertexIndex) => vertex.push(*p),
                    Some(BuiltinValue::InstanceIndex) => instance.push(*p),
                    _ => {}
                }
            }
        }
        if vertex.is_empty() && instance.is_empty() {
            return Ok(Applied::Skip);
        }
        let config = *inputs.require::<FirstIndexOffsetConfig>(self.name()).map_err(|d| vec![d])?;
        if has_offsets_buffer(input, BindingPoint::new(config.group, config.binding)) {
            return Ok(Applied::Skip);
        }
        let sem = Sem::analyze(input)?;
        let mut ctx = CloneContext::new(input, &sem);

        // Declared eagerly so they land ahead of every cloned declaration.
        let u32_ty = ctx.dst.types().u32();
        let mut members = Vec::new();
        let mut data = FirstIndexOffsetData::default();
        let mut offset = 0;
        if !vertex.is_empty() {
            members.push((MEMBERS[0], u32_ty));
            data.has_vertex_index = true;
            data.first_vertex_offset = offset;
            offset += 4;
        }
        if !instance.is_empty() {
            members.push((MEMBERS[1], u32_ty));
            data.has_instance_index = true;
            data.first_instance_offset = offset;
        }
        let struct_name = ctx.dst.symbols().fresh("FirstIndexData");
        let struct_ty = ctx.dst.structure(struct_name, members);
        let buffer_name = ctx.dst.symbols().fresh("first_index_data");
        let buffer = ctx.dst.resource(
            buffer_name,
            AddressSpace::Uniform,
            struct_ty,
            None,
            BindingPoint::new(config.group, config.binding),
        );

        for (params, member) in [(&vertex, MEMBERS[0]), (&instance, MEMBERS[1])] {
            for p in params {
                for user in sem.users(*p) {
                    let read = user.expr;
                    ctx.replace_expr(read, move |ctx| {
                        let value = ctx.clone_expr_without_transform(read);
                        let base = ctx.dst.ident(buffer);
                        let first = ctx.dst.member(base, member);
                        ctx.dst.binary(BinaryOp::Add, value, first)
                    });
                }
            }
        }

        let (output, diagnostics) = ctx.finish();
        outputs.add(data);
        Ok(Applied::Changed { output, diagnostics })
    }
}
