use super::{
    atomic_inner, c_int, float_text, infix, is_vector, operator, struct_name, Backend, FunctionHeader, GlobalVar,
    Operand,
};
use crate::builtin::BuiltinFn;
use crate::config::target::Version;
use crate::ir::{BinaryKind, Constant};
use crate::program::{BuiltinValue, PipelineStage};
use crate::types::{Access, AddressSpace, ArrayCount, Type, TypeId, TypeRegistry};

/// HLSL output for Shader Model 6.
///
/// Storage buffers are single-element structured buffers, so every
/// reference to one goes through `[0]`. Atomics become interlocked
/// intrinsics, which return through an out parameter and so are printed
/// as statements.
pub struct HlslBackend;

fn scalar_name(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Bool => Some("bool"),
        Type::I32 => Some("int"),
        Type::U32 => Some("uint"),
        Type::F32 => Some("float"),
        Type::F16 => Some("float16_t"),
        _ => None,
    }
}

fn semantic(builtin: BuiltinValue) -> &'static str {
    match builtin {
        BuiltinValue::VertexIndex => "SV_VertexID",
        BuiltinValue::InstanceIndex => "SV_InstanceID",
        BuiltinValue::Position => "SV_Position",
        BuiltinValue::GlobalInvocationId => "SV_DispatchThreadID",
        BuiltinValue::LocalInvocationIndex => "SV_GroupIndex",
    }
}

impl Backend for HlslBackend {
    fn name(&self) -> &'static str {
        "HLSL"
    }

    fn preamble(&self, _version: &Version) -> Vec<String> {
        Vec::new()
    }

    fn type_name(&self, types: &TypeRegistry, ty: TypeId) -> Option<String> {
        match &types[ty] {
            Type::Void => Some("void".to_string()),
            Type::Vector { elem, width } => Some(format!("{}{}", scalar_name(&types[*elem])?, width)),
            Type::Matrix { columns, rows, elem } => {
                Some(format!("{}{}x{}", scalar_name(&types[*elem])?, columns, rows))
            }
            Type::Struct(s) => Some(struct_name(s).to_string()),
            // Interlocked intrinsics work on plain integers.
            Type::Atomic { inner } => self.type_name(types, *inner),
            // Arrays are spelled around the declared name.
            Type::Array { .. } | Type::Pointer { .. } => None,
            other => scalar_name(other).map(str::to_string),
        }
    }

    fn declaration(&self, types: &TypeRegistry, ty: TypeId, name: &str) -> Option<String> {
        let mut dims = String::new();
        let mut current = ty;
        while let Type::Array { elem, count } = &types[current] {
            match count {
                ArrayCount::Constant(n) => dims.push_str(&format!("[{}]", n)),
                ArrayCount::Runtime | ArrayCount::Override(_) => return None,
            }
            current = *elem;
        }
        match types[current] {
            Type::Pointer { store, .. } if dims.is_empty() => {
                Some(format!("inout {}", self.declaration(types, store, name)?))
            }
            _ => Some(format!("{} {}{}", self.type_name(types, current)?, name, dims)),
        }
    }

    fn global_var(&self, types: &TypeRegistry, var: &GlobalVar) -> Option<Vec<String>> {
        match var.space {
            AddressSpace::Storage => {
                let b = var.binding?;
                let (buffer, register) = match var.access {
                    Access::Read => ("StructuredBuffer", "t"),
                    Access::Write | Access::ReadWrite => ("RWStructuredBuffer", "u"),
                };
                Some(vec![format!(
                    "{}<{}> {} : register({}{}, space{});",
                    buffer,
                    self.type_name(types, var.store)?,
                    var.name,
                    register,
                    b.binding,
                    b.group
                )])
            }
            AddressSpace::Uniform => {
                let b = var.binding?;
                Some(vec![
                    format!("cbuffer {}_block : register(b{}, space{}) {{", var.name, b.binding, b.group),
                    format!("  {};", self.declaration(types, var.store, &var.name)?),
                    "};".to_string(),
                ])
            }
            AddressSpace::Workgroup => Some(vec![format!(
                "groupshared {};",
                self.declaration(types, var.store, &var.name)?
            )]),
            AddressSpace::Private => {
                let decl = self.declaration(types, var.store, &var.name)?;
                Some(vec![match &var.initializer {
                    Some(init) => format!("static {} = {};", decl, init),
                    None => format!("static {};", decl),
                }])
            }
            AddressSpace::Function | AddressSpace::Handle => None,
        }
    }

    fn global_ref(&self, var: &GlobalVar) -> String {
        match var.space {
            AddressSpace::Storage => format!("{}[0]", var.name),
            _ => var.name.clone(),
        }
    }

    fn module_const(&self, types: &TypeRegistry, ty: TypeId, name: &str, value: &str) -> Option<String> {
        Some(format!("static const {} = {};", self.declaration(types, ty, name)?, value))
    }

    fn function_header(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>> {
        let mut lines = Vec::new();
        if let (Some(PipelineStage::Compute), Some([x, y, z])) = (header.stage, header.workgroup_size) {
            lines.push(format!("[numthreads({}, {}, {})]", x, y, z));
        }
        let mut params = Vec::with_capacity(header.params.len());
        for p in &header.params {
            let decl = self.declaration(types, p.ty, &p.name)?;
            match (p.builtin, header.is_entry_point()) {
                (Some(b), _) => params.push(format!("{} : {}", decl, semantic(b))),
                (None, true) => return None,
                (None, false) => params.push(decl),
            }
        }
        let ret = self.type_name(types, header.return_type)?;
        let output = match (header.stage, &types[header.return_type]) {
            (_, Type::Void) | (None, _) => "",
            (Some(PipelineStage::Vertex), _) => " : SV_Position",
            (Some(PipelineStage::Fragment), _) => " : SV_Target0",
            (Some(PipelineStage::Compute), _) => return None,
        };
        lines.push(format!("{} {}({}){} {{", ret, header.name, params.join(", "), output));
        Some(lines)
    }

    fn constant(&self, types: &TypeRegistry, value: Constant, ty: TypeId) -> Option<String> {
        let literal = match value {
            Constant::Bool(b) => b.to_string(),
            Constant::I32(v) => c_int(v),
            Constant::U32(v) => format!("{}u", v),
            Constant::F32(v) => float_text(v, "f", "asfloat"),
            Constant::F16(v) => format!("float16_t({})", float_text(v, "", "asfloat")),
        };
        match types[ty] {
            Type::Vector { width, .. } => {
                let parts = vec![literal; width as usize];
                Some(format!("{}({})", self.type_name(types, ty)?, parts.join(", ")))
            }
            _ => Some(literal),
        }
    }

    fn binary(&self, types: &TypeRegistry, kind: BinaryKind, lhs: &Operand, rhs: &Operand) -> Option<String> {
        let matrix = |o: &Operand| matches!(types[o.ty], Type::Matrix { .. });
        if kind == BinaryKind::Multiply && (matrix(lhs) || matrix(rhs)) {
            // Column-major IR matrices are row-major in HLSL terms.
            return Some(format!("mul({}, {})", rhs.text, lhs.text));
        }
        if types.is_bool_scalar_or_vector(lhs.ty) {
            let vector = is_vector(types, lhs.ty);
            match kind {
                BinaryKind::And if vector => return Some(format!("and({}, {})", lhs.text, rhs.text)),
                BinaryKind::Or if vector => return Some(format!("or({}, {})", lhs.text, rhs.text)),
                BinaryKind::And => return Some(infix(lhs, "&&", rhs)),
                BinaryKind::Or => return Some(infix(lhs, "||", rhs)),
                BinaryKind::Xor => return Some(infix(lhs, "!=", rhs)),
                _ => {}
            }
        }
        Some(infix(lhs, operator(kind), rhs))
    }

    fn builtin_call(&self, _types: &TypeRegistry, builtin: BuiltinFn, args: &[Operand]) -> Option<String> {
        let text: Vec<&str> = args.iter().map(|a| a.text.as_str()).collect();
        let call = |name: &str| Some(format!("{}({})", name, text.join(", ")));
        if builtin.is_atomic() || builtin.is_texture() || builtin.is_image_query() {
            return None;
        }
        match builtin {
            BuiltinFn::Mix => call("lerp"),
            BuiltinFn::Fract => call("frac"),
            BuiltinFn::Atan2 => call("atan2"),
            BuiltinFn::Dpdx => call("ddx"),
            BuiltinFn::Dpdy => call("ddy"),
            BuiltinFn::DpdxCoarse => call("ddx_coarse"),
            BuiltinFn::DpdyCoarse => call("ddy_coarse"),
            BuiltinFn::DpdxFine => call("ddx_fine"),
            BuiltinFn::DpdyFine => call("ddy_fine"),
            BuiltinFn::FwidthCoarse | BuiltinFn::FwidthFine => call("fwidth"),
            BuiltinFn::CountOneBits => call("countbits"),
            BuiltinFn::ReverseBits => call("reversebits"),
            BuiltinFn::CountLeadingZeros | BuiltinFn::CountTrailingZeros => None,
            BuiltinFn::Select => {
                let (f, t, c) = (args.first()?, args.get(1)?, args.get(2)?);
                Some(format!("select({}, {}, {})", c.text, t.text, f.text))
            }
            BuiltinFn::WorkgroupBarrier => Some("GroupMemoryBarrierWithGroupSync()".to_string()),
            BuiltinFn::StorageBarrier => Some("DeviceMemoryBarrierWithGroupSync()".to_string()),
            BuiltinFn::TextureBarrier => None,
            BuiltinFn::SubgroupBallot => call("WaveActiveBallot"),
            BuiltinFn::SubgroupBroadcast => call("WaveReadLaneAt"),
            BuiltinFn::SubgroupAdd => call("WaveActiveSum"),
            BuiltinFn::Dot4I8Packed | BuiltinFn::Dot4U8Packed => {
                let name = match builtin {
                    BuiltinFn::Dot4I8Packed => "dot4add_i8packed",
                    _ => "dot4add_u8packed",
                };
                let zero = if builtin == BuiltinFn::Dot4I8Packed { "0" } else { "0u" };
                Some(format!("{}({}, {})", name, text.join(", "), zero))
            }
            BuiltinFn::ArrayLength => None,
            _ if builtin.is_data_packing() || builtin.is_data_unpacking() => None,
            _ => call(builtin.name()),
        }
    }

    fn builtin_statements(
        &self,
        types: &TypeRegistry,
        builtin: BuiltinFn,
        args: &[Operand],
        result: &str,
        result_ty: Option<TypeId>,
    ) -> Option<Vec<String>> {
        if !builtin.is_atomic() {
            return None;
        }
        let p = args.first()?;
        let zero = match atomic_inner(types, p.ty)? {
            Type::I32 => "0",
            Type::U32 => "0u",
            _ => return None,
        };
        // A store has no result but the intrinsic still wants somewhere to put the old value.
        let ty = result_ty.or_else(|| args.get(1).map(|a| a.ty))?;
        let declared = format!("{};", self.declaration(types, ty, result)?);
        let interlocked = |name: &str, value: &str| {
            Some(vec![
                declared.clone(),
                format!("{}({}, {}, {});", name, p.text, value, result),
            ])
        };
        let value = || args.get(1).map(|a| a.text.as_str());
        match builtin {
            BuiltinFn::AtomicLoad => interlocked("InterlockedOr", zero),
            BuiltinFn::AtomicStore | BuiltinFn::AtomicExchange => interlocked("InterlockedExchange", value()?),
            BuiltinFn::AtomicAdd => interlocked("InterlockedAdd", value()?),
            BuiltinFn::AtomicSub => interlocked("InterlockedAdd", &format!("-({})", value()?)),
            BuiltinFn::AtomicMax => interlocked("InterlockedMax", value()?),
            BuiltinFn::AtomicMin => interlocked("InterlockedMin", value()?),
            BuiltinFn::AtomicAnd => interlocked("InterlockedAnd", value()?),
            BuiltinFn::AtomicOr => interlocked("InterlockedOr", value()?),
            BuiltinFn::AtomicXor => interlocked("InterlockedXor", value()?),
            BuiltinFn::AtomicCompareExchangeWeak => {
                let (cmp, v) = (args.get(1)?, args.get(2)?);
                Some(vec![
                    declared.clone(),
                    format!(
                        "InterlockedCompareExchange({}, {}, {}, {}.old_value);",
                        p.text, cmp.text, v.text, result
                    ),
                    format!("{}.exchanged = ({}.old_value == {});", result, result, cmp.text),
                ])
            }
            _ => None,
        }
    }

    fn pointer_arg(&self, reference: &str) -> String {
        reference.to_string()
    }

    fn pointer_param_ref(&self, name: &str) -> String {
        name.to_string()
    }
}
