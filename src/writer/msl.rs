use super::{
    atomic_inner, c_int, float_text, infix, operator, struct_name, Backend, FunctionHeader, GlobalVar, Operand,
};
use crate::builtin::BuiltinFn;
use crate::config::target::Version;
use crate::ir::{BinaryKind, Constant};
use crate::program::{BuiltinValue, PipelineStage};
use crate::types::{Access, AddressSpace, ArrayCount, Type, TypeId, TypeRegistry};

/// Metal Shading Language output.
///
/// Metal has no module-scope resources: buffers become entry-point
/// parameters bound by their binding number, and workgroup and private
/// variables are declared at the top of the entry point. A helper
/// function that touches a module-scope variable directly is not
/// printable.
pub struct MslBackend;

fn scalar_name(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Bool => Some("bool"),
        Type::I32 => Some("int"),
        Type::U32 => Some("uint"),
        Type::F32 => Some("float"),
        Type::F16 => Some("half"),
        _ => None,
    }
}

fn attribute(builtin: BuiltinValue) -> &'static str {
    match builtin {
        BuiltinValue::VertexIndex => "vertex_id",
        BuiltinValue::InstanceIndex => "instance_id",
        BuiltinValue::Position => "position",
        BuiltinValue::GlobalInvocationId => "thread_position_in_grid",
        BuiltinValue::LocalInvocationIndex => "thread_index_in_threadgroup",
    }
}

fn space_qualifier(space: AddressSpace) -> Option<&'static str> {
    match space {
        AddressSpace::Storage => Some("device"),
        AddressSpace::Uniform => Some("constant"),
        AddressSpace::Workgroup => Some("threadgroup"),
        AddressSpace::Function | AddressSpace::Private => Some("thread"),
        AddressSpace::Handle => None,
    }
}

fn entry_name(header: &FunctionHeader) -> String {
    // `main` is reserved in Metal.
    if header.is_entry_point() && header.name == "main" {
        "main_".to_string()
    } else {
        header.name.clone()
    }
}

impl MslBackend {
    fn resource_param(&self, types: &TypeRegistry, var: &GlobalVar) -> Option<Option<String>> {
        let qualifier = match (var.space, var.access) {
            (AddressSpace::Storage, Access::Read) => "const device",
            (AddressSpace::Storage, _) => "device",
            (AddressSpace::Uniform, _) => "constant",
            (AddressSpace::Workgroup | AddressSpace::Private, _) => return Some(None),
            (AddressSpace::Function | AddressSpace::Handle, _) => return None,
        };
        let binding = var.binding?;
        Some(Some(format!(
            "{} {}& {} [[buffer({})]]",
            qualifier,
            self.type_name(types, var.store)?,
            var.name,
            binding.binding
        )))
    }
}

impl Backend for MslBackend {
    fn name(&self) -> &'static str {
        "MSL"
    }

    fn preamble(&self, _version: &Version) -> Vec<String> {
        vec![
            "#include <metal_stdlib>".to_string(),
            "using namespace metal;".to_string(),
        ]
    }

    fn type_name(&self, types: &TypeRegistry, ty: TypeId) -> Option<String> {
        match &types[ty] {
            Type::Void => Some("void".to_string()),
            Type::Vector { elem, width } => Some(format!("{}{}", scalar_name(&types[*elem])?, width)),
            Type::Matrix { columns, rows, elem } => {
                Some(format!("{}{}x{}", scalar_name(&types[*elem])?, columns, rows))
            }
            Type::Atomic { inner } => match types[*inner] {
                Type::I32 => Some("atomic_int".to_string()),
                Type::U32 => Some("atomic_uint".to_string()),
                _ => None,
            },
            Type::Array { elem, count } => match count {
                ArrayCount::Constant(n) => Some(format!("array<{}, {}>", self.type_name(types, *elem)?, n)),
                ArrayCount::Runtime | ArrayCount::Override(_) => None,
            },
            Type::Pointer { space, store, .. } => Some(format!(
                "{} {}*",
                space_qualifier(*space)?,
                self.type_name(types, *store)?
            )),
            Type::Struct(s) => Some(struct_name(s).to_string()),
            other => scalar_name(other).map(str::to_string),
        }
    }

    fn declaration(&self, types: &TypeRegistry, ty: TypeId, name: &str) -> Option<String> {
        match &types[ty] {
            // The trailing array of a buffer is indexed past its declared size.
            Type::Array {
                elem,
                count: ArrayCount::Runtime,
            } => Some(format!("{} {}[1]", self.type_name(types, *elem)?, name)),
            _ => Some(format!("{} {}", self.type_name(types, ty)?, name)),
        }
    }

    fn global_var(&self, _types: &TypeRegistry, var: &GlobalVar) -> Option<Vec<String>> {
        match var.space {
            AddressSpace::Storage | AddressSpace::Uniform | AddressSpace::Workgroup | AddressSpace::Private => {
                Some(Vec::new())
            }
            AddressSpace::Function | AddressSpace::Handle => None,
        }
    }

    fn module_const(&self, types: &TypeRegistry, ty: TypeId, name: &str, value: &str) -> Option<String> {
        Some(format!("constant {} = {};", self.declaration(types, ty, name)?, value))
    }

    fn function_header(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>> {
        let ret = self.type_name(types, header.return_type)?;
        let Some(stage) = header.stage else {
            if !header.globals.is_empty() {
                return None;
            }
            let params = header
                .params
                .iter()
                .map(|p| self.declaration(types, p.ty, &p.name))
                .collect::<Option<Vec<_>>>()?;
            return Some(vec![format!("{} {}({}) {{", ret, header.name, params.join(", "))]);
        };

        let mut params = Vec::new();
        for p in &header.params {
            let builtin = p.builtin?;
            params.push(format!(
                "{} [[{}]]",
                self.declaration(types, p.ty, &p.name)?,
                attribute(builtin)
            ));
        }
        for g in &header.globals {
            if let Some(param) = self.resource_param(types, g)? {
                params.push(param);
            }
        }
        let keyword = match stage {
            PipelineStage::Vertex => "vertex",
            PipelineStage::Fragment => "fragment",
            PipelineStage::Compute => "kernel",
        };
        Some(vec![format!(
            "{} {} {}({}) {{",
            keyword,
            ret,
            entry_name(header),
            params.join(", ")
        )])
    }

    fn function_prologue(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>> {
        let mut lines = Vec::new();
        for g in &header.globals {
            let decl = self.declaration(types, g.store, &g.name)?;
            match (g.space, &g.initializer) {
                (AddressSpace::Workgroup, _) => lines.push(format!("threadgroup {};", decl)),
                (AddressSpace::Private, Some(init)) => lines.push(format!("{} = {};", decl, init)),
                (AddressSpace::Private, None) => lines.push(format!("{} = {{}};", decl)),
                _ => {}
            }
        }
        Some(lines)
    }

    fn constant(&self, types: &TypeRegistry, value: Constant, ty: TypeId) -> Option<String> {
        let literal = match value {
            Constant::Bool(b) => b.to_string(),
            Constant::I32(v) => c_int(v),
            Constant::U32(v) => format!("{}u", v),
            Constant::F32(v) => float_text(v, "f", "as_type<float>"),
            Constant::F16(v) => float_text(v, "h", "as_type<half>"),
        };
        match types[ty] {
            Type::Vector { .. } => Some(format!("{}({})", self.type_name(types, ty)?, literal)),
            _ => Some(literal),
        }
    }

    fn binary(&self, types: &TypeRegistry, kind: BinaryKind, lhs: &Operand, rhs: &Operand) -> Option<String> {
        if kind == BinaryKind::Modulo && types.is_float_scalar_or_vector(lhs.ty) {
            return Some(format!("fmod({}, {})", lhs.text, rhs.text));
        }
        if types.is_bool_scalar_or_vector(lhs.ty) {
            match kind {
                BinaryKind::And => return Some(infix(lhs, "&&", rhs)),
                BinaryKind::Or => return Some(infix(lhs, "||", rhs)),
                BinaryKind::Xor => return Some(infix(lhs, "!=", rhs)),
                _ => {}
            }
        }
        Some(infix(lhs, operator(kind), rhs))
    }

    fn builtin_call(&self, types: &TypeRegistry, builtin: BuiltinFn, args: &[Operand]) -> Option<String> {
        let text: Vec<&str> = args.iter().map(|a| a.text.as_str()).collect();
        let call = |name: &str| Some(format!("{}({})", name, text.join(", ")));
        let relaxed = |name: &str| Some(format!("{}({}, memory_order_relaxed)", name, text.join(", ")));
        if builtin.is_atomic() {
            // Only 32-bit integer atomics exist.
            atomic_inner(types, args.first()?.ty)?;
        }
        match builtin {
            BuiltinFn::AtomicLoad => relaxed("atomic_load_explicit"),
            BuiltinFn::AtomicStore => relaxed("atomic_store_explicit"),
            BuiltinFn::AtomicAdd => relaxed("atomic_fetch_add_explicit"),
            BuiltinFn::AtomicSub => relaxed("atomic_fetch_sub_explicit"),
            BuiltinFn::AtomicMax => relaxed("atomic_fetch_max_explicit"),
            BuiltinFn::AtomicMin => relaxed("atomic_fetch_min_explicit"),
            BuiltinFn::AtomicAnd => relaxed("atomic_fetch_and_explicit"),
            BuiltinFn::AtomicOr => relaxed("atomic_fetch_or_explicit"),
            BuiltinFn::AtomicXor => relaxed("atomic_fetch_xor_explicit"),
            BuiltinFn::AtomicExchange => relaxed("atomic_exchange_explicit"),
            BuiltinFn::AtomicCompareExchangeWeak => None,

            BuiltinFn::CountOneBits => call("popcount"),
            BuiltinFn::ReverseBits => call("reverse_bits"),
            BuiltinFn::CountLeadingZeros => call("clz"),
            BuiltinFn::CountTrailingZeros => call("ctz"),
            BuiltinFn::Round => call("rint"),
            BuiltinFn::Dpdx | BuiltinFn::DpdxCoarse | BuiltinFn::DpdxFine => call("dfdx"),
            BuiltinFn::Dpdy | BuiltinFn::DpdyCoarse | BuiltinFn::DpdyFine => call("dfdy"),
            BuiltinFn::Fwidth | BuiltinFn::FwidthCoarse | BuiltinFn::FwidthFine => call("fwidth"),
            BuiltinFn::WorkgroupBarrier => Some("threadgroup_barrier(mem_flags::mem_threadgroup)".to_string()),
            BuiltinFn::StorageBarrier => Some("threadgroup_barrier(mem_flags::mem_device)".to_string()),
            BuiltinFn::TextureBarrier => Some("threadgroup_barrier(mem_flags::mem_texture)".to_string()),
            BuiltinFn::Pack4X8Unorm => call("pack_float_to_unorm4x8"),
            BuiltinFn::Pack4X8Snorm => call("pack_float_to_snorm4x8"),
            BuiltinFn::Pack2X16Unorm => call("pack_float_to_unorm2x16"),
            BuiltinFn::Pack2X16Snorm => call("pack_float_to_snorm2x16"),
            BuiltinFn::Pack2X16Float => Some(format!("as_type<uint>(half2({}))", args.first()?.text)),
            BuiltinFn::Unpack4X8Unorm => call("unpack_unorm4x8_to_float"),
            BuiltinFn::Unpack4X8Snorm => call("unpack_snorm4x8_to_float"),
            BuiltinFn::Unpack2X16Unorm => call("unpack_unorm2x16_to_float"),
            BuiltinFn::Unpack2X16Snorm => call("unpack_snorm2x16_to_float"),
            BuiltinFn::Unpack2X16Float => Some(format!("float2(as_type<half2>({}))", args.first()?.text)),
            BuiltinFn::SubgroupBroadcast => call("simd_broadcast"),
            BuiltinFn::SubgroupAdd => call("simd_sum"),
            BuiltinFn::SubgroupBallot | BuiltinFn::ArrayLength => None,
            _ if builtin.is_texture()
                || builtin.is_image_query()
                || builtin.is_packed_4x8_integer_dot_product()
                || builtin.is_data_packing()
                || builtin.is_data_unpacking() =>
            {
                None
            }
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
        if builtin != BuiltinFn::AtomicCompareExchangeWeak {
            return None;
        }
        let (p, cmp, v) = (args.first()?, args.get(1)?, args.get(2)?);
        atomic_inner(types, p.ty)?;
        // The expected value is replaced by the one found on failure.
        Some(vec![
            format!("{};", self.declaration(types, result_ty?, result)?),
            format!("{}.old_value = {};", result, cmp.text),
            format!(
                "{}.exchanged = atomic_compare_exchange_weak_explicit({}, &{}.old_value, {}, memory_order_relaxed, memory_order_relaxed);",
                result, p.text, result, v.text
            ),
        ])
    }
}
