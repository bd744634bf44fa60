use super::{
    atomic_inner, c_int, float_text, infix, is_vector, operator, struct_name, Backend, FunctionHeader, GlobalVar,
    Operand,
};
use crate::builtin::BuiltinFn;
use crate::config::target::Version;
use crate::ir::{BinaryKind, Constant};
use crate::program::{BuiltinValue, PipelineStage};
use crate::types::{Access, AddressSpace, ArrayCount, Type, TypeId, TypeRegistry};

/// GLSL output, desktop or ES profile.
///
/// Entry points become `main` with builtin inputs copied out of the
/// `gl_*` variables in the prologue. Resource blocks use the binding
/// number only; GLSL has no bind groups.
pub struct GlslBackend {
    es: bool,
}

impl GlslBackend {
    pub fn desktop() -> Self {
        Self { es: false }
    }

    pub fn es() -> Self {
        Self { es: true }
    }

    fn scalar_name(&self, ty: &Type) -> Option<&'static str> {
        match ty {
            Type::Bool => Some("bool"),
            Type::I32 => Some("int"),
            Type::U32 => Some("uint"),
            Type::F32 => Some("float"),
            Type::F16 if !self.es => Some("float16_t"),
            _ => None,
        }
    }

    fn vector_prefix(&self, elem: &Type) -> Option<&'static str> {
        match elem {
            Type::Bool => Some("b"),
            Type::I32 => Some("i"),
            Type::U32 => Some("u"),
            Type::F32 => Some(""),
            Type::F16 if !self.es => Some("f16"),
            _ => None,
        }
    }

    fn block(&self, types: &TypeRegistry, var: &GlobalVar, layout: &str, keyword: &str) -> Option<Vec<String>> {
        let binding = var.binding?;
        let qualifier = match (var.space, var.access) {
            (AddressSpace::Storage, Access::Read) => "readonly ",
            (AddressSpace::Storage, Access::Write) => "writeonly ",
            _ => "",
        };
        Some(vec![
            format!(
                "layout(binding = {}, {}) {}{} {}_block {{",
                binding.binding, layout, qualifier, keyword, var.name
            ),
            format!("  {};", self.declaration(types, var.store, &var.name)?),
            "};".to_string(),
        ])
    }

    fn zero(types: &TypeRegistry, pointer: TypeId) -> Option<&'static str> {
        match atomic_inner(types, pointer)? {
            Type::I32 => Some("0"),
            Type::U32 => Some("0u"),
            _ => None,
        }
    }
}

fn input_variable(builtin: BuiltinValue) -> &'static str {
    match builtin {
        BuiltinValue::VertexIndex => "gl_VertexID",
        BuiltinValue::InstanceIndex => "gl_InstanceID",
        BuiltinValue::Position => "gl_FragCoord",
        BuiltinValue::GlobalInvocationId => "gl_GlobalInvocationID",
        BuiltinValue::LocalInvocationIndex => "gl_LocalInvocationIndex",
    }
}

fn vector_compare(kind: BinaryKind) -> Option<&'static str> {
    match kind {
        BinaryKind::Equal => Some("equal"),
        BinaryKind::NotEqual => Some("notEqual"),
        BinaryKind::LessThan => Some("lessThan"),
        BinaryKind::GreaterThan => Some("greaterThan"),
        BinaryKind::LessThanEqual => Some("lessThanEqual"),
        BinaryKind::GreaterThanEqual => Some("greaterThanEqual"),
        _ => None,
    }
}

impl Backend for GlslBackend {
    fn name(&self) -> &'static str {
        if self.es {
            "GLSL ES"
        } else {
            "GLSL"
        }
    }

    fn preamble(&self, version: &Version) -> Vec<String> {
        let number = format!("{}{}0", version.major, version.minor);
        if self.es {
            vec![
                format!("#version {} es", number),
                "precision highp float;".to_string(),
                "precision highp int;".to_string(),
            ]
        } else {
            vec![format!("#version {}", number)]
        }
    }

    fn type_name(&self, types: &TypeRegistry, ty: TypeId) -> Option<String> {
        match &types[ty] {
            Type::Void => Some("void".to_string()),
            Type::Vector { elem, width } => Some(format!("{}vec{}", self.vector_prefix(&types[*elem])?, width)),
            Type::Matrix { columns, rows, elem } => {
                let prefix = match types[*elem] {
                    Type::F32 => "",
                    Type::F16 if !self.es => "f16",
                    _ => return None,
                };
                Some(format!("{}mat{}x{}", prefix, columns, rows))
            }
            Type::Atomic { inner } => self.type_name(types, *inner),
            Type::Array { elem, count } => {
                let elem = self.type_name(types, *elem)?;
                match count {
                    ArrayCount::Constant(n) => Some(format!("{}[{}]", elem, n)),
                    ArrayCount::Runtime => Some(format!("{}[]", elem)),
                    ArrayCount::Override(_) => None,
                }
            }
            Type::Struct(s) => Some(struct_name(s).to_string()),
            Type::Pointer { .. } => None,
            other => self.scalar_name(other).map(str::to_string),
        }
    }

    fn declaration(&self, types: &TypeRegistry, ty: TypeId, name: &str) -> Option<String> {
        // Array sizes follow the name, outermost first.
        let mut dims = String::new();
        let mut current = ty;
        while let Type::Array { elem, count } = &types[current] {
            match count {
                ArrayCount::Constant(n) => dims.push_str(&format!("[{}]", n)),
                ArrayCount::Runtime => dims.push_str("[]"),
                ArrayCount::Override(_) => return None,
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
            AddressSpace::Storage => self.block(types, var, "std430", "buffer"),
            AddressSpace::Uniform => self.block(types, var, "std140", "uniform"),
            AddressSpace::Workgroup => Some(vec![format!("shared {};", self.declaration(types, var.store, &var.name)?)]),
            AddressSpace::Private => {
                let decl = self.declaration(types, var.store, &var.name)?;
                Some(vec![match &var.initializer {
                    Some(init) => format!("{} = {};", decl, init),
                    None => format!("{};", decl),
                }])
            }
            AddressSpace::Function | AddressSpace::Handle => None,
        }
    }

    fn function_header(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>> {
        let Some(stage) = header.stage else {
            let params = header
                .params
                .iter()
                .map(|p| self.declaration(types, p.ty, &p.name))
                .collect::<Option<Vec<_>>>()?;
            let ret = self.type_name(types, header.return_type)?;
            return Some(vec![format!("{} {}({}) {{", ret, header.name, params.join(", "))]);
        };
        if types[header.return_type] != Type::Void || header.params.iter().any(|p| p.builtin.is_none()) {
            return None;
        }
        let mut lines = Vec::new();
        if let (PipelineStage::Compute, Some([x, y, z])) = (stage, header.workgroup_size) {
            lines.push(format!(
                "layout(local_size_x = {}, local_size_y = {}, local_size_z = {}) in;",
                x, y, z
            ));
        }
        lines.push("void main() {".to_string());
        Some(lines)
    }

    fn function_prologue(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>> {
        if !header.is_entry_point() {
            return Some(Vec::new());
        }
        let mut lines = Vec::new();
        for p in &header.params {
            let builtin = p.builtin?;
            lines.push(format!(
                "{} = {}({});",
                self.declaration(types, p.ty, &p.name)?,
                self.type_name(types, p.ty)?,
                input_variable(builtin)
            ));
        }
        Some(lines)
    }

    fn constant(&self, types: &TypeRegistry, value: Constant, ty: TypeId) -> Option<String> {
        let literal = match value {
            Constant::Bool(b) => b.to_string(),
            Constant::I32(v) => c_int(v),
            Constant::U32(v) => format!("{}u", v),
            Constant::F32(v) => float_text(v, "", "uintBitsToFloat"),
            Constant::F16(v) if !self.es => format!("float16_t({})", float_text(v, "", "uintBitsToFloat")),
            Constant::F16(_) => return None,
        };
        if is_vector(types, ty) {
            Some(format!("{}({})", self.type_name(types, ty)?, literal))
        } else {
            Some(literal)
        }
    }

    fn binary(&self, types: &TypeRegistry, kind: BinaryKind, lhs: &Operand, rhs: &Operand) -> Option<String> {
        let vector = is_vector(types, lhs.ty);
        if types.is_bool_scalar_or_vector(lhs.ty) && kind.is_bitwise() {
            if vector {
                return None;
            }
            let token = match kind {
                BinaryKind::And => "&&",
                BinaryKind::Or => "||",
                _ => "^^",
            };
            return Some(infix(lhs, token, rhs));
        }
        if kind == BinaryKind::Modulo && types.is_float_scalar_or_vector(lhs.ty) {
            return None;
        }
        if vector {
            if let Some(f) = vector_compare(kind) {
                return Some(format!("{}({}, {})", f, lhs.text, rhs.text));
            }
        }
        Some(infix(lhs, operator(kind), rhs))
    }

    fn builtin_call(&self, types: &TypeRegistry, builtin: BuiltinFn, args: &[Operand]) -> Option<String> {
        let text: Vec<&str> = args.iter().map(|a| a.text.as_str()).collect();
        let call = |name: &str| Some(format!("{}({})", name, text.join(", ")));
        match builtin {
            BuiltinFn::AtomicLoad => {
                let p = args.first()?;
                Some(format!("atomicOr({}, {})", p.text, Self::zero(types, p.ty)?))
            }
            BuiltinFn::AtomicStore | BuiltinFn::AtomicExchange => call("atomicExchange"),
            BuiltinFn::AtomicSub => {
                let (p, v) = (args.first()?, args.get(1)?);
                Some(format!("atomicAdd({}, -({}))", p.text, v.text))
            }
            BuiltinFn::AtomicAdd
            | BuiltinFn::AtomicMax
            | BuiltinFn::AtomicMin
            | BuiltinFn::AtomicAnd
            | BuiltinFn::AtomicOr
            | BuiltinFn::AtomicXor => call(builtin.name()),
            BuiltinFn::AtomicCompareExchangeWeak => None,

            BuiltinFn::Dpdx | BuiltinFn::DpdxFine | BuiltinFn::DpdxCoarse => match builtin {
                BuiltinFn::DpdxFine if !self.es => call("dFdxFine"),
                BuiltinFn::DpdxCoarse if !self.es => call("dFdxCoarse"),
                BuiltinFn::Dpdx => call("dFdx"),
                _ => None,
            },
            BuiltinFn::Dpdy | BuiltinFn::DpdyFine | BuiltinFn::DpdyCoarse => match builtin {
                BuiltinFn::DpdyFine if !self.es => call("dFdyFine"),
                BuiltinFn::DpdyCoarse if !self.es => call("dFdyCoarse"),
                BuiltinFn::Dpdy => call("dFdy"),
                _ => None,
            },
            BuiltinFn::FwidthFine | BuiltinFn::FwidthCoarse if self.es => None,
            BuiltinFn::CountOneBits => call("bitCount"),
            BuiltinFn::ReverseBits => call("bitfieldReverse"),
            BuiltinFn::CountLeadingZeros | BuiltinFn::CountTrailingZeros => None,
            BuiltinFn::Atan2 => call("atan"),
            BuiltinFn::Round => call("roundEven"),
            BuiltinFn::Select => {
                let (f, t, c) = (args.first()?, args.get(1)?, args.get(2)?);
                Some(format!("mix({}, {}, {})", f.text, t.text, c.text))
            }
            BuiltinFn::ArrayLength => Some(format!("uint({}.length())", args.first()?.text)),
            BuiltinFn::Pack2X16Float => call("packHalf2x16"),
            BuiltinFn::Pack2X16Snorm => call("packSnorm2x16"),
            BuiltinFn::Pack2X16Unorm => call("packUnorm2x16"),
            BuiltinFn::Pack4X8Snorm => call("packSnorm4x8"),
            BuiltinFn::Pack4X8Unorm => call("packUnorm4x8"),
            BuiltinFn::Unpack2X16Float => call("unpackHalf2x16"),
            BuiltinFn::Unpack2X16Snorm => call("unpackSnorm2x16"),
            BuiltinFn::Unpack2X16Unorm => call("unpackUnorm2x16"),
            BuiltinFn::Unpack4X8Snorm => call("unpackSnorm4x8"),
            BuiltinFn::Unpack4X8Unorm => call("unpackUnorm4x8"),
            BuiltinFn::WorkgroupBarrier => Some("barrier()".to_string()),
            BuiltinFn::StorageBarrier => Some("memoryBarrierBuffer()".to_string()),
            BuiltinFn::TextureBarrier => Some("memoryBarrierImage()".to_string()),
            _ if builtin.is_texture()
                || builtin.is_image_query()
                || builtin.is_subgroup()
                || builtin.is_packed_4x8_integer_dot_product() =>
            {
                None
            }
            BuiltinFn::Pack4XI8 | BuiltinFn::Pack4XU8 | BuiltinFn::Unpack4XI8 | BuiltinFn::Unpack4XU8 => None,
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
        Self::zero(types, p.ty)?;
        Some(vec![
            format!("{};", self.declaration(types, result_ty?, result)?),
            format!("{}.old_value = atomicCompSwap({}, {}, {});", result, p.text, cmp.text, v.text),
            format!("{}.exchanged = ({}.old_value == {});", result, result, cmp.text),
        ])
    }

    fn pointer_arg(&self, reference: &str) -> String {
        reference.to_string()
    }

    fn pointer_param_ref(&self, name: &str) -> String {
        name.to_string()
    }
}
