use super::{infix, operator, Backend, FunctionHeader, GlobalVar, Operand};
use crate::builtin::BuiltinFn;
use crate::config::target::Version;
use crate::ir::{BinaryKind, Constant};
use crate::program::PipelineStage;
use crate::types::{AddressSpace, StructType, Type, TypeId, TypeRegistry};

/// WGSL output. Types print in their friendly spelling.
pub struct WgslBackend;

impl WgslBackend {
    fn scalar_literal(value: Constant) -> String {
        match value {
            Constant::I32(i32::MIN) => "i32(-2147483648)".to_string(),
            Constant::F32(v) if !v.is_finite() => format!("bitcast<f32>(0x{:08x}u)", v.to_bits()),
            other => other.to_string(),
        }
    }
}

impl Backend for WgslBackend {
    fn name(&self) -> &'static str {
        "WGSL"
    }

    fn preamble(&self, _version: &Version) -> Vec<String> {
        Vec::new()
    }

    fn type_name(&self, types: &TypeRegistry, ty: TypeId) -> Option<String> {
        Some(match types[ty] {
            // The access mode is only spelled for storage pointers.
            Type::Pointer { space, store, .. } if space != AddressSpace::Storage => {
                format!("ptr<{}, {}>", space.name(), types.friendly_name(store))
            }
            _ => types.friendly_name(ty),
        })
    }

    fn declaration(&self, types: &TypeRegistry, ty: TypeId, name: &str) -> Option<String> {
        Some(format!("{} : {}", name, self.type_name(types, ty)?))
    }

    fn predeclares_builtin_structs(&self) -> bool {
        true
    }

    fn struct_decl(&self, types: &TypeRegistry, s: &StructType) -> Option<Vec<String>> {
        let mut lines = vec![format!("struct {} {{", s.name)];
        for m in &s.members {
            lines.push(format!("  {},", self.declaration(types, m.ty, &m.name)?));
        }
        lines.push("}".to_string());
        Some(lines)
    }

    fn global_var(&self, types: &TypeRegistry, var: &GlobalVar) -> Option<Vec<String>> {
        let attrs = match var.binding {
            Some(b) => format!("@group({}) @binding({}) ", b.group, b.binding),
            None => String::new(),
        };
        let keyword = match var.space {
            AddressSpace::Storage => format!("var<storage, {}>", var.access.name()),
            AddressSpace::Handle => "var".to_string(),
            space => format!("var<{}>", space.name()),
        };
        let decl = self.declaration(types, var.store, &var.name)?;
        Some(vec![match &var.initializer {
            Some(init) => format!("{}{} {} = {};", attrs, keyword, decl, init),
            None => format!("{}{} {};", attrs, keyword, decl),
        }])
    }

    fn function_header(&self, types: &TypeRegistry, header: &FunctionHeader) -> Option<Vec<String>> {
        let mut lines = Vec::new();
        match (header.stage, header.workgroup_size) {
            (Some(PipelineStage::Compute), Some([x, y, z])) => {
                lines.push(format!("@compute @workgroup_size({}, {}, {})", x, y, z))
            }
            (Some(stage), _) => lines.push(format!("@{}", stage.name())),
            (None, _) => {}
        }
        let mut params = Vec::with_capacity(header.params.len());
        for p in &header.params {
            let decl = self.declaration(types, p.ty, &p.name)?;
            match (p.builtin, header.is_entry_point()) {
                (Some(b), _) => params.push(format!("@builtin({}) {}", b.name(), decl)),
                // Entry-point inputs other than builtins need locations.
                (None, true) => return None,
                (None, false) => params.push(decl),
            }
        }
        let ret = match types[header.return_type] {
            Type::Void => String::new(),
            _ => {
                let ty = self.type_name(types, header.return_type)?;
                match header.stage {
                    Some(PipelineStage::Vertex) => format!(" -> @builtin(position) {}", ty),
                    Some(PipelineStage::Fragment) => format!(" -> @location(0) {}", ty),
                    Some(PipelineStage::Compute) => return None,
                    None => format!(" -> {}", ty),
                }
            }
        };
        lines.push(format!("fn {}({}){} {{", header.name, params.join(", "), ret));
        Some(lines)
    }

    fn local_var(&self, types: &TypeRegistry, ty: TypeId, name: &str, init: Option<&str>) -> Option<String> {
        let decl = self.declaration(types, ty, name)?;
        Some(match init {
            Some(init) => format!("var {} = {};", decl, init),
            None => format!("var {};", decl),
        })
    }

    fn let_decl(&self, _types: &TypeRegistry, _ty: TypeId, name: &str, value: &str) -> Option<String> {
        Some(format!("let {} = {};", name, value))
    }

    fn constant(&self, types: &TypeRegistry, value: Constant, ty: TypeId) -> Option<String> {
        let scalar = Self::scalar_literal(value);
        match types[ty] {
            Type::Vector { .. } => Some(format!("{}({})", types.friendly_name(ty), scalar)),
            _ => Some(scalar),
        }
    }

    fn binary(&self, types: &TypeRegistry, kind: BinaryKind, lhs: &Operand, rhs: &Operand) -> Option<String> {
        let token = match kind {
            BinaryKind::Xor if types.is_bool_scalar_or_vector(lhs.ty) => "!=",
            _ => operator(kind),
        };
        Some(infix(lhs, token, rhs))
    }

    fn builtin_call(&self, _types: &TypeRegistry, builtin: BuiltinFn, args: &[Operand]) -> Option<String> {
        let args: Vec<&str> = args.iter().map(|a| a.text.as_str()).collect();
        Some(format!("{}({})", builtin.name(), args.join(", ")))
    }
}
