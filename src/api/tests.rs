use super::*;
use crate::builtin::BuiltinFn;
use crate::program::{Attribute, BinaryOp, BindingPoint, BuiltinValue, PipelineStage, ProgramBuilder};
use crate::types::{Access, AddressSpace};

fn compute(p: &mut ProgramBuilder, params: Vec<crate::program::VarId>, body: Vec<crate::program::StmtId>) {
    let void = p.types().void();
    p.function(
        "main",
        params,
        void,
        body,
        vec![Attribute::Stage(PipelineStage::Compute), Attribute::WorkgroupSize(1, 1, 1)],
    );
}

/// A workgroup counter bumped through an atomic stub.
fn stub_counter() -> Program {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let object = p.param("object", i);
    let value = p.param("value", i);
    let zero = p.lit_i32(0);
    let ret = p.ret(Some(zero));
    let stub = p.function(
        "stub_atomicAdd",
        vec![object, value],
        i,
        vec![ret],
        vec![Attribute::AtomicStub(BuiltinFn::AtomicAdd)],
    );
    let arg = p.ident(counter);
    let one = p.lit_i32(1);
    let call = p.call(stub, vec![arg, one]);
    let stmt = p.call_stmt(call);
    compute(&mut p, vec![], vec![stmt]);
    p.build()
}

/// `buf = buf << idx` on a storage buffer bound at group 0, binding 1.
fn shifter() -> Program {
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let buf = p.resource("buf", AddressSpace::Storage, u, Some(Access::ReadWrite), BindingPoint::new(0, 1));
    let idx = p.builtin_param("idx", u, BuiltinValue::LocalInvocationIndex);
    let lhs = p.ident(buf);
    let value = p.ident(buf);
    let amount = p.ident(idx);
    let shifted = p.binary(BinaryOp::ShiftLeft, value, amount);
    let assign = p.assign(lhs, shifted);
    compute(&mut p, vec![idx], vec![assign]);
    p.build()
}

/// A vertex entry point recording its vertex index.
fn vertex_recorder() -> Program {
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let void = p.types().void();
    let last = p.global_var("last", AddressSpace::Private, u, None);
    let vi = p.builtin_param("vi", u, BuiltinValue::VertexIndex);
    let lhs = p.ident(last);
    let rhs = p.ident(vi);
    let assign = p.assign(lhs, rhs);
    p.function("vs", vec![vi], void, vec![assign], vec![Attribute::Stage(PipelineStage::Vertex)]);
    p.build()
}

#[test]
fn test_default_options() {
    let options = CompileOptions::default();
    assert_eq!(options.target, Target::wgsl());
    assert!(options.binding_remapper.is_none());
    assert!(options.first_index_offset.is_none());
    assert!(!options.bound_array_accessors);
}

#[test]
fn test_for_target() {
    let options = CompileOptions::for_target("hlsl").unwrap();
    assert_eq!(options.target, Target::hlsl());
    let err = CompileOptions::for_target("spirv").unwrap_err();
    assert!(err.message.contains("unknown target 'spirv'"));
}

#[test]
fn test_program_transforms_follow_options() {
    let (manager, data) = CompileOptions::default().program_transforms();
    assert_eq!(manager.names(), vec!["SpirvAtomic"]);
    assert!(data.is_empty());

    let options = CompileOptions::default()
        .with_binding_remapper(BindingRemapperConfig::default())
        .with_first_index_offset(FirstIndexOffsetConfig::new(0, 7))
        .with_bound_array_accessors();
    let (manager, data) = options.program_transforms();
    assert_eq!(
        manager.names(),
        vec!["SpirvAtomic", "BindingRemapper", "FirstIndexOffset", "BoundArrayAccessors"]
    );
    assert!(data.contains::<BindingRemapperConfig>());
    assert_eq!(data.get::<FirstIndexOffsetConfig>(), Some(&FirstIndexOffsetConfig::new(0, 7)));
}

#[test]
fn test_shift_mask_only_for_c_like_dialects() {
    assert!(CompileOptions::default().ir_transforms().is_empty());
    for target in [Target::glsl(4, 5), Target::glsl_es(3, 1), Target::hlsl(), Target::msl()] {
        let options = CompileOptions { target, ..CompileOptions::default() };
        assert_eq!(options.ir_transforms().names(), vec!["ShiftMask"]);
    }
}

#[test]
fn test_compile_resolves_atomic_stub() {
    let out = compile(&stub_counter(), &CompileOptions::default()).unwrap();
    assert_eq!(out.changed, vec!["SpirvAtomic"]);
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert!(out.text.contains("var<workgroup> counter : atomic<i32>;"), "{}", out.text);
    assert!(out.text.contains("atomicAdd(&counter, 1i);"), "{}", out.text);
    assert!(!out.text.contains("stub_atomicAdd"));
    assert!(out.first_index_offset.is_none());
}

#[test]
fn test_compile_does_not_touch_input() {
    let program = stub_counter();
    let before = crate::program::writer::to_wgsl(&program);
    compile(&program, &CompileOptions::default()).unwrap();
    assert_eq!(crate::program::writer::to_wgsl(&program), before);
}

#[test]
fn test_shift_amount_masked_for_glsl_only() {
    let program = shifter();
    let glsl = compile(&program, &CompileOptions { target: Target::glsl(4, 5), ..CompileOptions::default() }).unwrap();
    assert_eq!(glsl.changed, vec!["ShiftMask"]);
    assert!(glsl.text.contains("& 31u"), "{}", glsl.text);

    let wgsl = compile(&program, &CompileOptions::default()).unwrap();
    assert!(wgsl.changed.is_empty());
    assert!(!wgsl.text.contains("& 31u"), "{}", wgsl.text);
}

#[test]
fn test_binding_remapper_moves_resource() {
    let config = BindingRemapperConfig::default().remap(BindingPoint::new(0, 1), BindingPoint::new(2, 3));
    let options = CompileOptions::default().with_binding_remapper(config);
    let out = compile(&shifter(), &options).unwrap();
    assert_eq!(out.changed, vec!["BindingRemapper"]);
    assert!(out.text.contains("@group(2) @binding(3) var<storage, read_write> buf : u32;"), "{}", out.text);
}

#[test]
fn test_first_index_offset_reports_layout() {
    let options = CompileOptions::default().with_first_index_offset(FirstIndexOffsetConfig::new(4, 1));
    let out = compile(&vertex_recorder(), &options).unwrap();
    assert_eq!(out.changed, vec!["FirstIndexOffset"]);
    let data = out.first_index_offset.unwrap();
    assert!(data.has_vertex_index);
    assert!(!data.has_instance_index);
    assert_eq!(data.first_vertex_offset, 0);
    assert!(out.text.contains("@group(1) @binding(4) var<uniform> first_index_data"), "{}", out.text);
    assert!(out.text.contains("first_vertex_index"), "{}", out.text);
}

#[test]
fn test_first_index_offset_skips_compute() {
    let options = CompileOptions::default().with_first_index_offset(FirstIndexOffsetConfig::new(4, 1));
    let out = compile(&shifter(), &options).unwrap();
    assert!(out.changed.is_empty());
    assert!(out.first_index_offset.is_none());
}

/// `f(x) = countLeadingZeros(x)`, which GLSL has no spelling for.
fn leading_zeros() -> Program {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let x = p.param("x", i);
    let arg = p.ident(x);
    let call = p.call_builtin(BuiltinFn::CountLeadingZeros, vec![arg]);
    let ret = p.ret(Some(call));
    p.function("f", vec![x], i, vec![ret], vec![]);
    p.build()
}

#[test]
fn test_writer_failure_is_returned() {
    let options = CompileOptions { target: Target::glsl(4, 5), ..CompileOptions::default() };
    let errors = compile(&leading_zeros(), &options).unwrap_err();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].message, "unhandled case in GLSL printer: countLeadingZeros");
}

#[test]
fn test_compile_all_targets() {
    let targets = [Target::wgsl(), Target::glsl(4, 5), Target::hlsl(), Target::msl()];
    let results = compile_all(&stub_counter(), &CompileOptions::default(), &targets);
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    let hlsl = results[2].1.as_ref().unwrap();
    assert!(hlsl.text.contains("InterlockedAdd(counter, 1, "), "{}", hlsl.text);

    let results = compile_all(&leading_zeros(), &CompileOptions::default(), &targets);
    let ok: Vec<bool> = results.iter().map(|(_, r)| r.is_ok()).collect();
    assert_eq!(ok, vec![true, false, false, true]);
    assert_eq!(results[1].0, Target::glsl(4, 5));
}

#[test]
fn test_bound_array_accessors_clamp_before_printing() {
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let arr_ty = p.types().array(u, crate::types::ArrayCount::Constant(8));
    let table = p.global_var("table", AddressSpace::Workgroup, arr_ty, None);
    let idx = p.builtin_param("idx", u, BuiltinValue::LocalInvocationIndex);
    let object = p.ident(table);
    let index = p.ident(idx);
    let lhs = p.index(object, index);
    let one = p.lit_u32(1);
    let assign = p.assign(lhs, one);
    compute(&mut p, vec![idx], vec![assign]);
    let program = p.build();

    let plain = compile(&program, &CompileOptions::default()).unwrap();
    assert!(plain.text.contains("table[idx] = 1u;"), "{}", plain.text);

    let options = CompileOptions::default().with_bound_array_accessors();
    let out = compile(&program, &options).unwrap();
    assert_eq!(out.changed, vec!["BoundArrayAccessors"]);
    assert!(out.text.contains("table[min(idx, 7u)] = 1u;"), "{}", out.text);
}
