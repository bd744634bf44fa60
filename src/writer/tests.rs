use super::*;
use crate::config::target::Target;
use crate::diagnostic::Severity;
use crate::ir::Builder;
use crate::types::ArrayCount;

fn emit(module: &Module, target: Target) -> String {
    match generate(module, &target) {
        Ok(text) => text,
        Err(errors) => panic!("{} failed: {:?}", target, errors),
    }
}

fn unhandled(module: &Module, target: Target) -> Diagnostic {
    let errors = generate(module, &target).unwrap_err();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    errors.into_iter().next().unwrap()
}

/// A 64-wide compute entry point doubling `buf.data[idx]` when `idx < buf.n`.
fn doubling_shader() -> Module {
    let mut b = Builder::new();
    let u = b.types().u32();
    let arr = b.types().array(u, ArrayCount::Constant(64));
    let s = b.types().structure("Buf", vec![("n".into(), u), ("data".into(), arr)]);
    let root = b.root_block();
    let buf = b
        .var(root, AddressSpace::Storage, s, Access::ReadWrite, None, Some(BindingPoint::new(0, 1)))
        .unwrap();
    b.set_name(buf, "buf");

    let void = b.types().void();
    let main = b.add_function("main", void, &[u]);
    b.set_stage(main, PipelineStage::Compute);
    b.set_workgroup_size(main, [64, 1, 1]);
    b.set_param_builtin(main, 0, BuiltinValue::LocalInvocationIndex);
    let idx = b.param(main, 0);
    b.set_name(idx, "idx");
    let block = b.function_block(main);

    let zero = b.constant(Constant::U32(0));
    let one = b.constant(Constant::U32(1));
    let n_ptr = b.access(block, buf, &[zero]).unwrap();
    let n = b.load(block, n_ptr).unwrap();
    let in_range = b.binary(block, BinaryKind::LessThan, idx, n).unwrap();
    let (_, then, _) = b.if_(block, in_range, false).unwrap();
    let slot = b.access(then, buf, &[one, idx]).unwrap();
    let old = b.load(then, slot).unwrap();
    let doubled = b.binary(then, BinaryKind::ShiftLeft, old, one).unwrap();
    b.store(then, slot, doubled).unwrap();
    b.exit_if(then).unwrap();
    b.return_(block, None).unwrap();
    b.finish()
}

/// A compute entry point calling `builtin` on a workgroup counter.
fn counter_shader(builtin: BuiltinFn) -> Module {
    let mut b = Builder::new();
    let u = b.types().u32();
    let atomic = b.types().atomic(u);
    let root = b.root_block();
    let counter = b
        .var(root, AddressSpace::Workgroup, atomic, Access::ReadWrite, None, None)
        .unwrap();
    b.set_name(counter, "counter");
    let void = b.types().void();
    let main = b.add_function("main", void, &[]);
    b.set_stage(main, PipelineStage::Compute);
    b.set_workgroup_size(main, [1, 1, 1]);
    let block = b.function_block(main);
    let zero = b.constant(Constant::U32(0));
    let one = b.constant(Constant::U32(1));
    let args = match builtin {
        BuiltinFn::AtomicCompareExchangeWeak => vec![counter, zero, one],
        _ => vec![counter, one],
    };
    b.call_builtin(block, builtin, args).unwrap();
    b.return_(block, None).unwrap();
    b.finish()
}

// ─── Dialect output ───────────────────────────────────────────────

#[test]
fn test_wgsl_compute_shader() {
    insta::assert_snapshot!(emit(&doubling_shader(), Target::wgsl()), @r###"
    struct Buf {
      n : u32,
      data : array<u32, 64>,
    }

    @group(0) @binding(1) var<storage, read_write> buf : Buf;

    @compute @workgroup_size(64, 1, 1)
    fn main(@builtin(local_invocation_index) idx : u32) {
      if (idx < buf.n) {
        buf.data[idx] = buf.data[idx] << 1u;
      }
    }
    "###);
}

#[test]
fn test_glsl_compute_shader() {
    insta::assert_snapshot!(emit(&doubling_shader(), Target::glsl(4, 5)), @r###"
    #version 450

    struct Buf {
      uint n;
      uint data[64];
    };

    layout(binding = 1, std430) buffer buf_block {
      Buf buf;
    };

    layout(local_size_x = 64, local_size_y = 1, local_size_z = 1) in;
    void main() {
      uint idx = uint(gl_LocalInvocationIndex);
      if (idx < buf.n) {
        buf.data[idx] = buf.data[idx] << 1u;
      }
    }
    "###);
}

#[test]
fn test_glsl_es_preamble() {
    let text = emit(&doubling_shader(), Target::glsl_es(3, 1));
    assert!(
        text.starts_with("#version 310 es\nprecision highp float;\nprecision highp int;\n\nstruct Buf {"),
        "{}",
        text
    );
}

#[test]
fn test_hlsl_compute_shader() {
    insta::assert_snapshot!(emit(&doubling_shader(), Target::hlsl()), @r###"
    struct Buf {
      uint n;
      uint data[64];
    };

    RWStructuredBuffer<Buf> buf : register(u1, space0);

    [numthreads(64, 1, 1)]
    void main(uint idx : SV_GroupIndex) {
      if (idx < buf[0].n) {
        buf[0].data[idx] = buf[0].data[idx] << 1u;
      }
    }
    "###);
}

#[test]
fn test_msl_compute_shader() {
    insta::assert_snapshot!(emit(&doubling_shader(), Target::msl()), @r###"
    #include <metal_stdlib>
    using namespace metal;

    struct Buf {
      uint n;
      array<uint, 64> data;
    };

    kernel void main_(uint idx [[thread_index_in_threadgroup]], device Buf& buf [[buffer(1)]]) {
      if (idx < buf.n) {
        buf.data[idx] = buf.data[idx] << 1u;
      }
    }
    "###);
}

#[test]
fn test_atomics_per_dialect() {
    let module = counter_shader(BuiltinFn::AtomicAdd);
    insta::assert_snapshot!(emit(&module, Target::wgsl()), @r###"
    var<workgroup> counter : atomic<u32>;

    @compute @workgroup_size(1, 1, 1)
    fn main() {
      atomicAdd(&counter, 1u);
    }
    "###);
    insta::assert_snapshot!(emit(&module, Target::glsl(4, 5)), @r###"
    #version 450

    shared uint counter;

    layout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;
    void main() {
      atomicAdd(counter, 1u);
    }
    "###);
    insta::assert_snapshot!(emit(&module, Target::msl()), @r###"
    #include <metal_stdlib>
    using namespace metal;

    kernel void main_() {
      threadgroup atomic_uint counter;
      atomic_fetch_add_explicit(&counter, 1u, memory_order_relaxed);
    }
    "###);
}

#[test]
fn test_hlsl_matrix_multiply_is_reversed() {
    let mut b = Builder::new();
    let f = b.types().f32();
    let m = b.types().mat(4, 4, f);
    let v = b.types().vec(f, 4);
    let func = b.add_function("transform", v, &[m, v]);
    let (pm, pv) = (b.param(func, 0), b.param(func, 1));
    b.set_name(pm, "m");
    b.set_name(pv, "v");
    let block = b.function_block(func);
    let product = b.binary(block, BinaryKind::Multiply, pm, pv).unwrap();
    b.return_(block, Some(product)).unwrap();
    insta::assert_snapshot!(emit(&b.finish(), Target::hlsl()), @r###"
    float4 transform(float4x4 m, float4 v) {
      return mul(v, m);
    }
    "###);
}

#[test]
fn test_glsl_vector_comparison() {
    let mut b = Builder::new();
    let f = b.types().f32();
    let v = b.types().vec(f, 2);
    let bool_ty = b.types().bool();
    let bv = b.types().vec(bool_ty, 2);
    let func = b.add_function("below", bv, &[v, v]);
    let (x, y) = (b.param(func, 0), b.param(func, 1));
    b.set_name(x, "a");
    b.set_name(y, "b");
    let block = b.function_block(func);
    let lt = b.binary(block, BinaryKind::LessThan, x, y).unwrap();
    b.return_(block, Some(lt)).unwrap();
    insta::assert_snapshot!(emit(&b.finish(), Target::glsl(4, 5)), @r###"
    #version 450

    bvec2 below(vec2 a, vec2 b) {
      return lessThan(a, b);
    }
    "###);
}

// ─── Statement layout ─────────────────────────────────────────────

#[test]
fn test_bare_return_is_elided() {
    let mut b = Builder::new();
    let void = b.types().void();
    let i = b.types().i32();
    let f = b.add_function("f", void, &[]);
    let block = b.function_block(f);
    b.return_(block, None).unwrap();

    let g = b.add_function("g", void, &[i]);
    let x = b.param(g, 0);
    b.set_name(x, "x");
    let block = b.function_block(g);
    let zero = b.constant(Constant::I32(0));
    let positive = b.binary(block, BinaryKind::GreaterThan, x, zero).unwrap();
    let (_, then, _) = b.if_(block, positive, false).unwrap();
    b.return_(then, None).unwrap();
    b.return_(block, None).unwrap();

    insta::assert_snapshot!(emit(&b.finish(), Target::wgsl()), @r###"
    fn f() {
    }

    fn g(x : i32) {
      if (x > 0i) {
        return;
      }
    }
    "###);
}

#[test]
fn test_unreachable_marker() {
    let mut b = Builder::new();
    let i = b.types().i32();
    let bool_ty = b.types().bool();
    let f = b.add_function("pick", i, &[bool_ty]);
    let c = b.param(f, 0);
    b.set_name(c, "c");
    let block = b.function_block(f);
    let one = b.constant(Constant::I32(1));
    let two = b.constant(Constant::I32(2));
    let (_, then, otherwise) = b.if_(block, c, true).unwrap();
    b.return_(then, Some(one)).unwrap();
    b.return_(otherwise.unwrap(), Some(two)).unwrap();
    b.unreachable(block).unwrap();

    insta::assert_snapshot!(emit(&b.finish(), Target::wgsl()), @r###"
    fn pick(c : bool) -> i32 {
      if (c) {
        return 1i;
      } else {
        return 2i;
      }
      /* unreachable */
    }
    "###);
}

#[test]
fn test_loads_are_not_moved_past_stores() {
    let mut b = Builder::new();
    let i = b.types().i32();
    let f = b.add_function("swap_out", i, &[]);
    let block = b.function_block(f);
    let one = b.constant(Constant::I32(1));
    let two = b.constant(Constant::I32(2));
    let x = b
        .var(block, AddressSpace::Function, i, Access::ReadWrite, Some(one), None)
        .unwrap();
    b.set_name(x, "x");
    let a = b.load(block, x).unwrap();
    b.set_name(a, "a");
    b.store(block, x, two).unwrap();
    b.return_(block, Some(a)).unwrap();

    insta::assert_snapshot!(emit(&b.finish(), Target::wgsl()), @r###"
    fn swap_out() -> i32 {
      var x : i32 = 1i;
      let a = x;
      x = 2i;
      return a;
    }
    "###);
}

#[test]
fn test_callees_print_first_and_calls_inline_once() {
    let mut b = Builder::new();
    let i = b.types().i32();
    let caller = b.add_function("caller", i, &[]);
    let twice = b.add_function("twice", i, &[i]);

    let v = b.param(twice, 0);
    b.set_name(v, "v");
    let block = b.function_block(twice);
    let two = b.constant(Constant::I32(2));
    let doubled = b.binary(block, BinaryKind::Multiply, v, two).unwrap();
    b.return_(block, Some(doubled)).unwrap();

    let block = b.function_block(caller);
    let four = b.constant(Constant::I32(4));
    let three = b.constant(Constant::I32(3));
    b.call(block, twice, vec![four]).unwrap();
    let r = b.call(block, twice, vec![three]).unwrap().unwrap();
    b.set_name(r, "r");
    let sum = b.binary(block, BinaryKind::Add, r, r).unwrap();
    b.return_(block, Some(sum)).unwrap();

    insta::assert_snapshot!(emit(&b.finish(), Target::wgsl()), @r###"
    fn twice(v : i32) -> i32 {
      return v * 2i;
    }

    fn caller() -> i32 {
      twice(4i);
      let r = twice(3i);
      return r + r;
    }
    "###);
}

#[test]
fn test_colliding_names_are_suffixed() {
    let mut b = Builder::new();
    let void = b.types().void();
    let i = b.types().i32();
    let f = b.add_function("f", void, &[]);
    let block = b.function_block(f);
    for _ in 0..2 {
        let x = b
            .var(block, AddressSpace::Function, i, Access::ReadWrite, None, None)
            .unwrap();
        b.set_name(x, "x");
    }
    b.return_(block, None).unwrap();

    insta::assert_snapshot!(emit(&b.finish(), Target::wgsl()), @r###"
    fn f() {
      var x : i32;
      var x_1 : i32;
    }
    "###);
}

// ─── Failures ─────────────────────────────────────────────────────

#[test]
fn test_hlsl_atomics_use_interlocked() {
    insta::assert_snapshot!(emit(&counter_shader(BuiltinFn::AtomicAdd), Target::hlsl()), @r###"
    groupshared uint counter;

    [numthreads(1, 1, 1)]
    void main() {
      uint v3;
      InterlockedAdd(counter, 1u, v3);
    }
    "###);
    // A store has no result; the old value lands in a scratch variable.
    let text = emit(&counter_shader(BuiltinFn::AtomicStore), Target::hlsl());
    assert!(text.contains("  uint original;\n  InterlockedExchange(counter, 1u, original);\n"), "{}", text);
    let text = emit(&counter_shader(BuiltinFn::AtomicSub), Target::hlsl());
    assert!(text.contains("InterlockedAdd(counter, -(1u), v3);"), "{}", text);
}

#[test]
fn test_compare_exchange_per_dialect() {
    let module = counter_shader(BuiltinFn::AtomicCompareExchangeWeak);
    // WGSL has the result structure built in.
    let text = emit(&module, Target::wgsl());
    assert!(!text.contains("struct"), "{}", text);
    assert!(text.contains("atomicCompareExchangeWeak(&counter, 0u, 1u);"), "{}", text);

    insta::assert_snapshot!(emit(&module, Target::glsl(4, 5)), @r###"
    #version 450

    struct atomic_compare_exchange_result_u32 {
      uint old_value;
      bool exchanged;
    };

    shared uint counter;

    layout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;
    void main() {
      atomic_compare_exchange_result_u32 v3;
      v3.old_value = atomicCompSwap(counter, 0u, 1u);
      v3.exchanged = (v3.old_value == 0u);
    }
    "###);
    insta::assert_snapshot!(emit(&module, Target::hlsl()), @r###"
    struct atomic_compare_exchange_result_u32 {
      uint old_value;
      bool exchanged;
    };

    groupshared uint counter;

    [numthreads(1, 1, 1)]
    void main() {
      atomic_compare_exchange_result_u32 v3;
      InterlockedCompareExchange(counter, 0u, 1u, v3.old_value);
      v3.exchanged = (v3.old_value == 0u);
    }
    "###);
    insta::assert_snapshot!(emit(&module, Target::msl()), @r###"
    #include <metal_stdlib>
    using namespace metal;

    struct atomic_compare_exchange_result_u32 {
      uint old_value;
      bool exchanged;
    };

    kernel void main_() {
      threadgroup atomic_uint counter;
      atomic_compare_exchange_result_u32 v3;
      v3.old_value = 0u;
      v3.exchanged = atomic_compare_exchange_weak_explicit(&counter, &v3.old_value, 1u, memory_order_relaxed, memory_order_relaxed);
    }
    "###);
}

#[test]
fn test_compare_exchange_operands_are_evaluated_once() {
    let mut b = Builder::new();
    let u = b.types().u32();
    let atomic = b.types().atomic(u);
    let root = b.root_block();
    let counter = b
        .var(root, AddressSpace::Workgroup, atomic, Access::ReadWrite, None, None)
        .unwrap();
    b.set_name(counter, "counter");
    let seen = b.var(root, AddressSpace::Private, u, Access::ReadWrite, None, None).unwrap();
    b.set_name(seen, "seen");
    let void = b.types().void();
    let main = b.add_function("main", void, &[]);
    b.set_stage(main, PipelineStage::Compute);
    b.set_workgroup_size(main, [1, 1, 1]);
    let block = b.function_block(main);
    let one = b.constant(Constant::U32(1));
    let last = b.load(block, seen).unwrap();
    let want = b.binary(block, BinaryKind::Add, last, one).unwrap();
    b.set_name(want, "want");
    let result = b
        .call_builtin(block, BuiltinFn::AtomicCompareExchangeWeak, vec![counter, want, one])
        .unwrap()
        .unwrap();
    b.set_name(result, "swap");
    b.return_(block, None).unwrap();
    let module = b.finish();

    let text = emit(&module, Target::glsl(4, 5));
    assert!(text.contains("  uint want = seen + 1u;\n"), "{}", text);
    assert!(text.contains("swap.old_value = atomicCompSwap(counter, want, 1u);"), "{}", text);
    assert!(text.contains("swap.exchanged = (swap.old_value == want);"), "{}", text);
    assert_eq!(text.matches("seen + 1u").count(), 1, "{}", text);
}

#[test]
fn test_builtin_without_any_form_is_unhandled() {
    let module = counter_shader(BuiltinFn::AtomicCompareExchangeWeak);
    let mut printer = Printer::new(&module, HlslBackend);
    assert!(printer.generate(&Target::hlsl().version).is_ok());
    assert_eq!(printer.stage(), Stage::Done);

    let mut b = Builder::new();
    let i = b.types().i32();
    let func = b.add_function("lz", i, &[i]);
    let x = b.param(func, 0);
    b.set_name(x, "x");
    let block = b.function_block(func);
    let lz = b.call_builtin(block, BuiltinFn::CountLeadingZeros, vec![x]).unwrap();
    b.return_(block, lz).unwrap();
    let module = b.finish();
    let mut printer = Printer::new(&module, GlslBackend::desktop());
    let errors = printer.generate(&Target::glsl(4, 5).version).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::InternalError);
    assert_eq!(errors[0].message, "unhandled case in GLSL printer: countLeadingZeros");
    assert_eq!(errors[0].notes, vec!["while printing the function body of 'lz'".to_string()]);
    assert_ne!(printer.stage(), Stage::Done);
    assert!(printer.result().is_empty());
}

#[test]
fn test_float_modulo() {
    let mut b = Builder::new();
    let f = b.types().f32();
    let func = b.add_function("m", f, &[f, f]);
    let (x, y) = (b.param(func, 0), b.param(func, 1));
    b.set_name(x, "a");
    b.set_name(y, "b");
    let block = b.function_block(func);
    let rem = b.binary(block, BinaryKind::Modulo, x, y).unwrap();
    b.return_(block, Some(rem)).unwrap();
    let module = b.finish();

    let error = unhandled(&module, Target::glsl(4, 5));
    assert_eq!(error.message, "unhandled case in GLSL printer: mod of type 'f32'");
    assert_eq!(error.notes, vec!["while printing the function body of 'm'".to_string()]);

    insta::assert_snapshot!(emit(&module, Target::msl()), @r###"
    #include <metal_stdlib>
    using namespace metal;

    float m(float a, float b) {
      return fmod(a, b);
    }
    "###);
}

#[test]
fn test_msl_helper_touching_globals_is_unhandled() {
    let mut b = Builder::new();
    let i = b.types().i32();
    let void = b.types().void();
    let root = b.root_block();
    let counter = b
        .var(root, AddressSpace::Private, i, Access::ReadWrite, None, None)
        .unwrap();
    b.set_name(counter, "counter");
    let bump = b.add_function("bump", void, &[]);
    let block = b.function_block(bump);
    let one = b.constant(Constant::I32(1));
    b.store(block, counter, one).unwrap();
    b.return_(block, None).unwrap();
    let module = b.finish();

    let error = unhandled(&module, Target::msl());
    assert_eq!(error.message, "unhandled case in MSL printer: function header of 'bump'");
    assert_eq!(error.notes, vec!["while printing the function header of 'bump'".to_string()]);

    insta::assert_snapshot!(emit(&module, Target::wgsl()), @r###"
    var<private> counter : i32;

    fn bump() {
      counter = 1i;
    }
    "###);
}

#[test]
fn test_invalid_module_prints_nothing() {
    let mut b = Builder::new();
    let void = b.types().void();
    b.add_function("open", void, &[]);
    let module = b.finish();

    let expected = validate(&module).unwrap_err();
    let mut printer = Printer::new(&module, WgslBackend);
    let errors = printer.generate(&Target::wgsl().version).unwrap_err();
    assert_eq!(errors, expected);
    assert_eq!(printer.stage(), Stage::Preamble);
    assert_eq!(printer.result(), "");
}

// ─── Exhaustiveness ───────────────────────────────────────────────

/// A module with at least one instruction of every kind.
fn every_instruction() -> Module {
    let mut b = Builder::new();
    let i = b.types().i32();
    let f = b.types().f32();
    let void = b.types().void();
    let v2 = b.types().vec(f, 2);
    let ptr = b.types().pointer(AddressSpace::Function, i, Access::ReadWrite);

    let root = b.root_block();
    let zero_i = b.constant(Constant::I32(0));
    let counter = b
        .var(root, AddressSpace::Private, i, Access::ReadWrite, Some(zero_i), None)
        .unwrap();
    b.set_name(counter, "counter");

    let negate = b.add_function("negate", void, &[ptr]);
    let p = b.param(negate, 0);
    b.set_name(p, "p");
    let block = b.function_block(negate);
    let v = b.load(block, p).unwrap();
    let n = b.unary(block, UnaryKind::Negation, v).unwrap();
    b.store(block, p, n).unwrap();
    b.return_(block, None).unwrap();

    let probe = b.add_function("probe", f, &[v2]);
    let x = b.param(probe, 0);
    b.set_name(x, "x");
    let block = b.function_block(probe);
    let zero_u = b.constant(Constant::U32(0));
    let x0 = b.access(block, x, &[zero_u]).unwrap();
    let local = b
        .var(block, AddressSpace::Function, f, Access::ReadWrite, Some(x0), None)
        .unwrap();
    b.set_name(local, "local");
    let alias = b.let_(block, local).unwrap();
    let y = b.load(block, alias).unwrap();
    b.set_name(y, "y");
    let s = b.call_builtin(block, BuiltinFn::Abs, vec![y]).unwrap().unwrap();
    let m = b.binary(block, BinaryKind::Multiply, y, s).unwrap();
    b.set_name(m, "m");
    b.store(block, local, m).unwrap();
    let slot = b
        .var(block, AddressSpace::Function, i, Access::ReadWrite, None, None)
        .unwrap();
    b.set_name(slot, "i");
    b.call(block, negate, vec![slot]).unwrap();
    let zero_f = b.constant(Constant::F32(0.0));
    let c = b.binary(block, BinaryKind::GreaterThan, m, zero_f).unwrap();
    let (_, then, otherwise) = b.if_(block, c, true).unwrap();
    b.exit_if(then).unwrap();
    b.return_(otherwise.unwrap(), Some(y)).unwrap();
    b.unreachable(block).unwrap();
    b.finish()
}

#[test]
fn test_every_instruction_kind_prints_or_is_reported() {
    let module = every_instruction();
    let mut seen = HashSet::new();
    module.walk_block(module.root_block(), &mut |inst| {
        seen.insert(inst.kind.name());
    });
    for f in module.functions() {
        module.walk_block(module.function(f).block, &mut |inst| {
            let kind = match inst.kind {
                InstKind::Binary(_) => "binary".to_string(),
                InstKind::Unary(_) => "unary".to_string(),
                InstKind::BuiltinCall(_) => "builtin".to_string(),
                _ => inst.kind.name(),
            };
            seen.insert(kind);
        });
    }
    assert_eq!(seen.len(), 13, "{:?}", seen);

    for dialect in Dialect::ALL {
        let target = Target::resolve(dialect.name()).unwrap();
        match generate(&module, &target) {
            Ok(text) => {
                assert!(text.contains("/* unreachable */"), "{}:\n{}", target, text);
                assert!(text.contains("negate("), "{}:\n{}", target, text);
            }
            Err(errors) => {
                for e in errors {
                    assert_eq!(e.severity, Severity::InternalError, "{}: {:?}", target, e);
                    assert!(e.message.starts_with("unhandled case in"), "{}: {:?}", target, e);
                }
            }
        }
    }
}

#[test]
fn test_every_instruction_kind_in_wgsl() {
    insta::assert_snapshot!(emit(&every_instruction(), Target::wgsl()), @r###"
    var<private> counter : i32 = 0i;

    fn negate(p : ptr<function, i32>) {
      (*p) = -(*p);
    }

    fn probe(x : vec2<f32>) -> f32 {
      var local : f32 = x[0u];
      let y = local;
      let m = y * abs(y);
      local = m;
      var i : i32;
      negate(&i);
      if (m > 0.0f) {
      } else {
        return y;
      }
      /* unreachable */
    }
    "###);
}

#[test]
fn test_nested_scope_prints_as_a_block() {
    let mut b = Builder::new();
    let i = b.types().i32();
    let func = b.add_function("f", i, &[]);
    let block = b.function_block(func);
    let yes = b.constant(Constant::Bool(true));
    let (_, inner, _) = b.if_(block, yes, false).unwrap();
    let one = b.constant(Constant::I32(1));
    b.return_(inner, Some(one)).unwrap();
    let two = b.constant(Constant::I32(2));
    b.return_(block, Some(two)).unwrap();
    let module = b.finish();

    insta::assert_snapshot!(emit(&module, Target::wgsl()), @r###"
    fn f() -> i32 {
      {
        return 1i;
      }
      return 2i;
    }
    "###);
    insta::assert_snapshot!(emit(&module, Target::glsl(4, 5)), @r###"
    #version 450

    int f() {
      {
        return 1;
      }
      return 2;
    }
    "###);
}

// ─── Spelling helpers ─────────────────────────────────────────────

#[test]
fn test_literal_edge_cases() {
    assert_eq!(c_int(i32::MIN), "(-2147483647 - 1)");
    assert_eq!(c_int(-3), "-3");
    assert_eq!(float_text(1.5, "f", "asfloat"), "1.5f");
    assert_eq!(float_text(f32::INFINITY, "", "uintBitsToFloat"), "uintBitsToFloat(0x7f800000u)");
}

#[test]
fn test_parentheses() {
    assert_eq!(bare("(a + b)"), "a + b");
    assert_eq!(bare("(a) + (b)"), "(a) + (b)");
    assert_eq!(bare("f(x)"), "f(x)");
    assert_eq!(wrap("buf.n"), "buf.n");
    assert_eq!(wrap("-x"), "(-x)");
}
