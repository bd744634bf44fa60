use super::*;
use crate::program::writer::to_wgsl;
use crate::program::{Attribute, BindingPoint, PipelineStage, ProgramBuilder};
use crate::types::{Access, AddressSpace};

fn stub(p: &mut ProgramBuilder, builtin: BuiltinFn, ty: TypeId, extra: usize) -> FnId {
    let mut params = vec![p.param("object", ty)];
    for i in 0..extra {
        params.push(p.param(format!("arg{}", i), ty));
    }
    let u32_ty = p.types().u32();
    let zero = if ty == u32_ty { p.lit_u32(0) } else { p.lit_i32(0) };
    let ret = p.ret(Some(zero));
    p.function(
        format!("stub_{}", builtin.name()),
        params,
        ty,
        vec![ret],
        vec![Attribute::AtomicStub(builtin)],
    )
}

fn entry(p: &mut ProgramBuilder, body: Vec<StmtId>) {
    let void = p.types().void();
    p.function(
        "main",
        vec![],
        void,
        body,
        vec![Attribute::Stage(PipelineStage::Compute), Attribute::WorkgroupSize(1, 1, 1)],
    );
}

fn run(program: &Program) -> Applied<Program> {
    SpirvAtomic
        .apply(program, &DataMap::new(), &mut DataMap::new())
        .unwrap()
}

fn changed(program: &Program) -> (Program, Vec<Diagnostic>) {
    match run(program) {
        Applied::Changed { output, diagnostics } => (output, diagnostics),
        Applied::Skip => panic!("expected SpirvAtomic to change the program"),
    }
}

#[test]
fn test_skips_without_stubs() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let lhs = p.ident(counter);
    let one = p.lit_i32(1);
    let assign = p.assign(lhs, one);
    entry(&mut p, vec![assign]);
    assert!(run(&p.build()).is_skip());
}

#[test]
fn test_atomic_add_on_module_scope_var() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i, 1);
    let arg = p.ident(counter);
    let one = p.lit_i32(1);
    let call = p.call(add, vec![arg, one]);
    let stmt = p.call_stmt(call);
    entry(&mut p, vec![stmt]);

    let (output, diagnostics) = changed(&p.build());
    assert!(diagnostics.is_empty());
    assert_eq!(
        to_wgsl(&output),
        "var<workgroup> counter : atomic<i32>;\n\
         \n\
         @compute\n\
         @workgroup_size(1, 1, 1)\n\
         fn main() {\n\
         \x20 atomicAdd(&counter, 1i);\n\
         }\n"
    );
    assert!(output.find_function("stub_atomicAdd").is_none());
}

#[test]
fn test_struct_member_is_forked() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let s = p.structure("S", vec![("a", i), ("b", i)]);
    let buf = p.resource("buf", AddressSpace::Storage, s, Some(Access::ReadWrite), BindingPoint::new(0, 0));
    let other = p.global_var("other", AddressSpace::Private, s, None);
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i, 1);

    let base = p.ident(buf);
    let member = p.member(base, "a");
    let one = p.lit_i32(1);
    let call = p.call(add, vec![member, one]);
    let s1 = p.call_stmt(call);

    let base = p.ident(buf);
    let a = p.member(base, "a");
    let x = p.let_("x", None, a);
    let s2 = p.decl(x);

    let base = p.ident(buf);
    let b = p.member(base, "b");
    let y = p.let_("y", None, b);
    let s3 = p.decl(y);

    let base = p.ident(other);
    let oa = p.member(base, "a");
    let z = p.let_("z", None, oa);
    let s4 = p.decl(z);
    entry(&mut p, vec![s1, s2, s3, s4]);

    let input = p.build();
    let (output, diagnostics) = changed(&input);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    insta::assert_snapshot!(to_wgsl(&output), @r###"
    struct S_atomic {
      a : atomic<i32>,
      b : i32,
    }

    struct S {
      a : i32,
      b : i32,
    }

    @group(0) @binding(0) var<storage, read_write> buf : S_atomic;

    var<private> other : S;

    @compute
    @workgroup_size(1, 1, 1)
    fn main() {
      atomicAdd(&buf.a, 1i);
      let x = atomicLoad(&buf.a);
      let y = buf.b;
      let z = other.a;
    }
    "###);

    // The input keeps its original shape.
    let original = input.find_struct("S").unwrap();
    let st = input.types().as_struct(original).unwrap();
    assert_eq!(input.types()[st.members[0].ty], Type::I32);
}

#[test]
fn test_compare_exchange_reads_old_value() {
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, u, None);
    let cmpxchg = stub(&mut p, BuiltinFn::AtomicCompareExchangeWeak, u, 2);
    let arg = p.ident(counter);
    let expected = p.lit_u32(0);
    let value = p.lit_u32(1);
    let call = p.call(cmpxchg, vec![arg, expected, value]);
    let r = p.let_("r", None, call);
    let stmt = p.decl(r);
    entry(&mut p, vec![stmt]);

    let (output, _) = changed(&p.build());
    let text = to_wgsl(&output);
    assert!(
        text.contains(
            "  let old_value = atomicCompareExchangeWeak(&counter, 0u, 1u).old_value;\n  let r = old_value;\n"
        ),
        "{}",
        text
    );
    assert!(text.contains("var<workgroup> counter : atomic<u32>;"));
}

#[test]
fn test_plain_store_and_read_become_atomic_calls() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i, 1);
    let arg = p.ident(counter);
    let one = p.lit_i32(1);
    let call = p.call(add, vec![arg, one]);
    let s1 = p.call_stmt(call);

    let lhs = p.ident(counter);
    let five = p.lit_i32(5);
    let s2 = p.assign(lhs, five);

    let read = p.ident(counter);
    let one = p.lit_i32(1);
    let sum = p.add(read, one);
    let x = p.let_("x", None, sum);
    let s3 = p.decl(x);

    let addr = p.ident(counter);
    let ptr = p.address_of(addr);
    let q = p.let_("q", None, ptr);
    let s4 = p.decl(q);
    entry(&mut p, vec![s1, s2, s3, s4]);

    let (output, _) = changed(&p.build());
    let text = to_wgsl(&output);
    assert!(text.contains("  atomicStore(&counter, 5i);\n"), "{}", text);
    assert!(text.contains("  let x = (atomicLoad(&counter) + 1i);\n"), "{}", text);
    assert!(text.contains("  let q = &counter;\n"), "{}", text);
}

#[test]
fn test_propagates_through_pointer_let() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i, 1);
    let target = p.ident(counter);
    let addr = p.address_of(target);
    let ptr = p.let_("p", None, addr);
    let s1 = p.decl(ptr);
    let base = p.ident(ptr);
    let deref = p.deref(base);
    let one = p.lit_i32(1);
    let call = p.call(add, vec![deref, one]);
    let s2 = p.call_stmt(call);
    entry(&mut p, vec![s1, s2]);

    let (output, _) = changed(&p.build());
    let text = to_wgsl(&output);
    assert!(text.contains("var<workgroup> counter : atomic<i32>;"), "{}", text);
    assert!(text.contains("  let p = &counter;\n  atomicAdd(p, 1i);\n"), "{}", text);
}

#[test]
fn test_nested_struct_in_runtime_array() {
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let item = p.structure("Item", vec![("count", u), ("tag", u)]);
    let items = p.types().array(item, ArrayCount::Runtime);
    let buffer = p.structure("Buf", vec![("items", items)]);
    let buf = p.resource("buf", AddressSpace::Storage, buffer, Some(Access::ReadWrite), BindingPoint::new(0, 1));
    let add = stub(&mut p, BuiltinFn::AtomicAdd, u, 1);
    let base = p.ident(buf);
    let list = p.member(base, "items");
    let idx = p.lit_i32(0);
    let elem = p.index(list, idx);
    let count = p.member(elem, "count");
    let one = p.lit_u32(1);
    let call = p.call(add, vec![count, one]);
    let stmt = p.call_stmt(call);
    entry(&mut p, vec![stmt]);

    let (output, diagnostics) = changed(&p.build());
    assert!(diagnostics.is_empty());
    let text = to_wgsl(&output);
    assert!(
        text.starts_with(
            "struct Item_atomic {\n  count : atomic<u32>,\n  tag : u32,\n}\n\nstruct Item {\n"
        ),
        "{}",
        text
    );
    assert!(text.contains("struct Buf_atomic {\n  items : array<Item_atomic>,\n}\n\nstruct Buf {\n  items : array<Item>,\n}"));
    assert!(text.contains("var<storage, read_write> buf : Buf_atomic;"));
    assert!(text.contains("atomicAdd(&buf.items[0i].count, 1u);"));
}

#[test]
fn test_override_sized_array_falls_back_to_one() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let arr = p.types().array(i, ArrayCount::Override("N".into()));
    let counters = p.global_var("counters", AddressSpace::Workgroup, arr, None);
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i, 1);
    let base = p.ident(counters);
    let idx = p.lit_i32(2);
    let elem = p.index(base, idx);
    let one = p.lit_i32(1);
    let call = p.call(add, vec![elem, one]);
    let stmt = p.call_stmt(call);
    entry(&mut p, vec![stmt]);

    let (output, diagnostics) = changed(&p.build());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, OVERRIDE_COUNT_UNSUPPORTED);
    assert!(diagnostics[0].is_error());
    assert!(to_wgsl(&output).contains("var<workgroup> counters : array<atomic<i32>, 1>;"));
}

#[test]
fn test_second_run_skips() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let sub = stub(&mut p, BuiltinFn::AtomicSub, i, 1);
    let arg = p.ident(counter);
    let one = p.lit_i32(1);
    let call = p.call(sub, vec![arg, one]);
    let stmt = p.call_stmt(call);
    entry(&mut p, vec![stmt]);

    let (output, _) = changed(&p.build());
    assert!(run(&output).is_skip());
}

#[test]
fn test_stub_call_without_arguments_is_fatal() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let zero = p.lit_i32(0);
    let ret = p.ret(Some(zero));
    let bad = p.function("bad", vec![], i, vec![ret], vec![Attribute::AtomicStub(BuiltinFn::AtomicAdd)]);
    let call = p.call(bad, vec![]);
    let stmt = p.call_stmt(call);
    entry(&mut p, vec![stmt]);
    let errors = SpirvAtomic
        .apply(&p.build(), &DataMap::new(), &mut DataMap::new())
        .unwrap_err();
    assert!(errors[0].message.contains("has no arguments"));
}
