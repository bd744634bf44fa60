use glint::builtin::BuiltinFn;
use glint::config::target::Target;
use glint::diagnostic::Severity;
use glint::program::{Attribute, BindingPoint, FnId, PipelineStage, ProgramBuilder, StmtId};
use glint::transform::{should_run, DataMap, Manager, SpirvAtomic};
use glint::types::{Access, AddressSpace, Type, TypeId};
use glint::{compile, ir, writer, CompileOptions, Program};

fn stub(p: &mut ProgramBuilder, builtin: BuiltinFn, ty: TypeId) -> FnId {
    let object = p.param("object", ty);
    let value = p.param("value", ty);
    let zero = p.lit_i32(0);
    let ret = p.ret(Some(zero));
    p.function(
        format!("stub_{}", builtin.name()),
        vec![object, value],
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

fn wgsl(program: &Program) -> String {
    match compile(program, &CompileOptions::default()) {
        Ok(out) => out.text,
        Err(errors) => panic!(
            "should compile, got {} errors: {:?}",
            errors.len(),
            errors.iter().map(|e| &e.message).collect::<Vec<_>>()
        ),
    }
}

/// Scenario B input: one stub add on a workgroup `i32`.
fn counter_program() -> Program {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i);
    let arg = p.ident(counter);
    let one = p.lit_i32(1);
    let call = p.call(add, vec![arg, one]);
    let stmt = p.call_stmt(call);
    entry(&mut p, vec![stmt]);
    p.build()
}

/// Scenario C input: `S.a` feeds a stub, `S.b` is only read.
fn struct_program() -> Program {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let s = p.structure("S", vec![("a", i), ("b", i)]);
    let buf = p.resource("buf", AddressSpace::Storage, s, Some(Access::ReadWrite), BindingPoint::new(0, 0));
    let add = stub(&mut p, BuiltinFn::AtomicAdd, i);

    let base = p.ident(buf);
    let a = p.member(base, "a");
    let one = p.lit_i32(1);
    let call = p.call(add, vec![a, one]);
    let s1 = p.call_stmt(call);

    let base = p.ident(buf);
    let a = p.member(base, "a");
    let x = p.let_("x", None, a);
    let s2 = p.decl(x);

    let base = p.ident(buf);
    let b = p.member(base, "b");
    let y = p.let_("y", None, b);
    let s3 = p.decl(y);

    let base = p.ident(buf);
    let b = p.member(base, "b");
    let sum = {
        let lx = p.ident(x);
        let ly = p.ident(y);
        p.add(lx, ly)
    };
    let s4 = p.assign(b, sum);
    entry(&mut p, vec![s1, s2, s3, s4]);
    p.build()
}

#[test]
fn test_scenario_a_no_stubs_is_a_straight_translation() {
    let mut p = ProgramBuilder::new();
    let i = p.types().i32();
    let counter = p.global_var("counter", AddressSpace::Workgroup, i, None);
    let lhs = p.ident(counter);
    let one = p.lit_i32(1);
    let assign = p.assign(lhs, one);
    entry(&mut p, vec![assign]);
    let program = p.build();

    let out = compile(&program, &CompileOptions::default()).unwrap();
    assert!(out.changed.is_empty());
    let module = ir::from_program::build(&program).unwrap();
    assert_eq!(out.text, writer::generate(&module, &Target::wgsl()).unwrap());
    assert!(!out.text.contains("atomic"));
}

#[test]
fn test_scenario_a_empty_program() {
    let program = ProgramBuilder::new().build();
    assert!(!should_run(&SpirvAtomic, &program, &DataMap::new()));
    let out = compile(&program, &CompileOptions::default()).unwrap();
    assert!(out.changed.is_empty());
    assert_eq!(out.text.trim(), "");
}

#[test]
fn test_scenario_b_stub_becomes_atomic_builtin() {
    let text = wgsl(&counter_program());
    assert!(text.contains("var<workgroup> counter : atomic<i32>;"), "{}", text);
    assert!(text.contains("atomicAdd(&counter, 1i);"), "{}", text);
    assert!(!text.contains("stub_"), "{}", text);
}

#[test]
fn test_scenario_c_only_touched_member_is_atomic() {
    let program = struct_program();
    let text = wgsl(&program);
    assert!(text.contains("struct S_atomic {\n  a : atomic<i32>,\n  b : i32,\n}"), "{}", text);
    assert!(text.contains("var<storage, read_write> buf : S_atomic;"), "{}", text);
    assert!(text.contains("atomicAdd(&buf.a, 1i);"), "{}", text);
    assert!(text.contains("atomicLoad(&buf.a)"), "{}", text);
    assert!(text.contains("buf.b"), "{}", text);
    assert!(!text.contains("atomicLoad(&buf.b)"), "{}", text);
    assert!(!text.contains("atomicStore(&buf.b"), "{}", text);

    // The caller's struct is never rewritten in place.
    let original = program.find_struct("S").unwrap();
    let st = program.types().as_struct(original).unwrap();
    assert_eq!(program.types()[st.members[0].ty], Type::I32);
}

#[test]
fn test_scenario_d_only_top_level_bare_return_is_elided() {
    let mut p = ProgramBuilder::new();
    let void = p.types().void();
    let ret = p.ret(None);
    p.function("f", vec![], void, vec![ret], vec![]);
    let ret = p.ret(None);
    let nested = p.block(vec![ret]);
    p.function("g", vec![], void, vec![nested], vec![]);
    let text = wgsl(&p.build());
    assert!(text.contains("fn f() {\n}\n"), "{}", text);
    let g = &text[text.find("fn g()").unwrap()..];
    assert!(g.contains("fn g() {\n  {\n    return;\n  }\n}"), "{}", text);
    assert!(!text.contains("if (true)"), "{}", text);
}

#[test]
fn test_scenario_e_unhandled_construct_produces_no_text() {
    // GLSL has no spelling for countLeadingZeros.
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let bits = p.global_var("bits", AddressSpace::Workgroup, u, None);
    let lhs = p.ident(bits);
    let arg = p.ident(bits);
    let lz = p.call_builtin(BuiltinFn::CountLeadingZeros, vec![arg]);
    let assign = p.assign(lhs, lz);
    entry(&mut p, vec![assign]);
    let program = p.build();

    let options = CompileOptions {
        target: Target::glsl(4, 5),
        ..CompileOptions::default()
    };
    let errors = compile(&program, &options).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::InternalError);
    assert_eq!(errors[0].message, "unhandled case in GLSL printer: countLeadingZeros");
    assert_eq!(errors[0].notes, vec!["while printing the function body of 'main'".to_string()]);
    assert!(compile(&program, &CompileOptions::default()).is_ok());
}

#[test]
fn test_atomic_propagation_is_idempotent() {
    let program = struct_program();
    let mut manager = Manager::new();
    manager.add(SpirvAtomic);
    let once = manager.run(program, DataMap::new()).unwrap();
    assert_eq!(once.changed, vec!["SpirvAtomic"]);
    assert!(!should_run(&SpirvAtomic, &once.program, &DataMap::new()));

    let twice = manager.run(once.program.clone(), DataMap::new()).unwrap();
    assert!(twice.changed.is_empty());
    assert_eq!(wgsl(&twice.program), wgsl(&once.program));
}

#[test]
fn test_compile_is_deterministic() {
    let program = struct_program();
    for target in [Target::wgsl(), Target::glsl(4, 5), Target::msl()] {
        let options = CompileOptions {
            target,
            ..CompileOptions::default()
        };
        let first = compile(&program, &options).unwrap().text;
        let second = compile(&program, &options).unwrap().text;
        assert_eq!(first, second, "{}", target);
    }
}

#[test]
fn test_every_dialect_prints_or_reports() {
    let program = counter_program();
    for name in ["wgsl", "glsl", "glsl-es", "hlsl", "msl"] {
        let options = CompileOptions::for_target(name).unwrap();
        match compile(&program, &options) {
            Ok(out) => assert!(out.text.contains("counter"), "{}: {}", name, out.text),
            Err(errors) => {
                assert!(!errors.is_empty());
                assert!(
                    errors.iter().all(|e| e.message.starts_with("unhandled case in")),
                    "{}: {:?}",
                    name,
                    errors
                );
            }
        }
    }
}
