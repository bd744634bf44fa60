//! Compile latency per stage.
//!
//! 1. Atomic propagation on a program with many stub calls
//! 2. Lowering to IR
//! 3. Printing, per dialect
//! 4. Total end-to-end

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use glint::builtin::BuiltinFn;
use glint::config::target::Target;
use glint::program::{Attribute, BindingPoint, PipelineStage, ProgramBuilder};
use glint::transform::{DataMap, Manager, SpirvAtomic};
use glint::types::{Access, AddressSpace};
use glint::{compile, ir, writer, CompileOptions, Program};

/// A storage struct with `n` counters, each bumped through a stub and read back.
fn synthetic_program(n: usize) -> Program {
    let mut p = ProgramBuilder::new();
    let u = p.types().u32();
    let void = p.types().void();
    let names: Vec<String> = (0..n).map(|i| format!("c{}", i)).collect();
    let members: Vec<(&str, _)> = names.iter().map(|name| (name.as_str(), u)).collect();
    let s = p.structure("Counters", members);
    let buf = p.resource("buf", AddressSpace::Storage, s, Some(Access::ReadWrite), BindingPoint::new(0, 0));

    let object = p.param("object", u);
    let value = p.param("value", u);
    let zero = p.lit_u32(0);
    let ret = p.ret(Some(zero));
    let add = p.function(
        "stub_atomicAdd",
        vec![object, value],
        u,
        vec![ret],
        vec![Attribute::AtomicStub(BuiltinFn::AtomicAdd)],
    );

    let mut body = Vec::with_capacity(n * 2);
    for (i, name) in names.iter().enumerate() {
        let base = p.ident(buf);
        let member = p.member(base, name.as_str());
        let amount = p.lit_u32(i as u32);
        let call = p.call(add, vec![member, amount]);
        body.push(p.call_stmt(call));

        let base = p.ident(buf);
        let member = p.member(base, name.as_str());
        let local = p.let_(format!("v{}", i), None, member);
        body.push(p.decl(local));
    }
    p.function(
        "main",
        vec![],
        void,
        body,
        vec![Attribute::Stage(PipelineStage::Compute), Attribute::WorkgroupSize(64, 1, 1)],
    );
    p.build()
}

fn bench_atomic_propagation(c: &mut Criterion) {
    let small = synthetic_program(8);
    let large = synthetic_program(128);
    let mut manager = Manager::new();
    manager.add(SpirvAtomic);

    let mut group = c.benchmark_group("spirv_atomic");
    group.bench_function("8_members", |b| {
        b.iter(|| manager.run(black_box(small.clone()), DataMap::new()))
    });
    group.bench_function("128_members", |b| {
        b.iter(|| manager.run(black_box(large.clone()), DataMap::new()))
    });
    group.finish();
}

fn bench_lowering(c: &mut Criterion) {
    let program = synthetic_program(128);
    c.bench_function("from_program/128_members", |b| {
        b.iter(|| ir::from_program::build(black_box(&program)))
    });
}

fn bench_printers(c: &mut Criterion) {
    let program = synthetic_program(128);
    let Ok(prepared) = glint::prepare(&program, &CompileOptions::default()) else {
        return;
    };
    let mut group = c.benchmark_group("print");
    for target in [Target::wgsl(), Target::glsl(4, 5), Target::msl()] {
        group.bench_function(target.dialect.name(), |b| {
            b.iter(|| writer::generate(black_box(&prepared.module), &target))
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let program = synthetic_program(128);
    let options = CompileOptions {
        target: Target::glsl(4, 5),
        ..CompileOptions::default()
    };
    c.bench_function("compile/glsl/128_members", |b| {
        b.iter(|| compile(black_box(&program), &options))
    });
}

criterion_group!(
    benches,
    bench_atomic_propagation,
    bench_lowering,
    bench_printers,
    bench_end_to_end
);
criterion_main!(benches);
