//! Criterion benchmarks for circuit evaluation
//!
//! Run with: cargo bench -p klang-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use klang_core::{Circuit, Gain, Mix, Port, Through, Unit};

/// A linear chain of `depth` gain stages between the boundaries.
fn build_chain(depth: usize) -> Circuit {
    let mut c = Circuit::new();
    c.add_boundary_input("in", 0.0);
    c.add_boundary_output("out");
    let mut prev = None;
    for _ in 0..depth {
        let id = c.add_unit(Unit::of(Gain::new(0.99)));
        match prev {
            None => c.connect_input(0, Port::new(id, 0)).unwrap(),
            Some(p) => c.connect(Port::new(p, 0), Port::new(id, 0)).unwrap(),
        }
        prev = Some(id);
    }
    c.connect_output(Port::new(prev.unwrap(), 0), 0).unwrap();
    c
}

/// One shared source fanned out to `width` pass-throughs, re-mixed.
fn build_fan(width: usize) -> Circuit {
    let mut c = Circuit::new();
    c.add_boundary_input("in", 0.0);
    c.add_boundary_output("out");
    let src = c.add_unit(Unit::of(Through));
    c.connect_input(0, Port::new(src, 0)).unwrap();
    let mix = c.add_unit(Unit::of(Mix));
    for _ in 0..width {
        let leg = c.add_unit(Unit::of(Through));
        c.connect(Port::new(src, 0), Port::new(leg, 0)).unwrap();
        c.connect(Port::new(leg, 0), Port::new(mix, 0)).unwrap();
    }
    c.connect_output(Port::new(mix, 0), 0).unwrap();
    c
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_chain");
    for &depth in &[4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("tick", depth), &depth, |b, &depth| {
            let mut circuit = build_chain(depth);
            circuit.set_external_input(0, 0.5);
            b.iter(|| {
                circuit.tick();
                black_box(circuit.read_output(0));
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_fan_out");
    for &width in &[4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("tick", width), &width, |b, &width| {
            let mut circuit = build_fan(width);
            circuit.set_external_input(0, 0.5);
            b.iter(|| {
                circuit.tick();
                black_box(circuit.read_output(0));
            });
        });
    }
    group.finish();
}

fn bench_clone(c: &mut Criterion) {
    let circuit = build_chain(16);
    c.bench_function("circuit_clone_16", |b| {
        b.iter(|| black_box(circuit.clone()));
    });
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_clone);
criterion_main!(benches);
