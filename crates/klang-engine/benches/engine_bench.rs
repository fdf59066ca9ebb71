//! Criterion benchmarks for the voice engine tick path
//!
//! Run with: cargo bench -p klang-engine
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use klang_core::{Circuit, Const, Gain, GateEnvelope, Port, Unit};
use klang_engine::VoiceEngine;

fn prototype() -> Circuit {
    let mut c = Circuit::new();
    c.add_boundary_output("out");
    let src = c.add_unit(Unit::of(Const::new(1.0)));
    let env = c.add_unit(Unit::of(GateEnvelope::default()));
    let gain = c.add_unit(Unit::of(Gain::new(0.5)));
    c.connect(Port::new(src, 0), Port::new(env, 0)).unwrap();
    c.connect(Port::new(env, 0), Port::new(gain, 0)).unwrap();
    c.connect_output(Port::new(gain, 0), 0).unwrap();
    c
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_tick");
    for &sounding in &[1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("voices", sounding),
            &sounding,
            |b, &sounding| {
                let (mut engine, _sender) = VoiceEngine::new(prototype(), 16);
                for n in 0..sounding {
                    engine.note_on(60 + n as u8, 100);
                }
                let (mut l, mut r) = (0.0, 0.0);
                b.iter(|| {
                    engine.tick(0.0, 0.0, &mut l, &mut r);
                    black_box(l);
                });
            },
        );
    }
    group.finish();
}

fn bench_process_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_process_block");
    for &sounding in &[1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("voices_64f", sounding),
            &sounding,
            |b, &sounding| {
                let (mut engine, _sender) = VoiceEngine::new(prototype(), 16);
                engine.set_block_size(64);
                for n in 0..sounding {
                    engine.note_on(60 + n as u8, 100);
                }
                let silence = [0.0; 64];
                let (mut l, mut r) = ([0.0; 64], [0.0; 64]);
                b.iter(|| {
                    engine.process_block(&silence, &silence, &mut l, &mut r);
                    black_box(l[0]);
                });
            },
        );
    }
    group.finish();
}

fn bench_note_on_steal(c: &mut Criterion) {
    c.bench_function("note_on_with_steal", |b| {
        let (mut engine, _sender) = VoiceEngine::new(prototype(), 8);
        for n in 0..8u8 {
            engine.note_on(40 + n, 100);
        }
        let mut note = 60u8;
        b.iter(|| {
            engine.note_on(black_box(note), 100);
            note = note.wrapping_add(1).max(1);
        });
    });
}

criterion_group!(benches, bench_tick, bench_process_block, bench_note_on_steal);
criterion_main!(benches);
