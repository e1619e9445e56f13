use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rpl::engine::Engine;
use rpl::utf8;

static NUMS: &str = "digit = [0-9]\nint = digit+\nnum = int {\".\" int}?";

fn bench_utf8_range_compile(c: &mut Criterion) {
    let mut n = 0u32;
    c.bench_function("utf8_range_compile", |b| {
        b.iter(|| {
            // vary the interval so the cache doesn't short-circuit the work
            n = (n + 1) % 0x800;
            utf8::compile_range(black_box(n), black_box(0x10ffff)).unwrap()
        })
    });
}

fn bench_utf8_range_match(c: &mut Criterion) {
    let peg = utf8::compile_range(0, 0x10ffff).unwrap();
    c.bench_function("utf8_range_match", |b| {
        b.iter(|| {
            for input in ["a", "é", "世", "🌍"] {
                peg.match_bytes(black_box(input.as_bytes()));
            }
        })
    });
}

fn bench_compile_block(c: &mut Criterion) {
    c.bench_function("compile_block", |b| {
        b.iter(|| {
            let mut engine = Engine::new();
            engine.load(black_box(NUMS)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_utf8_range_compile,
    bench_utf8_range_match,
    bench_compile_block
);
criterion_main!(benches);
