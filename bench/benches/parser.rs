use criterion::{criterion_group, criterion_main, Criterion};
use kou::{lexer, parser};
use std::hint::black_box;

static INPUT: &str = include_str!("../inputs/sample.kou");

fn criterion_benchmark(c: &mut Criterion) {
    let tokens = lexer::tokenize(INPUT).unwrap();

    c.bench_function("parser", |b| {
        b.iter(|| {
            let module = parser::parse(black_box(&tokens)).unwrap();
            black_box(module);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
