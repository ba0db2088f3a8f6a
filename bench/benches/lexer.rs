use criterion::{criterion_group, criterion_main, Criterion};
use kou::lexer::{self, SUGGESTED_TOKENS_CAPACITY};
use std::hint::black_box;

static INPUT: &str = include_str!("../inputs/sample.kou");

fn criterion_benchmark(c: &mut Criterion) {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);

    c.bench_function("lexer", |b| {
        b.iter(|| {
            tokens.clear();
            lexer::lex(black_box(INPUT), &mut tokens).unwrap();
            black_box(tokens.len());
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
