//! Benchmarks for fragment stitching and prefill extraction.

use convertflow::inference::{continuation_prefill, Concatenate, DropLastLine, StitchPolicy};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn fragments(count: usize, lines: usize) -> Vec<String> {
    (0..count)
        .map(|f| {
            (0..lines)
                .map(|l| format!("    int value_{f}_{l} = compute({l});"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect()
}

fn stitch_benchmark(c: &mut Criterion) {
    let input = fragments(8, 400);

    c.bench_function("drop_last_line_8x400", |b| {
        b.iter(|| DropLastLine.stitch(black_box(&input)))
    });
    c.bench_function("concatenate_8x400", |b| {
        b.iter(|| Concatenate.stitch(black_box(&input)))
    });
    c.bench_function("continuation_prefill", |b| {
        b.iter(|| continuation_prefill(black_box(&input[0])))
    });
}

criterion_group!(benches, stitch_benchmark);
criterion_main!(benches);
