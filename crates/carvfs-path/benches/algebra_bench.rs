use criterion::{black_box, criterion_group, criterion_main, Criterion};
use carvfs_path::{Context, Entity, Segment};

/// `count` fragments of `size` bytes with a one-byte gap between them.
fn striped(count: u64, size: u64, shift: u64) -> Entity {
    (0..count)
        .map(|i| Segment::fragment(shift + i * (size + 1), size))
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let a = striped(1000, 100, 0);
    let b = striped(1000, 100, 50);

    c.bench_function("merge_1000_fragments", |bench| {
        bench.iter(|| {
            let mut level = a.clone();
            level.merge(black_box(&b))
        })
    });
}

fn bench_overlap(c: &mut Criterion) {
    let a = striped(1000, 100, 0);
    let b = striped(1000, 100, 50);

    c.bench_function("overlap_size_1000_fragments", |bench| {
        bench.iter(|| a.overlap_size(black_box(&b)))
    });
}

fn bench_parse_nested(c: &mut Criterion) {
    let ctx = Context::in_memory();
    let path = "0+20000_40000+20000/10000+20000/5000+10000/2500+5000/1250+2500/625+1250";

    c.bench_function("parse_nested_6_levels", |bench| {
        bench.iter(|| ctx.parse(black_box(path)).unwrap())
    });
}

criterion_group!(benches, bench_merge, bench_overlap, bench_parse_nested);
criterion_main!(benches);
