use core_persist::{packbits_decode, packbits_encode};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_packbits(c: &mut Criterion) {
    // A mostly-flat layer with a painted band, the common shape in practice.
    let mut flat = vec![0u8; 1280 * 64 * 4];
    for chunk in flat[100_000..140_000].chunks_mut(7) {
        chunk[0] = 0xAB;
    }

    c.bench_function("encode_band", |b| {
        b.iter(|| packbits_encode(black_box(&flat)));
    });

    let encoded = packbits_encode(&flat);
    c.bench_function("decode_band", |b| {
        b.iter(|| packbits_decode(black_box(&encoded)).unwrap());
    });
}

criterion_group!(benches, bench_packbits);
criterion_main!(benches);
