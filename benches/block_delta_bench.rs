use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pgbackrest_core::block_delta::{self, BlockMapItem};
use pgbackrest_core::codec::{get_codec, Codec, CompressType};

fn bench_codec(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];

    let gz = get_codec(CompressType::Gz);
    c.bench_function("gz_compress_1mb", |b| b.iter(|| gz.compress(black_box(&data), 6)));

    let zst = get_codec(CompressType::Zst);
    c.bench_function("zst_compress_1mb", |b| b.iter(|| zst.compress(black_box(&data), 3)));

    let lz4 = get_codec(CompressType::Lz4);
    c.bench_function("lz4_compress_1mb", |b| b.iter(|| lz4.compress(black_box(&data), 0)));
}

fn bench_plan(c: &mut Criterion) {
    let checksum_size = 20;
    let block_map: Vec<BlockMapItem> = (0..10_000)
        .map(|i| BlockMapItem {
            block_no: i,
            offset: i * 4096,
            size: 4096,
            super_block_size: 4096,
            reference: 0,
            bundle_id: 0,
            checksum: vec![(i % 256) as u8; checksum_size],
        })
        .collect();
    let existing: Vec<u8> = block_map.iter().flat_map(|b| b.checksum.clone()).collect();

    c.bench_function("block_delta_plan_10k_unchanged", |b| {
        b.iter(|| block_delta::plan(black_box(&block_map), 4096, checksum_size, Some(black_box(&existing))))
    });

    c.bench_function("block_delta_plan_10k_all_new", |b| b.iter(|| block_delta::plan(black_box(&block_map), 4096, checksum_size, None)));
}

criterion_group!(benches, bench_codec, bench_plan);
criterion_main!(benches);
