//! Funnel transport benchmarks.
//!
//! Measures the checksum engine on its own and a full color write through
//! one rank and through an in-process cluster.
//!
//! Run with:
//! ```bash
//! cargo bench --bench funnel
//! ```

#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ksprop_formats::{Color, ColorVector, Complex, LatticeShape, SITE_RECORD_BYTES, checksum_words};
use ksprop_io::{
    Communicator, FormatKind, IoConfig, LocalCluster, PropFile, SingleRank, SiteMap, SliceLayout,
};
use std::hint::black_box;

fn field(len: usize, offset: usize) -> Vec<ColorVector<f64>> {
    (0..len)
        .map(|i| {
            let x = (i + offset) as f64;
            ColorVector::new([
                Complex::new(x, -x),
                Complex::new(x / 2.0, 1.0),
                Complex::new(0.5, x / 4.0),
            ])
        })
        .collect()
}

fn bench_checksum(c: &mut Criterion) {
    let words: Vec<u32> = (0..1 << 16).map(|i: u32| i.wrapping_mul(0x9e37_79b9)).collect();
    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(words.len() as u64 * 4));
    group.bench_function("checksum_words", |b| {
        b.iter(|| checksum_words(black_box(&words)));
    });
    group.finish();
}

fn bench_single_rank_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create benchmark directory");
    let path = dir.path().join("prop");
    let shape = LatticeShape::new([8, 8, 8, 8]).expect("Valid lattice");
    let map = SliceLayout::new(shape, 1);
    let data = field(shape.volume(), 0);

    let mut group = c.benchmark_group("write_color");
    group.throughput(Throughput::Bytes((shape.volume() * SITE_RECORD_BYTES) as u64));
    for buffer_records in [64, 4096] {
        let config = IoConfig {
            buffer_records,
            write_info_file: false,
            ..IoConfig::default()
        };
        group.bench_with_input(
            BenchmarkId::new("single_rank", buffer_records),
            &config,
            |b, config| {
                b.iter(|| {
                    let mut file = PropFile::create(
                        &SingleRank,
                        &path,
                        shape,
                        FormatKind::Binary,
                        config.clone(),
                    )
                    .expect("Failed to create benchmark file");
                    let sums = file
                        .write_color(&map, Color::ALL[0], &data)
                        .expect("Failed to write color");
                    file.close().expect("Failed to close benchmark file");
                    black_box(sums)
                });
            },
        );
    }
    group.finish();
}

fn bench_cluster_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create benchmark directory");
    let path = dir.path().join("prop");
    let shape = LatticeShape::new([8, 8, 8, 8]).expect("Valid lattice");
    let config = IoConfig {
        write_info_file: false,
        ..IoConfig::default()
    };

    let mut group = c.benchmark_group("cluster_write_color");
    group.throughput(Throughput::Bytes((shape.volume() * SITE_RECORD_BYTES) as u64));
    for ranks in [2, 4] {
        let map = SliceLayout::new(shape, ranks);
        let cluster = LocalCluster::new(ranks);
        group.bench_function(BenchmarkId::from_parameter(ranks), |b| {
            b.iter(|| {
                cluster.run(|comm| {
                    let rank = comm.rank();
                    let data = field(map.sites_on(rank), rank * map.sites_on(0));
                    let mut file = PropFile::create(
                        &comm,
                        &path,
                        shape,
                        FormatKind::Binary,
                        config.clone(),
                    )
                    .expect("Failed to create benchmark file");
                    let sums = file
                        .write_color(&map, Color::ALL[0], &data)
                        .expect("Failed to write color");
                    file.close().expect("Failed to close benchmark file");
                    sums
                })
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_checksum,
    bench_single_rank_write,
    bench_cluster_write
);
criterion_main!(benches);
