//! Performance benchmarks for vaultmirror
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;
use vaultmirror::config::HashAlgorithm;
use vaultmirror::fs::{CopyOptions, FileCopier, ScanConfig, Scanner};
use vaultmirror::safety::CancelSignal;

fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_copy_large_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_file_copy");

    for size in [1024 * 1024, 10 * 1024 * 1024, 100 * 1024 * 1024].iter() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let quarantine_dir = dst_dir.path().join(".quarantine");

        let src_file = create_test_file(src_dir.path(), "large.bin", *size);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("durable_copy", humansize::format_size(*size as u64, humansize::BINARY)), size, |b, _| {
            let dst_file = dst_dir.path().join("large.bin");
            let copier = FileCopier::new(CopyOptions::default());
            let cancel = CancelSignal::new();

            b.iter(|| {
                let _ = black_box(copier.copy_with_quarantine(
                    &src_file,
                    &dst_file,
                    std::path::Path::new("large.bin"),
                    &quarantine_dir,
                    HashAlgorithm::Blake3,
                    &cancel,
                ));
                let _ = std::fs::remove_file(&dst_file);
            });
        });
    }

    group.finish();
}

fn bench_hash_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_algorithms");

    let data_size = 10 * 1024 * 1024; // 10 MB
    let data: Vec<u8> = (0..data_size).map(|i| (i % 256) as u8).collect();

    group.throughput(Throughput::Bytes(data_size as u64));

    for algo in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
        group.bench_with_input(BenchmarkId::new("hash", algo.name()), &data, |b, data| {
            b.iter(|| black_box(vaultmirror::hash::hash_bytes(data, algo)));
        });
    }

    group.finish();
}

fn bench_directory_scan(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();

    for i in 0..10 {
        let subdir = dir.path().join(format!("subdir_{i}"));
        std::fs::create_dir_all(&subdir).unwrap();

        for j in 0..100 {
            create_test_file(&subdir, &format!("file_{j}.txt"), 1024);
        }
    }

    c.bench_function("scan_1000_files", |b| {
        b.iter(|| {
            let scanner = Scanner::new(ScanConfig::default());
            black_box(scanner.scan(dir.path()).unwrap())
        });
    });
}

criterion_group!(benches, bench_copy_large_file, bench_hash_algorithms, bench_directory_scan);

criterion_main!(benches);
