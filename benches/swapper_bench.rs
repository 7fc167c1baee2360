// Page Swapper Performance Benchmarks
// Measures scalar page round trips and vectored batch flushes against a
// temporary backing file.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::RngCore;
use rusty_swap::{PageSwapper, SingleFileSwapper, SwapConfig};
use tempfile::TempDir;

const PAGE_SIZE: usize = 8192;

fn create_swapper() -> (SingleFileSwapper, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let swapper = SingleFileSwapper::open(
        temp_dir.path().join("bench.db"),
        PAGE_SIZE,
        &SwapConfig::default(),
        None,
    )
    .unwrap();
    (swapper, temp_dir)
}

fn bench_scalar_io(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalar_io");

    let (swapper, _temp) = create_swapper();
    let mut page = vec![0u8; PAGE_SIZE];
    rand::rng().fill_bytes(&mut page);

    group.bench_function("write_page", |b| {
        let mut page_id = 0u64;
        b.iter(|| {
            swapper.write(black_box(page_id % 1024), &page).unwrap();
            page_id += 1;
        });
    });

    group.bench_function("read_page", |b| {
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut page_id = 0u64;
        b.iter(|| {
            swapper.read(black_box(page_id % 1024), &mut buf).unwrap();
            page_id += 1;
        });
    });

    group.finish();
}

fn bench_vectored_io(c: &mut Criterion) {
    let mut group = c.benchmark_group("vectored_io");

    for run_len in [4usize, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("write_run", run_len),
            &run_len,
            |b, &run_len| {
                let (swapper, _temp) = create_swapper();
                let pages: Vec<Vec<u8>> = (0..run_len)
                    .map(|_| {
                        let mut page = vec![0u8; PAGE_SIZE];
                        rand::rng().fill_bytes(&mut page);
                        page
                    })
                    .collect();
                let run: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
                b.iter(|| {
                    swapper.write_vectored(black_box(0), &run).unwrap();
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("read_run", run_len),
            &run_len,
            |b, &run_len| {
                let (swapper, _temp) = create_swapper();
                let seed = vec![7u8; PAGE_SIZE];
                for page_id in 0..run_len as u64 {
                    swapper.write(page_id, &seed).unwrap();
                }
                let mut bufs: Vec<Vec<u8>> = (0..run_len).map(|_| vec![0u8; PAGE_SIZE]).collect();
                b.iter(|| {
                    let mut run: Vec<&mut [u8]> =
                        bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
                    swapper.read_vectored(black_box(0), &mut run).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_scalar_io, bench_vectored_io);
criterion_main!(benches);
