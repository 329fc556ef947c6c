use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use presamples::config::{LoaderConfig, PackageOptions};
use presamples::data::{
    ExchangeType, Lookup, MatrixStore, SampleMatrix, SeedSpec, TECHNOSPHERE_MATRIX,
};
use presamples::io::package::{create_package, MatrixData, ParameterData};
use presamples::model::Indexer;
use presamples::pipelines::PackagesDataLoader;
use std::hint::black_box;
use std::path::{Path, PathBuf};

const NCOLS: usize = 100;

/// Technosphere package with `n` production exchanges and `n` inputs
fn technosphere_package(dir: &Path, n: usize) -> PathBuf {
    let mut rows = Vec::with_capacity(2 * n);
    let mut exchanges = Vec::with_capacity(2 * n);
    for i in 0..n as u64 {
        exchanges.push((i, i, ExchangeType::Production));
        exchanges.push(((i + 1) % n as u64, i, ExchangeType::Technosphere));
        rows.push((0..NCOLS).map(|c| 1.0 + c as f64).collect::<Vec<f64>>());
        rows.push((0..NCOLS).map(|c| 0.01 * c as f64).collect::<Vec<f64>>());
    }
    let samples = SampleMatrix::from_rows(rows).expect("Build samples");
    let data = MatrixData::technosphere(samples, &exchanges).expect("Technosphere data");
    create_package(
        &[data],
        &[],
        &PackageOptions::new()
            .id(format!("tech{}", n))
            .dirpath(dir)
            .seed(SeedSpec::Value(42)),
    )
    .expect("Create package")
    .1
}

fn parameter_package(dir: &Path, id: &str, n: usize) -> PathBuf {
    let names = (0..n).map(|i| format!("p{}", i)).collect();
    let rows = (0..n)
        .map(|i| (0..NCOLS).map(|c| (i * c) as f64).collect())
        .collect();
    let data = ParameterData::new("params", names, SampleMatrix::from_rows(rows).expect("Build samples"));
    create_package(
        &[],
        &[data],
        &PackageOptions::new().id(id).dirpath(dir).seed(SeedSpec::Value(7)),
    )
    .expect("Create package")
    .1
}

fn store(n: usize) -> MatrixStore {
    let lookup: Lookup = (0..n as u64).map(|i| (i, i as usize)).collect();
    MatrixStore::new()
        .with_matrix(TECHNOSPHERE_MATRIX, n, n)
        .with_lookup("_product_dict", lookup.clone())
        .with_lookup("_activity_dict", lookup)
}

/// Benchmark seeded column draws
fn bench_indexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexer_advance");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("seeded", |b| {
        let mut indexer = Indexer::new(NCOLS, Some(SeedSpec::Value(1)));
        b.iter(|| {
            for _ in 0..1000 {
                black_box(indexer.advance());
            }
        })
    });

    group.finish();
}

/// Benchmark one Monte-Carlo iteration: advance + matrix update
fn bench_update_matrices(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_matrices");
    let dir = tempfile::tempdir().expect("Create temp dir");

    for n in [100, 1_000, 10_000] {
        let path = technosphere_package(dir.path(), n);
        let mut loader = PackagesDataLoader::new([&path], LoaderConfig::default()).expect("Load");
        let mut owner = store(n);
        loader.index_arrays(&owner);

        group.throughput(Throughput::Elements(2 * n as u64));
        group.bench_with_input(BenchmarkId::new("exchanges", 2 * n), &n, |b, _| {
            b.iter(|| {
                loader.advance();
                loader
                    .update_matrices(Some(&mut owner), None)
                    .expect("Update");
            })
        });
    }

    group.finish();
}

/// Benchmark reading every consolidated parameter across overriding packages
fn bench_parameters(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidated_parameters");
    let dir = tempfile::tempdir().expect("Create temp dir");

    for n in [100, 1_000] {
        let base = parameter_package(dir.path(), &format!("base{}", n), n);
        let top = parameter_package(dir.path(), &format!("top{}", n), n / 2);
        let mut loader =
            PackagesDataLoader::new([&base, &top], LoaderConfig::default()).expect("Load");

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("names", n), &n, |b, _| {
            b.iter(|| {
                loader.advance();
                black_box(loader.parameters().consolidated_array().expect("Read"))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_indexer, bench_update_matrices, bench_parameters);
criterion_main!(benches);
