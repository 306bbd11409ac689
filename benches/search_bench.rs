use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use simsearch_rs::{Dataset, IndexConfig, SearchEngine, Series};

fn make_dataset(n_series: usize, len: usize) -> Dataset {
    Dataset::new(
        (0..n_series)
            .map(|s| {
                let phase = s as f64 * 13.7;
                Series::univariate(
                    (0..len)
                        .map(|i| {
                            let t = i as f64 + phase;
                            (t * 0.21).sin() + 0.4 * (t * 0.83).cos() + 0.1 * (t * 2.9).sin()
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    for n_series in [16, 64] {
        let dataset = make_dataset(n_series, 2_000);
        let config = IndexConfig::new(64);
        group.bench_with_input(BenchmarkId::from_parameter(n_series), &n_series, |b, _| {
            b.iter(|| SearchEngine::build(black_box(dataset.clone()), black_box(config.clone())))
        });
    }
    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_query");
    let dataset = make_dataset(64, 2_000);
    let query: Vec<Vec<f64>> = vec![dataset.series(3).channel(0)[500..564].to_vec()];

    let plain = SearchEngine::build(dataset.clone(), IndexConfig::new(64));
    let with_landmarks =
        SearchEngine::build(dataset, IndexConfig::new(64).with_landmarks(4));

    for k in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("coeff_only", k), &k, |b, &k| {
            b.iter(|| plain.knn(black_box(&query), k))
        });
        group.bench_with_input(BenchmarkId::new("with_landmarks", k), &k, |b, &k| {
            b.iter(|| with_landmarks.knn(black_box(&query), k))
        });
    }
    group.finish();
}

fn bench_knn_vs_brute_force(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_vs_brute_force");
    let dataset = make_dataset(32, 1_000);
    let engine = SearchEngine::build(dataset.clone(), IndexConfig::new(32));
    let stats = dataset.rolling_stats(32);
    let query: Vec<Vec<f64>> = vec![dataset.series(1).channel(0)[200..232].to_vec()];

    group.bench_function("indexed", |b| b.iter(|| engine.knn(black_box(&query), 10)));
    group.bench_function("brute_force", |b| {
        b.iter(|| simsearch_rs::brute_force_knn(&dataset, &stats, black_box(&query), 10))
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_knn, bench_knn_vs_brute_force);
criterion_main!(benches);
