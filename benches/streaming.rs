use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_online::feature_engineering::FeatureHasher;
use kolosal_online::streaming::{CollectingReporter, Driver, RunState};
use kolosal_online::training::{EstimatorKind, IncrementalClassifier};
use kolosal_online::utils::{Batch, CsvChunkSource, CsvSourceOptions, Schema};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::io::Cursor;
use std::sync::Arc;

const COLUMNS: [&str; 8] = ["id", "click", "hour", "site_id", "app_id", "device_model", "banner_pos", "c14"];

fn create_rows(n_rows: usize, seed: u64) -> Vec<Vec<String>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..n_rows)
        .map(|i| {
            vec![
                format!("{}", i),
                format!("{}", (rng.gen::<f64>() < 0.17) as u8),
                format!("141021{:02}", rng.gen_range(0..24)),
                format!("{:08x}", rng.gen_range(0..500u32)),
                format!("{:08x}", rng.gen_range(0..300u32)),
                format!("{:08x}", rng.gen_range(0..2000u32)),
                format!("{}", rng.gen_range(0..7)),
                format!("{}", rng.gen_range(15000..25000)),
            ]
        })
        .collect()
}

fn create_csv(n_rows: usize) -> String {
    let mut data = COLUMNS.join(",");
    data.push('\n');
    for row in create_rows(n_rows, 7) {
        data.push_str(&row.join(","));
        data.push('\n');
    }
    data
}

fn bench_encode_and_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_update");
    let columns: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    let schema = Arc::new(Schema::new(columns, "click", &["id".to_string()]).unwrap());
    let classes = vec!["0".to_string(), "1".to_string()];
    let hasher = FeatureHasher::default();

    for chunk_size in [100, 1000, 5000].iter() {
        let batch = Batch::from_rows(Arc::clone(&schema), 0, create_rows(*chunk_size, 1)).unwrap();
        let mut model = EstimatorKind::default().build(&classes, hasher.n_features()).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", chunk_size), &batch, |b, batch| {
            b.iter(|| hasher.encode(black_box(batch)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("predict_update", chunk_size), &batch, |b, batch| {
            let encoded = hasher.encode(batch).unwrap();
            b.iter(|| {
                let proba = model.predict_proba(black_box(&encoded.features)).unwrap();
                model.partial_fit(&encoded.features, &encoded.labels).unwrap();
                proba
            })
        });
    }

    group.finish();
}

fn bench_driver(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver");
    group.sample_size(10);

    let data = create_csv(20_000);
    let classes = vec!["0".to_string(), "1".to_string()];
    let driver = Driver::new(FeatureHasher::new(1 << 18).unwrap(), None).unwrap();

    group.bench_function("full_run_20k", |b| {
        b.iter(|| {
            let options = CsvSourceOptions { chunk_size: 1000, ..CsvSourceOptions::default() };
            let mut source = CsvChunkSource::from_reader(Cursor::new(data.as_bytes()), &options).unwrap();
            let model = EstimatorKind::default().build(&classes, 1 << 18).unwrap();
            let mut state = RunState::new(model, 5).unwrap();
            let mut reporter = CollectingReporter::default();
            driver.run(&mut source, &mut state, &mut reporter).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_encode_and_update, bench_driver);
criterion_main!(benches);
