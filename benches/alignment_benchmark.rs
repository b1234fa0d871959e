//! Criterion benchmarks for the inference path
//!
//! These benchmarks measure:
//! - Raw request normalization
//! - Schema alignment of an imputed record
//! - Full prediction through the facade

use accident_severity::ml::normalizer::normalize_inference;
use accident_severity::ml::{ClassifierTrainer, InferenceAligner, SyntheticRecordSource};
use accident_severity::models::{RawColumn, RawRecord};
use accident_severity::{Config, SeverityPredictor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn request() -> RawRecord {
    RawRecord::new()
        .with(RawColumn::Longitude, -0.1276)
        .with(RawColumn::Latitude, 51.5072)
        .with(RawColumn::AccidentDate, "2022-11-18")
        .with(RawColumn::AccidentTime, "17:45")
        .with(RawColumn::WeatherConditions, "Fine no high winds")
        .with(RawColumn::LightConditions, "Darkness - lights lit")
        .with(RawColumn::RoadType, "Dual carriageway")
        .with(RawColumn::SpeedLimit, 40.0)
        .with(RawColumn::RoadSurfaceConditions, "Wet or damp")
        .with(RawColumn::JunctionDetail, "T or staggered junction")
        .with(RawColumn::UrbanOrRuralArea, "Urban")
}

fn bench_normalize(c: &mut Criterion) {
    let raw = request();
    c.bench_function("normalize_inference", |b| {
        b.iter(|| normalize_inference(black_box(&raw)).unwrap());
    });
}

fn bench_align(c: &mut Criterion) {
    let mut config = Config::default();
    config.training.n_estimators = 10;
    let outcome = ClassifierTrainer::new(config.training)
        .train(&SyntheticRecordSource::new(500, 42).generate())
        .unwrap();
    let aligner = InferenceAligner::new(&outcome.schema).unwrap();
    let mut record = normalize_inference(&request()).unwrap();
    outcome.schema.imputer().impute(&mut record);

    c.bench_function("align_record", |b| {
        b.iter(|| aligner.align(black_box(&record)));
    });
}

fn bench_predict(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let raw = request();

    let mut group = c.benchmark_group("predict");
    group.throughput(Throughput::Elements(1));
    for trees in [10usize, 50, 100] {
        let mut config = Config::default();
        config.model.artifact_dir = dir.path().join(trees.to_string());
        config.training.n_estimators = trees;
        let predictor = SeverityPredictor::new(config);
        runtime
            .block_on(predictor.train(SyntheticRecordSource::new(500, 42).generate()))
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(trees), &raw, |b, raw| {
            b.iter(|| predictor.predict(black_box(raw)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_align, bench_predict);
criterion_main!(benches);
