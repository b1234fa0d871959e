//! Shared fixtures for the severity pipeline integration tests

#![allow(dead_code)]

use accident_severity::ml::SyntheticRecordSource;
use accident_severity::models::{RawColumn, RawRecord, Severity};
use accident_severity::{Config, SeverityPredictor};
use std::collections::HashMap;
use std::path::Path;

/// Default configuration with a smaller ensemble and a private artifact directory
pub fn test_config(artifact_dir: &Path) -> Config {
    let mut config = Config::default();
    config.model.artifact_dir = artifact_dir.to_path_buf();
    config.training.n_estimators = 30;
    config.data.synthetic_samples = 400;
    config
}

/// Synthetic records with an exact 70/20/10 Slight/Serious/Fatal mix
pub fn labelled_batch(count: usize, seed: u64) -> Vec<RawRecord> {
    SyntheticRecordSource::new(count, seed)
        .generate()
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let severity = match i % 10 {
                0..=6 => Severity::Slight,
                7 | 8 => Severity::Serious,
                _ => Severity::Fatal,
            };
            record.with(RawColumn::Severity, severity.code() as f64)
        })
        .collect()
}

/// A complete prediction request whose categories all occur in synthetic data
pub fn request() -> RawRecord {
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

/// A predictor trained on `labelled_batch(count, seed)`
pub async fn trained_predictor(config: Config, count: usize, seed: u64) -> SeverityPredictor {
    let predictor = SeverityPredictor::new(config);
    predictor
        .train(labelled_batch(count, seed))
        .await
        .expect("training on the labelled batch succeeds");
    predictor
}

/// Parse Prometheus exposition text into metric name -> lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
