//! End-to-end tests of the severity pipeline: training, persistence,
//! alignment and the predictor facade.

mod common;

use accident_severity::ml::normalizer::{normalize_batch, normalize_inference, DEFAULT_HOUR};
use accident_severity::ml::{
    needs_manual_review, ClassifierTrainer, FeatureEncoder, Imputer, InferenceAligner,
    ModelArtifactStore,
};
use accident_severity::models::{RawColumn, Severity, TimeOfDay};
use accident_severity::{AppError, SeverityPredictor};
use common::{labelled_batch, request, test_config, trained_predictor};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[test]
fn test_training_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let batch = labelled_batch(1000, 7);

    let first = ClassifierTrainer::new(config.training.clone())
        .train(&batch)
        .unwrap();
    let second = ClassifierTrainer::new(config.training.clone())
        .train(&batch)
        .unwrap();

    assert_eq!(first.schema.feature_names, second.schema.feature_names);
    assert_eq!(first.schema.label_classes, second.schema.label_classes);
    assert_eq!(first.metrics.confusion_matrix, second.metrics.confusion_matrix);
    assert_eq!(first.metrics.accuracy, second.metrics.accuracy);
    assert_eq!(
        first.model.forest.feature_importances(),
        second.model.forest.feature_importances()
    );

    // 700/200/100 with a 0.2 test split keeps 140/40/20 held out
    assert_eq!(first.metrics.n_test_samples, 200);
    assert_eq!(first.metrics.n_training_samples, 800);
    let held_out: Vec<usize> = first
        .metrics
        .confusion_matrix
        .iter()
        .map(|row| row.iter().sum())
        .collect();
    assert_eq!(first.schema.label_classes, vec!["Fatal", "Serious", "Slight"]);
    assert_eq!(held_out, vec![20, 40, 140]);
}

#[test]
fn test_seen_category_sets_its_indicator() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let outcome = ClassifierTrainer::new(config.training)
        .train(&labelled_batch(300, 11))
        .unwrap();
    let schema = &outcome.schema;

    let mut record = normalize_inference(&request()).unwrap();
    schema.imputer().impute(&mut record);
    let aligned = InferenceAligner::new(schema).unwrap().align(&record);

    assert!(aligned.unseen.is_empty());
    let column = schema
        .index_of("weather_conditions_Fine no high winds")
        .unwrap();
    assert_eq!(aligned.vector[column], 1.0);

    let weather_total: f64 = schema
        .feature_names
        .iter()
        .zip(&aligned.vector)
        .filter(|(name, _)| name.starts_with("weather_conditions_"))
        .map(|(_, value)| value)
        .sum();
    assert_eq!(weather_total, 1.0);
}

#[tokio::test]
async fn test_unseen_category_zero_fills_and_still_predicts() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = trained_predictor(test_config(dir.path()), 300, 13).await;
    let snapshot = predictor.snapshot().unwrap();

    let raw = request().with(RawColumn::WeatherConditions, "Meteor Shower");
    let mut record = normalize_inference(&raw).unwrap();
    snapshot.schema.imputer().impute(&mut record);
    let aligned = InferenceAligner::new(&snapshot.schema)
        .unwrap()
        .align(&record);

    assert_eq!(aligned.vector.len(), snapshot.schema.len());
    for (name, value) in snapshot.schema.feature_names.iter().zip(&aligned.vector) {
        if name.starts_with("weather_conditions_") {
            assert_eq!(*value, 0.0, "{} should be zero-filled", name);
        }
    }

    let result = predictor.predict(&raw).unwrap();
    assert!(result.has_unseen_categories());
    assert_eq!(result.unseen_categories.len(), 1);
    assert_eq!(result.unseen_categories[0].attribute, "weather_conditions");
    assert_eq!(result.unseen_categories[0].value, "Meteor Shower");
}

#[tokio::test]
async fn test_entirely_unseen_categories_still_predict() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = trained_predictor(test_config(dir.path()), 300, 79).await;
    let snapshot = predictor.snapshot().unwrap();
    let schema = &snapshot.schema;

    let raw = request()
        .with(RawColumn::WeatherConditions, "Meteor Shower")
        .with(RawColumn::LightConditions, "Aurora")
        .with(RawColumn::RoadType, "Hovercraft lane")
        .with(RawColumn::RoadSurfaceConditions, "Lava")
        .with(RawColumn::JunctionDetail, "Wormhole")
        .with(RawColumn::UrbanOrRuralArea, "Orbital");
    let mut record = normalize_inference(&raw).unwrap();
    schema.imputer().impute(&mut record);
    let aligned = InferenceAligner::new(schema).unwrap().align(&record);

    assert_eq!(aligned.vector.len(), schema.len());
    assert_eq!(aligned.unseen.len(), 6);
    for (name, value) in schema.feature_names.iter().zip(&aligned.vector) {
        if let Some((attribute, _)) = schema.split_indicator(name) {
            // time_of_day is derived from the hour and stays known
            if attribute != "time_of_day" {
                assert_eq!(*value, 0.0, "{} should be zero-filled", name);
            }
        }
    }

    let result = predictor.predict(&raw).unwrap();
    assert_eq!(result.unseen_categories.len(), 6);
    let attributes: BTreeSet<&str> = result
        .unseen_categories
        .iter()
        .map(|u| u.attribute.as_str())
        .collect();
    assert_eq!(
        attributes,
        BTreeSet::from([
            "junction_detail",
            "light_conditions",
            "road_surface_conditions",
            "road_type",
            "urban_or_rural_area",
            "weather_conditions",
        ])
    );
}

#[tokio::test]
async fn test_severity_code_is_the_class_index() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = trained_predictor(test_config(dir.path()), 300, 83).await;
    let snapshot = predictor.snapshot().unwrap();
    assert_eq!(snapshot.schema.label_classes, vec!["Fatal", "Serious", "Slight"]);

    let result = predictor.predict(&request()).unwrap();
    assert_eq!(
        Some(result.severity_code),
        snapshot.schema.encode_label(result.severity)
    );
    assert_eq!(
        snapshot.schema.decode_label(result.severity_code).unwrap(),
        result.severity
    );
    let best = result
        .probabilities
        .values()
        .cloned()
        .fold(f64::MIN, f64::max);
    assert_eq!(
        result.probabilities[&snapshot.schema.label_classes[result.severity_code]],
        best
    );
}

#[test]
fn test_malformed_time_defaults_to_midday() {
    let raw = request().with(RawColumn::AccidentTime, "25:99");
    let record = normalize_inference(&raw).unwrap();

    assert_eq!(record.hour, Some(DEFAULT_HOUR as f64));
    assert_eq!(record.time_of_day.as_deref(), Some(TimeOfDay::Afternoon.as_ref()));
}

#[test]
fn test_single_sample_class_is_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let batch: Vec<_> = labelled_batch(50, 17)
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let severity = if i == 0 { Severity::Fatal } else { Severity::Serious };
            record.with(RawColumn::Severity, severity.code() as f64)
        })
        .collect();

    let err = ClassifierTrainer::new(config.training).train(&batch).unwrap_err();
    assert!(matches!(err, AppError::InsufficientData(_)));
    assert!(err.to_string().contains("Fatal"), "{}", err);
}

#[tokio::test]
async fn test_missing_or_mismatched_artifacts_are_reported() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let predictor_a = trained_predictor(test_config(dir_a.path()), 300, 19).await;
    let _predictor_b = trained_predictor(test_config(dir_b.path()), 300, 23).await;

    let store_a = predictor_a.store().clone();
    let store_b = ModelArtifactStore::from_config(&test_config(dir_b.path()).model);
    assert!(store_a.load().is_ok());
    assert!(store_b.load().is_ok());

    // A blob from another run does not match the manifest
    std::fs::copy(store_a.model_path(), store_b.model_path()).unwrap();
    let err = store_b.load().unwrap_err();
    assert!(matches!(err, AppError::ArtifactMissing(_)), "{:?}", err);

    std::fs::remove_file(store_b.model_path()).unwrap();
    let err = store_b.load().unwrap_err();
    assert!(matches!(err, AppError::ArtifactMissing(_)));

    std::fs::remove_file(store_a.manifest_path()).unwrap();
    let err = predictor_a.reload().await.unwrap_err();
    assert_eq!(err.error_code(), "ARTIFACT_MISSING");

    // The installed snapshot survives a failed reload
    assert!(predictor_a.predict(&request()).is_ok());
}

#[tokio::test]
async fn test_manifest_naming_another_blob_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = trained_predictor(test_config(dir.path()), 300, 89).await;
    let store = predictor.store().clone();

    let mut manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.manifest_path()).unwrap()).unwrap();
    manifest["model_file"] = serde_json::Value::from("other_model.bin");
    std::fs::write(store.manifest_path(), serde_json::to_vec(&manifest).unwrap()).unwrap();

    let err = store.load().unwrap_err();
    assert!(matches!(err, AppError::ArtifactMissing(_)), "{:?}", err);
    assert!(err.to_string().contains("other_model.bin"));
}

#[test]
fn test_label_decoding_inverts_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = ClassifierTrainer::new(test_config(dir.path()).training)
        .train(&labelled_batch(200, 29))
        .unwrap();
    let schema = &outcome.schema;

    for severity in [Severity::Fatal, Severity::Serious, Severity::Slight] {
        let index = schema.encode_label(severity).unwrap();
        assert_eq!(schema.decode_label(index).unwrap(), severity);
    }
    assert!(schema.decode_label(schema.n_classes()).is_err());
}

#[test]
fn test_review_threshold_is_strict() {
    assert!(!needs_manual_review(0.6, 0.6));
    assert!(needs_manual_review(0.6 - f64::EPSILON, 0.6));
    assert!(!needs_manual_review(1.0, 0.6));
}

#[tokio::test]
async fn test_review_flag_follows_configured_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = trained_predictor(test_config(dir.path()), 300, 31).await;
    let confidence = predictor.predict(&request()).unwrap().confidence;
    assert!(confidence > 0.0);

    let mut at = test_config(dir.path());
    at.model.confidence_threshold = confidence;
    let at = SeverityPredictor::new(at);
    at.reload().await.unwrap();
    let result = at.predict(&request()).unwrap();
    assert_eq!(result.confidence, confidence);
    assert!(!result.needs_manual_review);

    let mut above = test_config(dir.path());
    above.model.confidence_threshold = f64::from_bits(confidence.to_bits() + 1);
    let above = SeverityPredictor::new(above);
    above.reload().await.unwrap();
    assert!(above.predict(&request()).unwrap().needs_manual_review);
}

#[test]
fn test_imputation_is_idempotent() {
    let mut records = normalize_batch(&labelled_batch(100, 37)).unwrap();
    records[0].speed_limit = None;
    records[1].weather_conditions = None;
    let imputer = Imputer::fit(&records);

    imputer.impute_batch(&mut records);
    let once = records.clone();
    imputer.impute_batch(&mut records);
    assert_eq!(once, records);
}

#[test]
fn test_encoded_rows_match_inference_alignment() {
    let mut records = normalize_batch(&labelled_batch(120, 41)).unwrap();
    let imputer = Imputer::fit(&records);
    imputer.impute_batch(&mut records);

    let dataset = FeatureEncoder::fit_transform(&records, &imputer, Uuid::new_v4()).unwrap();
    let aligner = InferenceAligner::new(&dataset.schema).unwrap();

    for (record, row) in records.iter().zip(dataset.features.rows()) {
        let aligned = aligner.align(record);
        assert!(aligned.unseen.is_empty());
        assert_eq!(aligned.vector, row.to_vec());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_aligned_length_matches_schema(
        suffix in "[A-Za-z]{1,12}",
        speed in 0.0f64..200.0,
        hour in 0u32..24,
    ) {
        let mut records = normalize_batch(&labelled_batch(60, 43)).unwrap();
        let imputer = Imputer::fit(&records);
        imputer.impute_batch(&mut records);
        let schema = FeatureEncoder::fit(&records, &imputer, Uuid::new_v4()).unwrap();
        let aligner = InferenceAligner::new(&schema).unwrap();

        let weather = format!("Novel {}", suffix);
        let raw = request()
            .with(RawColumn::WeatherConditions, weather.as_str())
            .with(RawColumn::SpeedLimit, speed)
            .with(RawColumn::AccidentTime, format!("{:02}:30", hour));
        let mut record = normalize_inference(&raw).unwrap();
        imputer.impute(&mut record);
        let aligned = aligner.align(&record);

        prop_assert_eq!(aligned.vector.len(), schema.len());
        prop_assert!(aligned.unseen.iter().any(|u| u.attribute == "weather_conditions" && u.value == weather));
        for (name, value) in schema.feature_names.iter().zip(&aligned.vector) {
            if name.starts_with("weather_conditions_") {
                prop_assert_eq!(*value, 0.0);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_predictions_during_training_see_a_whole_model() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = Arc::new(trained_predictor(test_config(dir.path()), 300, 47).await);
    let old_run = predictor.metadata().unwrap().run_id;

    let trainer = predictor.clone();
    let training = tokio::spawn(async move { trainer.train(labelled_batch(600, 53)).await });

    let mut seen = BTreeSet::new();
    while !training.is_finished() {
        let result = predictor.predict(&request()).unwrap();
        seen.insert(result.model_run_id);
        tokio::task::yield_now().await;
    }
    training.await.unwrap().unwrap();

    let new_run = predictor.metadata().unwrap().run_id;
    assert_ne!(old_run, new_run);
    seen.insert(predictor.predict(&request()).unwrap().model_run_id);
    assert!(seen.iter().all(|run| *run == old_run || *run == new_run));
    assert!(seen.contains(&new_run));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_training_leaves_store_and_snapshot_paired() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = SeverityPredictor::new(test_config(dir.path()));

    let (a, b) = tokio::join!(
        predictor.train(labelled_batch(300, 59)),
        predictor.train(labelled_batch(300, 61)),
    );
    a.unwrap();
    b.unwrap();

    let installed = predictor.metadata().unwrap().run_id;
    let persisted = predictor.store().load().unwrap();
    assert_eq!(persisted.schema.run_id, installed);
    assert_eq!(persisted.metadata.run_id, installed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_training_still_installs() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = SeverityPredictor::new(test_config(dir.path()));

    let _ = tokio::time::timeout(
        Duration::from_millis(1),
        predictor.train(labelled_batch(600, 67)),
    )
    .await;

    let mut waited = Duration::ZERO;
    while !predictor.is_ready() && waited < Duration::from_secs(60) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    assert!(predictor.is_ready());
    assert!(predictor.predict(&request()).is_ok());
}
