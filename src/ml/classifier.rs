use crate::config::TrainingConfig;
use crate::error::{AppError, Result};
use crate::ml::features::{EncodedDataset, FeatureEncoder, FeatureSchema};
use crate::ml::forest::{BalancedRandomForest, ForestParameters};
use crate::ml::imputer::Imputer;
use crate::ml::models::{ClassMetrics, ModelMetadata, ModelMetrics, ModelType};
use crate::ml::normalizer;
use crate::models::{CanonicalRecord, FeatureImportance, RawRecord, Severity};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Trait for classifiers bound to a feature schema
pub trait Classifier: Send + Sync {
    /// Class probabilities for one aligned feature vector
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>>;

    /// Global importance per feature column
    fn feature_importances(&self) -> &[f64];

    /// Get model type
    fn model_type(&self) -> ModelType;
}

/// A fitted classifier tagged with the run that produced it
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    pub run_id: Uuid,
    pub model_type: ModelType,
    pub forest: BalancedRandomForest,
}

impl Classifier for TrainedModel {
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        self.forest
            .predict_proba_row(ndarray::ArrayView1::from(features))
    }

    fn feature_importances(&self) -> &[f64] {
        self.forest.feature_importances()
    }

    fn model_type(&self) -> ModelType {
        self.model_type
    }
}

/// Everything one successful training run produces
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub schema: FeatureSchema,
    pub metrics: ModelMetrics,
    pub metadata: ModelMetadata,
}

/// Splits, fits and evaluates the severity classifier
pub struct ClassifierTrainer {
    config: TrainingConfig,
}

impl ClassifierTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train from raw records: normalize, impute, encode, split, fit, evaluate
    pub fn train(&self, raws: &[RawRecord]) -> Result<TrainingOutcome> {
        let records = normalizer::normalize_batch(raws)?;
        self.train_canonical(records)
    }

    /// Train from normalized, labelled records
    pub fn train_canonical(&self, records: Vec<CanonicalRecord>) -> Result<TrainingOutcome> {
        if !(self.config.test_size > 0.0 && self.config.test_size < 1.0) {
            return Err(AppError::Configuration(format!(
                "test_size must be in (0, 1), got {}",
                self.config.test_size
            )));
        }
        if records.is_empty() {
            return Err(AppError::InsufficientData(
                "training batch has 0 usable rows".to_string(),
            ));
        }

        let mut records = cap_samples(
            records,
            self.config.max_training_samples,
            self.config.random_seed,
        );
        check_class_counts(&records)?;

        let imputer = Imputer::fit(&records);
        imputer.impute_batch(&mut records);

        let run_id = Uuid::new_v4();
        let dataset = FeatureEncoder::fit_transform(&records, &imputer, run_id)?;
        let EncodedDataset {
            features,
            labels,
            schema,
        } = dataset;

        let (train_idx, test_idx) = stratified_split(
            &labels,
            schema.n_classes(),
            self.config.test_size,
            self.config.random_seed,
        )?;

        info!(
            run_id = %run_id,
            n_train = train_idx.len(),
            n_test = test_idx.len(),
            n_features = schema.len(),
            "Fitting severity classifier"
        );

        let x_train = features.select(Axis(0), &train_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| labels[i]).collect();
        let forest = BalancedRandomForest::fit(
            &x_train,
            &y_train,
            schema.n_classes(),
            &ForestParameters::from(&self.config),
        )?;

        let x_test: Array2<f64> = features.select(Axis(0), &test_idx);
        let y_test: Vec<usize> = test_idx.iter().map(|&i| labels[i]).collect();
        let y_pred = forest.predict(&x_test)?;

        let mut metrics = evaluate(&y_test, &y_pred, &schema.label_classes);
        metrics.feature_importances = top_importances(
            &schema.feature_names,
            forest.feature_importances(),
            self.config.top_importances,
        );
        metrics.n_training_samples = train_idx.len();
        metrics.n_test_samples = test_idx.len();

        info!(
            run_id = %run_id,
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            "Severity classifier trained"
        );

        let metadata = ModelMetadata {
            run_id,
            model_type: ModelType::BalancedRandomForest,
            trained_at: chrono::Utc::now(),
            n_training_samples: train_idx.len(),
            n_test_samples: test_idx.len(),
            n_features: schema.len(),
            metrics: Some(metrics.clone()),
            hyperparameters: ModelMetadata::hyperparameters_from(&self.config),
        };

        Ok(TrainingOutcome {
            model: TrainedModel {
                run_id,
                model_type: ModelType::BalancedRandomForest,
                forest,
            },
            schema,
            metrics,
            metadata,
        })
    }
}

/// Deterministically down-sample to at most `max` records, keeping input order
fn cap_samples(records: Vec<CanonicalRecord>, max: usize, seed: u64) -> Vec<CanonicalRecord> {
    if max == 0 || records.len() <= max {
        return records;
    }

    warn!(
        total = records.len(),
        kept = max,
        "Training batch exceeds sample cap; down-sampling"
    );
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = rand::seq::index::sample(&mut rng, records.len(), max).into_vec();
    keep.sort_unstable();

    let mut records: Vec<Option<CanonicalRecord>> = records.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| records[i].take()).collect()
}

fn check_class_counts(records: &[CanonicalRecord]) -> Result<()> {
    let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
    for record in records {
        let severity = record.severity.ok_or_else(|| AppError::schema("severity"))?;
        *counts.entry(severity).or_default() += 1;
    }

    if counts.len() < 2 {
        return Err(AppError::InsufficientData(format!(
            "need at least 2 severity classes, found {} in {} rows",
            counts.len(),
            records.len()
        )));
    }
    if let Some((severity, count)) = counts.iter().find(|(_, &count)| count < 2) {
        return Err(AppError::InsufficientData(format!(
            "class {} has {} sample(s); at least 2 are required",
            severity, count
        )));
    }
    Ok(())
}

/// Seeded stratified split returning sorted (train, test) row indices.
///
/// Each class contributes `round(n_c * test_size)` rows to the test side,
/// clamped so both sides keep at least one row of every class.
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class
            .get_mut(label)
            .ok_or_else(|| AppError::Internal(format!("Label {} outside {} classes", label, n_classes)))?
            .push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for (class, mut rows) in by_class.into_iter().enumerate() {
        if rows.is_empty() {
            continue;
        }
        if rows.len() < 2 {
            return Err(AppError::InsufficientData(format!(
                "class index {} has {} sample(s); at least 2 are required",
                class,
                rows.len()
            )));
        }

        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64 * test_size).round() as usize).clamp(1, rows.len() - 1);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Accuracy, support-weighted averages, confusion matrix and per-class report
pub fn evaluate(y_true: &[usize], y_pred: &[usize], classes: &[String]) -> ModelMetrics {
    let mut metrics = ModelMetrics::new();
    metrics.classes = classes.to_vec();

    let n_classes = classes.len();
    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < n_classes && p < n_classes {
            confusion[t][p] += 1;
        }
    }

    let n_samples = y_true.len();
    if n_samples == 0 {
        metrics.confusion_matrix = confusion;
        return metrics;
    }

    let correct: usize = (0..n_classes).map(|c| confusion[c][c]).sum();
    metrics.accuracy = correct as f64 / n_samples as f64;

    for (class_idx, class) in classes.iter().enumerate() {
        let tp = confusion[class_idx][class_idx];
        let support: usize = confusion[class_idx].iter().sum();
        let predicted: usize = confusion.iter().map(|row| row[class_idx]).sum();

        let precision = if predicted > 0 {
            tp as f64 / predicted as f64
        } else {
            0.0
        };
        let recall = if support > 0 {
            tp as f64 / support as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let weight = support as f64 / n_samples as f64;
        metrics.precision += precision * weight;
        metrics.recall += recall * weight;
        metrics.f1_score += f1 * weight;

        metrics.per_class_metrics.insert(
            class.clone(),
            ClassMetrics {
                precision,
                recall,
                f1_score: f1,
                support,
            },
        );
    }

    metrics.confusion_matrix = confusion;
    metrics
}

/// Pair importances with feature names, highest first
pub fn top_importances(names: &[String], importances: &[f64], n: usize) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(feature, &importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();

    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked.truncate(n);
    ranked
}
