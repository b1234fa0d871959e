use crate::config::TrainingConfig;
use crate::models::FeatureImportance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Model evaluation metrics on the held-out partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Support-weighted precision
    pub precision: f64,

    /// Support-weighted recall
    pub recall: f64,

    /// Support-weighted F1 score
    pub f1_score: f64,

    /// Confusion matrix, rows = true class, columns = predicted class,
    /// both in label class order
    pub confusion_matrix: Vec<Vec<usize>>,

    /// Label classes indexing the confusion matrix
    pub classes: Vec<String>,

    /// Per-class metrics
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,

    /// Most important features, descending
    pub feature_importances: Vec<FeatureImportance>,

    pub n_training_samples: usize,
    pub n_test_samples: usize,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: Vec::new(),
            classes: Vec::new(),
            per_class_metrics: BTreeMap::new(),
            feature_importances: Vec::new(),
            n_training_samples: 0,
            n_test_samples: 0,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model metadata, persisted in the schema manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Training run shared by the model blob and its schema
    pub run_id: Uuid,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of held-out samples
    pub n_test_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Held-out metrics of this run
    pub metrics: Option<ModelMetrics>,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
}

impl ModelMetadata {
    pub fn hyperparameters_from(config: &TrainingConfig) -> BTreeMap<String, String> {
        [
            ("n_estimators", config.n_estimators.to_string()),
            ("max_depth", config.max_depth.to_string()),
            ("min_samples_split", config.min_samples_split.to_string()),
            ("min_samples_leaf", config.min_samples_leaf.to_string()),
            ("test_size", config.test_size.to_string()),
            ("random_seed", config.random_seed.to_string()),
            ("class_weight", "balanced".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged decision trees with class-balanced bootstraps
    BalancedRandomForest,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::BalancedRandomForest => write!(f, "Balanced Random Forest"),
        }
    }
}
