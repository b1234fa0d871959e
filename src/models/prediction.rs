use crate::models::record::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A categorical value absent from the feature schema; its indicator block is all zeros
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnseenCategory {
    pub attribute: String,
    pub value: String,
}

/// A named feature with its importance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Result of a single severity prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted severity
    pub severity: Severity,

    /// Encoded class index of the predicted severity, i.e. its position in the
    /// schema's label classes
    pub severity_code: usize,

    /// Ensemble probability of the predicted class
    pub confidence: f64,

    /// True iff confidence is below the configured threshold
    pub needs_manual_review: bool,

    /// Top globally important features of the model.
    /// These are not attributions for this particular input.
    pub factors: Vec<FeatureImportance>,

    /// Probability of every label class known to the model
    pub probabilities: BTreeMap<String, f64>,

    /// Categorical values the model has never seen
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unseen_categories: Vec<UnseenCategory>,

    /// Training run that produced the model
    pub model_run_id: uuid::Uuid,

    pub timestamp: DateTime<Utc>,
}

impl PredictionResult {
    /// Whether any categorical value fell outside the feature schema
    pub fn has_unseen_categories(&self) -> bool {
        !self.unseen_categories.is_empty()
    }
}
