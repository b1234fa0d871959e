use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model artifact and prediction configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Classifier training configuration
    #[serde(default)]
    pub training: TrainingConfig,

    /// Training data source configuration
    #[serde(default)]
    pub data: DataConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("SEVERITY_CONFIG")
            .unwrap_or_else(|_| "config/severity.toml".to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration layering defaults, the given file (if present) and environment
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: SEVERITY_)
            .add_source(
                config::Environment::with_prefix("SEVERITY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding the model blob and schema manifest
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Model blob file name
    #[serde(default = "default_model_file")]
    pub model_file: String,

    /// Schema manifest file name
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Predictions below this confidence are flagged for manual review
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Number of globally important features reported per prediction
    #[serde(default = "default_top_factors")]
    pub top_factors: usize,

    /// Fail predictions carrying categories the schema has never seen
    #[serde(default)]
    pub reject_unseen_categories: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            model_file: default_model_file(),
            manifest_file: default_manifest_file(),
            confidence_threshold: default_confidence_threshold(),
            top_factors: default_top_factors(),
            reject_unseen_categories: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of trees in the ensemble
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Maximum tree depth
    #[serde(default = "default_max_depth")]
    pub max_depth: u16,

    /// Minimum samples required to split a node
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    /// Minimum samples required at a leaf
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    /// Held-out fraction for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for splitting, sampling and bootstrapping
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Larger batches are down-sampled to this many records
    #[serde(default = "default_max_training_samples")]
    pub max_training_samples: usize,

    /// Number of feature importances kept in the metrics report
    #[serde(default = "default_top_importances")]
    pub top_importances: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            test_size: default_test_size(),
            random_seed: default_random_seed(),
            max_training_samples: default_max_training_samples(),
            top_importances: default_top_importances(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON array or JSON-lines file of raw accident records
    pub data_path: Option<PathBuf>,

    /// Train on generated records when the data source cannot be read
    #[serde(default = "default_true")]
    pub fallback_to_synthetic: bool,

    /// Number of generated records for the fallback
    #[serde(default = "default_synthetic_samples")]
    pub synthetic_samples: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            fallback_to_synthetic: true,
            synthetic_samples: default_synthetic_samples(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./data/models")
}

fn default_model_file() -> String {
    "model.bin".to_string()
}

fn default_manifest_file() -> String {
    "feature_schema.json".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_top_factors() -> usize {
    5
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> u16 {
    10
}

fn default_min_samples_split() -> usize {
    5
}

fn default_min_samples_leaf() -> usize {
    2
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_seed() -> u64 {
    42
}

fn default_max_training_samples() -> usize {
    100_000
}

fn default_top_importances() -> usize {
    20
}

fn default_synthetic_samples() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
