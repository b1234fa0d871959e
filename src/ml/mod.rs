/// Severity prediction pipeline
///
/// Raw records flow through:
/// - Schema normalization (column renaming, temporal derivation)
/// - Imputation (training medians, "Unknown" categories)
/// - Feature encoding (fixed, ordered one-hot schema)
/// - Classifier training (stratified split, balanced bagged trees)
/// - Artifact persistence (model blob + schema manifest as a pair)
/// - Inference alignment (rebuild vectors in persisted schema order)

pub mod aligner;
pub mod classifier;
pub mod features;
pub mod forest;
pub mod imputer;
pub mod models;
pub mod normalizer;
pub mod service;
pub mod source;
pub mod store;

pub use aligner::{AlignedVector, InferenceAligner};
pub use classifier::{Classifier, ClassifierTrainer, TrainedModel, TrainingOutcome};
pub use features::{EncodedDataset, FeatureEncoder, FeatureSchema};
pub use forest::{BalancedRandomForest, ForestParameters};
pub use imputer::{Imputer, UNKNOWN_CATEGORY};
pub use models::{ClassMetrics, ModelMetadata, ModelMetrics, ModelType};
pub use service::{needs_manual_review, FeatureOptions, ModelSnapshot, SeverityPredictor};
pub use source::{InMemoryRecordSource, JsonRecordSource, RecordSource, SyntheticRecordSource};
pub use store::{LoadedArtifacts, ModelArtifactStore, SchemaManifest};
