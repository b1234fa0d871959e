use crate::config::Config;
use crate::error::{AppError, Result};
use crate::metrics::{
    MANUAL_REVIEW_TOTAL, MODEL_ACCURACY, MODEL_FEATURES, PREDICTIONS_TOTAL,
    PREDICTION_DURATION_SECONDS, TRAINING_DURATION_SECONDS, TRAINING_RUNS_TOTAL,
    UNSEEN_CATEGORIES_TOTAL,
};
use crate::ml::aligner::InferenceAligner;
use crate::ml::classifier::{top_importances, Classifier, ClassifierTrainer, TrainedModel};
use crate::ml::features::FeatureSchema;
use crate::ml::forest::argmax;
use crate::ml::imputer::Imputer;
use crate::ml::models::{ModelMetadata, ModelMetrics};
use crate::ml::normalizer;
use crate::ml::source::{InMemoryRecordSource, JsonRecordSource, RecordSource, SyntheticRecordSource};
use crate::ml::store::{LoadedArtifacts, ModelArtifactStore};
use crate::models::{FeatureImportance, PredictionResult, RawRecord};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An immutable model, its schema and everything derived from them
#[derive(Debug)]
pub struct ModelSnapshot {
    pub model: TrainedModel,
    pub schema: FeatureSchema,
    pub metadata: ModelMetadata,
    aligner: InferenceAligner,
    imputer: Imputer,
    factors: Vec<FeatureImportance>,
}

impl ModelSnapshot {
    pub fn new(
        model: TrainedModel,
        schema: FeatureSchema,
        metadata: ModelMetadata,
        top_factors: usize,
    ) -> Result<Self> {
        let aligner = InferenceAligner::new(&schema)?;
        let imputer = schema.imputer();
        let factors = top_importances(
            &schema.feature_names,
            model.feature_importances(),
            top_factors,
        );

        Ok(Self {
            model,
            schema,
            metadata,
            aligner,
            imputer,
            factors,
        })
    }

    /// Top globally important features
    pub fn factors(&self) -> &[FeatureImportance] {
        &self.factors
    }
}

/// Values a request form may offer, taken from the active schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOptions {
    pub categorical: BTreeMap<String, Vec<String>>,
    pub numeric: Vec<String>,
}

/// Severity prediction facade.
///
/// Holds one shared snapshot that concurrent `predict` calls read without
/// blocking each other. Training runs on the blocking pool, at most one at a
/// time, and installs its result with a single pointer swap.
pub struct SeverityPredictor {
    config: Config,
    store: ModelArtifactStore,
    snapshot: Arc<RwLock<Option<Arc<ModelSnapshot>>>>,
    training_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SeverityPredictor {
    /// Create a predictor with no model installed
    pub fn new(config: Config) -> Self {
        let store = ModelArtifactStore::from_config(&config.model);
        Self {
            config,
            store,
            snapshot: Arc::new(RwLock::new(None)),
            training_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Load persisted artifacts, or train a fresh model.
    ///
    /// Training uses `source` if given, else the configured data file, else
    /// (when enabled) synthetic records.
    pub async fn initialize(&self, source: Option<Arc<dyn RecordSource>>) -> Result<()> {
        match self.reload().await {
            Ok(()) => return Ok(()),
            Err(e) => warn!("No usable model artifacts ({}); training a new model", e),
        }

        let source = source.or_else(|| {
            self.config
                .data
                .data_path
                .as_ref()
                .map(|path| Arc::new(JsonRecordSource::new(path)) as Arc<dyn RecordSource>)
        });

        if let Some(source) = source {
            let description = source.describe();
            match self.train_from_source(source).await {
                Ok(_) => return Ok(()),
                Err(e) => warn!("Training from {} failed: {}", description, e),
            }
        }

        if self.config.data.fallback_to_synthetic {
            warn!(
                samples = self.config.data.synthetic_samples,
                "Falling back to synthetic training data"
            );
            let synthetic = SyntheticRecordSource::new(
                self.config.data.synthetic_samples,
                self.config.training.random_seed,
            );
            match self.train_from_source(Arc::new(synthetic)).await {
                Ok(_) => return Ok(()),
                Err(e) => error!("Training on synthetic data failed: {}", e),
            }
        }

        error!("Severity predictor has no model");
        Err(AppError::ModelUnavailable(
            "no model could be loaded or trained".to_string(),
        ))
    }

    /// Replace the active snapshot with the persisted artifacts
    pub async fn reload(&self) -> Result<()> {
        let store = self.store.clone();
        let LoadedArtifacts {
            model,
            schema,
            metadata,
        } = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| AppError::Internal(format!("Load task failed: {}", e)))??;

        let snapshot = ModelSnapshot::new(model, schema, metadata, self.config.model.top_factors)?;
        install(&self.snapshot, snapshot);
        Ok(())
    }

    /// Train on a batch of raw records, persist the result and swap it in
    pub async fn train(&self, records: Vec<RawRecord>) -> Result<ModelMetrics> {
        self.train_from_source(Arc::new(InMemoryRecordSource::new(records)))
            .await
    }

    /// Train on records from `source`, persist the result and swap it in.
    ///
    /// Only one run proceeds at a time; later calls queue behind it. A run,
    /// queued or in progress, completes and installs its model even if the
    /// caller stops waiting.
    pub async fn train_from_source(&self, source: Arc<dyn RecordSource>) -> Result<ModelMetrics> {
        let lock = self.training_lock.clone();
        let trainer = ClassifierTrainer::new(self.config.training.clone());
        let store = self.store.clone();
        let slot = self.snapshot.clone();
        let top_factors = self.config.model.top_factors;

        let handle = tokio::spawn(async move {
            let guard = lock.lock_owned().await;

            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                let timer = TRAINING_DURATION_SECONDS.start_timer();
                info!(source = %source.describe(), "Training run started");

                let result = source.load().and_then(|raws| {
                    let outcome = trainer.train(&raws)?;
                    let metrics = outcome.metrics.clone();
                    let snapshot = ModelSnapshot::new(
                        outcome.model,
                        outcome.schema,
                        outcome.metadata,
                        top_factors,
                    )?;
                    store.save(&snapshot.model, &snapshot.schema, &snapshot.metadata)?;
                    install(&slot, snapshot);
                    Ok(metrics)
                });

                timer.observe_duration();
                let outcome = if result.is_ok() { "success" } else { "failure" };
                TRAINING_RUNS_TOTAL.with_label_values(&[outcome]).inc();
                if let Err(e) = &result {
                    error!("Training run failed: {}", e);
                }
                result
            })
            .await
            .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))?
        });

        handle
            .await
            .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))?
    }

    /// Predict severity for one raw request
    pub fn predict(&self, raw: &RawRecord) -> Result<PredictionResult> {
        let timer = PREDICTION_DURATION_SECONDS.start_timer();
        let snapshot = self.snapshot().ok_or_else(|| {
            AppError::ModelUnavailable("no model has been loaded or trained".to_string())
        })?;

        let mut record = normalizer::normalize_inference(raw)?;
        snapshot.imputer.impute(&mut record);
        let aligned = snapshot.aligner.align(&record);

        for unseen in &aligned.unseen {
            warn!(
                attribute = %unseen.attribute,
                value = %unseen.value,
                "Category not seen in training; indicators zero-filled"
            );
            UNSEEN_CATEGORIES_TOTAL
                .with_label_values(&[unseen.attribute.as_str()])
                .inc();
        }
        if self.config.model.reject_unseen_categories {
            if let Some(unseen) = aligned.unseen.first() {
                return Err(AppError::validation(
                    unseen.attribute.clone(),
                    format!("category '{}' is unknown to the model", unseen.value),
                ));
            }
        }

        let proba = snapshot.model.predict_proba(&aligned.vector)?;
        let class = argmax(proba.iter().copied());
        let confidence = proba.get(class).copied().unwrap_or(0.0);
        let severity = snapshot.schema.decode_label(class)?;
        let needs_manual_review =
            needs_manual_review(confidence, self.config.model.confidence_threshold);

        let probabilities = snapshot
            .schema
            .label_classes
            .iter()
            .cloned()
            .zip(proba.iter().copied())
            .collect();

        PREDICTIONS_TOTAL
            .with_label_values(&[severity.as_ref()])
            .inc();
        if needs_manual_review {
            MANUAL_REVIEW_TOTAL.inc();
        }
        timer.observe_duration();

        debug!(
            severity = %severity,
            confidence,
            needs_manual_review,
            "Prediction served"
        );

        Ok(PredictionResult {
            severity,
            severity_code: class,
            confidence,
            needs_manual_review,
            factors: snapshot.factors().to_vec(),
            probabilities,
            unseen_categories: aligned.unseen,
            model_run_id: snapshot.schema.run_id,
            timestamp: chrono::Utc::now(),
        })
    }

    /// Held-out metrics of the active model
    pub fn metrics(&self) -> Option<ModelMetrics> {
        self.snapshot()
            .and_then(|snapshot| snapshot.metadata.metrics.clone())
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.snapshot().map(|snapshot| snapshot.metadata.clone())
    }

    /// Category values and numeric inputs known to the active schema
    pub fn feature_options(&self) -> Result<FeatureOptions> {
        let snapshot = self.snapshot().ok_or_else(|| {
            AppError::ModelUnavailable("no model has been loaded or trained".to_string())
        })?;

        Ok(FeatureOptions {
            categorical: snapshot.schema.category_values(),
            numeric: snapshot.schema.numeric_attributes.clone(),
        })
    }

    /// Current snapshot; callers keep it alive for as long as they use it
    pub fn snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.read().is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ModelArtifactStore {
        &self.store
    }
}

/// A prediction needs review iff its confidence is strictly below the threshold
pub fn needs_manual_review(confidence: f64, threshold: f64) -> bool {
    confidence < threshold
}

fn install(slot: &RwLock<Option<Arc<ModelSnapshot>>>, snapshot: ModelSnapshot) {
    let accuracy = snapshot
        .metadata
        .metrics
        .as_ref()
        .map(|m| m.accuracy)
        .unwrap_or_default();
    MODEL_ACCURACY.set(accuracy);
    MODEL_FEATURES.set(snapshot.schema.len() as f64);

    info!(
        run_id = %snapshot.schema.run_id,
        n_features = snapshot.schema.len(),
        accuracy,
        "Installed model snapshot"
    );
    *slot.write() = Some(Arc::new(snapshot));
}
