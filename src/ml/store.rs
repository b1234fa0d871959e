use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::ml::aligner::InferenceAligner;
use crate::ml::classifier::TrainedModel;
use crate::ml::features::FeatureSchema;
use crate::ml::models::ModelMetadata;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// JSON manifest written next to the model blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaManifest {
    #[serde(flatten)]
    pub schema: FeatureSchema,

    /// File name of the paired model blob
    pub model_file: String,

    /// Hex SHA-256 of the model blob
    pub model_sha256: String,

    pub metadata: ModelMetadata,
}

/// A model and the schema it was trained against, loaded as one unit
#[derive(Debug)]
pub struct LoadedArtifacts {
    pub model: TrainedModel,
    pub schema: FeatureSchema,
    pub metadata: ModelMetadata,
}

/// Persists the classifier blob and its schema manifest as a pair
#[derive(Debug, Clone)]
pub struct ModelArtifactStore {
    dir: PathBuf,
    model_file: String,
    manifest_file: String,
}

impl ModelArtifactStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        model_file: impl Into<String>,
        manifest_file: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            model_file: model_file.into(),
            manifest_file: manifest_file.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.artifact_dir.clone(),
            config.model_file.clone(),
            config.manifest_file.clone(),
        )
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.model_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.manifest_file)
    }

    /// Whether both artifacts are present on disk
    pub fn exists(&self) -> bool {
        self.model_path().is_file() && self.manifest_path().is_file()
    }

    /// Write the model blob, then the manifest that points at it
    pub fn save(
        &self,
        model: &TrainedModel,
        schema: &FeatureSchema,
        metadata: &ModelMetadata,
    ) -> Result<()> {
        if model.run_id != schema.run_id || metadata.run_id != schema.run_id {
            return Err(AppError::Internal(format!(
                "Refusing to pair model {} with schema {}",
                model.run_id, schema.run_id
            )));
        }

        fs::create_dir_all(&self.dir)?;

        let blob = bincode::serialize(model)?;
        let manifest = SchemaManifest {
            schema: schema.clone(),
            model_file: self.model_file.clone(),
            model_sha256: sha256_hex(&blob),
            metadata: metadata.clone(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;

        write_atomic(&self.model_path(), &blob)?;
        write_atomic(&self.manifest_path(), &manifest_json)?;

        info!(
            run_id = %schema.run_id,
            dir = %self.dir.display(),
            bytes = blob.len(),
            "Saved model artifacts"
        );
        Ok(())
    }

    /// Load both artifacts, verifying they come from the same training run
    pub fn load(&self) -> Result<LoadedArtifacts> {
        let manifest_path = self.manifest_path();
        let model_path = self.model_path();

        if !manifest_path.is_file() {
            return Err(AppError::ArtifactMissing(format!(
                "schema manifest not found at {}",
                manifest_path.display()
            )));
        }
        if !model_path.is_file() {
            return Err(AppError::ArtifactMissing(format!(
                "model blob not found at {}",
                model_path.display()
            )));
        }

        let manifest_bytes = fs::read(&manifest_path).map_err(|e| {
            AppError::ArtifactMissing(format!("cannot read {}: {}", manifest_path.display(), e))
        })?;
        let manifest: SchemaManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            AppError::ArtifactMissing(format!("cannot parse {}: {}", manifest_path.display(), e))
        })?;
        if manifest.model_file != self.model_file {
            return Err(AppError::ArtifactMissing(format!(
                "manifest {} pairs with model '{}', expected '{}'",
                manifest_path.display(),
                manifest.model_file,
                self.model_file
            )));
        }

        let blob = fs::read(&model_path).map_err(|e| {
            AppError::ArtifactMissing(format!("cannot read {}: {}", model_path.display(), e))
        })?;
        if sha256_hex(&blob) != manifest.model_sha256 {
            return Err(AppError::ArtifactMissing(format!(
                "model blob {} does not match the manifest digest",
                model_path.display()
            )));
        }

        let model: TrainedModel = bincode::deserialize(&blob).map_err(|e| {
            AppError::ArtifactMissing(format!("cannot decode {}: {}", model_path.display(), e))
        })?;

        let schema = manifest.schema;
        if model.run_id != schema.run_id || manifest.metadata.run_id != schema.run_id {
            return Err(AppError::ArtifactMissing(format!(
                "model run {} does not match schema run {}",
                model.run_id, schema.run_id
            )));
        }
        if model.forest.n_features() != schema.len()
            || model.forest.n_classes() != schema.n_classes()
        {
            return Err(AppError::ArtifactMissing(format!(
                "model expects {} features / {} classes, schema has {} / {}",
                model.forest.n_features(),
                model.forest.n_classes(),
                schema.len(),
                schema.n_classes()
            )));
        }
        InferenceAligner::new(&schema)
            .map_err(|e| AppError::ArtifactMissing(format!("unusable schema manifest: {}", e)))?;

        info!(
            run_id = %schema.run_id,
            n_features = schema.len(),
            "Loaded model artifacts"
        );
        Ok(LoadedArtifacts {
            model,
            schema,
            metadata: manifest.metadata,
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Write to a temporary sibling, then rename into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AppError::Internal(format!("{} has no parent", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Internal(format!("{} has no file name", path.display())))?;
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    debug!(path = %path.display(), "Wrote artifact");
    result
}
