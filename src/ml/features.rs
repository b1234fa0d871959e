use crate::error::{AppError, Result};
use crate::ml::aligner::InferenceAligner;
use crate::ml::imputer::Imputer;
use crate::models::{CanonicalRecord, CategoricalAttribute, NumericAttribute, Severity};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use strum::IntoEnumIterator;
use uuid::Uuid;

/// Ordered feature columns fixed at training time.
///
/// Column order is `[numeric attributes...] + [categorical indicators...]`,
/// indicators named `<attribute>_<value>` and sorted by attribute declaration
/// order, then lexicographically by value. Never mutated once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Training run this schema belongs to
    pub run_id: Uuid,

    /// Feature column names, in vector order
    pub feature_names: Vec<String>,

    /// Numeric attributes passed through as columns
    pub numeric_attributes: Vec<String>,

    /// Categorical attributes expanded into indicators
    pub categorical_attributes: Vec<String>,

    /// Label classes; position is the encoded class index
    pub label_classes: Vec<String>,

    /// Training-time medians per numeric attribute
    pub medians: BTreeMap<String, f64>,
}

impl FeatureSchema {
    pub fn len(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_names.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.label_classes.len()
    }

    pub fn index_of(&self, feature: &str) -> Option<usize> {
        self.feature_names.iter().position(|f| f == feature)
    }

    /// Encode a severity as its class index
    pub fn encode_label(&self, severity: Severity) -> Option<usize> {
        self.label_classes
            .iter()
            .position(|c| c.as_str() == severity.as_ref())
    }

    /// Decode a class index back to its severity
    pub fn decode_label(&self, index: usize) -> Result<Severity> {
        let label = self.label_classes.get(index).ok_or_else(|| {
            AppError::Internal(format!(
                "Class index {} outside {} label classes",
                index,
                self.label_classes.len()
            ))
        })?;
        Severity::from_str(label)
            .map_err(|_| AppError::Internal(format!("Unknown label class '{}'", label)))
    }

    /// Imputer carrying the persisted medians
    pub fn imputer(&self) -> Imputer {
        Imputer::from_medians(self.medians.clone())
    }

    /// Category values known per categorical attribute
    pub fn category_values(&self) -> BTreeMap<String, Vec<String>> {
        let mut values: BTreeMap<String, Vec<String>> = self
            .categorical_attributes
            .iter()
            .map(|a| (a.clone(), Vec::new()))
            .collect();

        for name in &self.feature_names {
            if let Some((attribute, value)) = self.split_indicator(name) {
                if let Some(list) = values.get_mut(attribute) {
                    list.push(value.to_string());
                }
            }
        }
        values
    }

    /// Split an indicator name at the longest known attribute prefix
    pub fn split_indicator<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        self.categorical_attributes
            .iter()
            .filter(|attribute| {
                name.len() > attribute.len()
                    && name.starts_with(attribute.as_str())
                    && name.as_bytes()[attribute.len()] == b'_'
            })
            .max_by_key(|attribute| attribute.len())
            .map(|attribute| (&name[..attribute.len()], &name[attribute.len() + 1..]))
    }
}

/// Encoded training data
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    /// Feature matrix (n_samples x schema length)
    pub features: Array2<f64>,

    /// Encoded class index per row
    pub labels: Vec<usize>,

    pub schema: FeatureSchema,
}

impl EncodedDataset {
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }
}

/// One-hot encoder that fixes the feature schema from a training batch
pub struct FeatureEncoder;

impl FeatureEncoder {
    /// Derive the schema and encode an imputed, labelled batch
    pub fn fit_transform(
        records: &[CanonicalRecord],
        imputer: &Imputer,
        run_id: Uuid,
    ) -> Result<EncodedDataset> {
        if records.is_empty() {
            return Err(AppError::InsufficientData(
                "cannot encode an empty training batch (0 rows)".to_string(),
            ));
        }

        let schema = Self::fit(records, imputer, run_id)?;
        let labels = records
            .iter()
            .map(|record| {
                record
                    .severity
                    .and_then(|s| schema.encode_label(s))
                    .ok_or_else(|| AppError::schema("severity"))
            })
            .collect::<Result<Vec<_>>>()?;

        // Rows go through the aligner so training and inference vectors match bit for bit
        let aligner = InferenceAligner::new(&schema)?;
        let mut features = Array2::zeros((records.len(), schema.len()));
        for (record, mut row) in records.iter().zip(features.rows_mut()) {
            let aligned = aligner.align(record);
            for (cell, value) in row.iter_mut().zip(aligned.vector) {
                *cell = value;
            }
        }

        Ok(EncodedDataset {
            features,
            labels,
            schema,
        })
    }

    /// Derive the feature schema without encoding
    pub fn fit(records: &[CanonicalRecord], imputer: &Imputer, run_id: Uuid) -> Result<FeatureSchema> {
        let label_classes: BTreeSet<String> = records
            .iter()
            .filter_map(|r| r.severity)
            .map(|s| s.as_ref().to_string())
            .collect();

        let numeric_attributes: Vec<String> = NumericAttribute::FEATURES
            .iter()
            .map(|a| a.as_ref().to_string())
            .collect();

        let mut feature_names = numeric_attributes.clone();
        let mut categorical_attributes = Vec::new();

        for attribute in CategoricalAttribute::iter() {
            let values: BTreeSet<&str> = records
                .iter()
                .filter_map(|r| r.categorical(attribute))
                .collect();

            feature_names.extend(
                values
                    .into_iter()
                    .map(|value| format!("{}_{}", attribute.as_ref(), value)),
            );
            categorical_attributes.push(attribute.as_ref().to_string());
        }

        Ok(FeatureSchema {
            run_id,
            feature_names,
            numeric_attributes,
            categorical_attributes,
            label_classes: label_classes.into_iter().collect(),
            medians: imputer.medians().clone(),
        })
    }
}
