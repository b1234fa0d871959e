use crate::error::{AppError, Result};
use crate::ml::features::FeatureSchema;
use crate::models::{CanonicalRecord, CategoricalAttribute, NumericAttribute, UnseenCategory};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// How a schema column is filled
#[derive(Debug, Clone, PartialEq)]
enum ColumnPlan {
    Numeric(NumericAttribute),
    Indicator {
        attribute: CategoricalAttribute,
        value: String,
    },
}

/// An aligned feature vector and the categories that fell outside the schema
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedVector {
    pub vector: Vec<f64>,
    pub unseen: Vec<UnseenCategory>,
}

/// Rebuilds feature vectors in persisted schema order.
///
/// The column plan is resolved once per schema; aligning a record is then a
/// single pass over the plan with no allocation beyond the output vector.
#[derive(Debug, Clone)]
pub struct InferenceAligner {
    plan: Vec<ColumnPlan>,
    known: BTreeMap<CategoricalAttribute, BTreeSet<String>>,
}

impl InferenceAligner {
    /// Resolve every schema column; fails if a name cannot be resolved
    pub fn new(schema: &FeatureSchema) -> Result<Self> {
        let mut known: BTreeMap<CategoricalAttribute, BTreeSet<String>> = BTreeMap::new();
        for name in &schema.categorical_attributes {
            known.insert(parse_categorical(name)?, BTreeSet::new());
        }

        let mut plan = Vec::with_capacity(schema.len());
        for name in &schema.feature_names {
            if schema.numeric_attributes.iter().any(|a| a == name) {
                let attribute = NumericAttribute::from_str(name).map_err(|_| {
                    AppError::Internal(format!("Unknown numeric feature '{}'", name))
                })?;
                plan.push(ColumnPlan::Numeric(attribute));
                continue;
            }

            let (attribute, value) = schema.split_indicator(name).ok_or_else(|| {
                AppError::Internal(format!(
                    "Feature '{}' is neither numeric nor a known indicator",
                    name
                ))
            })?;
            let attribute = parse_categorical(attribute)?;
            known
                .entry(attribute)
                .or_default()
                .insert(value.to_string());
            plan.push(ColumnPlan::Indicator {
                attribute,
                value: value.to_string(),
            });
        }

        Ok(Self { plan, known })
    }

    /// Number of columns produced
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Align an imputed record to the schema.
    ///
    /// A categorical value without a matching indicator column leaves that
    /// attribute's indicator block all zero and is reported in `unseen`.
    pub fn align(&self, record: &CanonicalRecord) -> AlignedVector {
        let mut vector = vec![0.0; self.plan.len()];

        for (slot, column) in vector.iter_mut().zip(&self.plan) {
            match column {
                ColumnPlan::Numeric(attribute) => {
                    if let Some(value) = record.numeric(*attribute) {
                        *slot = value;
                    }
                }
                ColumnPlan::Indicator { attribute, value } => {
                    if record.categorical(*attribute) == Some(value.as_str()) {
                        *slot = 1.0;
                    }
                }
            }
        }

        let unseen = self
            .known
            .iter()
            .filter_map(|(attribute, values)| {
                let value = record.categorical(*attribute)?;
                (!values.contains(value)).then(|| UnseenCategory {
                    attribute: attribute.as_ref().to_string(),
                    value: value.to_string(),
                })
            })
            .collect();

        debug_assert_eq!(vector.len(), self.plan.len());
        AlignedVector { vector, unseen }
    }
}

fn parse_categorical(name: &str) -> Result<CategoricalAttribute> {
    CategoricalAttribute::from_str(name)
        .map_err(|_| AppError::Internal(format!("Unknown categorical attribute '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::FeatureEncoder;
    use crate::ml::imputer::Imputer;
    use crate::models::Severity;
    use uuid::Uuid;

    fn imputed(severity: Severity, weather: &str, surface: &str) -> CanonicalRecord {
        let mut record = CanonicalRecord {
            severity: Some(severity),
            longitude: Some(0.25),
            latitude: Some(51.75),
            hour: Some(17.0),
            speed_limit: Some(30.0),
            weather_conditions: Some(weather.to_string()),
            road_surface_conditions: Some(surface.to_string()),
            ..Default::default()
        };
        Imputer::default().impute(&mut record);
        record
    }

    fn schema() -> FeatureSchema {
        let records = vec![
            imputed(Severity::Slight, "Fine no high winds", "Dry"),
            imputed(Severity::Serious, "Fog or mist", "Wet_or_damp"),
        ];
        FeatureEncoder::fit(&records, &Imputer::fit(&records), Uuid::nil()).unwrap()
    }

    #[test]
    fn test_seen_category_sets_indicator() {
        let schema = schema();
        let aligner = InferenceAligner::new(&schema).unwrap();
        let aligned = aligner.align(&imputed(Severity::Slight, "Fine no high winds", "Dry"));

        assert_eq!(aligned.vector.len(), schema.len());
        let fine = schema.index_of("weather_conditions_Fine no high winds").unwrap();
        let fog = schema.index_of("weather_conditions_Fog or mist").unwrap();
        assert_eq!(aligned.vector[fine], 1.0);
        assert_eq!(aligned.vector[fog], 0.0);
        assert_eq!(aligned.vector[0], 0.25);
        assert!(aligned.unseen.is_empty());
    }

    #[test]
    fn test_unseen_category_zero_fills_and_reports() {
        let schema = schema();
        let aligner = InferenceAligner::new(&schema).unwrap();
        let aligned = aligner.align(&imputed(Severity::Slight, "Meteor Shower", "Dry"));

        assert_eq!(aligned.vector.len(), schema.len());
        for (i, name) in schema.feature_names.iter().enumerate() {
            if name.starts_with("weather_conditions_") {
                assert_eq!(aligned.vector[i], 0.0, "{}", name);
            }
        }
        assert_eq!(
            aligned.unseen,
            vec![UnseenCategory {
                attribute: "weather_conditions".to_string(),
                value: "Meteor Shower".to_string(),
            }]
        );
    }

    #[test]
    fn test_value_with_underscores_resolves() {
        let schema = schema();
        let aligner = InferenceAligner::new(&schema).unwrap();
        let aligned = aligner.align(&imputed(Severity::Slight, "Fog or mist", "Wet_or_damp"));

        let wet = schema
            .index_of("road_surface_conditions_Wet_or_damp")
            .unwrap();
        assert_eq!(aligned.vector[wet], 1.0);
    }

    #[test]
    fn test_unresolvable_feature_name_rejected() {
        let mut schema = schema();
        schema.feature_names.push("mystery_column".to_string());
        assert!(InferenceAligner::new(&schema).is_err());
    }
}
