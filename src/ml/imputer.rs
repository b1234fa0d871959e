use crate::models::{CanonicalRecord, CategoricalAttribute, NumericAttribute};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::warn;

/// Placeholder for missing categorical values
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Fills missing values with training-time statistics.
///
/// Numeric gaps take the column median of the training batch; categorical gaps
/// take [`UNKNOWN_CATEGORY`]. The medians are persisted with the feature schema
/// so inference never recomputes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    medians: BTreeMap<String, f64>,
}

impl Imputer {
    /// Compute medians over a training batch
    pub fn fit(records: &[CanonicalRecord]) -> Self {
        let medians = NumericAttribute::iter()
            .map(|attribute| {
                let values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.numeric(attribute))
                    .filter(|v| v.is_finite())
                    .collect();

                let median = median(values).unwrap_or_else(|| {
                    warn!(
                        attribute = attribute.as_ref(),
                        "No observed values; imputing 0.0"
                    );
                    0.0
                });
                (attribute.as_ref().to_string(), median)
            })
            .collect();

        Self { medians }
    }

    /// Rebuild from persisted medians
    pub fn from_medians(medians: BTreeMap<String, f64>) -> Self {
        Self { medians }
    }

    pub fn medians(&self) -> &BTreeMap<String, f64> {
        &self.medians
    }

    pub fn median(&self, attribute: NumericAttribute) -> Option<f64> {
        self.medians.get(attribute.as_ref()).copied()
    }

    /// Fill every gap in place; values already present are left untouched
    pub fn impute(&self, record: &mut CanonicalRecord) {
        for attribute in NumericAttribute::iter() {
            let slot = record.numeric_mut(attribute);
            if slot.is_none() {
                *slot = Some(self.median(attribute).unwrap_or(0.0));
            }
        }

        for attribute in CategoricalAttribute::iter() {
            let slot = record.categorical_mut(attribute);
            if slot.is_none() {
                *slot = Some(UNKNOWN_CATEGORY.to_string());
            }
        }
    }

    pub fn impute_batch(&self, records: &mut [CanonicalRecord]) {
        for record in records.iter_mut() {
            self.impute(record);
        }
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(longitude: Option<f64>, weather: Option<&str>) -> CanonicalRecord {
        CanonicalRecord {
            longitude,
            weather_conditions: weather.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(vec![]), None);
    }

    #[test]
    fn test_fills_numeric_with_training_median() {
        let training = vec![
            record(Some(1.0), Some("Fog or mist")),
            record(Some(3.0), None),
            record(None, None),
            record(Some(2.0), None),
        ];
        let imputer = Imputer::fit(&training);
        assert_eq!(imputer.median(NumericAttribute::Longitude), Some(2.0));
        // no observed values at all
        assert_eq!(imputer.median(NumericAttribute::Month), Some(0.0));

        let mut target = record(None, None);
        imputer.impute(&mut target);
        assert_eq!(target.longitude, Some(2.0));
        assert_eq!(target.weather_conditions.as_deref(), Some(UNKNOWN_CATEGORY));
        assert_eq!(target.time_of_day.as_deref(), Some(UNKNOWN_CATEGORY));
    }

    #[test]
    fn test_inference_uses_persisted_medians() {
        let mut medians = BTreeMap::new();
        medians.insert("latitude".to_string(), 51.25);
        let imputer = Imputer::from_medians(medians);

        let mut target = CanonicalRecord::default();
        imputer.impute(&mut target);
        assert_eq!(target.latitude, Some(51.25));
    }

    #[test]
    fn test_imputation_is_idempotent() {
        let training = vec![record(Some(1.0), Some("Other")), record(Some(5.0), None)];
        let imputer = Imputer::fit(&training);

        let mut once = record(None, None);
        imputer.impute(&mut once);
        let mut twice = once.clone();
        imputer.impute(&mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_present_values_untouched() {
        let imputer = Imputer::fit(&[record(Some(10.0), None)]);
        let mut target = record(Some(-3.5), Some("Snow"));
        imputer.impute(&mut target);
        assert_eq!(target.longitude, Some(-3.5));
        assert_eq!(target.weather_conditions.as_deref(), Some("Snow"));
    }
}
