use crate::error::{AppError, Result};
use crate::models::{
    CanonicalRecord, CategoricalAttribute, RawColumn, RawRecord, RawValue, Severity, TimeOfDay,
};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use tracing::{debug, warn};
use validator::Validate;

/// Hour used when the accident time is missing or unparseable
pub const DEFAULT_HOUR: u32 = 12;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// How strictly to treat questionable raw values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    /// Unrecognized severities drop the row; unparseable numbers become null
    Training,
    /// Unrecognized severities and malformed numbers are rejected
    Inference,
}

/// Normalize one training row. `Ok(None)` means the row carries no usable label.
pub fn normalize_training(raw: &RawRecord) -> Result<Option<CanonicalRecord>> {
    let severity = match raw.get(RawColumn::Severity) {
        None => return Err(AppError::schema(RawColumn::Severity.as_ref())),
        Some(value) => value.as_text().and_then(|s| Severity::from_raw(&s)),
    };

    let Some(severity) = severity else {
        debug!(value = ?raw.severity, "Dropping row with unrecognized severity");
        return Ok(None);
    };

    let mut record = normalize_common(raw, NormalizationMode::Training)?;
    record.severity = Some(severity);
    Ok(Some(record))
}

/// Normalize a prediction request, validating ranges
pub fn normalize_inference(raw: &RawRecord) -> Result<CanonicalRecord> {
    let mut record = normalize_common(raw, NormalizationMode::Inference)?;

    // A label is not needed at inference, but one that is present must be valid
    if let Some(value) = raw.get(RawColumn::Severity).filter(|v| !v.is_null()) {
        let text = value.as_text().unwrap_or_default();
        let severity = Severity::from_raw(&text).ok_or_else(|| {
            AppError::validation(
                RawColumn::Severity.as_ref(),
                format!("unrecognized severity '{}'", text),
            )
        })?;
        record.severity = Some(severity);
    }

    record.validate()?;
    Ok(record)
}

/// Normalize a training batch, dropping unlabeled rows
pub fn normalize_batch(raws: &[RawRecord]) -> Result<Vec<CanonicalRecord>> {
    let mut records = Vec::with_capacity(raws.len());
    let mut dropped = 0usize;

    for raw in raws {
        match normalize_training(raw)? {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(
            dropped,
            kept = records.len(),
            "Dropped training rows with unrecognized severity"
        );
    }

    Ok(records)
}

fn normalize_common(raw: &RawRecord, mode: NormalizationMode) -> Result<CanonicalRecord> {
    for column in [
        RawColumn::Longitude,
        RawColumn::Latitude,
        RawColumn::AccidentDate,
    ] {
        if raw.get(column).is_none() {
            return Err(AppError::schema(column.as_ref()));
        }
    }

    let mut record = CanonicalRecord {
        longitude: numeric_value(raw, RawColumn::Longitude, mode)?,
        latitude: numeric_value(raw, RawColumn::Latitude, mode)?,
        speed_limit: numeric_value(raw, RawColumn::SpeedLimit, mode)?,
        ..Default::default()
    };

    let date = raw.get(RawColumn::AccidentDate).and_then(parse_date);
    if let Some(date) = date {
        let day_of_week = date.weekday().num_days_from_monday();
        record.accident_date = Some(date);
        record.year = Some(date.year() as f64);
        record.month = Some(date.month() as f64);
        record.day = Some(date.day() as f64);
        record.day_of_week = Some(day_of_week as f64);
        record.is_weekend = Some(if day_of_week >= 5 { 1.0 } else { 0.0 });
    }

    let hour = raw
        .get(RawColumn::AccidentTime)
        .and_then(parse_hour)
        .unwrap_or(DEFAULT_HOUR);
    record.hour = Some(hour as f64);
    record.time_of_day = Some(TimeOfDay::from_hour(hour).to_string());

    for (column, attribute) in [
        (RawColumn::WeatherConditions, CategoricalAttribute::WeatherConditions),
        (RawColumn::LightConditions, CategoricalAttribute::LightConditions),
        (RawColumn::RoadType, CategoricalAttribute::RoadType),
        (
            RawColumn::RoadSurfaceConditions,
            CategoricalAttribute::RoadSurfaceConditions,
        ),
        (RawColumn::JunctionDetail, CategoricalAttribute::JunctionDetail),
        (RawColumn::UrbanOrRuralArea, CategoricalAttribute::UrbanOrRuralArea),
    ] {
        *record.categorical_mut(attribute) = raw
            .get(column)
            .and_then(RawValue::as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    Ok(record)
}

fn numeric_value(raw: &RawRecord, column: RawColumn, mode: NormalizationMode) -> Result<Option<f64>> {
    let parsed = match raw.get(column) {
        None | Some(RawValue::Null) => return Ok(None),
        Some(RawValue::Number(n)) => Some(*n),
        Some(RawValue::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(RawValue::Text(s)) => s.trim().parse::<f64>().ok(),
    };

    match (parsed.filter(|n| n.is_finite()), mode) {
        (Some(n), _) => Ok(Some(n)),
        (None, NormalizationMode::Training) => Ok(None),
        (None, NormalizationMode::Inference) => Err(AppError::validation(
            column.as_ref(),
            "expected a finite number",
        )),
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` (date part) or `DD/MM/YYYY`
pub fn parse_date(value: &RawValue) -> Option<NaiveDate> {
    let RawValue::Text(text) = value else {
        return None;
    };
    let text = text.trim();
    let date_part = match text.split_once('T') {
        Some((date, time)) if NaiveTime::parse_from_str(time, "%H:%M:%S").is_ok() => date,
        Some(_) => return None,
        None => text,
    };

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

/// Parse `HH:MM` into an hour of day
pub fn parse_hour(value: &RawValue) -> Option<u32> {
    let RawValue::Text(text) = value else {
        return None;
    };
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .ok()
        .map(|time| time.hour())
}
