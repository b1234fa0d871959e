use crate::error::{AppError, Result};
use crate::models::{RawColumn, RawRecord, RawValue, Severity};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const WEATHER_CONDITIONS: [&str; 6] = [
    "Fine no high winds",
    "Raining no high winds",
    "Fine + high winds",
    "Raining + high winds",
    "Fog or mist",
    "Other",
];

pub const LIGHT_CONDITIONS: [&str; 4] = [
    "Daylight",
    "Darkness - lights lit",
    "Darkness - lights unlit",
    "Darkness - no lighting",
];

pub const ROAD_TYPES: [&str; 5] = [
    "Single carriageway",
    "Dual carriageway",
    "One way street",
    "Roundabout",
    "Slip road",
];

pub const SPEED_LIMITS: [f64; 6] = [20.0, 30.0, 40.0, 50.0, 60.0, 70.0];

pub const ROAD_SURFACE_CONDITIONS: [&str; 5] = [
    "Dry",
    "Wet or damp",
    "Snow",
    "Frost or ice",
    "Flood over 3cm deep",
];

pub const JUNCTION_DETAILS: [&str; 5] = [
    "Not at junction or within 20 metres",
    "T or staggered junction",
    "Crossroads",
    "Roundabout",
    "Other junction",
];

/// A provider of raw training records
pub trait RecordSource: Send + Sync {
    /// Read the full batch
    fn load(&self) -> Result<Vec<RawRecord>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Records already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<RawRecord>,
}

impl InMemoryRecordSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for InMemoryRecordSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory batch of {} records", self.records.len())
    }
}

/// A JSON array or JSON-lines file of raw records
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for JsonRecordSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        let text = fs::read_to_string(&self.path)?;
        let records = parse_records(&text)?;
        info!(
            path = %self.path.display(),
            records = records.len(),
            "Loaded raw records"
        );
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("JSON file {}", self.path.display())
    }
}

/// Parse a JSON array of objects, a single object, or one object per line
pub fn parse_records(text: &str) -> Result<Vec<RawRecord>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    if let Ok(single) = serde_json::from_str::<RawRecord>(trimmed) {
        return Ok(vec![single]);
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                AppError::Serialization(format!("line {}: {}", n + 1, e))
            })
        })
        .collect()
}

/// Seeded generator of plausible raw accident records.
///
/// Severity mix is Slight 70%, Serious 20%, Fatal 10%; locations fall in a
/// one-degree box around London; dates span 2020 to 2022.
#[derive(Debug, Clone)]
pub struct SyntheticRecordSource {
    count: usize,
    seed: u64,
}

impl SyntheticRecordSource {
    pub fn new(count: usize, seed: u64) -> Self {
        Self { count, seed }
    }

    pub fn generate(&self) -> Vec<RawRecord> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();

        (0..self.count)
            .map(|_| {
                let date = start + Duration::days(rng.gen_range(0..365 * 3_i64));
                let time = format!("{:02}:{:02}", rng.gen_range(0..24u32), rng.gen_range(0..60u32));
                let severity = match rng.gen_range(0..100u32) {
                    0..=69 => Severity::Slight,
                    70..=89 => Severity::Serious,
                    _ => Severity::Fatal,
                };
                let area = if rng.gen_bool(0.7) { "Urban" } else { "Rural" };

                RawRecord::new()
                    .with(RawColumn::Severity, severity.code() as f64)
                    .with(RawColumn::Longitude, rng.gen_range(-0.5..0.5_f64))
                    .with(RawColumn::Latitude, rng.gen_range(51.0..52.0_f64))
                    .with(RawColumn::AccidentDate, date.format("%Y-%m-%d").to_string())
                    .with(RawColumn::AccidentTime, time)
                    .with(RawColumn::WeatherConditions, pick(&mut rng, &WEATHER_CONDITIONS))
                    .with(RawColumn::LightConditions, pick(&mut rng, &LIGHT_CONDITIONS))
                    .with(RawColumn::RoadType, pick(&mut rng, &ROAD_TYPES))
                    .with(
                        RawColumn::SpeedLimit,
                        RawValue::Number(*SPEED_LIMITS.choose(&mut rng).unwrap_or(&30.0)),
                    )
                    .with(
                        RawColumn::RoadSurfaceConditions,
                        pick(&mut rng, &ROAD_SURFACE_CONDITIONS),
                    )
                    .with(RawColumn::JunctionDetail, pick(&mut rng, &JUNCTION_DETAILS))
                    .with(RawColumn::UrbanOrRuralArea, area)
            })
            .collect()
    }
}

fn pick(rng: &mut StdRng, values: &[&'static str]) -> &'static str {
    values.choose(rng).copied().unwrap_or("Other")
}

impl RecordSource for SyntheticRecordSource {
    fn load(&self) -> Result<Vec<RawRecord>> {
        Ok(self.generate())
    }

    fn describe(&self) -> String {
        format!("{} synthetic records (seed {})", self.count, self.seed)
    }
}
