use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use validator::Validate;

/// Accident severity label
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum Severity {
    Fatal,
    Serious,
    Slight,
}

impl Severity {
    /// Parse a raw severity value: the source codes `1|2|3` or a label name
    pub fn from_raw(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(Severity::Fatal),
            "2" => Some(Severity::Serious),
            "3" => Some(Severity::Slight),
            other => Severity::iter().find(|s| s.as_ref().eq_ignore_ascii_case(other)),
        }
    }

    /// Source severity code
    pub fn code(&self) -> u8 {
        match self {
            Severity::Fatal => 1,
            Severity::Serious => 2,
            Severity::Slight => 3,
        }
    }
}

/// Time-of-day bucket, half-open hour ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
pub enum TimeOfDay {
    /// [0, 6)
    Night,
    /// [6, 12)
    Morning,
    /// [12, 18)
    Afternoon,
    /// [18, 24)
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => TimeOfDay::Night,
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }
}

/// Numeric attributes of a canonical record, in feature order.
///
/// `Year` and `Day` are derived and imputed but never used as model features.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum NumericAttribute {
    Longitude,
    Latitude,
    Hour,
    DayOfWeek,
    IsWeekend,
    SpeedLimit,
    Month,
    Year,
    Day,
}

impl NumericAttribute {
    /// Numeric feature columns, in schema order
    pub const FEATURES: [NumericAttribute; 7] = [
        NumericAttribute::Longitude,
        NumericAttribute::Latitude,
        NumericAttribute::Hour,
        NumericAttribute::DayOfWeek,
        NumericAttribute::IsWeekend,
        NumericAttribute::SpeedLimit,
        NumericAttribute::Month,
    ];
}

/// Categorical attributes of a canonical record, in feature order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum CategoricalAttribute {
    WeatherConditions,
    LightConditions,
    RoadType,
    RoadSurfaceConditions,
    JunctionDetail,
    UrbanOrRuralArea,
    TimeOfDay,
}

/// A scalar value as it arrives from a raw source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Render as text; integral numbers drop the fractional part
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

/// Raw columns understood by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RawColumn {
    Severity,
    Longitude,
    Latitude,
    AccidentDate,
    AccidentTime,
    WeatherConditions,
    LightConditions,
    RoadType,
    SpeedLimit,
    RoadSurfaceConditions,
    JunctionDetail,
    UrbanOrRuralArea,
}

impl RawColumn {
    /// Resolve a source or canonical column name
    pub fn from_key(key: &str) -> Option<Self> {
        let column = match key {
            "Accident_Severity" | "accident_severity" | "severity" => RawColumn::Severity,
            "Longitude" | "longitude" => RawColumn::Longitude,
            "Latitude" | "latitude" => RawColumn::Latitude,
            "Date" | "date" | "accident_date" => RawColumn::AccidentDate,
            "Time" | "time" | "accident_time" => RawColumn::AccidentTime,
            "Weather_Conditions" | "weather_conditions" => RawColumn::WeatherConditions,
            "Light_Conditions" | "light_conditions" => RawColumn::LightConditions,
            "Road_Type" | "road_type" => RawColumn::RoadType,
            "Speed_limit" | "Speed_Limit" | "speed_limit" => RawColumn::SpeedLimit,
            "Road_Surface_Conditions" | "road_surface_conditions" => {
                RawColumn::RoadSurfaceConditions
            }
            "Junction_Detail" | "junction_detail" => RawColumn::JunctionDetail,
            "Urban_or_Rural_Area" | "urban_or_rural_area" => RawColumn::UrbanOrRuralArea,
            _ => return None,
        };
        Some(column)
    }
}

/// One raw accident observation or prediction request.
///
/// `None` means the column was absent from the source; `Some(RawValue::Null)`
/// means it was present but empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, RawValue>",
    into = "BTreeMap<String, RawValue>"
)]
pub struct RawRecord {
    pub severity: Option<RawValue>,
    pub longitude: Option<RawValue>,
    pub latitude: Option<RawValue>,
    pub accident_date: Option<RawValue>,
    pub accident_time: Option<RawValue>,
    pub weather_conditions: Option<RawValue>,
    pub light_conditions: Option<RawValue>,
    pub road_type: Option<RawValue>,
    pub speed_limit: Option<RawValue>,
    pub road_surface_conditions: Option<RawValue>,
    pub junction_detail: Option<RawValue>,
    pub urban_or_rural_area: Option<RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: RawColumn, value: impl Into<RawValue>) -> Self {
        *self.slot_mut(column) = Some(value.into());
        self
    }

    pub fn set(&mut self, column: RawColumn, value: Option<RawValue>) {
        *self.slot_mut(column) = value;
    }

    pub fn get(&self, column: RawColumn) -> Option<&RawValue> {
        match column {
            RawColumn::Severity => self.severity.as_ref(),
            RawColumn::Longitude => self.longitude.as_ref(),
            RawColumn::Latitude => self.latitude.as_ref(),
            RawColumn::AccidentDate => self.accident_date.as_ref(),
            RawColumn::AccidentTime => self.accident_time.as_ref(),
            RawColumn::WeatherConditions => self.weather_conditions.as_ref(),
            RawColumn::LightConditions => self.light_conditions.as_ref(),
            RawColumn::RoadType => self.road_type.as_ref(),
            RawColumn::SpeedLimit => self.speed_limit.as_ref(),
            RawColumn::RoadSurfaceConditions => self.road_surface_conditions.as_ref(),
            RawColumn::JunctionDetail => self.junction_detail.as_ref(),
            RawColumn::UrbanOrRuralArea => self.urban_or_rural_area.as_ref(),
        }
    }

    fn slot_mut(&mut self, column: RawColumn) -> &mut Option<RawValue> {
        match column {
            RawColumn::Severity => &mut self.severity,
            RawColumn::Longitude => &mut self.longitude,
            RawColumn::Latitude => &mut self.latitude,
            RawColumn::AccidentDate => &mut self.accident_date,
            RawColumn::AccidentTime => &mut self.accident_time,
            RawColumn::WeatherConditions => &mut self.weather_conditions,
            RawColumn::LightConditions => &mut self.light_conditions,
            RawColumn::RoadType => &mut self.road_type,
            RawColumn::SpeedLimit => &mut self.speed_limit,
            RawColumn::RoadSurfaceConditions => &mut self.road_surface_conditions,
            RawColumn::JunctionDetail => &mut self.junction_detail,
            RawColumn::UrbanOrRuralArea => &mut self.urban_or_rural_area,
        }
    }
}

impl From<BTreeMap<String, RawValue>> for RawRecord {
    fn from(map: BTreeMap<String, RawValue>) -> Self {
        let mut record = RawRecord::default();
        for (key, value) in map {
            if let Some(column) = RawColumn::from_key(&key) {
                record.set(column, Some(value));
            }
        }
        record
    }
}

impl From<RawRecord> for BTreeMap<String, RawValue> {
    fn from(record: RawRecord) -> Self {
        RawColumn::iter()
            .filter_map(|column| {
                record
                    .get(column)
                    .map(|value| (column.as_ref().to_string(), value.clone()))
            })
            .collect()
    }
}

/// A raw record after renaming and derivation; imputation fills the remaining gaps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CanonicalRecord {
    pub severity: Option<Severity>,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,

    pub accident_date: Option<NaiveDate>,
    pub hour: Option<f64>,
    pub year: Option<f64>,
    pub month: Option<f64>,
    pub day: Option<f64>,
    pub day_of_week: Option<f64>,
    pub is_weekend: Option<f64>,

    #[validate(range(min = 0.0, max = 200.0))]
    pub speed_limit: Option<f64>,

    pub weather_conditions: Option<String>,
    pub light_conditions: Option<String>,
    pub road_type: Option<String>,
    pub road_surface_conditions: Option<String>,
    pub junction_detail: Option<String>,
    pub urban_or_rural_area: Option<String>,
    pub time_of_day: Option<String>,
}

impl CanonicalRecord {
    pub fn numeric(&self, attribute: NumericAttribute) -> Option<f64> {
        match attribute {
            NumericAttribute::Longitude => self.longitude,
            NumericAttribute::Latitude => self.latitude,
            NumericAttribute::Hour => self.hour,
            NumericAttribute::DayOfWeek => self.day_of_week,
            NumericAttribute::IsWeekend => self.is_weekend,
            NumericAttribute::SpeedLimit => self.speed_limit,
            NumericAttribute::Month => self.month,
            NumericAttribute::Year => self.year,
            NumericAttribute::Day => self.day,
        }
    }

    pub fn numeric_mut(&mut self, attribute: NumericAttribute) -> &mut Option<f64> {
        match attribute {
            NumericAttribute::Longitude => &mut self.longitude,
            NumericAttribute::Latitude => &mut self.latitude,
            NumericAttribute::Hour => &mut self.hour,
            NumericAttribute::DayOfWeek => &mut self.day_of_week,
            NumericAttribute::IsWeekend => &mut self.is_weekend,
            NumericAttribute::SpeedLimit => &mut self.speed_limit,
            NumericAttribute::Month => &mut self.month,
            NumericAttribute::Year => &mut self.year,
            NumericAttribute::Day => &mut self.day,
        }
    }

    pub fn categorical(&self, attribute: CategoricalAttribute) -> Option<&str> {
        match attribute {
            CategoricalAttribute::WeatherConditions => self.weather_conditions.as_deref(),
            CategoricalAttribute::LightConditions => self.light_conditions.as_deref(),
            CategoricalAttribute::RoadType => self.road_type.as_deref(),
            CategoricalAttribute::RoadSurfaceConditions => self.road_surface_conditions.as_deref(),
            CategoricalAttribute::JunctionDetail => self.junction_detail.as_deref(),
            CategoricalAttribute::UrbanOrRuralArea => self.urban_or_rural_area.as_deref(),
            CategoricalAttribute::TimeOfDay => self.time_of_day.as_deref(),
        }
    }

    pub fn categorical_mut(&mut self, attribute: CategoricalAttribute) -> &mut Option<String> {
        match attribute {
            CategoricalAttribute::WeatherConditions => &mut self.weather_conditions,
            CategoricalAttribute::LightConditions => &mut self.light_conditions,
            CategoricalAttribute::RoadType => &mut self.road_type,
            CategoricalAttribute::RoadSurfaceConditions => &mut self.road_surface_conditions,
            CategoricalAttribute::JunctionDetail => &mut self.junction_detail,
            CategoricalAttribute::UrbanOrRuralArea => &mut self.urban_or_rural_area,
            CategoricalAttribute::TimeOfDay => &mut self.time_of_day,
        }
    }
}
