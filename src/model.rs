//! Log entry types and the effective glucose level

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GlucoError;
use crate::thresholds::{self, GlucoseStatus};

/// Kind of insulin administered with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InsulinType {
    #[serde(rename = "Rapid-acting")]
    Rapid,
    #[serde(rename = "Long-acting")]
    Long,
    #[default]
    None,
}

impl InsulinType {
    pub fn label(self) -> &'static str {
        match self {
            InsulinType::Rapid => "Rapid-acting",
            InsulinType::Long => "Long-acting",
            InsulinType::None => "None",
        }
    }
}

impl FromStr for InsulinType {
    type Err = GlucoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rapid" | "rapid-acting" => Ok(InsulinType::Rapid),
            "long" | "long-acting" => Ok(InsulinType::Long),
            "none" => Ok(InsulinType::None),
            other => Err(GlucoError::InvalidInput(format!("unknown insulin type '{}'", other))),
        }
    }
}

/// Meal slot an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MealType {
    Breakfast,
    Snack,
    Lunch,
    #[default]
    Control,
    Dinner,
    Correction,
}

impl MealType {
    pub const ALL: [MealType; 6] = [
        MealType::Breakfast,
        MealType::Snack,
        MealType::Lunch,
        MealType::Control,
        MealType::Dinner,
        MealType::Correction,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MealType::Breakfast => "Breakfast",
            MealType::Snack => "Snack",
            MealType::Lunch => "Lunch",
            MealType::Control => "Control",
            MealType::Dinner => "Dinner",
            MealType::Correction => "Correction",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MealType {
    type Err = GlucoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MealType::ALL
            .iter()
            .copied()
            .find(|m| m.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| GlucoError::InvalidInput(format!("unknown meal type '{}'", s)))
    }
}

/// Where a log entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    #[default]
    Manual,
    Sensor,
    /// Not produced locally, only read back from other clients' exports
    #[allow(dead_code)]
    AiScan,
}

/// A single glucose / insulin / carbohydrate log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlucoseLog {
    pub id: String,
    pub profile_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stick_level: Option<f64>,
    #[serde(default)]
    pub carbs: u32,
    #[serde(default)]
    pub insulin_units: f64,
    #[serde(default)]
    pub insulin_type: InsulinType,
    #[serde(default)]
    pub meal_type: MealType,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub source: LogSource,
}

/// Log content before the store assigns identity, ownership and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct LogDraft {
    pub timestamp: DateTime<Utc>,
    pub sensor_level: Option<f64>,
    pub stick_level: Option<f64>,
    pub carbs: u32,
    pub insulin_units: f64,
    pub insulin_type: InsulinType,
    pub meal_type: MealType,
    pub notes: String,
}

impl LogDraft {
    /// Empty draft at the given instant
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            sensor_level: None,
            stick_level: None,
            carbs: 0,
            insulin_units: 0.0,
            insulin_type: InsulinType::None,
            meal_type: MealType::Control,
            notes: String::new(),
        }
    }
}

impl GlucoseLog {
    /// Stamp a draft into a full record
    pub fn from_draft(draft: LogDraft, id: String, profile_id: String, source: LogSource) -> Self {
        Self {
            id,
            profile_id,
            timestamp: draft.timestamp,
            sensor_level: draft.sensor_level,
            stick_level: draft.stick_level,
            carbs: draft.carbs,
            insulin_units: draft.insulin_units,
            insulin_type: draft.insulin_type,
            meal_type: draft.meal_type,
            notes: draft.notes,
            source,
        }
    }

    /// See [`effective_level`]
    pub fn effective_level(&self) -> f64 {
        effective_level(self.sensor_level, self.stick_level)
    }

    /// True when at least one level field is set, whatever its value
    pub fn has_reading(&self) -> bool {
        self.sensor_level.is_some() || self.stick_level.is_some()
    }

    pub fn status(&self) -> GlucoseStatus {
        thresholds::classify(self.effective_level())
    }
}

/// Single glucose value used for all computation.
///
/// Sensor wins over stick. A level that is absent *or zero* falls through to
/// the next one, and 0 is returned when nothing is left, so a genuine zero
/// reading cannot be told apart from "no reading". Callers that need to skip
/// empty entries must check [`GlucoseLog::has_reading`] first.
pub fn effective_level(sensor_level: Option<f64>, stick_level: Option<f64>) -> f64 {
    nonzero(sensor_level)
        .or_else(|| nonzero(stick_level))
        .unwrap_or(0.0)
}

fn nonzero(level: Option<f64>) -> Option<f64> {
    level.filter(|v| *v != 0.0 && !v.is_nan())
}

/// One component of a meal carbohydrate estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealItem {
    pub name: String,
    #[serde(default)]
    pub portion: String,
    pub carbs: f64,
}

/// Narrated trend analysis returned by the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInsight {
    pub summary: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Manual log owned by `profile-1`
    pub(crate) fn log_at(id: &str, timestamp: DateTime<Utc>, sensor: Option<f64>, stick: Option<f64>) -> GlucoseLog {
        let mut draft = LogDraft::at(timestamp);
        draft.sensor_level = sensor;
        draft.stick_level = stick;
        GlucoseLog::from_draft(draft, id.to_string(), "profile-1".to_string(), LogSource::Manual)
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_sensor_wins_over_stick() {
        assert_eq!(effective_level(Some(165.0), Some(170.0)), 165.0);
        assert_eq!(effective_level(Some(90.0), Some(300.0)), 90.0);
    }

    #[test]
    fn test_fallback_to_stick() {
        assert_eq!(effective_level(None, Some(170.0)), 170.0);
        // zero sensor value falls through like an absent one
        assert_eq!(effective_level(Some(0.0), Some(120.0)), 120.0);
    }

    #[test]
    fn test_no_reading_is_zero() {
        assert_eq!(effective_level(None, None), 0.0);
        assert_eq!(effective_level(Some(0.0), Some(0.0)), 0.0);

        let log = log_at("a", t0(), None, None);
        assert!(!log.has_reading());
        assert_eq!(log.effective_level(), 0.0);
    }

    #[test]
    fn test_zero_stick_is_present_but_normalizes_to_zero() {
        let log = log_at("a", t0(), None, Some(0.0));
        assert!(log.has_reading());
        assert_eq!(log.effective_level(), 0.0);
        assert_eq!(log.status(), GlucoseStatus::Hypo);
    }

    #[test]
    fn test_json_field_names() {
        let mut log = log_at("abc", t0(), Some(110.0), None);
        log.insulin_type = InsulinType::Rapid;
        log.meal_type = MealType::Breakfast;
        log.source = LogSource::AiScan;

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["profileId"], "profile-1");
        assert_eq!(json["sensorLevel"], 110.0);
        assert!(json.get("stickLevel").is_none());
        assert_eq!(json["insulinType"], "Rapid-acting");
        assert_eq!(json["mealType"], "Breakfast");
        assert_eq!(json["source"], "ai_scan");
    }

    #[test]
    fn test_missing_source_defaults_to_manual() {
        let json = r#"{
            "id": "1",
            "profileId": "p",
            "timestamp": "2025-03-10T12:00:00Z",
            "sensorLevel": 110,
            "carbs": 45,
            "insulinUnits": 5,
            "insulinType": "Rapid-acting",
            "mealType": "Breakfast",
            "notes": "morning"
        }"#;
        let log: GlucoseLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.source, LogSource::Manual);
        assert_eq!(log.carbs, 45);
        assert_eq!(log.effective_level(), 110.0);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("lunch".parse::<MealType>().unwrap(), MealType::Lunch);
        assert_eq!("rapid".parse::<InsulinType>().unwrap(), InsulinType::Rapid);
        assert!("brunch".parse::<MealType>().is_err());
    }
}
