//! Producers of new log entries
//!
//! Manual form entries, meal carbohydrate notes, sensor screenshot imports
//! and one-tap quick actions all end up in the [`LogStore`].

use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use log::{info, warn};

use crate::collaborators::{encode_image, BusyFlag, ExtractedReading, ImageExtractor, Language, MealEstimator};
use crate::error::GlucoError;
use crate::model::{GlucoseLog, InsulinType, LogDraft, LogSource, MealItem, MealType};
use crate::store::LogStore;

/// Notes attached to every entry imported from a sensor screenshot
pub const SENSOR_IMPORT_NOTE: &str = "AI Sensor Import";

// ============= Manual entry =============

/// Log entry form, fields kept as typed
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    pub sensor_level: String,
    pub stick_level: String,
    pub insulin_units: String,
    pub insulin_type: InsulinType,
    pub meal_type: MealType,
    pub notes: String,
}

/// What a form submission did
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Added { id: String },
    /// `false` when the edited entry no longer exists
    Updated { found: bool },
}

impl ManualEntry {
    /// Blank form for a new entry at the given local time
    pub fn new_at(now: DateTime<Local>) -> Self {
        Self {
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M").to_string(),
            sensor_level: String::new(),
            stick_level: String::new(),
            insulin_units: String::new(),
            insulin_type: InsulinType::Rapid,
            meal_type: MealType::Control,
            notes: String::new(),
        }
    }

    /// Form prefilled from an existing entry, in local time
    pub fn from_log(log: &GlucoseLog) -> Self {
        let local = log.timestamp.with_timezone(&Local);
        Self {
            date: local.format("%Y-%m-%d").to_string(),
            time: local.format("%H:%M").to_string(),
            sensor_level: log.sensor_level.map(|v| v.to_string()).unwrap_or_default(),
            stick_level: log.stick_level.map(|v| v.to_string()).unwrap_or_default(),
            insulin_units: log.insulin_units.to_string(),
            insulin_type: log.insulin_type,
            meal_type: log.meal_type,
            notes: log.notes.clone(),
        }
    }

    /// Build the entry content. `carbs` is carried over from the entry being
    /// edited since the form has no carbohydrate field.
    pub fn to_draft_in<Tz: TimeZone>(&self, tz: &Tz, carbs: u32) -> Result<LogDraft, GlucoError> {
        Ok(LogDraft {
            timestamp: combine_date_time(&self.date, &self.time, tz)?,
            sensor_level: parse_level(&self.sensor_level, "sensor level")?,
            stick_level: parse_level(&self.stick_level, "stick level")?,
            carbs,
            insulin_units: parse_level(&self.insulin_units, "insulin units")?.unwrap_or(0.0),
            insulin_type: self.insulin_type,
            meal_type: self.meal_type,
            notes: self.notes.clone(),
        })
    }

    /// Submit the form: update `editing` in place, or add a new manual entry
    pub fn submit(&self, store: &mut LogStore, editing: Option<&GlucoseLog>) -> Result<Submission, GlucoError> {
        self.submit_in(&Local, store, editing)
    }

    pub fn submit_in<Tz: TimeZone>(
        &self,
        tz: &Tz,
        store: &mut LogStore,
        editing: Option<&GlucoseLog>,
    ) -> Result<Submission, GlucoError> {
        let carbs = editing.map(|log| log.carbs).unwrap_or(0);
        let draft = self.to_draft_in(tz, carbs)?;

        match editing {
            Some(original) => {
                let updated = GlucoseLog::from_draft(
                    draft,
                    original.id.clone(),
                    original.profile_id.clone(),
                    original.source,
                );
                Ok(Submission::Updated { found: store.update(updated) })
            }
            None => {
                let id = store.add(draft, LogSource::Manual).id.clone();
                Ok(Submission::Added { id })
            }
        }
    }
}

/// Join a form date and time into one instant, read in `tz`
pub fn combine_date_time<Tz: TimeZone>(date: &str, time: &str, tz: &Tz) -> Result<DateTime<Utc>, GlucoError> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| GlucoError::InvalidInput(format!("invalid date '{}': {}", date, e)))?;
    let clock = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|e| GlucoError::InvalidInput(format!("invalid time '{}': {}", time, e)))?;

    tz.from_local_datetime(&day.and_time(clock))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| GlucoError::InvalidInput(format!("{} {} does not exist in the local timezone", date, time)))
}

/// Empty input means "not entered"
fn parse_level(input: &str, field: &str) -> Result<Option<f64>, GlucoError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    match input.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(GlucoError::InvalidInput(format!("{} must be a non-negative number, got '{}'", field, input))),
    }
}

// ============= Meal carbohydrate estimate =============

/// Text appended to the notes after a meal estimate:
/// `"\n[Carbs: {total}g - {item}: {grams}g, ...]"`
pub fn carb_breakdown(items: &[MealItem]) -> String {
    let total: f64 = items.iter().map(|i| i.carbs).sum();
    let detail = items
        .iter()
        .map(|i| format!("{}: {}g", i.name, i.carbs))
        .collect::<Vec<_>>()
        .join(", ");
    format!("\n[Carbs: {}g - {}]", total, detail)
}

/// Append the breakdown to in-progress notes. The structured carbs field of
/// the entry is left alone.
pub fn append_carb_breakdown(notes: &mut String, items: &[MealItem]) {
    notes.push_str(&carb_breakdown(items));
}

/// Ask the estimator about a meal description. `None` when the description
/// is blank or an estimate is already running; an empty list when the
/// service found nothing or failed.
pub fn estimate_meal(
    estimator: &dyn MealEstimator,
    description: &str,
    language: Language,
    busy: &BusyFlag,
) -> Option<Vec<MealItem>> {
    if description.trim().is_empty() {
        return None;
    }
    let _guard = busy.try_begin()?;
    let items = estimator.estimate(description, language);
    info!("Meal estimate returned {} items", items.len());
    Some(items)
}

// ============= Sensor screenshot import =============

/// Result of a sensor import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(usize),
    NothingFound,
    /// Another import is still running
    Busy,
}

/// Entry content for extracted readings. Readings whose timestamp cannot be
/// read, or whose level is negative or not a number, are skipped.
pub fn sensor_drafts(readings: &[ExtractedReading]) -> Vec<LogDraft> {
    readings
        .iter()
        .filter(|reading| {
            let valid = reading.sensor_level.is_finite() && reading.sensor_level >= 0.0;
            if !valid {
                warn!("Skipping extracted reading with invalid level {}", reading.sensor_level);
            }
            valid
        })
        .filter_map(|reading| match parse_extracted_timestamp(&reading.timestamp) {
            Some(timestamp) => Some(LogDraft {
                timestamp,
                sensor_level: Some(reading.sensor_level),
                stick_level: None,
                carbs: 0,
                insulin_units: 0.0,
                insulin_type: InsulinType::None,
                meal_type: MealType::Control,
                notes: SENSOR_IMPORT_NOTE.to_string(),
            }),
            None => {
                warn!("Skipping extracted reading with unreadable timestamp '{}'", reading.timestamp);
                None
            }
        })
        .collect()
}

/// Add extracted readings to the store as one batch
pub fn import_sensor_readings(store: &mut LogStore, readings: &[ExtractedReading]) -> ImportOutcome {
    let drafts = sensor_drafts(readings);
    match store.bulk_add(drafts, LogSource::Sensor) {
        0 => ImportOutcome::NothingFound,
        count => ImportOutcome::Imported(count),
    }
}

/// Extract readings from a sensor screenshot and import them
pub fn sync_from_image(
    store: &mut LogStore,
    extractor: &dyn ImageExtractor,
    image: &[u8],
    busy: &BusyFlag,
) -> ImportOutcome {
    let Some(_guard) = busy.try_begin() else {
        return ImportOutcome::Busy;
    };
    let readings = extractor.extract(&encode_image(image));
    import_sensor_readings(store, &readings)
}

/// RFC 3339, or a local date-time without offset as the service often sends
fn parse_extracted_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============= Quick actions =============

/// One-tap dashboard entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    /// 1 unit of rapid insulin
    Insulin,
    /// 15 g snack
    Carb,
    Check,
}

impl FromStr for QuickAction {
    type Err = GlucoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insulin" => Ok(QuickAction::Insulin),
            "carb" | "carbs" => Ok(QuickAction::Carb),
            "check" => Ok(QuickAction::Check),
            other => Err(GlucoError::InvalidInput(format!("unknown quick action '{}'", other))),
        }
    }
}

impl QuickAction {
    pub fn draft(self, now: DateTime<Utc>) -> LogDraft {
        let mut draft = LogDraft::at(now);
        match self {
            QuickAction::Insulin => {
                draft.insulin_units = 1.0;
                draft.insulin_type = InsulinType::Rapid;
                draft.notes = "Rapid correction 1u".to_string();
            }
            QuickAction::Carb => {
                draft.carbs = 15;
                draft.meal_type = MealType::Snack;
                draft.notes = "Quick snack 15g".to_string();
            }
            QuickAction::Check => {
                draft.notes = "Quick action log".to_string();
            }
        }
        draft
    }

    pub fn log(self, store: &mut LogStore, now: DateTime<Utc>) -> String {
        store.add(self.draft(now), LogSource::Manual).id.clone()
    }
}
