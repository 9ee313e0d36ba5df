//! JSON export and import of log collections

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;

use crate::error::GlucoError;
use crate::model::GlucoseLog;

/// Pretty-printed JSON array of the collection, in store order
pub fn export_json(logs: &[GlucoseLog]) -> Result<String, GlucoError> {
    Ok(serde_json::to_string_pretty(logs)?)
}

pub fn import_json(json: &str) -> Result<Vec<GlucoseLog>, GlucoError> {
    Ok(serde_json::from_str(json)?)
}

/// Write the collection to a file
pub fn export_to_file<P: AsRef<Path>>(path: P, logs: &[GlucoseLog]) -> Result<(), GlucoError> {
    fs::write(path.as_ref(), export_json(logs)?)?;
    info!("Exported {} logs to {}", logs.len(), path.as_ref().display());
    Ok(())
}

pub fn import_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<GlucoseLog>, GlucoError> {
    let json = fs::read_to_string(path.as_ref())?;
    import_json(&json)
}

/// `glucolog_logs_<date>.json`
pub fn default_export_file_name(now: DateTime<Local>) -> String {
    format!("glucolog_logs_{}.json", now.format("%Y-%m-%d"))
}

/// Default export location inside a directory
pub fn default_export_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(default_export_file_name(now))
}
