//! Clinical glucose thresholds and classification
//!
//! Two bands live here and must not be confused:
//! the danger band (hypo below 70, hyper above 180) used to classify a single
//! reading, and the tighter target band (80-130) used for time-in-range.
//! All values are mg/dL, the same unit the logs are recorded in.

use serde::{Deserialize, Serialize};

/// Below this a reading is hypoglycemic
pub const HYPO: f64 = 70.0;
/// Lower bound of the target band (inclusive)
pub const TARGET_MIN: f64 = 80.0;
/// Upper bound of the target band (inclusive)
pub const TARGET_MAX: f64 = 130.0;
/// Above this a reading is hyperglycemic
pub const HYPER: f64 = 180.0;

/// Classification of an effective glucose level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseStatus {
    Hypo,   // < 70 mg/dL
    Normal, // 70 to 180 inclusive
    Hyper,  // > 180 mg/dL
}

impl GlucoseStatus {
    /// Get a display label for the status
    pub fn label(self) -> &'static str {
        match self {
            GlucoseStatus::Hypo => "Hypoglycemia",
            GlucoseStatus::Normal => "Normal",
            GlucoseStatus::Hyper => "Hyperglycemia",
        }
    }

    /// Get a short status text
    pub fn status(self) -> &'static str {
        match self {
            GlucoseStatus::Hypo => "LOW",
            GlucoseStatus::Normal => "OK",
            GlucoseStatus::Hyper => "HIGH",
        }
    }
}

/// Classify an effective level against the danger band
pub fn classify(level: f64) -> GlucoseStatus {
    if level < HYPO {
        GlucoseStatus::Hypo
    } else if level > HYPER {
        GlucoseStatus::Hyper
    } else {
        GlucoseStatus::Normal
    }
}

/// Whether a level sits inside the target band (80-130 inclusive)
pub fn in_target(level: f64) -> bool {
    (TARGET_MIN..=TARGET_MAX).contains(&level)
}

/// Target band display string
pub fn format_target_range() -> String {
    format!("{}-{} mg/dL", TARGET_MIN, TARGET_MAX)
}
