//! Offline collaborators
//!
//! Rule-based stand-ins for the AI service: a trend analyzer working from
//! the thresholds and a carbohydrate table for common foods. Output is
//! always English.

use log::debug;

use crate::collaborators::{AnalysisSample, Language, MealEstimator, TrendAnalyzer};
use crate::error::GlucoError;
use crate::model::{AiInsight, MealItem, MealType};
use crate::thresholds::{self, GlucoseStatus, TARGET_MAX};

/// Difference between the two halves of the series reported as a trend
const TREND_DELTA: f64 = 20.0;

/// Trend analysis from threshold counts
#[derive(Debug, Default)]
pub struct RuleBasedAnalyzer;

impl RuleBasedAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl TrendAnalyzer for RuleBasedAnalyzer {
    fn analyze(&self, samples: &[AnalysisSample], language: Language) -> Result<AiInsight, GlucoError> {
        debug!("Rule-based analysis of {} samples, answering in ENGLISH instead of {}", samples.len(), language.prompt_name());

        let readings: Vec<&AnalysisSample> = samples.iter().filter(|s| s.level > 0.0).collect();
        if readings.is_empty() {
            return Ok(AiInsight {
                summary: "No glucose readings in the analyzed entries.".to_string(),
                patterns: Vec::new(),
                suggestions: vec!["Log sensor or stick readings to get an analysis.".to_string()],
                warning: None,
            });
        }

        let levels: Vec<f64> = readings.iter().map(|s| s.level).collect();
        let hypo = levels.iter().filter(|&&l| thresholds::classify(l) == GlucoseStatus::Hypo).count();
        let hyper = levels.iter().filter(|&&l| thresholds::classify(l) == GlucoseStatus::Hyper).count();
        let in_range = levels.iter().filter(|&&l| thresholds::in_target(l)).count();

        let summary = format!(
            "Average {:.0} mg/dL over {} readings, {}% in the {} target range.",
            mean(&levels),
            levels.len(),
            (in_range as f64 / levels.len() as f64 * 100.0).round(),
            thresholds::format_target_range(),
        );

        let mut patterns = Vec::new();
        let meal_levels: Vec<f64> = readings
            .iter()
            .filter(|s| !matches!(s.meal, MealType::Control | MealType::Correction))
            .map(|s| s.level)
            .collect();
        if !meal_levels.is_empty() && mean(&meal_levels) > TARGET_MAX {
            patterns.push(format!("Readings logged with meals run high (avg {:.0} mg/dL).", mean(&meal_levels)));
        }
        if hypo > 0 {
            patterns.push(format!("{} low reading(s).", hypo));
        }
        if hyper > 0 {
            patterns.push(format!("{} high reading(s).", hyper));
        }
        if levels.len() >= 4 {
            let (older, newer) = levels.split_at(levels.len() / 2);
            let delta = mean(newer) - mean(older);
            if delta > TREND_DELTA {
                patterns.push("Levels are trending up.".to_string());
            } else if delta < -TREND_DELTA {
                patterns.push("Levels are trending down.".to_string());
            }
        }

        let mut suggestions = Vec::new();
        if hyper > 0 {
            suggestions.push("Review carbohydrate counts and rapid insulin timing around meals.".to_string());
        }
        if hypo > 0 {
            suggestions.push("Check for lows after insulin doses and keep fast carbs at hand.".to_string());
        }
        if suggestions.is_empty() {
            suggestions.push("Keep logging consistently.".to_string());
        }

        let warning = (hypo >= 2).then(|| "Repeated low readings, talk to your care team.".to_string());

        Ok(AiInsight { summary, patterns, suggestions, warning })
    }
}

/// Keyword, display name, portion, grams of carbohydrate per portion
const CARB_TABLE: &[(&str, &str, &str, f64)] = &[
    ("pasta", "Pasta", "80g dry", 60.0),
    ("rice", "Rice", "80g dry", 62.0),
    ("pizza", "Pizza", "1 pizza", 100.0),
    ("bread", "Bread", "1 slice", 15.0),
    ("croissant", "Croissant", "1 piece", 26.0),
    ("cereal", "Cereal", "30g", 25.0),
    ("potato", "Potato", "1 medium", 30.0),
    ("apple", "Apple", "1 medium", 15.0),
    ("banana", "Banana", "1 medium", 25.0),
    ("orange", "Orange", "1 medium", 12.0),
    ("juice", "Fruit juice", "1 glass", 26.0),
    ("milk", "Milk", "1 cup", 12.0),
    ("yogurt", "Yogurt", "1 pot", 15.0),
    ("cookie", "Cookie", "1 piece", 10.0),
];

/// Carbohydrate estimates from a fixed table of common foods.
/// Parts of the description are split on `,`, `+` and ` and `; a leading
/// number multiplies the portion. Unknown foods are left out.
#[derive(Debug, Default)]
pub struct CarbTable;

impl CarbTable {
    pub fn new() -> Self {
        Self
    }

    fn lookup(part: &str) -> Option<MealItem> {
        let part = part.trim().to_lowercase();
        let (count, rest) = match part.split_once(char::is_whitespace) {
            Some((n, rest)) => match n.parse::<u32>() {
                Ok(n) if n > 0 => (n, rest),
                _ => (1, part.as_str()),
            },
            None => (1, part.as_str()),
        };

        let &(_, name, portion, carbs) = CARB_TABLE.iter().find(|(keyword, ..)| rest.contains(*keyword))?;
        let portion = if count > 1 {
            format!("{} x {}", count, portion)
        } else {
            portion.to_string()
        };
        Some(MealItem {
            name: name.to_string(),
            portion,
            carbs: carbs * count as f64,
        })
    }
}

impl MealEstimator for CarbTable {
    fn estimate(&self, description: &str, _language: Language) -> Vec<MealItem> {
        description
            .replace(" and ", ",")
            .split([',', '+'])
            .filter_map(Self::lookup)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::analysis_samples;
    use crate::model::tests::{log_at, t0};
    use chrono::Duration;

    fn samples(levels: &[f64]) -> Vec<AnalysisSample> {
        // levels given oldest first
        let logs: Vec<_> = levels
            .iter()
            .enumerate()
            .map(|(i, &l)| log_at(&i.to_string(), t0() + Duration::hours(i as i64), Some(l), None))
            .collect();
        analysis_samples(&logs)
    }

    #[test]
    fn test_analysis_counts_and_warning() {
        let insight = RuleBasedAnalyzer::new()
            .analyze(&samples(&[60.0, 65.0, 110.0, 200.0]), Language::En)
            .unwrap();

        assert!(insight.summary.starts_with("Average 109 mg/dL over 4 readings, 25%"));
        assert!(insight.patterns.contains(&"2 low reading(s).".to_string()));
        assert!(insight.patterns.contains(&"1 high reading(s).".to_string()));
        assert_eq!(insight.suggestions.len(), 2);
        assert!(insight.warning.is_some());
    }

    #[test]
    fn test_analysis_trend_up() {
        let insight = RuleBasedAnalyzer::new()
            .analyze(&samples(&[100.0, 105.0, 150.0, 160.0]), Language::En)
            .unwrap();
        assert!(insight.patterns.contains(&"Levels are trending up.".to_string()));
        assert!(insight.warning.is_none());
    }

    #[test]
    fn test_analysis_without_readings() {
        let logs = vec![log_at("a", t0(), None, None)];
        let insight = RuleBasedAnalyzer::new().analyze(&analysis_samples(&logs), Language::It).unwrap();
        assert!(insight.patterns.is_empty());
        assert!(insight.summary.starts_with("No glucose readings"));
    }

    #[test]
    fn test_carb_table_estimate() {
        let items = CarbTable::new().estimate("Pasta al pomodoro, 2 apples and a glass of juice", Language::En);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Pasta", "Apple", "Fruit juice"]);
        assert_eq!(items[1].carbs, 30.0);
        assert_eq!(items[1].portion, "2 x 1 medium");
    }

    #[test]
    fn test_carb_table_unknown_food() {
        assert!(CarbTable::new().estimate("grilled chicken", Language::En).is_empty());
    }
}
