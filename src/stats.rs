//! Dashboard statistics and trend series for glucose logs
//!
//! Statistics are computed over every log of the active profile; only the
//! trend series is meant to be fed a window-filtered set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{GlucoseLog, MealType};
use crate::thresholds::{self, HYPER, HYPO};

/// Headline numbers shown on the dashboard and in the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub average_level: u32,
    /// Percentage of valid readings within 80-130 mg/dL
    pub time_in_range: u32,
    pub hypo_count: usize,
    pub hyper_count: usize,
}

impl DashboardStats {
    /// Fold a log collection into dashboard statistics.
    ///
    /// Only entries with a sensor or stick level present take part. Hypo and
    /// hyper counts use the normalized level, so an entry whose only reading
    /// is a stick value of 0 counts as a hypo event.
    pub fn from_logs(logs: &[GlucoseLog]) -> Self {
        let levels: Vec<f64> = logs
            .iter()
            .filter(|log| log.has_reading())
            .map(GlucoseLog::effective_level)
            .collect();

        if levels.is_empty() {
            return Self::default();
        }

        let count = levels.len() as f64;
        let sum: f64 = levels.iter().sum();
        let in_range = levels.iter().filter(|&&v| thresholds::in_target(v)).count();

        Self {
            average_level: (sum / count).round() as u32,
            time_in_range: ((in_range as f64 / count) * 100.0).round() as u32,
            hypo_count: levels.iter().filter(|&&v| v < HYPO).count(),
            hyper_count: levels.iter().filter(|&&v| v > HYPER).count(),
        }
    }

    /// Format average with unit
    pub fn format_average(&self) -> String {
        format!("{} mg/dL", self.average_level)
    }
}

/// One point of the glucose trend chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub level: f64,
    pub carbs: u32,
    pub insulin: f64,
    pub meal: MealType,
}

/// Chart series in ascending time order.
/// Entries without a reading plot at level 0 so carbs and insulin still show.
pub fn trend_series(logs: &[GlucoseLog]) -> Vec<TrendPoint> {
    let mut points: Vec<TrendPoint> = logs
        .iter()
        .map(|log| TrendPoint {
            timestamp: log.timestamp,
            level: log.effective_level(),
            carbs: log.carbs,
            insulin: log.insulin_units,
            meal: log.meal_type,
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{log_at, t0};
    use chrono::Duration;

    #[test]
    fn test_empty_logs_give_zero_stats() {
        let stats = DashboardStats::from_logs(&[]);
        assert_eq!(
            stats,
            DashboardStats { average_level: 0, time_in_range: 0, hypo_count: 0, hyper_count: 0 }
        );
    }

    #[test]
    fn test_logs_without_readings_give_zero_stats() {
        let logs = vec![log_at("a", t0(), None, None), log_at("b", t0(), None, None)];
        assert_eq!(DashboardStats::from_logs(&logs), DashboardStats::default());
    }

    #[test]
    fn test_sensor_and_stick_mix() {
        let logs = vec![
            log_at("1", t0() - Duration::days(2), Some(110.0), None),
            log_at("2", t0() - Duration::days(1), Some(165.0), Some(170.0)),
        ];
        let stats = DashboardStats::from_logs(&logs);

        // (110 + 165) / 2 = 137.5, rounds half up
        assert_eq!(stats.average_level, 138);
        // 110 sits inside 80-130, 165 does not
        assert_eq!(stats.time_in_range, 50);
        assert_eq!(stats.hypo_count, 0);
        assert_eq!(stats.hyper_count, 0);
    }

    #[test]
    fn test_no_reading_entries_are_excluded() {
        let logs = vec![
            log_at("1", t0(), Some(100.0), None),
            log_at("2", t0(), None, None),
            log_at("3", t0(), None, Some(200.0)),
        ];
        let stats = DashboardStats::from_logs(&logs);

        assert_eq!(stats.average_level, 150);
        assert_eq!(stats.time_in_range, 50);
        assert_eq!(stats.hyper_count, 1);
    }

    #[test]
    fn test_hypo_and_hyper_counts() {
        let logs = vec![
            log_at("1", t0(), Some(55.0), None),
            log_at("2", t0(), Some(69.0), None),
            log_at("3", t0(), Some(70.0), None),
            log_at("4", t0(), Some(180.0), None),
            log_at("5", t0(), Some(181.0), None),
            log_at("6", t0(), Some(250.0), None),
        ];
        let stats = DashboardStats::from_logs(&logs);
        assert_eq!(stats.hypo_count, 2);
        assert_eq!(stats.hyper_count, 2);
        assert_eq!(stats.time_in_range, 0);
        assert!(stats.hypo_count + stats.hyper_count <= logs.len());
    }

    #[test]
    fn test_zero_stick_reading_counts_as_hypo() {
        // Present-but-zero reading is valid for the average yet normalizes to 0
        let logs = vec![
            log_at("1", t0(), None, Some(0.0)),
            log_at("2", t0(), Some(120.0), None),
        ];
        let stats = DashboardStats::from_logs(&logs);
        assert_eq!(stats.hypo_count, 1);
        assert_eq!(stats.average_level, 60);
        assert_eq!(stats.time_in_range, 50);
    }

    #[test]
    fn test_time_in_range_rounding() {
        // 1 of 3 in target -> 33.33 -> 33; 2 of 3 -> 66.67 -> 67
        let one = vec![
            log_at("1", t0(), Some(100.0), None),
            log_at("2", t0(), Some(150.0), None),
            log_at("3", t0(), Some(160.0), None),
        ];
        assert_eq!(DashboardStats::from_logs(&one).time_in_range, 33);

        let two = vec![
            log_at("1", t0(), Some(100.0), None),
            log_at("2", t0(), Some(110.0), None),
            log_at("3", t0(), Some(160.0), None),
        ];
        assert_eq!(DashboardStats::from_logs(&two).time_in_range, 67);
    }

    #[test]
    fn test_all_in_target() {
        let logs = vec![log_at("1", t0(), Some(80.0), None), log_at("2", t0(), Some(130.0), None)];
        let stats = DashboardStats::from_logs(&logs);
        assert_eq!(stats.time_in_range, 100);
        assert_eq!(stats.format_average(), "105 mg/dL");
    }

    #[test]
    fn test_trend_series_is_ascending() {
        let logs = vec![
            log_at("new", t0(), Some(140.0), None),
            log_at("old", t0() - Duration::hours(5), None, Some(95.0)),
            log_at("empty", t0() - Duration::hours(2), None, None),
        ];
        let series = trend_series(&logs);

        let levels: Vec<f64> = series.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![95.0, 0.0, 140.0]);
        assert!(series.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
