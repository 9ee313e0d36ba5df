//! Interfaces to the external analysis services
//!
//! Trend narration, meal carbohydrate estimation and screenshot extraction
//! are provided by a generative AI service. Only the boundary is modeled
//! here; implementations are supplied by the caller.

use std::cell::Cell;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::GlucoError;
use crate::model::{AiInsight, GlucoseLog, MealItem, MealType};

/// Maximum number of entries handed to trend analysis
pub const ANALYSIS_SAMPLE_LIMIT: usize = 20;

/// Output language requested from the services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    It,
    #[default]
    En,
    Es,
    Fr,
    Zh,
    Hi,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::It => "it",
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::Zh => "zh",
            Language::Hi => "hi",
        }
    }

    /// Name used when instructing the service which language to answer in
    pub fn prompt_name(self) -> &'static str {
        match self {
            Language::It => "ITALIAN",
            Language::En => "ENGLISH",
            Language::Es => "SPANISH",
            Language::Fr => "FRENCH",
            Language::Zh => "CHINESE",
            Language::Hi => "HINDI",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = GlucoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "it" => Ok(Language::It),
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            "fr" => Ok(Language::Fr),
            "zh" => Ok(Language::Zh),
            "hi" => Ok(Language::Hi),
            other => Err(GlucoError::InvalidInput(format!("unsupported language '{}'", other))),
        }
    }
}

/// Compact view of a log entry sent for trend analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSample {
    pub time: DateTime<Utc>,
    pub level: f64,
    pub carbs: u32,
    pub insulin: f64,
    pub meal: MealType,
}

/// A glucose value read off a sensor screenshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReading {
    /// ISO-8601 as produced by the service, timezone may be missing
    pub timestamp: String,
    pub sensor_level: f64,
}

pub trait TrendAnalyzer {
    fn analyze(&self, samples: &[AnalysisSample], language: Language) -> Result<AiInsight, GlucoError>;
}

/// Implementations return an empty list on failure instead of an error.
pub trait MealEstimator {
    fn estimate(&self, description: &str, language: Language) -> Vec<MealItem>;
}

/// Implementations return an empty list on failure instead of an error.
pub trait ImageExtractor {
    fn extract(&self, image_base64: &str) -> Vec<ExtractedReading>;
}

/// Guards against starting a second call of the same kind while one is
/// still in flight. Single-threaded, like the session that owns it.
#[derive(Debug, Default)]
pub struct BusyFlag {
    busy: Cell<bool>,
}

/// Clears its [`BusyFlag`] when dropped
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Mark as busy, or `None` when a call is already running
    pub fn try_begin(&self) -> Option<BusyGuard<'_>> {
        if self.busy.replace(true) {
            None
        } else {
            Some(BusyGuard { flag: self })
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.set(false);
    }
}

/// Most recent entries, oldest first, capped at [`ANALYSIS_SAMPLE_LIMIT`]
pub fn analysis_samples(logs: &[GlucoseLog]) -> Vec<AnalysisSample> {
    let mut samples: Vec<AnalysisSample> = logs
        .iter()
        .map(|log| AnalysisSample {
            time: log.timestamp,
            level: log.effective_level(),
            carbs: log.carbs,
            insulin: log.insulin_units,
            meal: log.meal_type,
        })
        .collect();
    samples.sort_by_key(|s| s.time);

    let skip = samples.len().saturating_sub(ANALYSIS_SAMPLE_LIMIT);
    samples.split_off(skip)
}

/// Result of asking for a trend analysis
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Insight(AiInsight),
    /// No entries to analyze, the service was not called
    NoData,
    /// Another analysis is still running
    Busy,
    Failed(String),
}

/// Run trend analysis over a profile's entries, turning failures into an
/// outcome the caller can show as a transient message.
pub fn run_analysis(
    analyzer: &dyn TrendAnalyzer,
    logs: &[GlucoseLog],
    language: Language,
    busy: &BusyFlag,
) -> AnalysisOutcome {
    if logs.is_empty() {
        return AnalysisOutcome::NoData;
    }
    let Some(_guard) = busy.try_begin() else {
        return AnalysisOutcome::Busy;
    };

    let samples = analysis_samples(logs);
    info!("Requesting trend analysis for {} entries ({})", samples.len(), language);
    match analyzer.analyze(&samples, language) {
        Ok(insight) => AnalysisOutcome::Insight(insight),
        Err(e) => {
            warn!("Trend analysis failed: {}", e);
            AnalysisOutcome::Failed(e.to_string())
        }
    }
}

/// Base64 payload for the image extraction service
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Image extraction delegated to an external program. The base64 image is
/// written to its stdin and a JSON array of readings is read from stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    command: String,
}

impl CommandExtractor {
    /// `command` is a program followed by whitespace-separated arguments
    pub fn new(command: &str) -> Self {
        Self { command: command.to_string() }
    }

    fn run(&self, image_base64: &str) -> Result<Vec<ExtractedReading>, GlucoError> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| GlucoError::Collaborator("empty extractor command".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        // Feed stdin from its own thread while stdout is drained here, so a
        // child that answers as it reads cannot fill both pipes.
        let stdin = child.stdin.take();
        let payload = image_base64.as_bytes().to_vec();
        let writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload)?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{} stopped reading its input: {}", program, e),
            Err(_) => return Err(GlucoError::Collaborator("stdin writer panicked".to_string())),
        }
        if !output.status.success() {
            return Err(GlucoError::Collaborator(format!("{} exited with {}", program, output.status)));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl ImageExtractor for CommandExtractor {
    fn extract(&self, image_base64: &str) -> Vec<ExtractedReading> {
        match self.run(image_base64) {
            Ok(readings) => {
                debug!("Extractor returned {} readings", readings.len());
                readings
            }
            Err(e) => {
                warn!("Image extraction failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::tests::{log_at, t0};
    use chrono::Duration;
    use std::cell::RefCell;

    /// Analyzer that records what it was sent
    pub(crate) struct RecordingAnalyzer {
        pub seen: RefCell<Vec<AnalysisSample>>,
        pub fail: bool,
    }

    impl TrendAnalyzer for RecordingAnalyzer {
        fn analyze(&self, samples: &[AnalysisSample], _language: Language) -> Result<AiInsight, GlucoError> {
            self.seen.borrow_mut().extend_from_slice(samples);
            if self.fail {
                return Err(GlucoError::Collaborator("quota exceeded".to_string()));
            }
            Ok(AiInsight {
                summary: format!("{} entries", samples.len()),
                patterns: vec!["post-lunch peaks".to_string()],
                suggestions: Vec::new(),
                warning: None,
            })
        }
    }

    fn analyzer(fail: bool) -> RecordingAnalyzer {
        RecordingAnalyzer { seen: RefCell::new(Vec::new()), fail }
    }

    #[test]
    fn test_samples_are_latest_twenty_ascending() {
        // store order: newest first
        let logs: Vec<GlucoseLog> = (0..25)
            .map(|i| log_at(&i.to_string(), t0() - Duration::hours(i), Some(100.0 + i as f64), None))
            .collect();

        let samples = analysis_samples(&logs);
        assert_eq!(samples.len(), ANALYSIS_SAMPLE_LIMIT);
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(samples.last().unwrap().time, t0());
        assert_eq!(samples.first().unwrap().level, 119.0);
    }

    #[test]
    fn test_samples_use_effective_level() {
        let logs = vec![
            log_at("a", t0(), Some(165.0), Some(170.0)),
            log_at("b", t0() - Duration::hours(1), None, None),
        ];
        let levels: Vec<f64> = analysis_samples(&logs).iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![0.0, 165.0]);
    }

    #[test]
    fn test_run_analysis_outcomes() {
        let busy = BusyFlag::new();
        let logs = vec![log_at("a", t0(), Some(120.0), None)];

        assert_eq!(run_analysis(&analyzer(false), &[], Language::En, &busy), AnalysisOutcome::NoData);

        match run_analysis(&analyzer(false), &logs, Language::It, &busy) {
            AnalysisOutcome::Insight(insight) => assert_eq!(insight.summary, "1 entries"),
            other => panic!("unexpected outcome {:?}", other),
        }

        let failing = analyzer(true);
        assert!(matches!(
            run_analysis(&failing, &logs, Language::En, &busy),
            AnalysisOutcome::Failed(_)
        ));
        // flag is released after a failure
        assert!(!busy.is_busy());
        assert_eq!(failing.seen.borrow().len(), 1);
    }

    #[test]
    fn test_run_analysis_while_busy() {
        let busy = BusyFlag::new();
        let _guard = busy.try_begin().unwrap();
        let recorder = analyzer(false);
        let logs = vec![log_at("a", t0(), Some(120.0), None)];

        assert_eq!(run_analysis(&recorder, &logs, Language::En, &busy), AnalysisOutcome::Busy);
        assert!(recorder.seen.borrow().is_empty());
    }

    #[test]
    fn test_busy_flag() {
        let busy = BusyFlag::new();
        {
            let _guard = busy.try_begin().unwrap();
            assert!(busy.is_busy());
            assert!(busy.try_begin().is_none());
        }
        assert!(!busy.is_busy());
        assert!(busy.try_begin().is_some());
    }

    #[test]
    fn test_encode_image() {
        assert_eq!(encode_image(b"hello"), "aGVsbG8=");
        assert_eq!(encode_image(&[]), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_reads_stdout() {
        // cat echoes the payload back, so the payload itself is the reply
        let reply = r#"[{"timestamp": "2025-03-10T09:00:00Z", "sensorLevel": 142}]"#;
        let readings = CommandExtractor::new("cat").extract(reply);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_level, 142.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_large_payload() {
        // well past the pipe buffer, and cat writes while it is still reading
        let point = r#"{"timestamp": "2025-03-10T09:00:00Z", "sensorLevel": 142}"#;
        let reply = format!("[{}]", vec![point; 20_000].join(","));
        assert!(reply.len() > 1_000_000);

        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(CommandExtractor::new("cat").extract(&reply).len());
        });
        let count = rx.recv_timeout(std::time::Duration::from_secs(30)).unwrap();
        assert_eq!(count, 20_000);
    }

    #[test]
    fn test_command_extractor_failures_are_empty() {
        assert!(CommandExtractor::new("glucolog-no-such-program").extract("aGVsbG8=").is_empty());
        assert!(CommandExtractor::new("   ").extract("aGVsbG8=").is_empty());
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("IT".parse::<Language>().unwrap(), Language::It);
        assert_eq!(Language::Hi.prompt_name(), "HINDI");
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn test_extracted_reading_json() {
        let readings: Vec<ExtractedReading> =
            serde_json::from_str(r#"[{"timestamp": "2024-05-01T08:30:00", "sensorLevel": 142}]"#).unwrap();
        assert_eq!(readings[0].sensor_level, 142.0);
    }
}
