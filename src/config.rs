//! Configuration file parsing and data locations

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::warn;

use crate::collaborators::Language;
use crate::error::GlucoError;
use crate::window::ChartRange;

const APP_DIR_NAME: &str = "glucolog";

/// Configuration loaded from config.txt
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Config {
    /// Overrides the SQLite file location
    pub database_path: Option<String>,
    /// Profile used when no session is logged in
    pub profile: Option<String>,
    pub language: Language,
    pub chart_range: ChartRange,
    /// Program that reads readings off sensor screenshots
    pub extractor_command: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GlucoError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, GlucoError> {
        let mut config = Config::default();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, rest)) = Self::parse_line(line) {
                let value = rest.split('#').next().unwrap_or("").trim();
                if value.is_empty() {
                    continue;
                }
                config.apply(key, value);
            }
        }

        Ok(config)
    }

    /// Unknown keys and bad values are ignored with a warning
    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "database_path" => self.database_path = Some(value.to_string()),
            "profile" => self.profile = Some(value.to_string()),
            "extractor_command" => self.extractor_command = Some(value.to_string()),
            "language" => match value.parse() {
                Ok(language) => self.language = language,
                Err(e) => warn!("config: {}", e),
            },
            "chart_range" => match value.parse() {
                Ok(range) => self.chart_range = range,
                Err(e) => warn!("config: {}", e),
            },
            other => warn!("config: unknown key '{}'", other),
        }
    }

    /// Split "key value" on the first whitespace
    fn parse_line(line: &str) -> Option<(&str, &str)> {
        let mut parts = line.splitn(2, |c: char| c.is_whitespace());
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        if key.is_empty() || value.is_empty() {
            return None;
        }

        Some((key, value))
    }

    /// Write a commented template
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), GlucoError> {
        let template = "\
# glucolog configuration
# Format: key value  # comment

# database_path /path/to/glucolog.db  # defaults to the data directory
# profile RSSMRA80A01H501U           # used when nobody is logged in
# extractor_command /usr/local/bin/read-sensor  # base64 image in, JSON readings out

language en       # it, en, es, fr, zh, hi
chart_range day   # day, week, month
";
        fs::write(path, template)?;
        Ok(())
    }

    /// Configured database location, or the default one
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }
}

/// Per-user application data directory
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn ensure_data_dir() -> Result<PathBuf, GlucoError> {
    let dir = get_data_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_database_path() -> PathBuf {
    get_data_dir().join("glucolog.db")
}

pub fn config_file_path() -> PathBuf {
    get_data_dir().join("config.txt")
}

/// Where exports and reports go when no file is given
pub fn default_export_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
