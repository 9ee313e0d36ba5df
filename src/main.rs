//! Glucose log and analytics
//!
//! Keeps a per-profile diary of glucose readings, insulin doses and meals,
//! and derives dashboard statistics, trend series and printable reports.
//!
//! Usage:
//!   glucolog login <profile>   - Select the active profile
//!   glucolog add --sensor 120  - Log an entry
//!   glucolog stats             - Dashboard statistics
//!   glucolog --help            - Show help
//!   GLUCOLOG_DBG=1 glucolog stats - Enable debug output

mod collaborators;
mod config;
mod error;
mod export;
mod ingest;
mod model;
mod report;
mod rules;
mod stats;
mod storage;
mod store;
mod thresholds;
mod window;

use std::env;
use std::fs;
use std::path::PathBuf;

use chrono::{Local, Utc};
use log::{info, warn};

use crate::collaborators::{run_analysis, AnalysisOutcome, BusyFlag, CommandExtractor, ExtractedReading};
use crate::config::{config_file_path, default_export_dir, ensure_data_dir, Config};
use crate::error::GlucoError;
use crate::ingest::{
    estimate_meal, import_sensor_readings, sync_from_image, ImportOutcome, ManualEntry, QuickAction, Submission,
};
use crate::report::{format_carbs, format_insulin, format_level, ReportInput};
use crate::rules::{CarbTable, RuleBasedAnalyzer};
use crate::stats::trend_series;
use crate::storage::SqliteRepository;
use crate::store::{LogStore, Notification};
use crate::window::ChartRange;

fn main() -> Result<(), GlucoError> {
    let args: Vec<String> = env::args().collect();

    let debug_mode = env::var("GLUCOLOG_DBG").is_ok();
    if debug_mode {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    }

    if let Err(e) = ensure_data_dir() {
        eprintln!("Warning: Could not create data directory: {}", e);
    }

    let cfg_path = config_file_path();
    if !cfg_path.exists() {
        if let Err(e) = Config::create_default(&cfg_path) {
            warn!("Could not create default config: {}", e);
        }
    }

    // Data directory first, then current directory
    let config = Config::load(config_file_path())
        .or_else(|_| Config::load("config.txt"))
        .unwrap_or_else(|e| {
            warn!("Could not load config: {}. Using defaults.", e);
            Config::default()
        });

    let command = args.get(1).map(|s| s.as_str());
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        None | Some("--help") | Some("-h") | Some("help") => print_help(),
        Some("--version") | Some("-V") => println!("glucolog {}", env!("CARGO_PKG_VERSION")),
        Some("path") | Some("paths") => cmd_show_paths(&config),
        Some("login") => cmd_login(&config, rest)?,
        Some("logout") => {
            SqliteRepository::new(config.database_path())?.clear_active_profile()?;
            println!("Logged out");
        }
        Some(other) => {
            let mut store = open_store(&config)?;
            let notifications = store.subscribe();

            let result = run_command(&config, &mut store, other, rest);

            for notification in notifications.try_iter() {
                print_notification(&notification);
            }
            result?;
        }
    }

    Ok(())
}

fn run_command(config: &Config, store: &mut LogStore, command: &str, args: &[String]) -> Result<(), GlucoError> {
    match command {
        "add" => cmd_add(config, store, args),
        "edit" => cmd_edit(store, args),
        "delete" | "rm" => cmd_delete(store, args),
        "quick" => cmd_quick(store, args),
        "list" | "ls" => {
            cmd_list(store, args.first().map(|s| s.as_str()));
            Ok(())
        }
        "stats" => {
            cmd_stats(store);
            Ok(())
        }
        "trend" => cmd_trend(config, store, args),
        "analyze" => cmd_analyze(config, store),
        "meal" => {
            cmd_meal(config, args);
            Ok(())
        }
        "import" => cmd_import(store, args),
        "scan" => cmd_scan(config, store, args),
        "export" => cmd_export(store, args),
        "restore" => cmd_restore(store, args),
        "report" => cmd_report(config, store, args),
        other => Err(GlucoError::InvalidInput(format!("unknown command '{}', try `glucolog help`", other))),
    }
}

/// Open the store for the logged-in profile, or the configured one
fn open_store(config: &Config) -> Result<LogStore, GlucoError> {
    let repository = SqliteRepository::new(config.database_path())?;
    let profile = repository
        .active_profile()?
        .or_else(|| config.profile.clone())
        .ok_or(GlucoError::NoActiveProfile)?;

    LogStore::open(&profile, Box::new(repository))
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::Saved => println!("Entry saved"),
        Notification::Updated => println!("Entry updated"),
        Notification::Deleted => println!("Entry deleted"),
        Notification::SyncCompleted { count } => println!("Imported {} readings", count),
        Notification::Restored { count } => println!("Restored {} entries", count),
        Notification::NothingFound => println!("No readings found"),
        Notification::Error(message) => eprintln!("Error: {}", message),
    }
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str, GlucoError> {
    args.get(index)
        .map(|s| s.as_str())
        .ok_or_else(|| GlucoError::InvalidInput(format!("missing {}", what)))
}

fn cmd_login(config: &Config, args: &[String]) -> Result<(), GlucoError> {
    let profile = required(args, 0, "profile")?.trim();
    if profile.is_empty() {
        return Err(GlucoError::InvalidInput("profile must not be empty".to_string()));
    }

    let repository = SqliteRepository::new(config.database_path())?;
    repository.set_active_profile(profile)?;
    println!("Logged in as {} ({} entries)", profile, repository.count(profile)?);
    Ok(())
}

/// Apply `--flag value` pairs to a form. Returns the meal description for
/// carbohydrate estimation when `--describe` is given.
fn apply_flags(entry: &mut ManualEntry, args: &[String]) -> Result<Option<String>, GlucoError> {
    let mut description = None;
    let mut iter = args.iter();

    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| GlucoError::InvalidInput(format!("missing value for {}", flag)))?
            .clone();
        match flag.as_str() {
            "--date" => entry.date = value,
            "--time" => entry.time = value,
            "--sensor" => entry.sensor_level = value,
            "--stick" => entry.stick_level = value,
            "--insulin" => entry.insulin_units = value,
            "--insulin-type" => entry.insulin_type = value.parse()?,
            "--meal" => entry.meal_type = value.parse()?,
            "--notes" => entry.notes = value,
            "--describe" => description = Some(value),
            other => return Err(GlucoError::InvalidInput(format!("unknown option '{}'", other))),
        }
    }

    Ok(description)
}

fn cmd_add(config: &Config, store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let mut entry = ManualEntry::new_at(Local::now());
    if let Some(description) = apply_flags(&mut entry, args)? {
        let busy = BusyFlag::new();
        if let Some(items) = estimate_meal(&CarbTable::new(), &description, config.language, &busy) {
            ingest::append_carb_breakdown(&mut entry.notes, &items);
        }
    }

    if let Submission::Added { id } = entry.submit(store, None)? {
        println!("{}", id);
    }
    Ok(())
}

fn cmd_edit(store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let id = required(args, 0, "entry id")?;
    let original = store
        .get(id)
        .cloned()
        .ok_or_else(|| GlucoError::InvalidInput(format!("no entry with id {}", id)))?;

    let mut entry = ManualEntry::from_log(&original);
    apply_flags(&mut entry, &args[1..])?;
    if let Submission::Updated { found: false } = entry.submit(store, Some(&original))? {
        warn!("Entry {} disappeared before the update", id);
    }
    Ok(())
}

fn cmd_delete(store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let id = required(args, 0, "entry id")?;
    if !store.delete(id) {
        return Err(GlucoError::InvalidInput(format!("no entry with id {}", id)));
    }
    Ok(())
}

fn cmd_quick(store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let action: QuickAction = required(args, 0, "action (insulin, carb, check)")?.parse()?;
    println!("{}", action.log(store, Utc::now()));
    Ok(())
}

fn cmd_list(store: &LogStore, filter: Option<&str>) {
    if store.is_empty() {
        println!("No entries for {}", store.profile_id());
        return;
    }
    let filter = filter.map(|f| f.to_lowercase());
    let keep = |notes: &str, meal: &str| match &filter {
        Some(f) => notes.to_lowercase().contains(f) || meal.to_lowercase().contains(f),
        None => true,
    };

    println!(
        "{:<36}  {:<16}  {:>10}  {:<22}  {:>5}  {:<10}  Notes",
        "Id", "Date/Time", "Value", "Insulin", "Carbs", "Meal"
    );
    for log in store.logs() {
        if !keep(&log.notes, log.meal_type.label()) {
            continue;
        }
        let status = if log.has_reading() { log.status().status() } else { "" };
        println!(
            "{:<36}  {:<16}  {:>10} {:<4}  {:<22}  {:>5}  {:<10}  {}",
            log.id,
            log.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            format_level(log),
            status,
            format_insulin(log),
            format_carbs(log),
            log.meal_type.label(),
            log.notes.lines().next().unwrap_or(""),
        );
    }
}

fn cmd_stats(store: &LogStore) {
    let stats = store.stats();
    println!("Profile:        {}", store.profile_id());
    println!("Entries:        {}", store.len());
    println!("Average:        {}", stats.format_average());
    println!("Time in range:  {}% ({})", stats.time_in_range, thresholds::format_target_range());
    println!("Hypo events:    {}", stats.hypo_count);
    println!("Hyper events:   {}", stats.hyper_count);
}

fn range_arg(config: &Config, arg: Option<&String>) -> Result<ChartRange, GlucoError> {
    match arg {
        Some(value) => value.parse(),
        None => Ok(config.chart_range),
    }
}

fn cmd_trend(config: &Config, store: &LogStore, args: &[String]) -> Result<(), GlucoError> {
    let range = range_arg(config, args.first())?;
    let points = trend_series(&store.window(range, Utc::now()));

    println!("Trend ({}), {} points", range, points.len());
    for point in points {
        println!(
            "  {}  {:>5} mg/dL  {:>4}g  {:>5}u  {}",
            point.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            point.level,
            point.carbs,
            point.insulin,
            point.meal,
        );
    }
    Ok(())
}

fn cmd_analyze(config: &Config, store: &LogStore) -> Result<(), GlucoError> {
    let busy = BusyFlag::new();
    match run_analysis(&RuleBasedAnalyzer::new(), store.logs(), config.language, &busy) {
        AnalysisOutcome::Insight(insight) => {
            println!("{}", insight.summary);
            for pattern in &insight.patterns {
                println!("  - {}", pattern);
            }
            for suggestion in &insight.suggestions {
                println!("  > {}", suggestion);
            }
            if let Some(warning) = &insight.warning {
                println!("Warning: {}", warning);
            }
        }
        AnalysisOutcome::NoData => println!("No entries to analyze"),
        AnalysisOutcome::Busy => println!("Analysis already running"),
        AnalysisOutcome::Failed(message) => return Err(GlucoError::Collaborator(message)),
    }
    Ok(())
}

fn cmd_meal(config: &Config, args: &[String]) {
    let description = args.join(" ");
    let busy = BusyFlag::new();
    match estimate_meal(&CarbTable::new(), &description, config.language, &busy) {
        Some(items) if !items.is_empty() => {
            for item in &items {
                println!("  {:<14} {:<14} {:>5}g", item.name, item.portion, item.carbs);
            }
            println!("{}", ingest::carb_breakdown(&items).trim());
        }
        _ => println!("No known foods in '{}'", description),
    }
}

fn cmd_import(store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let path = required(args, 0, "readings file")?;
    let readings: Vec<ExtractedReading> = serde_json::from_str(&fs::read_to_string(path)?)?;

    if let ImportOutcome::Imported(count) = import_sensor_readings(store, &readings) {
        info!("Imported {} of {} readings from {}", count, readings.len(), path);
    }
    Ok(())
}

fn cmd_scan(config: &Config, store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let path = required(args, 0, "image file")?;
    let command = config
        .extractor_command
        .as_deref()
        .ok_or_else(|| GlucoError::InvalidInput("no extractor_command in config".to_string()))?;

    let image = fs::read(path)?;
    let busy = BusyFlag::new();
    if sync_from_image(store, &CommandExtractor::new(command), &image, &busy) == ImportOutcome::Busy {
        println!("Import already running");
    }
    Ok(())
}

fn cmd_export(store: &LogStore, args: &[String]) -> Result<(), GlucoError> {
    let path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| export::default_export_path(&default_export_dir(), Local::now()));

    export::export_to_file(&path, store.logs())?;
    println!("Exported {} entries to {}", store.len(), path.display());
    Ok(())
}

fn cmd_restore(store: &mut LogStore, args: &[String]) -> Result<(), GlucoError> {
    let logs = export::import_from_file(required(args, 0, "export file")?)?;
    store.restore(logs)
}

fn cmd_report(config: &Config, store: &LogStore, args: &[String]) -> Result<(), GlucoError> {
    let range = range_arg(config, args.get(1))?;
    let now = Local::now();
    let path = args.first().map(PathBuf::from).unwrap_or_else(|| {
        default_export_dir().join(format!("glucolog_report_{}.pdf", now.format("%Y-%m-%d")))
    });

    let logs = store.window(range, now.with_timezone(&Utc));
    let input = ReportInput {
        profile_id: store.profile_id(),
        range,
        logs: &logs,
        stats: store.stats(),
        generated: now,
    };
    report::write_report(&path, &input)?;
    println!("Report written to {}", path.display());
    Ok(())
}

/// Show data paths
fn cmd_show_paths(config: &Config) {
    println!("glucolog data paths:");
    println!("  Data directory:  {}", config::get_data_dir().display());
    println!("  Database:        {}", config.database_path().display());
    println!("  Config file:     {}", config_file_path().display());
    println!("  Export default:  {}", default_export_dir().display());
}

fn print_help() {
    eprintln!("glucolog {}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  glucolog login <profile>          Select the active profile");
    eprintln!("  glucolog logout                   Clear the active profile");
    eprintln!("  glucolog add [options]            Log an entry");
    eprintln!("  glucolog edit <id> [options]      Change an entry");
    eprintln!("  glucolog delete <id>              Remove an entry");
    eprintln!("  glucolog quick insulin|carb|check One-tap entry");
    eprintln!("  glucolog list [filter]            Show entries, filtered by notes or meal");
    eprintln!("  glucolog stats                    Dashboard statistics");
    eprintln!("  glucolog trend [day|week|month]   Chart series for a period");
    eprintln!("  glucolog analyze                  Trend analysis of recent entries");
    eprintln!("  glucolog meal <description>       Carbohydrate estimate");
    eprintln!("  glucolog import <readings.json>   Import extracted sensor readings");
    eprintln!("  glucolog scan <image>             Read a sensor screenshot with extractor_command");
    eprintln!("  glucolog export [file]            Export entries as JSON");
    eprintln!("  glucolog restore <file>           Replace entries from a JSON export");
    eprintln!("  glucolog report [file] [range]    PDF report");
    eprintln!("  glucolog path                     Show data file locations");
    eprintln!("  glucolog help                     Show this help");
    eprintln!();
    eprintln!("Entry options:");
    eprintln!("  --date YYYY-MM-DD  --time HH:MM  --sensor N  --stick N");
    eprintln!("  --insulin U  --insulin-type rapid|long|none  --meal TYPE");
    eprintln!("  --notes TEXT  --describe \"meal description\"");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GLUCOLOG_DBG=1                    Enable debug output");
    eprintln!();
    eprintln!("Files:");
    eprintln!("  Database:  {}", config::default_database_path().display());
    eprintln!("  Config:    {}", config_file_path().display());
}
