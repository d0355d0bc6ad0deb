// Logging for mock-completion
// Text or JSON lines, written to stderr and optionally to a file with its own
// level. Module targets are included so broker, store and server output can be
// told apart.
//
// Example usage:
// ```
// let config = LogConfig {
//     console_level: LevelFilter::Info,
//     file_level: Some(LevelFilter::Debug),
//     format: LogFormat::Json,
//     destination: LogDestination::Both(PathBuf::from("mock-completion.log")),
// };
// init_logger(config)?;
// log::info!("Server listening");
// ```

use log::{Level, LevelFilter, Record};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// Log output format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Valid options: text, json", s)),
        }
    }
}

/// Log destination options
#[derive(Debug, Clone, PartialEq)]
pub enum LogDestination {
    Console,
    File(PathBuf),
    Both(PathBuf),
}

impl LogDestination {
    fn file_path(&self) -> Option<&Path> {
        match self {
            LogDestination::Console => None,
            LogDestination::File(path) | LogDestination::Both(path) => Some(path),
        }
    }

    fn includes_console(&self) -> bool {
        !matches!(self, LogDestination::File(_))
    }
}

/// JSON log entry structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub console_level: LevelFilter,
    pub file_level: Option<LevelFilter>,
    pub format: LogFormat,
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: None,
            format: LogFormat::Text,
            destination: LogDestination::Console,
        }
    }
}

impl LogConfig {
    /// Most verbose level any destination accepts
    pub fn max_level(&self) -> LevelFilter {
        match self.file_level {
            Some(file_level) => file_level.max(self.console_level),
            None => self.console_level,
        }
    }
}

/// Logger installed behind the `log` facade
pub struct ServiceLogger {
    config: LogConfig,
    file: Option<Mutex<File>>,
}

impl ServiceLogger {
    /// Create the logger, opening the log file up front when one is configured
    pub fn new(config: LogConfig) -> Result<Self> {
        let file = match config.destination.file_path() {
            Some(path) => Some(Mutex::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file: {}", path.display()))?,
            )),
            None => None,
        };
        Ok(Self { config, file })
    }

    fn format_timestamp() -> String {
        let now: DateTime<Local> = Local::now();
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    fn format_text_message(&self, level: Level, target: &str, message: &str) -> String {
        format!(
            "{} [{}] {}: {}",
            Self::format_timestamp(),
            level.as_str(),
            target,
            message
        )
    }

    fn format_json_message(&self, level: Level, target: &str, message: &str) -> Result<String> {
        let entry = JsonLogEntry {
            timestamp: Self::format_timestamp(),
            level: level.as_str().to_string(),
            target: target.to_string(),
            message: message.to_string(),
            detail: None,
        };

        serde_json::to_string(&entry)
            .context("Failed to serialize log entry to JSON")
    }

    fn format_record(&self, record: &Record) -> String {
        let message = record.args().to_string();
        let (level, target) = (record.level(), record.target());
        match self.config.format {
            LogFormat::Text => self.format_text_message(level, target, &message),
            LogFormat::Json => self
                .format_json_message(level, target, &message)
                .unwrap_or_else(|_| self.format_text_message(level, target, &message)),
        }
    }

    fn should_log_to_console(&self, level: Level) -> bool {
        self.config.destination.includes_console() && level <= self.config.console_level
    }

    fn should_log_to_file(&self, level: Level) -> bool {
        self.file.is_some() && self.config.file_level.is_some_and(|file_level| level <= file_level)
    }
}

impl log::Log for ServiceLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.should_log_to_console(metadata.level()) ||
        self.should_log_to_file(metadata.level())
    }

    fn log(&self, record: &Record) {
        let level = record.level();
        let to_console = self.should_log_to_console(level);
        let to_file = self.should_log_to_file(level);
        if !to_console && !to_file {
            return;
        }

        let line = self.format_record(record);

        if to_console {
            let _ = writeln!(io::stderr(), "{}", line);
        }
        if let (true, Some(file)) = (to_file, &self.file) {
            if let Err(e) = writeln!(file.lock(), "{}", line) {
                let _ = writeln!(io::stderr(), "File logging error: {}", e);
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logger(config: LogConfig) -> Result<()> {
    let max_level = config.max_level();
    let logger = ServiceLogger::new(config)?;

    log::set_boxed_logger(Box::new(logger))
        .context("Failed to set global logger")?;
    log::set_max_level(max_level);

    Ok(())
}

/// Convert string to LevelFilter
pub fn parse_log_level(level_str: &str) -> Result<LevelFilter> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        "off" => Ok(LevelFilter::Off),
        _ => Err(anyhow::anyhow!("Invalid log level: {}. Valid levels: error, warn, info, debug, trace, off", level_str)),
    }
}
