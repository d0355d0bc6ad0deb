use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use anyhow::{Context, Result};
use toml::Value;
use log::{debug, info};

use crate::cli::size_parser::{format_byte_size, parse_byte_size};
use crate::engine::EngineConfig;

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

pub const DEFAULT_LISTEN: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATA_FILE: &str = "preset_queues.json";
pub const DEFAULT_BYPASS_FILE: &str = "bypass_config.json";

/// Effective server settings after defaults, config file and CLI are merged
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen: String,
    pub port: u16,
    pub resolution_timeout: Duration,
    pub max_import_bytes: usize,
    pub data_file: PathBuf,
    pub bypass_file: PathBuf,
    pub observer_buffer: usize,
    pub finished_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            resolution_timeout: engine.resolution_timeout,
            max_import_bytes: crate::server::DEFAULT_MAX_IMPORT_BYTES,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            bypass_file: PathBuf::from(DEFAULT_BYPASS_FILE),
            observer_buffer: engine.observer_buffer,
            finished_history: engine.finished_history,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            anyhow::bail!("listen address must not be empty");
        }
        if self.resolution_timeout.is_zero() {
            anyhow::bail!("resolution-timeout must be at least 1 second");
        }
        if self.max_import_bytes == 0 {
            anyhow::bail!("max-import-size must be greater than zero");
        }
        if self.observer_buffer == 0 {
            anyhow::bail!("observer-buffer must be greater than zero");
        }
        if self.finished_history == 0 {
            anyhow::bail!("finished-history must be greater than zero");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            resolution_timeout: self.resolution_timeout,
            observer_buffer: self.observer_buffer,
            finished_history: self.finished_history,
        }
    }

    /// Render as a `[server]` TOML table
    fn to_toml_table(&self) -> toml::Table {
        let mut table = toml::Table::new();
        table.insert("listen".into(), Value::String(self.listen.clone()));
        table.insert("port".into(), Value::Integer(i64::from(self.port)));
        table.insert(
            "resolution-timeout".into(),
            Value::Integer(self.resolution_timeout.as_secs() as i64),
        );
        let size = format_byte_size(self.max_import_bytes);
        let size = if size.contains('.') {
            self.max_import_bytes.to_string()
        } else {
            size.replace(' ', "")
        };
        table.insert("max-import-size".into(), Value::String(size));
        table.insert("data-file".into(), Value::String(self.data_file.display().to_string()));
        table.insert("bypass-file".into(), Value::String(self.bypass_file.display().to_string()));
        table.insert("observer-buffer".into(), Value::Integer(self.observer_buffer as i64));
        table.insert("finished-history".into(), Value::Integer(self.finished_history as i64));
        table
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
    selected_section: Option<String>,
}

impl ConfigManager {
    /// Create a new ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            config_file_path: None,
            selected_section: None,
        }
    }

    /// Load configuration using discovery hierarchy
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        for path in discover_config_files() {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using defaults");
        Ok(Self::from_config(Configuration::new()))
    }

    /// Load configuration from explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        Ok(Self {
            config,
            config_file_path: Some(path),
            selected_section: None,
        })
    }

    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// Get value from configuration with section fallback
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        // Priority: selected_section -> specified section -> base
        if let Some(selected) = &self.selected_section {
            if let Some(value) = self.config.get(selected).and_then(|s| s.get(key)) {
                return Some(value);
            }
        }

        if let Some(value) = self.config.get(section).and_then(|s| s.get(key)) {
            return Some(value);
        }

        self.config.get("base").and_then(|s| s.get(key))
    }

    /// Select configuration section for --config-name
    pub fn select_section(&mut self, section: String) {
        debug!("Selecting configuration section: {}", section);
        self.selected_section = Some(section);
    }

    /// Get boolean value with type conversion
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {}.{}: {}", section, key, value)),
            },
            None => Ok(None),
        }
    }

    /// Get log level value with type conversion
    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_value(section, key) {
            Some(value) => Ok(Some(crate::logging::parse_log_level(value)?)),
            None => Ok(None),
        }
    }

    /// Get path value with type conversion
    pub fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(PathBuf::from)
    }

    fn get_parsed<T>(&self, section: &str, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_value(section, key) {
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid {}.{} value '{}': {}", section, key, value, e)),
            None => Ok(None),
        }
    }

    /// Server settings from the `[server]` section over built-in defaults
    pub fn get_server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();

        if let Some(listen) = self.get_value("server", "listen") {
            config.listen = listen.clone();
        }
        if let Some(port) = self.get_parsed::<u16>("server", "port")? {
            config.port = port;
        }
        if let Some(secs) = self.get_parsed::<u64>("server", "resolution-timeout")? {
            config.resolution_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = self.get_value("server", "max-import-size") {
            config.max_import_bytes = parse_byte_size(size)
                .with_context(|| format!("Invalid max-import-size value in config: {}", size))?;
        }
        if let Some(path) = self.get_path("server", "data-file") {
            config.data_file = path;
        }
        if let Some(path) = self.get_path("server", "bypass-file") {
            config.bypass_file = path;
        }
        if let Some(buffer) = self.get_parsed::<usize>("server", "observer-buffer")? {
            config.observer_buffer = buffer;
        }
        if let Some(history) = self.get_parsed::<usize>("server", "finished-history")? {
            config.finished_history = history;
        }

        config.validate()
            .with_context(|| "Server configuration validation failed")?;
        Ok(config)
    }

    /// Complete configuration document with every server key filled in
    pub fn export_complete_config(&self, server: &ServerConfig) -> Result<String> {
        let mut root = toml::Table::new();

        let mut base = toml::Table::new();
        for key in ["console-level", "log-format", "log-file", "file-log-level"] {
            if let Some(value) = self.config.get("base").and_then(|s| s.get(key)) {
                base.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        if !base.is_empty() {
            root.insert("base".into(), Value::Table(base));
        }
        root.insert("server".into(), Value::Table(server.to_toml_table()));

        toml::to_string_pretty(&root).context("Failed to render configuration")
    }
}

/// Discover configuration files in order of precedence
fn discover_config_files() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Environment variable $MOCK_COMPLETION_CONFIG
    if let Ok(env_path) = env::var("MOCK_COMPLETION_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    // 2. XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mock-completion").join("config.toml"));
    }

    // 3. Home directory
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".mock-completion.toml"));
    }

    // 4. Project local
    paths.push(PathBuf::from("./.mock-completion.toml"));

    debug!("Config discovery paths: {:?}", paths);
    paths
}

/// Parse TOML content to string-based configuration
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let toml_value: Value = content.parse()
        .context("Failed to parse TOML content")?;

    let mut config = Configuration::new();

    if let Value::Table(table) = toml_value {
        flatten_toml_table(&table, String::new(), &mut config);
    }

    debug!("Parsed configuration: {:?}", config);
    Ok(config)
}

/// Recursively flatten TOML tables into section.subsection format
fn flatten_toml_table(table: &toml::Table, prefix: String, config: &mut Configuration) {
    for (key, value) in table {
        let section_name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Table(subtable) if subtable.values().all(|v| !v.is_table()) => {
                let section = subtable
                    .iter()
                    .map(|(subkey, subvalue)| (subkey.clone(), toml_value_to_string(subvalue)))
                    .collect();
                config.insert(section_name, section);
            }
            Value::Table(subtable) => flatten_toml_table(subtable, section_name, config),
            _ => {
                // Bare top-level key
                let mut section = HashMap::new();
                section.insert("value".to_string(), toml_value_to_string(value));
                config.insert(section_name, section);
            }
        }
    }
}

/// Convert TOML Value to string representation
fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Datetime(dt) => dt.to_string(),
        Value::Array(_) | Value::Table(_) => value.to_string(),
    }
}
