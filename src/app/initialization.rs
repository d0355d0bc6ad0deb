//! Application initialization and configuration

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, info};
use crate::{cli, config, logging};
use crate::bypass::{BypassForwarder, BypassSettings};
use crate::engine::Engine;
use crate::notifications::{HubEvent, Publisher};
use crate::queue::JsonFileBackend;
use crate::server::AppState;

pub fn load_configuration(args: &cli::Args) -> Result<config::ConfigManager> {
    let mut manager = if let Some(config_file) = &args.config_file {
        debug!("Loading configuration from explicit file: {}", config_file.display());
        config::ConfigManager::load_from_file(config_file.clone())?
    } else {
        config::ConfigManager::load()?
    };

    if let Some(section_name) = &args.config_name {
        manager.select_section(section_name.clone());
    }

    Ok(manager)
}

/// Merge command line overrides over the configured server settings
pub fn resolve_server_config(args: &cli::Args, config: &config::ConfigManager) -> Result<config::ServerConfig> {
    let mut server = config.get_server_config()?;

    if let Some(listen) = &args.listen {
        server.listen = listen.clone();
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(secs) = args.timeout {
        server.resolution_timeout = Duration::from_secs(secs);
    }
    if let Some(size) = &args.max_import_size {
        server.max_import_bytes = cli::size_parser::parse_byte_size(size)
            .with_context(|| format!("Invalid --max-import-size: {}", size))?;
    }
    if let Some(path) = &args.data_file {
        server.data_file = path.clone();
    }
    if let Some(path) = &args.bypass_file {
        server.bypass_file = path.clone();
    }

    server.validate()?;
    debug!("Effective server configuration: {:?}", server);
    Ok(server)
}

/// Handle configuration export command
pub fn handle_export_config(
    config_manager: &config::ConfigManager,
    server: &config::ServerConfig,
    export_path: &Path,
) -> Result<()> {
    let config_content = config_manager.export_complete_config(server)?;

    std::fs::write(export_path, config_content)
        .with_context(|| format!("Failed to write configuration to {}", export_path.display()))?;

    info!("Configuration exported to: {}", export_path.display());
    Ok(())
}

pub fn configure_logging(args: &cli::Args, config: &config::ConfigManager) -> Result<logging::LogConfig> {
    use log::LevelFilter;
    use std::str::FromStr;

    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        config.get_log_level("base", "console-level")?
            .unwrap_or(LevelFilter::Info)
    };

    let format = if !args.log_format.is_empty() && args.log_format != "text" {
        logging::LogFormat::from_str(&args.log_format)
            .map_err(|e| anyhow::anyhow!(e))?
    } else {
        match config.get_value("base", "log-format") {
            Some(format_str) => logging::LogFormat::from_str(format_str)
                .map_err(|e| anyhow::anyhow!(e))?,
            None => logging::LogFormat::Text,
        }
    };

    let log_file_path = args.log_file.clone()
        .or_else(|| config.get_path("base", "log-file"));

    let file_log_level = match &args.log_file_level {
        Some(level_str) => Some(logging::parse_log_level(level_str)?),
        None => config.get_log_level("base", "file-log-level")?,
    };

    let (destination, file_level) = match (log_file_path, file_log_level) {
        (Some(file_path), level) => {
            (logging::LogDestination::Both(file_path), Some(level.unwrap_or(console_level)))
        }
        (None, None) => (logging::LogDestination::Console, None),
        (None, Some(_)) => {
            return Err(anyhow::anyhow!("Log file level specified without log file"));
        }
    };

    Ok(logging::LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

/// Load persisted state and wire the engine, bypass and HTTP state together
pub async fn build_app_state(server: &config::ServerConfig) -> Result<AppState> {
    let backend = Arc::new(JsonFileBackend::new(&server.data_file));
    let engine = Engine::initialize(&server.engine_config(), backend)
        .await
        .with_context(|| format!("Failed to load staged responses from {}", server.data_file.display()))?;

    let publisher: Arc<dyn Publisher<HubEvent>> = engine.hub().clone();
    let settings = Arc::new(BypassSettings::load(&server.bypass_file, publisher.clone()).await);
    let forwarder = Arc::new(BypassForwarder::new(settings, publisher));

    Ok(AppState::new(engine, forwarder, server.max_import_bytes))
}
