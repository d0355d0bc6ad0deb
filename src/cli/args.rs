use clap::Parser;
use anyhow::Result;
use std::path::PathBuf;
use log::debug;

use super::size_parser::parse_byte_size;

/// Mock completion API server
#[derive(Parser, Debug)]
#[command(name = "mock-completion")]
#[command(about = "A test double for completion APIs with staged responses, manual operator answers and real-time observers")]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'l', long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Seconds a request waits for a manual response before failing
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Largest accepted import payload (supports units: K, MB, G, etc.)
    #[arg(long = "max-import-size", value_name = "SIZE")]
    pub max_import_size: Option<String>,

    /// File holding the staged response queues
    #[arg(long = "data-file", value_name = "FILE")]
    pub data_file: Option<PathBuf>,

    /// File holding the bypass settings
    #[arg(long = "bypass-file", value_name = "FILE")]
    pub bypass_file: Option<PathBuf>,

    /// Verbose output (debug level logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL")]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION")]
    pub config_name: Option<String>,

    /// Write the effective configuration to a file and exit
    #[arg(long, value_name = "FILE")]
    pub export_config: Option<PathBuf>,
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();

    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified"
        ));
    }

    match args.log_format.to_lowercase().as_str() {
        "text" | "json" => {},
        _ => return Err(anyhow::anyhow!(
            "Invalid log format '{}'. Valid options: text, json", args.log_format
        )),
    }

    if let Some(ref level) = args.log_file_level {
        match level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {},
            _ => return Err(anyhow::anyhow!(
                "Invalid log file level '{}'. Valid levels: error, warn, info, debug, trace", level
            )),
        }
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!(
            "--log-file-level requires --log-file to be specified"
        ));
    }

    if args.timeout == Some(0) {
        return Err(anyhow::anyhow!("--timeout must be at least 1 second"));
    }

    if let Some(ref size) = args.max_import_size {
        parse_byte_size(size)
            .map_err(|e| anyhow::anyhow!("Invalid --max-import-size: {}", e))?;
    }

    Ok(())
}
