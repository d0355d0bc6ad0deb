use anyhow::Result;
use std::process;
use log::error;

use mock_completion::{app, cli, logging};

fn main() {
    // Set up panic handler with better error reporting
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Panic: {}", panic_info);
        process::exit(101);
    }));

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::args::parse_args();

    cli::args::validate_args(&args)?;

    let config_manager = app::load_configuration(&args)?;

    let log_config = app::configure_logging(&args, &config_manager)?;
    logging::init_logger(log_config)?;

    let server_config = app::resolve_server_config(&args, &config_manager)?;

    // Handle configuration export command first (before creating runtime)
    if let Some(export_path) = &args.export_config {
        return app::handle_export_config(&config_manager, &server_config, export_path);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let state = app::build_app_state(&server_config).await?;
        app::run_server(&server_config, state).await
    })
}
