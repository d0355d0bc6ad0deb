//! Application orchestration module

pub mod initialization;
pub mod execution;

pub use initialization::{
    load_configuration,
    configure_logging,
    resolve_server_config,
    handle_export_config,
    build_app_state,
};
pub use execution::run_server;
