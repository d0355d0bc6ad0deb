//! CLI module containing argument parsing and related functionality

pub mod args;
pub mod size_parser;

pub use args::Args;
