//! CLI command handlers

pub mod args;
pub mod commands;

pub use args::{get_log_level, Cli, Commands};
pub use commands::execute_command;
