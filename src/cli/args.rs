//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Exercise a stateflow store from the command line
#[derive(Parser)]
#[command(name = "stateflow")]
#[command(about = "stateflow - single-writer reactive state container demos", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Store configuration file (TOML)
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hammer one store with concurrent increments and check what subscribers saw
    Counter {
        /// Number of concurrent writer tasks
        #[arg(short = 'w', long, default_value = "8")]
        writers: usize,

        /// Increments issued by each writer
        #[arg(short = 'n', long, default_value = "250")]
        increments: u32,
    },
    /// Print the execution order of nested reads and mutations
    Ordering,
    /// Run an async fetch pipeline and print each state transition
    Fetch {
        /// Make the second fetch fail
        #[arg(long)]
        fail: bool,

        /// Keep the previous value while loading and after a failure
        #[arg(long)]
        retain: bool,

        /// Simulated latency of each fetch in milliseconds
        #[arg(long, default_value = "50")]
        latency_ms: u64,
    },
}

/// Log filter for a verbosity count.
pub fn get_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,tokio=debug",
    }
}
