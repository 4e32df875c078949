//! CLI argument parsing
//!
//! Author: Moroya Sakamoto

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "alice-handoff")]
#[command(author, version, about = "Task-local burst workers and timed queue handoff", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the burst workers to completion
    Workers {
        /// Number of worker tasks
        #[arg(short, long)]
        tasks: Option<u32>,

        /// Lines buffered per flush
        #[arg(short, long)]
        burst: Option<usize>,
    },

    /// Run the producer/consumer pair
    Handoff {
        /// Stop the producer after this many messages
        #[arg(short, long)]
        messages: Option<u32>,

        /// Stop the consumer after this many consecutive timeouts
        #[arg(short, long)]
        idle_limit: Option<u32>,
    },
}
