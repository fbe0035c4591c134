//! CLI command definitions using clap

use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Wisp - run and inspect a Wisp interpreter hosted in WebAssembly
#[derive(Parser)]
#[command(name = "wisp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<OutputFormat>,

    /// Configuration file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Guest binary (overrides the configuration file)
    #[arg(long, global = true, env = "WISP_GUEST")]
    pub guest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Read-eval-print loop over stdin
    Repl,

    /// Read and evaluate a single expression
    Eval {
        /// Source text
        source: String,
    },

    /// Decode a raw tagged word without evaluating anything
    Inspect {
        /// Raw value, decimal or 0x-prefixed hex
        raw: String,
    },
}
