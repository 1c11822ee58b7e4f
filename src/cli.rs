use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "oiltest")]
#[command(version)]
#[command(about = "Record and report oil contamination test runs")]
pub struct Cli {
    /// Directory holding the database and settings
    #[arg(long, global = true, env = "OILTEST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the filters a test can run against
    Filters,

    /// Run a test and stream live readings until it ends
    Run {
        /// Filter id, e.g. index_One
        #[arg(short, long)]
        filter: String,

        /// Planned duration in seconds (defaults to the configured duration)
        #[arg(short, long, conflicts_with = "manual")]
        duration: Option<u64>,

        /// Run without a countdown until interrupted
        #[arg(long)]
        manual: bool,

        /// Record an interrupted test as aborted instead of stopped
        #[arg(long)]
        abort_on_interrupt: bool,
    },

    /// List recorded test runs, newest first
    History,

    /// Show one test run with its logged readings
    Report { run_id: String },

    /// Write a CSV report of all finished runs
    Export {
        /// Output directory (defaults to the configured export directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// List application sessions
    Sessions,

    /// Show or change settings
    Config {
        /// Default directory for exported reports
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
}
