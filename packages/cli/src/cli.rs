//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Remove image backgrounds, mirror the result and store both files.
///
/// Configuration comes from the environment (`REMOVE_BG_API_KEY`, `STORAGE_*`, ...).
/// Set `DATABASE_PATH` to keep job records between invocations.
#[derive(Debug, Parser)]
#[command(name = "imagepipe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Shrink large inputs before background removal.
    Optimized,
    /// Send the input untouched.
    Original,
}

impl ModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeArg::Optimized => "optimized",
            ModeArg::Original => "original",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit images and wait for each job to finish.
    Submit {
        /// JPEG, PNG or WebP files.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = ModeArg::Optimized)]
        mode: ModeArg,

        /// Run each job inline instead of through the work queue.
        #[arg(long, default_value_t = false)]
        sync: bool,
    },

    /// Show one job.
    Status { id: String },

    /// List ready jobs, newest first.
    List {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Cancel a job if it is running, then delete its files and record.
    Delete { id: String },
}
