//! CLI argument parsing for the assignment-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "assignment-worker", about = "Worker-to-zone assignment upload worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Validate and load a local CSV file, printing the outcome as JSON
    Upload {
        /// Path to the CSV file
        path: PathBuf,
        /// Name recorded in the upload audit (defaults to the file name)
        #[arg(long)]
        file_name: Option<String>,
    },
}
