use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Projects, boards and tasks from the command line.
/// Storage defaults to ~/.taskboard/data.json or a path passed via --data.
#[derive(Parser)]
#[command(name = "tb", version, about = "Project, board and task manager")]
pub struct Cli {
    /// Path to the JSON data file.
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Deadline for each service call in milliseconds (0 waits forever).
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}
