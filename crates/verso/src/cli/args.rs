use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "verso",
    version,
    about = "Autosave history and remote sync for note folders"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, env = "VERSO_CONFIG", help = "Configuration file path")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Register an existing folder as a project, creating a repository if needed")]
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    #[command(about = "Create a new project under the projects root")]
    New { name: String },

    #[command(about = "List known projects")]
    Projects,

    #[command(about = "Snapshot the working tree onto the autosave branch")]
    Save {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    #[command(about = "Squash pending autosaves into a checkpoint commit")]
    Commit {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(short, long, help = "Commit message (generated when omitted)")]
        message: Option<String>,
    },

    #[command(about = "Sync every project with the remote host")]
    Sync,

    #[command(about = "Answer JSON requests on stdin, one per line")]
    Serve,
}
