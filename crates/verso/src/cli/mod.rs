mod args;
mod history;
mod project;
mod serve;
mod sync;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;
use verso_core::Config;
use verso_core::app::Verso;
use verso_core::sync::{SyncPrompter, TokenAuthProvider};

use args::{Cli, Commands};

fn load_config(cli: &Cli) -> Option<Config> {
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            None
        }
    }
}

pub async fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    let Some(config) = load_config(&cli) else {
        return ExitCode::FAILURE;
    };

    let auth = Arc::new(TokenAuthProvider::new(
        config.remote.api_url.clone(),
        config.remote_token(),
        config.remote.token_env.clone(),
    ));
    // Serve mode owns stdin, so it cannot ask questions there.
    let prompter: Arc<dyn SyncPrompter> = match cli.command {
        Commands::Serve => Arc::new(sync::HostPrompter),
        _ => Arc::new(sync::TerminalPrompter),
    };

    let app = match Verso::new(config, auth, prompter).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let ok = match cli.command {
        Commands::Init { path } => project::handle_init(&app, &path).await,
        Commands::New { name } => project::handle_new(&app, &name).await,
        Commands::Projects => project::handle_projects(&app).await,
        Commands::Save { path } => history::handle_save(&app, &path).await,
        Commands::Commit { path, message } => history::handle_commit(&app, &path, message).await,
        Commands::Sync => sync::handle_sync(&app).await,
        Commands::Serve => serve::handle_serve(&app).await,
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Abbreviated commit id for display.
fn short(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}
