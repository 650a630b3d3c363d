//! `verso`: command-line host for versioned notes.

mod cli;

use std::process::ExitCode;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // stdout carries command output and the serve protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verso=info,verso_core=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run_cli().await
}
