use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tracing::info;
use verso_core::app::Verso;
use verso_core::project::ProjectConfig;
use verso_core::sync::{SyncMode, SyncPrompter};

/// Asks on the controlling terminal.
pub struct TerminalPrompter;

#[async_trait]
impl SyncPrompter for TerminalPrompter {
    async fn confirm_trash(&self, project: &ProjectConfig) -> Option<bool> {
        let question = format!(
            "The remote copy of '{}' was deleted. Move {} to the trash? [y/N] ",
            project.name,
            project.path.display()
        );
        tokio::task::spawn_blocking(move || {
            print!("{question}");
            let _ = io::stdout().flush();
            let mut answer = String::new();
            if io::stdin().lock().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
        })
        .await
        .ok()
    }

    fn notify(&self, message: &str) {
        println!("{message}");
    }
}

/// Used while serving: stdin is the request channel, so the question goes
/// back to the host in the sync report and its answer arrives with the next
/// `sync` request.
pub struct HostPrompter;

#[async_trait]
impl SyncPrompter for HostPrompter {
    async fn confirm_trash(&self, project: &ProjectConfig) -> Option<bool> {
        info!(
            "Remote of '{}' was deleted; asking the host whether to trash it",
            project.name
        );
        None
    }

    fn notify(&self, message: &str) {
        info!("{}", message);
    }
}

pub async fn handle_sync(app: &Verso) -> bool {
    let report = app.sync(SyncMode::Interactive).await;

    for project in &report.projects {
        println!("  {:<24} {}", project.project, project.outcome);
    }
    for error in &report.errors {
        eprintln!("  {}", error);
    }
    report.skipped.is_none() && report.aborted.is_none() && report.errors.is_empty()
}
