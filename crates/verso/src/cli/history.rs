use std::path::Path;

use verso_core::app::Verso;
use verso_core::history::AutoSaveOutcome;

use super::short;

pub async fn handle_save(app: &Verso, path: &Path) -> bool {
    match app.auto_commit(path).await {
        Ok(AutoSaveOutcome::Committed { commit, message }) => {
            println!("Autosaved [{}] {}", short(&commit), message);
            true
        }
        Ok(AutoSaveOutcome::Clean | AutoSaveOutcome::Unchanged) => {
            println!("Nothing to save");
            true
        }
        Err(e) => {
            eprintln!("Autosave failed: {}", e);
            false
        }
    }
}

pub async fn handle_commit(app: &Verso, path: &Path, message: Option<String>) -> bool {
    let outcome = match app.final_commit(path, message).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Commit failed: {}", e);
            return false;
        }
    };

    match &outcome.commit {
        Some(commit) => println!("Committed [{}] {}", short(commit), outcome.message),
        None => println!("Nothing new to commit"),
    }
    if outcome.shadow_removed {
        println!("  Pending autosaves folded in");
    }

    // The process exits after this; let the follow-up sync finish first.
    if let Some(report) = app.finish_background_sync().await {
        println!("  {}", report.summary());
    }
    true
}
