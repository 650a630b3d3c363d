mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use common::{FakeAuth, FakeGateways, FakeLocal, FakePrompter, FakeRemote, registry_with, session};
use tokio_util::sync::CancellationToken;
use verso_core::error::RemoteError;
use verso_core::project::ProjectRegistry;
use verso_core::sync::{RemoteNaming, SyncMode, SyncOrchestrator};

struct Harness {
    dir: tempfile::TempDir,
    registry: Arc<ProjectRegistry>,
    remote: Arc<FakeRemote>,
    local: Arc<FakeLocal>,
    auth: Arc<FakeAuth>,
    prompter: Arc<FakePrompter>,
    orchestrator: Arc<SyncOrchestrator>,
}

async fn harness(projects: &[&str], remotes: &[&str], auth: Arc<FakeAuth>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(dir.path(), projects).await;
    let remote = FakeRemote::with_repos(remotes);
    let local = FakeLocal::new();
    let prompter = FakePrompter::answering(false);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&registry),
        auth.clone(),
        Arc::new(FakeGateways {
            remote: remote.clone(),
            local: local.clone(),
        }),
        prompter.clone(),
        RemoteNaming::new("verso"),
        dir.path().join("projects"),
    ));
    Harness {
        dir,
        registry,
        remote,
        local,
        auth,
        prompter,
        orchestrator,
    }
}

#[tokio::test]
async fn silent_pass_without_session_does_nothing() {
    let h = harness(&["journal"], &[], FakeAuth::signed_out()).await;

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert_eq!(report.skipped.as_deref(), Some("not signed in"));
    assert!(h.remote.calls().is_empty());
    assert!(h.prompter.notes().is_empty());
}

#[tokio::test]
async fn interactive_pass_without_session_reports_it() {
    let h = harness(&["journal"], &[], FakeAuth::signed_out()).await;

    let report = h.orchestrator.sync(SyncMode::Interactive).await;
    assert!(report.skipped.is_some());
    assert!(h.remote.calls().is_empty());
    assert_eq!(h.prompter.notes().len(), 1);
    assert!(h.prompter.notes()[0].starts_with("Sync skipped"));
}

#[tokio::test]
async fn pass_syncs_up_then_clones_remote_only_projects() {
    let h = harness(
        &["journal"],
        &["verso-recipes", "unrelated"],
        FakeAuth::signed_in(),
    )
    .await;

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.projects.len(), 2);

    assert_eq!(
        h.remote.calls(),
        vec!["get verso-journal", "create verso-journal", "list"]
    );
    assert!(
        h.local
            .calls()
            .contains(&"clone https://example.test/alice/verso-recipes.git recipes".to_string())
    );

    let recipes = h.registry.find_by_name("recipes").await.unwrap();
    assert_eq!(recipes.path, h.dir.path().join("projects").join("recipes"));
    assert!(h.registry.find_by_name("unrelated").await.is_none());
    assert!(h.registry.find_by_name("journal").await.unwrap().synced_at.is_some());
}

#[tokio::test]
async fn session_is_cached_between_passes() {
    let h = harness(&[], &[], FakeAuth::signed_in()).await;

    h.orchestrator.sync(SyncMode::Silent).await;
    h.orchestrator.sync(SyncMode::Silent).await;
    assert_eq!(h.auth.requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.orchestrator.sessions().get(), Some(session()));
}

#[tokio::test]
async fn unauthorized_aborts_the_pass_and_drops_the_session() {
    let h = harness(&["journal", "ideas"], &[], FakeAuth::signed_in()).await;
    h.remote.fail_with(RemoteError::Unauthorized);

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert!(report.aborted.is_some());
    assert_eq!(h.remote.calls().len(), 1, "stopped after the first 401");
    assert!(h.orchestrator.sessions().get().is_none());

    // Next pass re-authenticates.
    h.orchestrator.sync(SyncMode::Silent).await;
    assert_eq!(h.auth.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_aborts_but_keeps_the_session() {
    let h = harness(&["journal", "ideas"], &[], FakeAuth::signed_in()).await;
    h.remote
        .fail_with(RemoteError::RateLimited("slow down".into()));

    let report = h.orchestrator.sync(SyncMode::Interactive).await;
    assert!(report.aborted.unwrap().contains("rate limiting"));
    assert_eq!(h.remote.calls().len(), 1);
    assert!(h.orchestrator.sessions().get().is_some());
    assert!(h.prompter.notes()[0].starts_with("Sync stopped"));
}

#[tokio::test]
async fn network_errors_are_isolated_per_project() {
    let h = harness(&["ideas", "journal"], &[], FakeAuth::signed_in()).await;
    h.remote.fail_with(RemoteError::Network("connection reset".into()));

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert!(report.aborted.is_none());
    // Both projects attempted, plus the listing.
    assert_eq!(report.errors.len(), 3);
    assert_eq!(
        h.remote.calls(),
        vec!["get verso-ideas", "get verso-journal", "list"]
    );
}

#[tokio::test]
async fn missing_folder_is_reported_not_synced() {
    let h = harness(&["journal"], &[], FakeAuth::signed_in()).await;
    let path = h.registry.find_by_name("journal").await.unwrap().path;
    std::fs::remove_dir_all(&path).unwrap();

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert_eq!(report.errors.len(), 1);
    assert_eq!(h.remote.calls(), vec!["list"]);
}

#[tokio::test]
async fn silent_pass_defers_deletion_and_interactive_pass_asks() {
    let h = harness(&["journal"], &[], FakeAuth::signed_in()).await;
    let path = h.registry.find_by_name("journal").await.unwrap().path;
    h.registry.mark_synced(&path, Utc::now()).await.unwrap();

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert_eq!(report.projects[0].outcome, "waiting for confirmation");
    assert_eq!(h.prompter.asked(), 0);
    assert!(!h.remote.has("verso-journal"));

    let report = h.orchestrator.sync(SyncMode::Interactive).await;
    assert_eq!(h.prompter.asked(), 1);
    assert_eq!(report.projects[0].outcome, "restored remote");
    assert!(h.remote.has("verso-journal"));
}

#[tokio::test]
async fn unregistered_folder_blocks_clone() {
    let h = harness(&[], &["verso-recipes"], FakeAuth::signed_in()).await;
    std::fs::create_dir_all(h.dir.path().join("projects").join("recipes")).unwrap();

    let report = h.orchestrator.sync(SyncMode::Silent).await;
    assert!(report.projects.is_empty());
    assert!(h.local.calls().is_empty());
    assert!(h.registry.find_by_name("recipes").await.is_none());
}

#[tokio::test]
async fn periodic_sync_stops_on_cancel() {
    let h = harness(&[], &[], FakeAuth::signed_in()).await;
    let cancel = CancellationToken::new();
    let task = tokio::spawn(
        Arc::clone(&h.orchestrator).run_periodic(Duration::from_secs(3600), cancel.clone()),
    );

    // The first tick fires immediately.
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.remote.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.remote.calls(), vec!["list"]);
}
