//! Per-project sync policy.
//!
//! [`decide`] is the pure decision table. [`SyncPolicyEngine`] carries a
//! decision out through the gateways and records the result in the registry.
//!
//! | synced | remote  | modified | decision                                   |
//! |--------|---------|----------|--------------------------------------------|
//! | yes    | absent  | any      | ask: trash, or recreate the remote         |
//! | yes    | present | any      | [`SyncDecision::PullAndPush`]              |
//! | no     | absent  | any      | [`SyncDecision::CreateRemoteAndPush`]      |
//! | no     | present | yes      | [`SyncDecision::RenameLocalAndPushNew`]    |
//! | no     | present | no       | [`SyncDecision::TrashLocalAndCloneRemote`] |

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, VersoError};
use crate::project::{Project, ProjectConfig, ProjectRegistry};
use crate::sync::local::LocalProjectService;
use crate::sync::naming::{RemoteNaming, find_available_name, timestamped_name};
use crate::sync::remote::{RemoteRepositoryService, RepoInfo};

/// What a sync pass does with one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// The remote was deleted on purpose; discard the local copy.
    TrashLocal,
    /// The remote vanished but the user keeps the project; recreate and push.
    RestoreRemoteFromLocal,
    PullAndPush,
    CreateRemoteAndPush,
    /// Both sides hold unrelated work under the same name; fork the local one.
    RenameLocalAndPushNew,
    /// The local copy holds nothing of value; replace it with the remote.
    TrashLocalAndCloneRemote,
    /// Remote with no local counterpart.
    CloneRemoteOnly,
}

impl SyncDecision {
    pub fn label(&self) -> &'static str {
        match self {
            SyncDecision::TrashLocal => "moved to trash",
            SyncDecision::RestoreRemoteFromLocal => "restored remote",
            SyncDecision::PullAndPush => "pulled and pushed",
            SyncDecision::CreateRemoteAndPush => "created remote",
            SyncDecision::RenameLocalAndPushNew => "renamed and pushed as new",
            SyncDecision::TrashLocalAndCloneRemote => "replaced with remote",
            SyncDecision::CloneRemoteOnly => "cloned",
        }
    }
}

/// Output of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Decided(SyncDecision),
    /// A synced project lost its remote; only the user can say whether that was intended.
    ConfirmDeletion,
}

pub fn decide(config: &ProjectConfig, remote_exists: bool) -> PolicyVerdict {
    let decision = match (config.synced_at.is_some(), remote_exists) {
        (true, false) => return PolicyVerdict::ConfirmDeletion,
        (true, true) => SyncDecision::PullAndPush,
        (false, false) => SyncDecision::CreateRemoteAndPush,
        (false, true) if config.modified_at.is_some() => SyncDecision::RenameLocalAndPushNew,
        (false, true) => SyncDecision::TrashLocalAndCloneRemote,
    };
    PolicyVerdict::Decided(decision)
}

/// Declining keeps the data.
pub fn resolve_deletion(confirmed: bool) -> SyncDecision {
    if confirmed {
        SyncDecision::TrashLocal
    } else {
        SyncDecision::RestoreRemoteFromLocal
    }
}

/// User-facing side of a sync pass.
#[async_trait]
pub trait SyncPrompter: Send + Sync {
    /// Ask whether a project whose remote disappeared should be trashed.
    ///
    /// `None` means no answer is available yet; the project is deferred to a
    /// later pass.
    async fn confirm_trash(&self, project: &ProjectConfig) -> Option<bool>;

    /// Show a status line.
    fn notify(&self, message: &str);
}

/// Result of syncing one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSyncOutcome {
    Applied(SyncDecision),
    /// Needs a confirmation that a silent pass cannot ask for.
    Deferred,
    /// Pull stopped on a merge conflict; nothing was pushed.
    Conflict,
}

/// Called with a project folder right before sync moves it away.
pub type BeforeMoveHook = Arc<dyn Fn(&Path) + Send + Sync>;

/// Executes decisions through the gateways.
///
/// Each decision runs under the project's work lock, so it never overlaps an
/// autosave or checkpoint of the same folder.
pub struct SyncPolicyEngine {
    remote: Arc<dyn RemoteRepositoryService>,
    local: Arc<dyn LocalProjectService>,
    registry: Arc<ProjectRegistry>,
    naming: RemoteNaming,
    before_move: Option<BeforeMoveHook>,
}

fn require_remote<'a>(remote: Option<&'a RepoInfo>, decision: SyncDecision) -> Result<&'a RepoInfo> {
    remote.ok_or_else(|| VersoError::project(format!("{decision:?} needs an existing remote")))
}

impl SyncPolicyEngine {
    pub fn new(
        remote: Arc<dyn RemoteRepositoryService>,
        local: Arc<dyn LocalProjectService>,
        registry: Arc<ProjectRegistry>,
        naming: RemoteNaming,
    ) -> Self {
        Self {
            remote,
            local,
            registry,
            naming,
            before_move: None,
        }
    }

    pub fn with_before_move(mut self, hook: BeforeMoveHook) -> Self {
        self.before_move = Some(hook);
        self
    }

    fn release_folder(&self, path: &Path) {
        if let Some(hook) = &self.before_move {
            hook(path);
        }
    }

    /// Sync one registered project against its remote (if any).
    ///
    /// Without a prompter, or without an answer from it, a deletion that
    /// needs confirmation is deferred.
    pub async fn sync_project(
        &self,
        config: &ProjectConfig,
        remote: Option<&RepoInfo>,
        prompter: Option<&dyn SyncPrompter>,
    ) -> Result<ProjectSyncOutcome> {
        let decision = match decide(config, remote.is_some()) {
            PolicyVerdict::Decided(decision) => decision,
            PolicyVerdict::ConfirmDeletion => {
                let answer = match prompter {
                    Some(prompter) => prompter.confirm_trash(config).await,
                    None => None,
                };
                match answer {
                    Some(confirmed) => resolve_deletion(confirmed),
                    None => {
                        info!(
                            "Remote of {} is gone; waiting for the user to decide",
                            config.name
                        );
                        return Ok(ProjectSyncOutcome::Deferred);
                    }
                }
            }
        };
        debug!("{}: {:?}", config.name, decision);
        let lock = self.registry.work_lock(&config.path);
        let _work = lock.lock().await;
        self.apply(decision, config, remote).await
    }

    /// Clone a remote repository that has no local project and register it.
    pub async fn sync_remote_repo(
        &self,
        repo: &RepoInfo,
        name: &str,
        target: &Path,
    ) -> Result<ProjectSyncOutcome> {
        let config = ProjectConfig {
            name: name.to_string(),
            path: target.to_path_buf(),
            synced_at: None,
            modified_at: None,
        };
        let lock = self.registry.work_lock(target);
        let _work = lock.lock().await;
        self.apply(SyncDecision::CloneRemoteOnly, &config, Some(repo))
            .await
    }

    async fn apply(
        &self,
        decision: SyncDecision,
        config: &ProjectConfig,
        remote: Option<&RepoInfo>,
    ) -> Result<ProjectSyncOutcome> {
        let path = config.path.as_path();
        match decision {
            SyncDecision::TrashLocal => {
                self.release_folder(path);
                self.local.move_to_trash(path).await?;
                self.registry.remove(path).await?;
                return Ok(ProjectSyncOutcome::Applied(decision));
            }
            SyncDecision::RestoreRemoteFromLocal | SyncDecision::CreateRemoteAndPush => {
                let repo = self
                    .remote
                    .create_repository(&self.naming.repo_name(&config.name))
                    .await?;
                self.local.push_project(path, Some(&repo.clone_url)).await?;
                self.registry.mark_synced(path, Utc::now()).await?;
            }
            SyncDecision::PullAndPush => {
                let repo = require_remote(remote, decision)?;
                match self.local.pull_project(path).await {
                    Ok(()) => {}
                    Err(VersoError::MergeConflict { .. }) => {
                        warn!(
                            "{} has merge conflicts; resolve them before the next sync",
                            path.display()
                        );
                        return Ok(ProjectSyncOutcome::Conflict);
                    }
                    Err(e) => return Err(e),
                }
                self.local.push_project(path, Some(&repo.clone_url)).await?;
                self.registry.mark_synced(path, Utc::now()).await?;
            }
            SyncDecision::RenameLocalAndPushNew => {
                let parent = path.parent().ok_or_else(|| {
                    VersoError::project(format!("{} has no parent", path.display()))
                })?;
                let base = timestamped_name(&config.name, Local::now());
                let new_name =
                    find_available_name(self.remote.as_ref(), &self.naming, &base, parent).await?;

                self.release_folder(path);
                let new_path = self.local.rename_project(path, &new_name).await?;
                self.registry.rename(path, &new_name, &new_path).await?;
                let repo = self
                    .remote
                    .create_repository(&self.naming.repo_name(&new_name))
                    .await?;
                self.local
                    .push_project(&new_path, Some(&repo.clone_url))
                    .await?;
                self.registry.mark_synced(&new_path, Utc::now()).await?;
                info!("{} kept as {}", config.name, new_name);
            }
            SyncDecision::TrashLocalAndCloneRemote => {
                let repo = require_remote(remote, decision)?;
                self.release_folder(path);
                self.local.move_to_trash(path).await?;
                self.local.clone_project(&repo.clone_url, path).await?;
                self.registry.mark_synced(path, Utc::now()).await?;
            }
            SyncDecision::CloneRemoteOnly => {
                let repo = require_remote(remote, decision)?;
                self.local.clone_project(&repo.clone_url, path).await?;
                self.registry
                    .register(Project::new(&config.name, path))
                    .await?;
                self.registry.mark_synced(path, Utc::now()).await?;
            }
        }
        Ok(ProjectSyncOutcome::Applied(decision))
    }
}
