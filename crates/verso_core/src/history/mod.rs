//! Versioned autosave pipeline for one project.
//!
//! Two kinds of commits are written with git plumbing:
//!
//! - **Autosaves** go to the shadow branch `auto-save/<branch>`. Each snapshot
//!   is staged into its own temporary index file, so the primary index and
//!   the working tree are never touched.
//! - **Checkpoints** stage everything into the primary index, commit on top of
//!   `<branch>`, and delete the shadow branch. The autosave commits stay in the
//!   object store, unreferenced, until git garbage-collects them.
//!
//! Ref updates are always the last git step of each pipeline, so a failure
//! part-way leaves every ref where it was.

mod message;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{Local, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::error::{Result, VersoError};
use crate::git::{Git, Identity, TempIndex};
use crate::project::ProjectRegistry;
use crate::summarize::extract_change;

pub use message::{
    CommitMessageGenerator, CommitMessageProvider, OpenAiCompatibleProvider, fallback_message,
};

/// Prefix of the shadow branch holding autosave commits.
pub const SHADOW_BRANCH_PREFIX: &str = "auto-save/";

/// Message used when a snapshot's diff yields no summary.
pub const AUTOSAVE_FALLBACK_MESSAGE: &str = "Auto-save";

const ROOT_COMMIT_MESSAGE: &str = "Initial commit";

/// Full ref name of the shadow branch for `branch`.
pub fn shadow_ref(branch: &str) -> String {
    format!("refs/heads/{SHADOW_BRANCH_PREFIX}{branch}")
}

/// What the store is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Clean,
    AutosaveInFlight,
    FinalizeInFlight,
}

/// Result of [`LocalVersionStore::auto_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveOutcome {
    /// The working tree matches the primary index; no ref was touched.
    Clean,
    /// The snapshot equals the current shadow tip; no commit was written.
    Unchanged,
    /// A new autosave commit now heads the shadow branch.
    Committed { commit: String, message: String },
}

/// Result of [`LocalVersionStore::final_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    /// The new checkpoint, or `None` when the tree matched the branch tip.
    pub commit: Option<String>,
    pub message: String,
    /// Whether a shadow branch existed and was deleted.
    pub shadow_removed: bool,
}

/// Owns all git plumbing for one project directory.
pub struct LocalVersionStore {
    git: Git,
    project_path: PathBuf,
    registry: Arc<ProjectRegistry>,
    generator: CommitMessageGenerator,
    summary_max_len: usize,
    /// Held for the whole of an autosave or checkpoint. Shared with sync
    /// through [`ProjectRegistry::work_lock`].
    op: Arc<Mutex<()>>,
    state: Arc<StdMutex<StoreState>>,
}

/// Resets the observable state when an operation ends, however it ends.
struct StateGuard(Arc<StdMutex<StoreState>>);

impl Drop for StateGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            *state = StoreState::Clean;
        }
    }
}

impl LocalVersionStore {
    pub fn new(
        project_path: impl Into<PathBuf>,
        registry: Arc<ProjectRegistry>,
        generator: CommitMessageGenerator,
        config: &HistoryConfig,
    ) -> Self {
        let project_path = project_path.into();
        let git = Git::new(&project_path).with_identity(Identity {
            name: config.author_name.clone(),
            email: config.author_email.clone(),
        });
        let op = registry.work_lock(&project_path);
        Self {
            git,
            project_path,
            registry,
            generator,
            summary_max_len: config.summary_max_len,
            op,
            state: Arc::new(StdMutex::new(StoreState::Clean)),
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn state(&self) -> StoreState {
        self.state.lock().map(|s| *s).unwrap_or(StoreState::Clean)
    }

    fn enter(&self, state: StoreState) -> StateGuard {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
        StateGuard(Arc::clone(&self.state))
    }

    /// Snapshot the working tree onto the shadow branch.
    pub async fn auto_commit(&self) -> Result<AutoSaveOutcome> {
        let _op = self.op.lock().await;
        let _state = self.enter(StoreState::AutosaveInFlight);

        // Plain `status` may refresh and rewrite the primary index.
        let status = self
            .git
            .command(["status", "--porcelain"])
            .env("GIT_OPTIONAL_LOCKS", "0")
            .run()
            .await?;
        if status.is_empty() {
            debug!("{}: nothing to autosave", self.project_path.display());
            return Ok(AutoSaveOutcome::Clean);
        }

        let branch = self.current_branch().await?;
        let branch_ref = format!("refs/heads/{branch}");
        let branch_tip = match self.resolve_commit(&branch_ref).await? {
            Some(tip) => tip,
            None => self.create_root_commit(&branch_ref).await?,
        };

        let git_dir = PathBuf::from(self.git.run(["rev-parse", "--absolute-git-dir"]).await?);
        let index = TempIndex::new(&git_dir);
        let outcome = self
            .snapshot_into_shadow(&index, &branch, &branch_tip)
            .await;
        drop(index);
        let outcome = outcome?;

        if let AutoSaveOutcome::Committed { commit, message } = &outcome {
            info!(
                "Autosaved {} [{}] {}",
                self.project_path.display(),
                &commit[..commit.len().min(8)],
                message
            );
            self.touch_modified().await;
        }
        Ok(outcome)
    }

    async fn snapshot_into_shadow(
        &self,
        index: &TempIndex,
        branch: &str,
        branch_tip: &str,
    ) -> Result<AutoSaveOutcome> {
        let index_path = index.path();
        self.git
            .command(["read-tree", branch_tip])
            .env("GIT_INDEX_FILE", index_path)
            .run()
            .await?;
        self.git
            .command(["add", "-A"])
            .env("GIT_INDEX_FILE", index_path)
            .run()
            .await?;

        let shadow = shadow_ref(branch);
        let shadow_tip = match self.resolve_commit(&shadow).await? {
            Some(tip) => tip,
            None => {
                self.git
                    .run(["update-ref", "-m", "verso: start autosave", &shadow, branch_tip, ""])
                    .await?;
                branch_tip.to_string()
            }
        };

        let tree = self
            .git
            .command(["write-tree"])
            .env("GIT_INDEX_FILE", index_path)
            .run()
            .await?;
        let shadow_tree = self.tree_of(&shadow_tip).await?;
        if tree == shadow_tree {
            return Ok(AutoSaveOutcome::Unchanged);
        }

        let diff = self
            .git
            .run(["diff-tree", "-p", "-U0", "--no-color", &shadow_tree, &tree])
            .await?;
        let message = extract_change(&diff, self.summary_max_len)
            .unwrap_or_else(|| AUTOSAVE_FALLBACK_MESSAGE.to_string());

        let commit = self.commit_tree(&tree, Some(&shadow_tip), &message).await?;
        self.git
            .run(["update-ref", "-m", "verso: autosave", &shadow, &commit, &shadow_tip])
            .await?;

        Ok(AutoSaveOutcome::Committed { commit, message })
    }

    /// Squash everything into a checkpoint on the current branch and drop the shadow branch.
    pub async fn final_commit(&self, message: Option<String>) -> Result<CheckpointOutcome> {
        let _op = self.op.lock().await;
        let _state = self.enter(StoreState::FinalizeInFlight);

        let branch = self.current_branch().await?;
        let branch_ref = format!("refs/heads/{branch}");

        self.git.run(["add", "-A"]).await?;

        let message = match message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()) {
            Some(message) => message,
            None => self.generate_message().await?,
        };

        let tree = self.git.run(["write-tree"]).await?;
        let parent = self.resolve_commit(&branch_ref).await?;

        let unchanged = match &parent {
            Some(parent) => self.tree_of(parent).await? == tree,
            None => false,
        };

        let commit = if unchanged {
            debug!("{}: checkpoint tree unchanged", self.project_path.display());
            None
        } else {
            let commit = self.commit_tree(&tree, parent.as_deref(), &message).await?;
            let old = parent.as_deref().unwrap_or("");
            self.git
                .run(["update-ref", "-m", "verso: checkpoint", &branch_ref, &commit, old])
                .await?;
            Some(commit)
        };

        self.git.run(["symbolic-ref", "HEAD", &branch_ref]).await?;
        self.git.run(["reset", "-q", "--mixed", "HEAD"]).await?;

        let shadow = shadow_ref(&branch);
        let shadow_removed = match self.resolve_commit(&shadow).await? {
            Some(tip) => {
                self.git.run(["update-ref", "-d", &shadow, &tip]).await?;
                true
            }
            None => false,
        };

        if let Some(commit) = &commit {
            info!(
                "Checkpoint {} [{}] {}",
                self.project_path.display(),
                &commit[..commit.len().min(8)],
                message
            );
        }
        self.touch_modified().await;

        Ok(CheckpointOutcome {
            commit,
            message,
            shadow_removed,
        })
    }

    /// Current tip of the shadow branch, if it exists.
    pub async fn shadow_tip(&self) -> Result<Option<String>> {
        let branch = self.current_branch().await?;
        self.resolve_commit(&shadow_ref(&branch)).await
    }

    async fn generate_message(&self) -> Result<String> {
        if self.generator.is_empty() {
            return Ok(fallback_message(Local::now()));
        }
        let diff = self.git.run(["diff", "--cached", "--no-color"]).await?;
        Ok(self.generator.generate_or_fallback(&diff, Local::now()).await)
    }

    async fn current_branch(&self) -> Result<String> {
        let output = self
            .git
            .command(["symbolic-ref", "--quiet", "--short", "HEAD"])
            .output()
            .await?;
        if !output.success() {
            return Err(VersoError::project(format!(
                "{} has a detached HEAD",
                self.project_path.display()
            )));
        }
        let branch = output.stdout.trim();
        match branch.strip_prefix(SHADOW_BRANCH_PREFIX) {
            // Someone checked out the shadow branch; keep writing against its main branch.
            Some(main) => Ok(main.to_string()),
            None => Ok(branch.to_string()),
        }
    }

    /// Resolve a ref to a commit id, `None` if it does not exist.
    async fn resolve_commit(&self, reference: &str) -> Result<Option<String>> {
        let rev = format!("{reference}^{{commit}}");
        let output = self
            .git
            .command(["rev-parse", "--verify", "--quiet", &rev])
            .output()
            .await?;
        if output.success() {
            return Ok(Some(output.stdout.trim().to_string()));
        }
        if output.stderr.is_empty() {
            Ok(None)
        } else {
            Err(VersoError::Git {
                command: "rev-parse".into(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }

    async fn tree_of(&self, commit: &str) -> Result<String> {
        self.git.run(["rev-parse", &format!("{commit}^{{tree}}")]).await
    }

    async fn commit_tree(&self, tree: &str, parent: Option<&str>, message: &str) -> Result<String> {
        let mut args = vec!["commit-tree", "--no-gpg-sign"];
        if let Some(parent) = parent {
            args.extend(["-p", parent]);
        }
        args.extend(["-F", "-", tree]);
        self.git.command(args).stdin(message).run().await
    }

    /// Give an unborn branch an empty first commit.
    async fn create_root_commit(&self, branch_ref: &str) -> Result<String> {
        let empty_tree = self.git.command(["mktree"]).stdin("").run().await?;
        let commit = self
            .commit_tree(&empty_tree, None, ROOT_COMMIT_MESSAGE)
            .await?;
        self.git
            .run(["update-ref", "-m", "verso: root", branch_ref, &commit, ""])
            .await?;
        debug!("Created root commit {} on {}", commit, branch_ref);
        Ok(commit)
    }

    async fn touch_modified(&self) {
        if let Err(e) = self
            .registry
            .touch_modified(&self.project_path, Utc::now())
            .await
        {
            warn!(
                "Could not record modification time for {}: {}",
                self.project_path.display(),
                e
            );
        }
    }
}
