//! Local project gateway: filesystem moves plus push/pull/clone through git.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Local;
use tracing::{debug, info};

use crate::error::{Result, VersoError};
use crate::git::Git;
use crate::sync::session::Session;

/// Filesystem and transport operations the sync engine performs on a project.
///
/// Every method fails loudly; there is no partial success.
#[async_trait]
pub trait LocalProjectService: Send + Sync {
    async fn move_to_trash(&self, path: &Path) -> Result<()>;

    /// Push the current branch, pointing `origin` at `remote_url` first when given.
    async fn push_project(&self, path: &Path, remote_url: Option<&str>) -> Result<()>;

    async fn pull_project(&self, path: &Path) -> Result<()>;

    /// Rename the project folder in place. Returns the new path.
    async fn rename_project(&self, old_path: &Path, new_name: &str) -> Result<PathBuf>;

    async fn clone_project(&self, url: &str, target: &Path) -> Result<()>;
}

/// [`LocalProjectService`] backed by the `git` CLI.
pub struct GitLocalProjectService {
    git: Git,
    trash_dir: PathBuf,
}

/// `-c http.extraHeader` value authenticating git HTTP transport with `session`.
pub fn auth_header(session: &Session) -> String {
    let credentials = STANDARD.encode(format!("x-access-token:{}", session.token));
    format!("Authorization: Basic {credentials}")
}

impl GitLocalProjectService {
    /// `git` supplies identity and config; its working directory is ignored.
    pub fn new(git: Git, trash_dir: impl Into<PathBuf>) -> Self {
        Self {
            git,
            trash_dir: trash_dir.into(),
        }
    }

    /// Same as [`new`](Self::new), authenticating transport with `session`.
    pub fn with_session(git: Git, trash_dir: impl Into<PathBuf>, session: &Session) -> Self {
        Self::new(git.with_config("http.extraHeader", auth_header(session)), trash_dir)
    }

    async fn current_branch(git: &Git) -> Result<String> {
        git.run(["symbolic-ref", "--quiet", "--short", "HEAD"]).await
    }

    async fn has_commits(git: &Git) -> Result<bool> {
        let output = git
            .command(["rev-parse", "--verify", "--quiet", "HEAD"])
            .output()
            .await?;
        Ok(output.success())
    }

    async fn set_origin(git: &Git, url: &str) -> Result<()> {
        let existing = git.command(["remote", "get-url", "origin"]).output().await?;
        if existing.success() {
            if existing.stdout.trim() != url {
                git.run(["remote", "set-url", "origin", url]).await?;
            }
        } else {
            git.run(["remote", "add", "origin", url]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LocalProjectService for GitLocalProjectService {
    async fn move_to_trash(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| VersoError::project(format!("{} has no folder name", path.display())))?
            .to_string_lossy()
            .into_owned();
        tokio::fs::create_dir_all(&self.trash_dir).await?;

        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let mut target = self.trash_dir.join(format!("{name}-{stamp}"));
        let mut n = 1;
        while target.exists() {
            target = self.trash_dir.join(format!("{name}-{stamp}-{n}"));
            n += 1;
        }

        tokio::fs::rename(path, &target).await?;
        info!("Moved {} to {}", path.display(), target.display());
        Ok(())
    }

    async fn push_project(&self, path: &Path, remote_url: Option<&str>) -> Result<()> {
        let git = self.git.at(path);
        if let Some(url) = remote_url {
            Self::set_origin(&git, url).await?;
        }
        if !Self::has_commits(&git).await? {
            debug!("{} has no commits yet, nothing to push", path.display());
            return Ok(());
        }

        let branch = Self::current_branch(&git).await?;
        git.run(["push", "--quiet", "--set-upstream", "origin", branch.as_str()])
            .await?;
        debug!("Pushed {} ({})", path.display(), branch);
        Ok(())
    }

    async fn pull_project(&self, path: &Path) -> Result<()> {
        let git = self.git.at(path);
        let branch = Self::current_branch(&git).await?;
        let output = git
            .command(["pull", "--no-rebase", "--no-edit", "origin", branch.as_str()])
            .output()
            .await?;
        if output.success() {
            return Ok(());
        }

        if output.stderr.contains("couldn't find remote ref") {
            debug!("Remote of {} is empty", path.display());
            return Ok(());
        }
        let conflicted = [&output.stdout, &output.stderr]
            .iter()
            .any(|s| s.contains("CONFLICT") || s.contains("Automatic merge failed"));
        if conflicted {
            return Err(VersoError::MergeConflict {
                path: path.to_path_buf(),
            });
        }
        Err(VersoError::Git {
            command: "pull".into(),
            code: output.code,
            stderr: output.stderr,
        })
    }

    async fn rename_project(&self, old_path: &Path, new_name: &str) -> Result<PathBuf> {
        let parent = old_path
            .parent()
            .ok_or_else(|| VersoError::project(format!("{} has no parent", old_path.display())))?;
        let new_path = parent.join(new_name);
        if new_path.exists() {
            return Err(VersoError::project(format!(
                "{} already exists",
                new_path.display()
            )));
        }
        tokio::fs::rename(old_path, &new_path).await?;
        info!("Renamed {} to {}", old_path.display(), new_path.display());
        Ok(new_path)
    }

    async fn clone_project(&self, url: &str, target: &Path) -> Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| VersoError::project(format!("{} has no parent", target.display())))?;
        tokio::fs::create_dir_all(parent).await?;
        let args = [
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new(url),
            target.as_os_str(),
        ];
        self.git.at(parent).run(args).await?;
        info!("Cloned {} into {}", url, target.display());
        Ok(())
    }
}
