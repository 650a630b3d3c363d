//! Sync passes over every known project.
//!
//! A pass authenticates, runs sync-up (every registered project against its
//! remote) and then sync-down (clone remotes that have no local project).
//! Failures are contained per project. Only errors that make further calls
//! pointless (expired auth, access denied, rate limiting) stop the pass.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{RemoteError, Result, VersoError};
use crate::git::{Git, Identity};
use crate::project::{ProjectRegistry, validate_project_name};
use crate::sync::local::{GitLocalProjectService, LocalProjectService};
use crate::sync::naming::RemoteNaming;
use crate::sync::policy::{BeforeMoveHook, ProjectSyncOutcome, SyncPolicyEngine, SyncPrompter};
use crate::sync::remote::{GitHubRepositoryService, RemoteRepositoryService};
use crate::sync::session::{AuthProvider, Session, SessionHolder};

/// Whether a pass may prompt the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Silent,
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub outcome: String,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Why the pass did not run at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    /// Why the pass stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub projects: Vec<ProjectReport>,
    pub errors: Vec<String>,
    /// Projects whose remote is gone and that wait for a trash-or-keep answer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub awaiting_confirmation: Vec<String>,
}

impl SyncReport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::default()
        }
    }

    fn record(&mut self, project: &str, outcome: ProjectSyncOutcome) {
        let outcome = match outcome {
            ProjectSyncOutcome::Applied(decision) => decision.label(),
            ProjectSyncOutcome::Deferred => {
                self.awaiting_confirmation.push(project.to_string());
                "waiting for confirmation"
            }
            ProjectSyncOutcome::Conflict => "merge conflict, push skipped",
        };
        self.projects.push(ProjectReport {
            project: project.to_string(),
            outcome: outcome.to_string(),
        });
    }

    fn fail(&mut self, project: &str, error: impl std::fmt::Display) {
        warn!("Sync of {} failed: {}", project, error);
        self.errors.push(format!("{project}: {error}"));
    }

    /// One-line status for the user.
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.skipped {
            return format!("Sync skipped: {reason}");
        }
        if let Some(reason) = &self.aborted {
            return format!("Sync stopped: {reason}");
        }
        match (self.projects.len(), self.errors.len()) {
            (n, 0) => format!("Synced {n} project(s)"),
            (n, e) => format!("Synced {n} project(s), {e} failed"),
        }
    }
}

/// Builds gateways bound to a session.
pub trait GatewayFactory: Send + Sync {
    fn remote(&self, session: &Session) -> Arc<dyn RemoteRepositoryService>;
    fn local(&self, session: &Session) -> Arc<dyn LocalProjectService>;
}

/// GitHub API plus the `git` CLI.
pub struct GitHubGatewayFactory {
    api_url: String,
    naming: RemoteNaming,
    private: bool,
    git: Git,
    trash_dir: PathBuf,
}

impl GitHubGatewayFactory {
    pub fn new(config: &Config) -> Self {
        let git = Git::new(&config.projects_root).with_identity(Identity {
            name: config.history.author_name.clone(),
            email: config.history.author_email.clone(),
        });
        Self {
            api_url: config.remote.api_url.clone(),
            naming: RemoteNaming::new(&config.remote.repo_prefix),
            private: config.remote.private,
            git,
            trash_dir: config.trash_dir.clone(),
        }
    }
}

impl GatewayFactory for GitHubGatewayFactory {
    fn remote(&self, session: &Session) -> Arc<dyn RemoteRepositoryService> {
        Arc::new(GitHubRepositoryService::new(
            &self.api_url,
            session.clone(),
            self.naming.clone(),
            self.private,
        ))
    }

    fn local(&self, session: &Session) -> Arc<dyn LocalProjectService> {
        Arc::new(GitLocalProjectService::with_session(
            self.git.clone(),
            &self.trash_dir,
            session,
        ))
    }
}

/// Runs sync passes. Passes never overlap.
pub struct SyncOrchestrator {
    registry: Arc<ProjectRegistry>,
    auth: Arc<dyn AuthProvider>,
    sessions: SessionHolder,
    gateways: Arc<dyn GatewayFactory>,
    prompter: Arc<dyn SyncPrompter>,
    naming: RemoteNaming,
    projects_root: PathBuf,
    before_move: Option<BeforeMoveHook>,
    pass: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<ProjectRegistry>,
        auth: Arc<dyn AuthProvider>,
        gateways: Arc<dyn GatewayFactory>,
        prompter: Arc<dyn SyncPrompter>,
        naming: RemoteNaming,
        projects_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            auth,
            sessions: SessionHolder::new(),
            gateways,
            prompter,
            naming,
            projects_root: projects_root.into(),
            before_move: None,
            pass: Mutex::new(()),
        }
    }

    /// Run `hook` on a project folder before a pass trashes or renames it.
    pub fn with_before_move(mut self, hook: BeforeMoveHook) -> Self {
        self.before_move = Some(hook);
        self
    }

    /// Share an existing session cache.
    pub fn with_sessions(mut self, sessions: SessionHolder) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn sessions(&self) -> &SessionHolder {
        &self.sessions
    }

    /// Reuse the cached session, or acquire one. Silent mode never prompts.
    pub async fn ensure_authenticated(&self, mode: SyncMode) -> Result<Option<Session>> {
        if let Some(session) = self.sessions.get() {
            return Ok(Some(session));
        }
        let session = match mode {
            SyncMode::Silent => self.auth.existing_session().await?,
            SyncMode::Interactive => Some(self.auth.sign_in().await?),
        };
        if let Some(session) = &session {
            debug!("Signed in as {}", session.login);
            self.sessions.set(session.clone());
        }
        Ok(session)
    }

    /// One full pass. Never fails; problems are reported.
    pub async fn sync(&self, mode: SyncMode) -> SyncReport {
        self.sync_with(mode, self.prompter.as_ref()).await
    }

    /// One full pass that asks `prompter` instead of the configured one.
    pub async fn sync_with(&self, mode: SyncMode, prompter: &dyn SyncPrompter) -> SyncReport {
        let Ok(_pass) = self.pass.try_lock() else {
            debug!("Sync already running, skipping");
            return SyncReport::skipped("another sync is in progress");
        };

        let report = self.run_pass(mode, prompter).await;
        match mode {
            SyncMode::Interactive => prompter.notify(&report.summary()),
            SyncMode::Silent => debug!("{}", report.summary()),
        }
        report
    }

    async fn run_pass(&self, mode: SyncMode, prompter: &dyn SyncPrompter) -> SyncReport {
        let session = match self.ensure_authenticated(mode).await {
            Ok(Some(session)) => session,
            Ok(None) => return SyncReport::skipped("not signed in"),
            Err(e) => {
                if let VersoError::Remote(remote) = &e {
                    if remote.invalidates_session() {
                        self.sessions.invalidate();
                    }
                }
                if mode == SyncMode::Silent {
                    debug!("Silent sync could not authenticate: {}", e);
                }
                return SyncReport::skipped(e.to_string());
            }
        };

        let remote = self.gateways.remote(&session);
        let mut engine = SyncPolicyEngine::new(
            Arc::clone(&remote),
            self.gateways.local(&session),
            Arc::clone(&self.registry),
            self.naming.clone(),
        );
        if let Some(hook) = &self.before_move {
            engine = engine.with_before_move(Arc::clone(hook));
        }

        let mut report = SyncReport::default();
        let result = match self.sync_up(&engine, remote.as_ref(), mode, prompter, &mut report).await {
            Ok(()) => self.sync_down(&engine, remote.as_ref(), &mut report).await,
            Err(e) => Err(e),
        };
        if let Err(error) = result {
            self.abort(error, &mut report);
        }
        info!(
            "Sync pass finished: {} project(s), {} error(s)",
            report.projects.len(),
            report.errors.len()
        );
        report
    }

    async fn sync_up(
        &self,
        engine: &SyncPolicyEngine,
        remote: &dyn RemoteRepositoryService,
        mode: SyncMode,
        prompter: &dyn SyncPrompter,
        report: &mut SyncReport,
    ) -> Result<(), RemoteError> {
        let prompter = match mode {
            SyncMode::Interactive => Some(prompter),
            SyncMode::Silent => None,
        };

        for project in self.registry.list().await {
            let config = project.config();
            if !config.path.exists() {
                report.fail(&config.name, "project folder is missing");
                continue;
            }

            let existing = match remote
                .get_repository(&self.naming.repo_name(&config.name))
                .await
            {
                Ok(existing) => existing,
                Err(e) if e.aborts_pass() => return Err(e),
                Err(e) => {
                    report.fail(&config.name, e);
                    continue;
                }
            };

            match engine.sync_project(&config, existing.as_ref(), prompter).await {
                Ok(outcome) => report.record(&config.name, outcome),
                Err(VersoError::Remote(e)) if e.aborts_pass() => return Err(e),
                Err(e) => report.fail(&config.name, e),
            }
        }
        Ok(())
    }

    async fn sync_down(
        &self,
        engine: &SyncPolicyEngine,
        remote: &dyn RemoteRepositoryService,
        report: &mut SyncReport,
    ) -> Result<(), RemoteError> {
        let repos = match remote.list_repositories().await {
            Ok(repos) => repos,
            Err(e) if e.aborts_pass() => return Err(e),
            Err(e) => {
                report.fail("remote listing", e);
                return Ok(());
            }
        };

        let known = self.registry.list().await;
        for repo in repos {
            let Some(name) = self.naming.project_name(&repo.name) else {
                continue;
            };
            if known.iter().any(|p| p.name == name) {
                continue;
            }
            let target = self.projects_root.join(name);
            if known.iter().any(|p| p.path == target) {
                continue;
            }
            if validate_project_name(name, &[]).is_err() {
                debug!("Ignoring remote {} with an unusable name", repo.name);
                continue;
            }
            if target.exists() {
                warn!(
                    "{} exists but is not a known project; not cloning {}",
                    target.display(),
                    repo.name
                );
                continue;
            }

            match engine.sync_remote_repo(&repo, name, &target).await {
                Ok(outcome) => report.record(name, outcome),
                Err(VersoError::Remote(e)) if e.aborts_pass() => return Err(e),
                Err(e) => report.fail(name, e),
            }
        }
        Ok(())
    }

    fn abort(&self, error: RemoteError, report: &mut SyncReport) {
        if error.invalidates_session() {
            self.sessions.invalidate();
        }
        let reason = match &error {
            RemoteError::Unauthorized => "sign-in expired, sign in again to sync".to_string(),
            RemoteError::Forbidden(detail) => format!("the remote host denied access ({detail})"),
            RemoteError::RateLimited(_) => {
                "the remote host is rate limiting requests, try again later".to_string()
            }
            other => other.to_string(),
        };
        warn!("Sync pass aborted: {}", reason);
        report.aborted = Some(reason);
    }

    /// Silent passes every `every`, starting immediately, until `cancel` fires.
    pub async fn run_periodic(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Periodic sync stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.sync(SyncMode::Silent).await;
                }
            }
        }
    }
}
