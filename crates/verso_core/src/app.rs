//! The [`Verso`] facade: what a host (editor UI or CLI) talks to.
//!
//! It owns the registry, one [`LocalVersionStore`] per project, the autosave
//! and idle-checkpoint timers, and the sync orchestrator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, VersoError};
use crate::git::open_or_init_repo;
use crate::history::{AutoSaveOutcome, CheckpointOutcome, CommitMessageGenerator, LocalVersionStore};
use crate::project::{
    Project, ProjectConfig, ProjectRegistry, ProjectSidecar, create_project_dir,
    validate_project_name,
};
use crate::protocol::{HostRequest, HostResponse};
use crate::schedule::Debouncer;
use crate::sync::{
    AuthProvider, BeforeMoveHook, GatewayFactory, GitHubGatewayFactory, RemoteNaming, SyncMode,
    SyncOrchestrator, SyncPrompter, SyncReport,
};

fn autosave_key(project: &Path) -> String {
    format!("autosave:{}", project.display())
}

fn checkpoint_key(project: &Path) -> String {
    format!("checkpoint:{}", project.display())
}

/// Trash answers the host sent along with a sync request.
struct HostAnswers<'a> {
    confirm_trash: &'a [String],
    keep: &'a [String],
    inner: &'a dyn SyncPrompter,
}

#[async_trait]
impl SyncPrompter for HostAnswers<'_> {
    async fn confirm_trash(&self, project: &ProjectConfig) -> Option<bool> {
        if self.confirm_trash.contains(&project.name) {
            Some(true)
        } else if self.keep.contains(&project.name) {
            Some(false)
        } else {
            None
        }
    }

    fn notify(&self, message: &str) {
        self.inner.notify(message);
    }
}

/// Application state shared by every request.
pub struct Verso {
    config: Config,
    registry: Arc<ProjectRegistry>,
    generator: CommitMessageGenerator,
    orchestrator: Arc<SyncOrchestrator>,
    prompter: Arc<dyn SyncPrompter>,
    stores: Mutex<HashMap<PathBuf, Arc<LocalVersionStore>>>,
    timers: Debouncer,
    periodic: Mutex<Option<CancellationToken>>,
    /// Silent pass started by the latest checkpoint.
    background_sync: Mutex<Option<JoinHandle<SyncReport>>>,
    shutdown: CancellationToken,
}

impl Verso {
    /// Build with the GitHub gateways.
    pub async fn new(
        config: Config,
        auth: Arc<dyn AuthProvider>,
        prompter: Arc<dyn SyncPrompter>,
    ) -> Result<Arc<Self>> {
        let gateways = Arc::new(GitHubGatewayFactory::new(&config));
        Self::with_gateways(config, auth, prompter, gateways).await
    }

    pub async fn with_gateways(
        config: Config,
        auth: Arc<dyn AuthProvider>,
        prompter: Arc<dyn SyncPrompter>,
        gateways: Arc<dyn GatewayFactory>,
    ) -> Result<Arc<Self>> {
        let registry = Arc::new(ProjectRegistry::load(&config.manifest_path).await?);
        let timers = Debouncer::new();
        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                Arc::clone(&registry),
                auth,
                gateways,
                Arc::clone(&prompter),
                RemoteNaming::new(&config.remote.repo_prefix),
                &config.projects_root,
            )
            .with_before_move(drop_timers_hook(timers.clone())),
        );
        let generator = CommitMessageGenerator::from_config(&config.ai.providers);

        Ok(Arc::new(Self {
            config,
            registry,
            generator,
            orchestrator,
            prompter,
            stores: Mutex::new(HashMap::new()),
            timers,
            periodic: Mutex::new(None),
            background_sync: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProjectRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Prepare the projects root, forget deleted projects, start periodic sync.
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.projects_root).await?;
        let dropped = self.registry.prune_missing().await?;
        if !dropped.is_empty() {
            info!("Forgot {} missing project(s): {}", dropped.len(), dropped.join(", "));
        }
        if self.config.sync.enabled {
            self.start_periodic_sync();
        }
        Ok(())
    }

    /// New empty project under the projects root.
    pub async fn create_project(&self, name: &str) -> Result<Project> {
        let existing: Vec<String> = self
            .registry
            .list()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        let name = validate_project_name(name, &existing).map_err(VersoError::Project)?;
        let path = create_project_dir(&self.config.projects_root, &name)?;
        self.registry.register(Project::new(&name, &path)).await
    }

    /// Register an existing folder, initializing a repository if needed.
    pub async fn open_project(&self, path: &Path) -> Result<Project> {
        if !path.is_dir() {
            return Err(VersoError::project(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let path = path.canonicalize()?;
        if let Some(project) = self.registry.find_by_path(&path).await {
            return self.registry.register(project).await;
        }

        // The folder name is the project name; it also names the remote.
        let folder = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| VersoError::project("cannot use the filesystem root"))?;
        let existing: Vec<String> = self
            .registry
            .list()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        let name = validate_project_name(&folder, &existing).map_err(VersoError::Project)?;

        open_or_init_repo(&path)?;
        if ProjectSidecar::read(&path)?.is_none() {
            ProjectSidecar::new(&name).write(&path)?;
        }
        self.registry.register(Project::new(name, path)).await
    }

    /// Registered project containing `path`.
    pub async fn project_for(&self, path: &Path) -> Result<Project> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.registry
            .list()
            .await
            .into_iter()
            .filter(|p| {
                path.starts_with(&p.path)
                    || p.path.canonicalize().is_ok_and(|root| path.starts_with(root))
            })
            .max_by_key(|p| p.path.components().count())
            .ok_or_else(|| {
                VersoError::project(format!("{} is not inside a known project", path.display()))
            })
    }

    fn store(&self, project: &Path) -> Arc<LocalVersionStore> {
        let create = || {
            Arc::new(LocalVersionStore::new(
                project,
                Arc::clone(&self.registry),
                self.generator.clone(),
                &self.config.history,
            ))
        };
        match self.stores.lock() {
            Ok(mut stores) => Arc::clone(stores.entry(project.to_path_buf()).or_insert_with(create)),
            Err(_) => create(),
        }
    }

    pub async fn auto_commit(&self, path: &Path) -> Result<AutoSaveOutcome> {
        let project = self.project_for(path).await?;
        self.store(&project.path).auto_commit().await
    }

    /// Cancel the pending autosave, write a checkpoint, then sync silently in the background.
    pub async fn final_commit(&self, path: &Path, message: Option<String>) -> Result<CheckpointOutcome> {
        let project = self.project_for(path).await?;
        self.timers.cancel(&autosave_key(&project.path));
        self.timers.cancel(&checkpoint_key(&project.path));

        let outcome = self.store(&project.path).final_commit(message).await?;
        if self.config.sync.enabled {
            let orchestrator = Arc::clone(&self.orchestrator);
            let handle = tokio::spawn(async move { orchestrator.sync(SyncMode::Silent).await });
            if let Ok(mut slot) = self.background_sync.lock() {
                *slot = Some(handle);
            }
        }
        Ok(outcome)
    }

    /// Whether an autosave or idle checkpoint is scheduled for `project`.
    pub fn has_pending_work(&self, project: &Path) -> bool {
        self.timers.is_pending(&autosave_key(project))
            || self.timers.is_pending(&checkpoint_key(project))
    }

    /// Wait for the sync started by the latest checkpoint, if any.
    pub async fn finish_background_sync(&self) -> Option<SyncReport> {
        let handle = self.background_sync.lock().ok()?.take()?;
        handle.await.ok()
    }

    /// (Re)arm the autosave and idle-checkpoint timers for the project containing `path`.
    pub async fn document_saved(self: &Arc<Self>, path: &Path) -> Result<()> {
        let project = self.project_for(path).await?.path;
        let history = &self.config.history;

        let this = Arc::clone(self);
        let target = project.clone();
        self.timers.schedule(
            autosave_key(&project),
            Duration::from_millis(history.autosave_debounce_ms),
            async move {
                if let Err(e) = this.auto_commit(&target).await {
                    warn!("Autosave of {} failed: {}", target.display(), e);
                }
            },
        );

        let this = Arc::clone(self);
        let target = project.clone();
        self.timers.schedule(
            checkpoint_key(&project),
            Duration::from_secs(history.idle_checkpoint_secs),
            async move {
                if let Err(e) = this.final_commit(&target, None).await {
                    warn!("Idle checkpoint of {} failed: {}", target.display(), e);
                }
            },
        );
        debug!("Timers armed for {}", project.display());
        Ok(())
    }

    pub async fn sync(&self, mode: SyncMode) -> SyncReport {
        self.orchestrator.sync(mode).await
    }

    /// Start the periodic silent sync if it is not running. Idempotent.
    pub fn start_periodic_sync(&self) -> CancellationToken {
        let Ok(mut slot) = self.periodic.lock() else {
            return self.shutdown.clone();
        };
        if let Some(token) = slot.as_ref().filter(|t| !t.is_cancelled()) {
            return token.clone();
        }

        let token = self.shutdown.child_token();
        let every = Duration::from_secs(self.config.sync.interval_minutes.max(1) * 60);
        tokio::spawn(Arc::clone(&self.orchestrator).run_periodic(every, token.clone()));
        info!("Periodic sync every {} minute(s)", every.as_secs() / 60);
        *slot = Some(token.clone());
        token
    }

    /// Drop pending timers and stop background sync.
    pub fn shutdown(&self) {
        self.timers.cancel_all();
        self.shutdown.cancel();
    }

    /// Dispatch one host request.
    pub async fn handle(self: &Arc<Self>, request: HostRequest) -> HostResponse {
        match request {
            HostRequest::Initialize => ack(self.initialize().await),
            HostRequest::DocumentSaved { path } => ack(self.document_saved(&path).await),
            HostRequest::AutoCommit { path } => match self.auto_commit(&path).await {
                Ok(outcome) => HostResponse::Commit {
                    success: true,
                    message: match outcome {
                        AutoSaveOutcome::Committed { message, .. } => message,
                        AutoSaveOutcome::Clean | AutoSaveOutcome::Unchanged => {
                            "No changes".to_string()
                        }
                    },
                },
                Err(e) => failed_commit(e),
            },
            HostRequest::FinalCommit { path, message } => {
                match self.final_commit(&path, message).await {
                    Ok(outcome) => HostResponse::Commit {
                        success: true,
                        message: outcome.message,
                    },
                    Err(e) => failed_commit(e),
                }
            }
            HostRequest::Sync {
                interactive,
                confirm_trash,
                keep,
            } => {
                let mode = if interactive {
                    SyncMode::Interactive
                } else {
                    SyncMode::Silent
                };
                let answers = HostAnswers {
                    confirm_trash: &confirm_trash,
                    keep: &keep,
                    inner: self.prompter.as_ref(),
                };
                HostResponse::Sync {
                    report: (&self.orchestrator.sync_with(mode, &answers).await).into(),
                }
            }
            HostRequest::ListProjects => HostResponse::Projects {
                projects: self.registry.list().await,
            },
            HostRequest::CreateProject { name } => match self.create_project(&name).await {
                Ok(project) => HostResponse::Projects {
                    projects: vec![project],
                },
                Err(e) => HostResponse::error(e.to_string()),
            },
        }
    }
}

/// Timers of a folder that sync is about to move must not fire on the old path.
fn drop_timers_hook(timers: Debouncer) -> BeforeMoveHook {
    Arc::new(move |project: &Path| {
        let dropped = timers.cancel(&autosave_key(project)) | timers.cancel(&checkpoint_key(project));
        if dropped {
            debug!("Dropped pending timers for {}", project.display());
        }
    })
}

fn ack(result: Result<()>) -> HostResponse {
    match result {
        Ok(()) => HostResponse::Ack,
        Err(e) => HostResponse::error(e.to_string()),
    }
}

fn failed_commit(error: VersoError) -> HostResponse {
    warn!("Commit failed: {}", error);
    HostResponse::Commit {
        success: false,
        message: error.to_string(),
    }
}
