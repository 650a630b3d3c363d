//! In-memory gateways that record every call.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use verso_core::error::{RemoteError, Result, VersoError};
use verso_core::project::{Project, ProjectConfig, ProjectRegistry};
use verso_core::sync::{
    AuthProvider, GatewayFactory, LocalProjectService, RemoteRepositoryService, RepoInfo, Session,
    SyncPrompter,
};

pub fn repo(name: &str) -> RepoInfo {
    RepoInfo {
        name: name.to_string(),
        clone_url: format!("https://example.test/alice/{name}.git"),
        html_url: format!("https://example.test/alice/{name}"),
        updated_at: None,
    }
}

#[derive(Default)]
pub struct FakeRemote {
    repos: Mutex<BTreeMap<String, RepoInfo>>,
    calls: Mutex<Vec<String>>,
    /// Returned by every call once set.
    failure: Mutex<Option<RemoteError>>,
}

impl FakeRemote {
    pub fn with_repos(names: &[&str]) -> Arc<Self> {
        let remote = Self::default();
        {
            let mut repos = remote.repos.lock().unwrap();
            for name in names {
                repos.insert(name.to_string(), repo(name));
            }
        }
        Arc::new(remote)
    }

    pub fn fail_with(&self, error: RemoteError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has(&self, name: &str) -> bool {
        self.repos.lock().unwrap().contains_key(name)
    }

    fn enter(&self, call: String) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteRepositoryService for FakeRemote {
    async fn get_repository(&self, name: &str) -> Result<Option<RepoInfo>, RemoteError> {
        self.enter(format!("get {name}"))?;
        Ok(self.repos.lock().unwrap().get(name).cloned())
    }

    async fn create_repository(&self, name: &str) -> Result<RepoInfo, RemoteError> {
        self.enter(format!("create {name}"))?;
        let info = repo(name);
        self.repos
            .lock()
            .unwrap()
            .insert(name.to_string(), info.clone());
        Ok(info)
    }

    async fn list_repositories(&self) -> Result<Vec<RepoInfo>, RemoteError> {
        self.enter("list".to_string())?;
        Ok(self.repos.lock().unwrap().values().cloned().collect())
    }
}

/// Performs real directory moves so the registry and disk stay consistent.
#[derive(Default)]
pub struct FakeLocal {
    calls: Mutex<Vec<String>>,
    conflict_on_pull: Mutex<bool>,
    pull_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeLocal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn conflict_on_pull(&self) {
        *self.conflict_on_pull.lock().unwrap() = true;
    }

    /// Block every pull until a permit is added to the returned gate.
    pub fn hold_pulls(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.pull_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn folder(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl LocalProjectService for FakeLocal {
    async fn move_to_trash(&self, path: &Path) -> Result<()> {
        self.record(format!("trash {}", folder(path)));
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    async fn push_project(&self, path: &Path, remote_url: Option<&str>) -> Result<()> {
        self.record(format!("push {} {}", folder(path), remote_url.unwrap_or("-")));
        Ok(())
    }

    async fn pull_project(&self, path: &Path) -> Result<()> {
        self.record(format!("pull {}", folder(path)));
        let gate = self.pull_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if *self.conflict_on_pull.lock().unwrap() {
            return Err(VersoError::MergeConflict {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    async fn rename_project(&self, old_path: &Path, new_name: &str) -> Result<PathBuf> {
        self.record(format!("rename {} {}", folder(old_path), new_name));
        let new_path = old_path.parent().unwrap().join(new_name);
        std::fs::rename(old_path, &new_path)?;
        Ok(new_path)
    }

    async fn clone_project(&self, url: &str, target: &Path) -> Result<()> {
        self.record(format!("clone {} {}", url, folder(target)));
        std::fs::create_dir_all(target)?;
        Ok(())
    }
}

pub struct FakePrompter {
    answer: Option<bool>,
    asked: AtomicUsize,
    notes: Mutex<Vec<String>>,
}

impl FakePrompter {
    pub fn answering(answer: bool) -> Arc<Self> {
        Self::with_answer(Some(answer))
    }

    /// Never decides, like a host that has not answered yet.
    pub fn undecided() -> Arc<Self> {
        Self::with_answer(None)
    }

    fn with_answer(answer: Option<bool>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: AtomicUsize::new(0),
            notes: Mutex::new(Vec::new()),
        })
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncPrompter for FakePrompter {
    async fn confirm_trash(&self, _project: &ProjectConfig) -> Option<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }

    fn notify(&self, message: &str) {
        self.notes.lock().unwrap().push(message.to_string());
    }
}

/// Hands out a fixed session; counts how often it was asked.
pub struct FakeAuth {
    session: Option<Session>,
    pub requests: AtomicUsize,
}

impl FakeAuth {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self {
            session: Some(session()),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            session: None,
            requests: AtomicUsize::new(0),
        })
    }
}

pub fn session() -> Session {
    Session {
        token: "tok".into(),
        login: "alice".into(),
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn existing_session(&self) -> Result<Option<Session>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.clone())
    }

    async fn sign_in(&self) -> Result<Session> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.session.clone().ok_or(VersoError::NotAuthenticated)
    }
}

pub struct FakeGateways {
    pub remote: Arc<FakeRemote>,
    pub local: Arc<FakeLocal>,
}

impl GatewayFactory for FakeGateways {
    fn remote(&self, _session: &Session) -> Arc<dyn RemoteRepositoryService> {
        self.remote.clone()
    }

    fn local(&self, _session: &Session) -> Arc<dyn LocalProjectService> {
        self.local.clone()
    }
}

/// Registry with one project folder per name under `root`.
pub async fn registry_with(root: &Path, projects: &[&str]) -> Arc<ProjectRegistry> {
    let registry = Arc::new(
        ProjectRegistry::load(root.join("projects.json"))
            .await
            .unwrap(),
    );
    for name in projects {
        let path = root.join("projects").join(name);
        std::fs::create_dir_all(&path).unwrap();
        registry.register(Project::new(*name, path)).await.unwrap();
    }
    registry
}
