//! Project registry: the JSON manifest of known projects and the per-project sidecar.
//!
//! The manifest lives at a fixed path (see [`crate::config::Config::manifest_path`])
//! and has the shape
//!
//! ```json
//! { "version": 1, "projects": [ { "name": "journal", "path": "/…/journal",
//!   "lastOpened": "…", "lastModified": "…", "syncedAt": "…" } ] }
//! ```
//!
//! Every mutation is written back immediately with a write-then-rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, VersoError};
use crate::git::init_repo;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// Sidecar file written into every project directory.
pub const SIDECAR_FILE: &str = ".verso.json";

/// A local project as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub last_opened: DateTime<Utc>,
    /// Last local content change; `None` means the copy holds nothing local-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Last successful push or pull; `None` means never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            last_opened: Utc::now(),
            last_modified: None,
            synced_at: None,
        }
    }

    /// The sync-relevant view of this project.
    pub fn config(&self) -> ProjectConfig {
        ProjectConfig {
            name: self.name.clone(),
            path: self.path.clone(),
            synced_at: self.synced_at,
            modified_at: self.last_modified,
        }
    }

    /// Name shown to the user: the sidecar's name if present, else the registry name.
    pub fn display_name(&self) -> String {
        match ProjectSidecar::read(&self.path) {
            Ok(Some(sidecar)) if !sidecar.name.trim().is_empty() => sidecar.name,
            _ => self.name.clone(),
        }
    }
}

/// Input of the sync policy for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub name: String,
    pub path: PathBuf,
    pub synced_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// `{name, createdAt}` stored inside each project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSidecar {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ProjectSidecar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    pub fn read(project_dir: &Path) -> Result<Option<Self>> {
        let path = project_dir.join(SIDECAR_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn write(&self, project_dir: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(project_dir.join(SIDECAR_FILE), contents)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    #[serde(default)]
    projects: Vec<Project>,
}

/// Validate a project name for use as a folder and remote repository name.
///
/// Returns the trimmed name, or a human-readable reason on failure.
pub fn validate_project_name(name: &str, existing: &[String]) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Please enter a project name".into());
    }
    if trimmed.starts_with('.') {
        return Err("Project names cannot start with a dot".into());
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("Use letters, numbers, dots, hyphens or underscores".into());
    }

    let normalized = trimmed.to_lowercase();
    if existing.iter().any(|n| n.to_lowercase() == normalized) {
        return Err("A project with that name already exists".into());
    }

    Ok(trimmed.to_string())
}

/// Create a project directory with an empty repository and its sidecar.
pub fn create_project_dir(root: &Path, name: &str) -> Result<PathBuf> {
    let path = root.join(name);
    if path.exists() {
        return Err(VersoError::project(format!(
            "{} already exists",
            path.display()
        )));
    }
    std::fs::create_dir_all(&path)?;
    init_repo(&path)?;
    ProjectSidecar::new(name).write(&path)?;
    Ok(path)
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Shared, persisted list of local projects.
pub struct ProjectRegistry {
    manifest_path: PathBuf,
    projects: Mutex<Vec<Project>>,
    work_locks: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ProjectRegistry {
    /// Load the manifest, starting empty if it does not exist yet.
    pub async fn load(manifest_path: impl Into<PathBuf>) -> Result<Self> {
        let manifest_path = manifest_path.into();
        let projects = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(contents) => {
                let manifest: Manifest = serde_json::from_str(&contents)?;
                if manifest.version > MANIFEST_VERSION {
                    warn!(
                        "Manifest version {} is newer than supported {}",
                        manifest.version, MANIFEST_VERSION
                    );
                }
                manifest.projects
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            "Loaded {} projects from {}",
            projects.len(),
            manifest_path.display()
        );
        Ok(Self {
            manifest_path,
            projects: Mutex::new(projects),
            work_locks: StdMutex::new(HashMap::new()),
        })
    }

    /// Lock serializing git work on one project directory.
    ///
    /// The version store holds it for each autosave and checkpoint; sync holds
    /// it while it pulls, pushes, moves or clones the folder.
    pub fn work_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        match self.work_locks.lock() {
            Ok(mut locks) => Arc::clone(locks.entry(key).or_default()),
            Err(_) => Arc::new(Mutex::new(())),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub async fn list(&self) -> Vec<Project> {
        self.projects.lock().await.clone()
    }

    pub async fn find_by_path(&self, path: &Path) -> Option<Project> {
        self.projects
            .lock()
            .await
            .iter()
            .find(|p| same_path(&p.path, path))
            .cloned()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Project> {
        self.projects
            .lock()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Add a project, or refresh `lastOpened` if the path is already known.
    pub async fn register(&self, project: Project) -> Result<Project> {
        let mut projects = self.projects.lock().await;
        let registered = match projects.iter_mut().find(|p| same_path(&p.path, &project.path)) {
            Some(existing) => {
                existing.last_opened = Utc::now();
                existing.clone()
            }
            None => {
                info!("Registered project {} at {}", project.name, project.path.display());
                projects.push(project.clone());
                project
            }
        };
        self.persist(&projects).await?;
        Ok(registered)
    }

    /// Record a local content change.
    pub async fn touch_modified(&self, path: &Path, at: DateTime<Utc>) -> Result<()> {
        self.update(path, |p| p.last_modified = Some(at)).await
    }

    /// Record a successful push or pull.
    pub async fn mark_synced(&self, path: &Path, at: DateTime<Utc>) -> Result<()> {
        self.update(path, |p| p.synced_at = Some(at)).await
    }

    /// Point an entry at its renamed folder.
    pub async fn rename(&self, old_path: &Path, new_name: &str, new_path: &Path) -> Result<()> {
        let new_name = new_name.to_string();
        let new_path = new_path.to_path_buf();
        self.update(old_path, move |p| {
            p.name = new_name;
            p.path = new_path;
        })
        .await
    }

    pub async fn remove(&self, path: &Path) -> Result<Option<Project>> {
        let mut projects = self.projects.lock().await;
        let removed = projects
            .iter()
            .position(|p| same_path(&p.path, path))
            .map(|i| projects.remove(i));
        if removed.is_some() {
            self.persist(&projects).await?;
        }
        Ok(removed)
    }

    /// Drop entries whose directories no longer exist. Returns the dropped names.
    pub async fn prune_missing(&self) -> Result<Vec<String>> {
        let mut projects = self.projects.lock().await;
        let (kept, dropped): (Vec<Project>, Vec<Project>) =
            projects.drain(..).partition(|p| p.path.exists());
        *projects = kept;
        if !dropped.is_empty() {
            self.persist(&projects).await?;
        }
        Ok(dropped.into_iter().map(|p| p.name).collect())
    }

    async fn update(&self, path: &Path, apply: impl FnOnce(&mut Project)) -> Result<()> {
        let mut projects = self.projects.lock().await;
        let project = projects
            .iter_mut()
            .find(|p| same_path(&p.path, path))
            .ok_or_else(|| {
                VersoError::project(format!("{} is not a registered project", path.display()))
            })?;
        apply(project);
        self.persist(&projects).await
    }

    async fn persist(&self, projects: &[Project]) -> Result<()> {
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            projects: projects.to_vec(),
        };
        let contents = serde_json::to_string_pretty(&manifest)?;

        if let Some(parent) = self.manifest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.manifest_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.manifest_path).await?;
        Ok(())
    }
}
