//! Messages exchanged with the host (editor UI) as JSON objects tagged by `type`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::sync::SyncReport;

/// Request from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    /// Load the registry and start background work.
    Initialize,
    /// A document inside a project was written to disk.
    DocumentSaved {
        /// Path of the saved document, or of the project itself.
        path: PathBuf,
    },
    /// Snapshot a project onto its shadow branch now.
    AutoCommit {
        /// Project directory.
        path: PathBuf,
    },
    /// Squash pending autosaves into a checkpoint.
    FinalCommit {
        /// Project directory.
        path: PathBuf,
        /// Commit message; generated when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Run a sync pass.
    ///
    /// A project whose remote disappeared is trashed only when the host lists
    /// it in `confirm_trash`, and restored when it is listed in `keep`. Any
    /// other such project comes back in `awaiting_confirmation`.
    Sync {
        /// Whether the user asked for it (and may be prompted).
        #[serde(default)]
        interactive: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        confirm_trash: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keep: Vec<String>,
    },
    ListProjects,
    CreateProject {
        name: String,
    },
}

/// Reply to a [`HostRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostResponse {
    Ack,
    Commit {
        success: bool,
        message: String,
    },
    Sync {
        report: SyncReportMessage,
    },
    Projects {
        projects: Vec<Project>,
    },
    Error {
        message: String,
    },
}

/// Wire form of a [`SyncReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReportMessage {
    pub summary: String,
    #[serde(default)]
    pub projects: Vec<ProjectOutcomeMessage>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Projects to ask the user about before the next interactive sync.
    #[serde(default)]
    pub awaiting_confirmation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOutcomeMessage {
    pub project: String,
    pub outcome: String,
}

impl From<&SyncReport> for SyncReportMessage {
    fn from(report: &SyncReport) -> Self {
        Self {
            summary: report.summary(),
            projects: report
                .projects
                .iter()
                .map(|p| ProjectOutcomeMessage {
                    project: p.project.clone(),
                    outcome: p.outcome.clone(),
                })
                .collect(),
            errors: report.errors.clone(),
            awaiting_confirmation: report.awaiting_confirmation.clone(),
        }
    }
}

impl HostResponse {
    pub fn error(message: impl Into<String>) -> Self {
        HostResponse::Error {
            message: message.into(),
        }
    }
}
