//! Error types shared across the Verso core library.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Crate-wide result alias.
pub type Result<T, E = VersoError> = std::result::Result<T, E>;

/// Errors produced by version-store, registry and sync operations.
#[derive(Debug, Error)]
pub enum VersoError {
    /// A `git` subprocess exited with a nonzero status.
    #[error("git {command} failed ({}): {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Git {
        /// The git subcommand that failed (e.g. `write-tree`).
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// libgit2 failed to open or inspect a repository.
    #[error("repository error: {0}")]
    Repository(#[from] git2::Error),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or sidecar (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote repository host rejected or failed a request.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No authentication session is available.
    #[error("not signed in to the remote host")]
    NotAuthenticated,

    /// A pull left the working tree with unresolved conflicts.
    #[error("merge conflict in {}; resolve it manually before the next sync", path.display())]
    MergeConflict {
        /// Project directory containing the conflict.
        path: PathBuf,
    },

    /// Project registry or project directory problem.
    #[error("project error: {0}")]
    Project(String),

    /// Configuration could not be loaded or saved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A commit message provider failed.
    #[error("message generation failed: {0}")]
    Generator(String),
}

impl VersoError {
    /// Build a project error from any displayable message.
    pub fn project(message: impl Into<String>) -> Self {
        Self::Project(message.into())
    }
}

/// Failures talking to the remote repository host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// HTTP 401: the cached session is no longer valid.
    #[error("authentication expired")]
    Unauthorized,

    /// HTTP 403 without rate-limit exhaustion.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// HTTP 429, or 403 with an exhausted rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Connection, DNS, TLS or timeout failure.
    #[error("network failure: {0}")]
    Network(String),

    /// Any other unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether this error should stop the whole sync pass rather than one project.
    pub fn aborts_pass(&self) -> bool {
        matches!(
            self,
            RemoteError::Unauthorized | RemoteError::Forbidden(_) | RemoteError::RateLimited(_)
        )
    }

    /// Whether the cached session must be dropped.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, RemoteError::Unauthorized)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_policy() {
        assert!(RemoteError::Unauthorized.aborts_pass());
        assert!(RemoteError::Unauthorized.invalidates_session());
        assert!(RemoteError::RateLimited("slow down".into()).aborts_pass());
        assert!(!RemoteError::RateLimited("slow down".into()).invalidates_session());
        assert!(!RemoteError::Network("reset".into()).aborts_pass());
    }

    #[test]
    fn test_git_error_display() {
        let err = VersoError::Git {
            command: "write-tree".into(),
            code: Some(128),
            stderr: "fatal: bad index".into(),
        };
        assert_eq!(
            err.to_string(),
            "git write-tree failed (128): fatal: bad index"
        );
    }
}
