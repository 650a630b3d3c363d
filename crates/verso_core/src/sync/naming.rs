//! Mapping between project names and remote repository names.

use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::{Result, VersoError};
use crate::sync::remote::RemoteRepositoryService;

/// Upper bound for the `-1, -2, …` search.
const MAX_SUFFIX_PROBES: u32 = 1000;

/// `<prefix>-<project>` naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNaming {
    prefix: String,
}

impl RemoteNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn repo_name(&self, project: &str) -> String {
        format!("{}-{}", self.prefix, project)
    }

    /// Project name encoded in a repository name, if it follows the convention.
    pub fn project_name<'a>(&self, repo: &'a str) -> Option<&'a str> {
        repo.strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')
            .filter(|name| !name.is_empty())
    }

    pub fn matches(&self, repo: &str) -> bool {
        self.project_name(repo).is_some()
    }
}

/// `<name>-YYYYMMDD-HHMMSS`
pub fn timestamped_name(name: &str, now: DateTime<Local>) -> String {
    format!("{}-{}", name, now.format("%Y%m%d-%H%M%S"))
}

/// Find a project name whose remote repository and sibling directory are both free.
///
/// `base` itself is tried first, then `base-1`, `base-2`, and so on.
pub async fn find_available_name(
    remote: &dyn RemoteRepositoryService,
    naming: &RemoteNaming,
    base: &str,
    local_parent: &Path,
) -> Result<String> {
    for n in 0..MAX_SUFFIX_PROBES {
        let candidate = if n == 0 {
            base.to_string()
        } else {
            format!("{base}-{n}")
        };
        if local_parent.join(&candidate).exists() {
            continue;
        }
        if remote
            .get_repository(&naming.repo_name(&candidate))
            .await?
            .is_none()
        {
            return Ok(candidate);
        }
    }
    Err(VersoError::project(format!(
        "no free name found for {base} after {MAX_SUFFIX_PROBES} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_repo_name_round_trip() {
        let naming = RemoteNaming::new("verso");
        assert_eq!(naming.repo_name("journal"), "verso-journal");
        assert_eq!(naming.project_name("verso-journal"), Some("journal"));
        assert_eq!(naming.project_name("verso-my-notes"), Some("my-notes"));
        assert_eq!(naming.project_name("versojournal"), None);
        assert_eq!(naming.project_name("verso-"), None);
        assert_eq!(naming.project_name("other-journal"), None);
    }

    #[test]
    fn test_timestamped_name() {
        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(timestamped_name("journal", now), "journal-20240102-030405");
    }
}
