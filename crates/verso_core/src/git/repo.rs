//! Create and open project repositories.

use std::path::Path;

use git2::{Repository, RepositoryInitOptions};

use crate::error::Result;

/// Branch created for brand-new projects.
pub const DEFAULT_BRANCH: &str = "main";

/// Initialize a new git repository at the given path with `main` as the unborn branch.
///
/// Writes a `.gitignore` that excludes OS metadata files.
pub fn init_repo(path: &Path) -> Result<Repository> {
    let mut options = RepositoryInitOptions::new();
    options.initial_head(DEFAULT_BRANCH).mkpath(true);
    let repo = Repository::init_opts(path, &options)?;

    let gitignore_path = path.join(".gitignore");
    if !gitignore_path.exists() {
        std::fs::write(&gitignore_path, ".DS_Store\nThumbs.db\n")?;
    }

    Ok(repo)
}

/// Open an existing git repository rooted exactly at `path`.
pub fn open_repo(path: &Path) -> Result<Repository> {
    Ok(Repository::open(path)?)
}

/// Open the repository at `path`, initializing one if the directory is not a repo yet.
pub fn open_or_init_repo(path: &Path) -> Result<Repository> {
    match Repository::open(path) {
        Ok(repo) => Ok(repo),
        Err(_) => init_repo(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_repo() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path()).unwrap();
        assert!(!repo.is_bare());
        assert!(dir.path().join(".git").exists());
        assert!(repo.head().is_err(), "fresh repo has an unborn HEAD");

        let head = repo.find_reference("HEAD").unwrap();
        assert_eq!(head.symbolic_target(), Some("refs/heads/main"));

        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".DS_Store"));
    }

    #[test]
    fn test_open_nonexistent_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_repo(dir.path()).is_err());
    }

    #[test]
    fn test_open_or_init_reuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).unwrap();
        std::fs::write(dir.path().join(".gitignore"), "custom\n").unwrap();

        open_or_init_repo(dir.path()).unwrap();
        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, "custom\n");
    }
}
