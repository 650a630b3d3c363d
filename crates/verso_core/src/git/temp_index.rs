//! Scoped temporary index files.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// An index file path unique to one snapshot, removed when dropped.
///
/// The file is not created here: git writes it on the first staging command.
/// Dropping the guard deletes both the index and any stale `.lock` sibling,
/// whichever way the owning operation exits.
#[derive(Debug)]
pub struct TempIndex {
    path: PathBuf,
}

impl TempIndex {
    pub fn new(git_dir: &Path) -> Self {
        let path = git_dir.join(format!("verso-index-{}", Uuid::new_v4().simple()));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempIndex {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(self.path.with_extension("lock"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique_and_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempIndex::new(dir.path());
        let b = TempIndex::new(dir.path());
        assert_ne!(a.path(), b.path());

        std::fs::write(a.path(), b"index").unwrap();
        let path = a.path().to_path_buf();
        drop(a);
        assert!(!path.exists());
    }
}
