//! Git access for project history.
//!
//! Writes go through the `git` binary ([`Git`]) so autosave snapshots can use
//! an isolated index file via `GIT_INDEX_FILE`. Repository creation uses
//! libgit2.

mod command;
mod repo;
mod temp_index;

pub use command::{Git, GitCommand, GitOutput, Identity};
pub use repo::{DEFAULT_BRANCH, init_repo, open_or_init_repo, open_repo};
pub use temp_index::TempIndex;
