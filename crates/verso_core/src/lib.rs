//! # `verso_core`
//!
//! Core library for Verso: versioned autosave and remote sync for
//! folders of notes.
//!
//! Every project is a git repository. While the user types, snapshots are
//! committed to a shadow branch (`auto-save/<branch>`) with git plumbing and
//! an isolated index. A checkpoint squashes them into one commit on the real
//! branch. Sync passes mirror each project to a repository on the remote host
//! and decide, per project, whether to push, pull, clone, rename or trash.
//!
//! [`app::Verso`] ties everything together for a host.

pub mod app;
pub mod config;
pub mod error;
pub mod git;

/// Autosave and checkpoint commits
pub mod history;

pub mod project;
pub mod protocol;
pub mod schedule;
pub mod summarize;

/// Remote sync
pub mod sync;

pub use app::Verso;
pub use config::Config;
pub use error::{RemoteError, Result, VersoError};
