//! Async runner for `git` subprocesses.
//!
//! Every plumbing step of the version store and every push/pull/clone of the
//! local gateway goes through [`Git`]. Calls are awaited one at a time per
//! operation; nothing here runs git invocations concurrently.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, VersoError};

/// Author/committer identity passed to git through the environment.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// A `git` binary bound to one working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    identity: Option<Identity>,
    /// `-c key=value` overrides applied to every invocation.
    config: Vec<(String, String)>,
}

/// Captured result of a finished git process.
#[derive(Debug)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            identity: None,
            config: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.push((key.into(), value.into()));
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Same settings, different working directory.
    pub fn at(&self, workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ..self.clone()
        }
    }

    /// Start building an invocation.
    pub fn command<I, S>(&self, args: I) -> GitCommand<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        GitCommand {
            git: self,
            args: args.into_iter().map(|a| a.as_ref().to_os_string()).collect(),
            envs: Vec::new(),
            stdin: None,
        }
    }

    /// Run and return trimmed stdout, failing on nonzero exit.
    pub async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command(args).run().await
    }
}

/// One pending git invocation.
pub struct GitCommand<'a> {
    git: &'a Git,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    stdin: Option<Vec<u8>>,
}

impl GitCommand<'_> {
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    fn subcommand(&self) -> String {
        self.args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Run to completion without interpreting the exit status.
    pub async fn output(self) -> Result<GitOutput> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.git.workdir);
        for (key, value) in &self.git.config {
            cmd.arg("-c").arg(format!("{key}={value}"));
        }
        cmd.args(&self.args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        if let Some(identity) = &self.git.identity {
            cmd.env("GIT_AUTHOR_NAME", &identity.name)
                .env("GIT_AUTHOR_EMAIL", &identity.email)
                .env("GIT_COMMITTER_NAME", &identity.name)
                .env("GIT_COMMITTER_EMAIL", &identity.email);
        }
        cmd.envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "git {:?} (in {})",
            self.args,
            self.git.workdir.display()
        );

        let mut child = cmd.spawn()?;
        if let Some(input) = &self.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input).await?;
            }
        }
        let output = child.wait_with_output().await?;

        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run and return stdout with trailing newlines removed; nonzero exit is an error.
    pub async fn run(self) -> Result<String> {
        let subcommand = self.subcommand();
        let output = self.output().await?;
        if !output.success() {
            return Err(VersoError::Git {
                command: subcommand,
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout.trim_end_matches(['\n', '\r']).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_carries_subcommand_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let git = Git::new(dir.path());
        let err = git.run(["rev-parse", "--verify", "HEAD"]).await.unwrap_err();
        match err {
            VersoError::Git { command, code, .. } => {
                assert_eq!(command, "rev-parse");
                assert_ne!(code, Some(0));
            }
            other => panic!("expected git error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let git = Git::new(dir.path());
        git.run(["init", "-q"]).await.unwrap();
        let oid = git
            .command(["hash-object", "--stdin"])
            .stdin("hello\n")
            .run()
            .await
            .unwrap();
        assert_eq!(oid, "ce013625030ba8dba906f756967f9e9ca394464a");
    }
}
