//! Source-control client seam (§1, §4.1, §10.5).
//!
//! The Branch Workspace never shells out to `git` directly; it drives a
//! `GitClient` trait object so tests can substitute a fake. The concrete
//! adapter here shells out to the system `git` binary with a timeout,
//! following the same spawn-with-piped-output-and-timeout shape used
//! elsewhere in this codebase for subprocess execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {command} timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("git {command} exited {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Narrow interface the Branch Workspace depends on instead of a concrete
/// git binding.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Shallow-clone `branch` from `remote_url` (which may already embed a
    /// token) into `dest`, at depth 1.
    async fn clone_shallow(&self, remote_url: &str, branch: &str, dest: &Path)
        -> Result<(), GitError>;

    /// Fetch all refs from origin with `--force --prune`.
    async fn fetch_prune(&self, repo: &Path) -> Result<(), GitError>;

    /// Force-checkout `branch`, discarding local changes.
    async fn checkout_force(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Resolve `HEAD` to a commit SHA.
    async fn rev_parse_head(&self, repo: &Path) -> Result<String, GitError>;
}

/// `GitClient` backed by the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct CliGitClient;

impl CliGitClient {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str], cwd: &Path) -> Result<String, GitError> {
        let command_label = format!("git {}", args.join(" "));

        let mut child = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let wait = tokio::time::timeout(DEFAULT_GIT_TIMEOUT, child.wait()).await;
        let status = match wait {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                return Err(GitError::TimedOut {
                    command: command_label,
                    timeout_secs: DEFAULT_GIT_TIMEOUT.as_secs(),
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(GitError::NonZeroExit {
                command: command_label,
                code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

#[async_trait]
impl GitClient for CliGitClient {
    async fn clone_shallow(
        &self,
        remote_url: &str,
        branch: &str,
        dest: &Path,
    ) -> Result<(), GitError> {
        let dest_str = dest.to_string_lossy();
        self.run(
            &[
                "clone",
                "--branch",
                branch,
                "--depth",
                "1",
                "--single-branch",
                remote_url,
                dest_str.as_ref(),
            ],
            dest.parent().unwrap_or_else(|| Path::new(".")),
        )
        .await?;
        Ok(())
    }

    async fn fetch_prune(&self, repo: &Path) -> Result<(), GitError> {
        self.run(&["fetch", "--force", "--prune", "origin"], repo)
            .await?;
        Ok(())
    }

    async fn checkout_force(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", "--force", branch], repo).await?;
        Ok(())
    }

    async fn rev_parse_head(&self, repo: &Path) -> Result<String, GitError> {
        self.run(&["rev-parse", "HEAD"], repo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::process::Command as TokioCommand;

    async fn init_repo(dir: &Path) {
        let status = TokioCommand::new("git")
            .args(["init", "--initial-branch=main"])
            .current_dir(dir)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        TokioCommand::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir)
            .status()
            .await
            .unwrap();
        TokioCommand::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .status()
            .await
            .unwrap();

        std::fs::write(dir.join("README.md"), "hello").unwrap();
        TokioCommand::new("git")
            .args(["add", "."])
            .current_dir(dir)
            .status()
            .await
            .unwrap();
        TokioCommand::new("git")
            .args(["commit", "-m", "init"])
            .current_dir(dir)
            .status()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn clone_shallow_then_rev_parse_round_trips() {
        let origin = tempdir().unwrap();
        init_repo(origin.path()).await;

        let client = CliGitClient::new();
        let origin_head = client.rev_parse_head(origin.path()).await.unwrap();

        let clone_parent = tempdir().unwrap();
        let dest = clone_parent.path().join("clone");
        client
            .clone_shallow(
                &origin.path().to_string_lossy(),
                "main",
                &dest,
            )
            .await
            .unwrap();

        let cloned_head = client.rev_parse_head(&dest).await.unwrap();
        assert_eq!(origin_head, cloned_head);
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;

        let client = CliGitClient::new();
        let err = client
            .checkout_force(dir.path(), "does-not-exist")
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn fetch_prune_on_solo_repo_succeeds_as_noop() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;

        let client = CliGitClient::new();
        // No configured remote named "origin": this should fail, exercising
        // the non-zero-exit path rather than silently succeeding.
        let err = client.fetch_prune(dir.path()).await.unwrap_err();
        assert!(matches!(err, GitError::NonZeroExit { .. }));
    }
}
