//! Branch Workspace (§4.1): the on-disk working copy backing one Tentacle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, TentacleError};
use crate::git_client::GitClient;

/// On-disk working copy for one branch, mediating clone/fetch/checkout/delete.
pub struct BranchWorkspace {
    path: PathBuf,
    branch: String,
    git: Arc<dyn GitClient>,
}

impl BranchWorkspace {
    pub fn new(branches_dir: &Path, branch: &str, git: Arc<dyn GitClient>) -> Self {
        Self {
            path: branches_dir.join(branch),
            branch: branch.to_string(),
            git,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// If the workspace doesn't exist, shallow-clone `branch` at depth 1;
    /// otherwise force-checkout `branch` in the existing repository.
    pub async fn ensure(&self, remote_url: &str) -> Result<()> {
        if self.path.exists() {
            self.git
                .checkout_force(&self.path, &self.branch)
                .await
                .map_err(|e| TentacleError::Workspace(e.to_string()))
        } else {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.git
                .clone_shallow(remote_url, &self.branch, &self.path)
                .await
                .map_err(|e| TentacleError::Workspace(e.to_string()))
        }
    }

    /// Fetch all refs with force+prune, then re-checkout the branch.
    /// Post-condition: `local_sha() == remote_sha`.
    pub async fn fetch(&self) -> Result<()> {
        self.git
            .fetch_prune(&self.path)
            .await
            .map_err(|e| TentacleError::Workspace(e.to_string()))?;
        self.git
            .checkout_force(&self.path, &self.branch)
            .await
            .map_err(|e| TentacleError::Workspace(e.to_string()))
    }

    pub async fn local_sha(&self) -> Option<String> {
        if !self.path.exists() {
            return None;
        }
        self.git.rev_parse_head(&self.path).await.ok()
    }

    /// True when no workspace exists yet, or the stored HEAD differs from
    /// `remote_sha`.
    pub async fn update_required(&self, remote_sha: &str) -> bool {
        match self.local_sha().await {
            None => true,
            Some(local) => local != remote_sha,
        }
    }

    /// Recursively remove the workspace directory. `is_live` is the caller's
    /// answer to "does the owning Supervisor still have a running process?"
    /// (only the Supervisor knows that) — when true, refuses with
    /// `TentacleError::Busy` rather than removing a directory a process may
    /// still have as its cwd (§4.1).
    pub async fn destroy(&self, is_live: bool) -> Result<()> {
        if is_live {
            return Err(TentacleError::Busy(self.branch.clone()));
        }
        if self.path.exists() {
            tokio::fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }
}

/// Rewrite a remote URL to embed an auth token inline
/// (`https://<token>@host/...`), for handing to the source-control client.
///
/// Never log the return value of this function.
pub fn embed_token(remote_url: &str, token: &str) -> String {
    if token.is_empty() {
        return remote_url.to_string();
    }

    match remote_url.split_once("://") {
        Some((scheme, rest)) => format!("{scheme}://{token}@{rest}"),
        None => remote_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_client::{CliGitClient, GitError};
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
        std::fs::write(dir.join("f.txt"), "v1").unwrap();
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

    #[test]
    fn embed_token_inserts_before_host() {
        let out = embed_token("https://github.com/acme/widgets.git", "secret123");
        assert_eq!(out, "https://secret123@github.com/acme/widgets.git");
        assert!(!out.is_empty());
    }

    #[test]
    fn embed_token_with_empty_token_is_noop() {
        let url = "https://github.com/acme/widgets.git";
        assert_eq!(embed_token(url, ""), url);
    }

    #[tokio::test]
    async fn ensure_clones_when_absent_then_checks_out_when_present() {
        let origin = tempdir().unwrap();
        init_repo(origin.path()).await;

        let branches_root = tempdir().unwrap();
        let git: Arc<dyn GitClient> = Arc::new(CliGitClient::new());
        let workspace = BranchWorkspace::new(branches_root.path(), "main", git);

        assert!(!workspace.exists());
        workspace
            .ensure(&origin.path().to_string_lossy())
            .await
            .unwrap();
        assert!(workspace.exists());
        assert!(workspace.path().join("f.txt").exists());

        // Second ensure() on an existing workspace checks out rather than
        // re-cloning.
        workspace
            .ensure(&origin.path().to_string_lossy())
            .await
            .unwrap();
        assert!(workspace.path().join("f.txt").exists());
    }

    #[tokio::test]
    async fn update_required_true_before_clone() {
        let branches_root = tempdir().unwrap();
        let git: Arc<dyn GitClient> = Arc::new(CliGitClient::new());
        let workspace = BranchWorkspace::new(branches_root.path(), "main", git);
        assert!(workspace.update_required("deadbeef").await);
    }

    #[tokio::test]
    async fn destroy_removes_directory() {
        let origin = tempdir().unwrap();
        init_repo(origin.path()).await;

        let branches_root = tempdir().unwrap();
        let git: Arc<dyn GitClient> = Arc::new(CliGitClient::new());
        let workspace = BranchWorkspace::new(branches_root.path(), "main", git);
        workspace
            .ensure(&origin.path().to_string_lossy())
            .await
            .unwrap();
        assert!(workspace.exists());

        workspace.destroy(false).await.unwrap();
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn destroy_on_missing_workspace_is_a_noop() {
        let branches_root = tempdir().unwrap();
        let git: Arc<dyn GitClient> = Arc::new(CliGitClient::new());
        let workspace = BranchWorkspace::new(branches_root.path(), "main", git);
        workspace.destroy(false).await.unwrap();
    }

    #[tokio::test]
    async fn destroy_refuses_while_live() {
        let origin = tempdir().unwrap();
        init_repo(origin.path()).await;

        let branches_root = tempdir().unwrap();
        let git: Arc<dyn GitClient> = Arc::new(CliGitClient::new());
        let workspace = BranchWorkspace::new(branches_root.path(), "main", git);
        workspace
            .ensure(&origin.path().to_string_lossy())
            .await
            .unwrap();

        let err = workspace.destroy(true).await.unwrap_err();
        assert!(matches!(err, TentacleError::Busy(_)));
        assert!(workspace.exists());
    }

    #[allow(dead_code)]
    fn assert_git_error_is_send(_e: GitError) {}
}
