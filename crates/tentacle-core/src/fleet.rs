//! Fleet Controller (§4.4): the map of branch name → Supervisor, reconciled
//! against the remote branch list and driven by webhook events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::{LogLevel, TentacleConfig};
use crate::events::{Observer, SystemLogEntry, TentacleEvent};
use crate::git_client::GitClient;
use crate::hosting::{filter_branches, HostingApi};
use crate::tentacle::Supervisor;
use crate::workspace::{embed_token, BranchWorkspace};

/// The 40-zero SHA git uses to mean "this ref did not exist before/after".
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// A parsed `push` webhook payload, already reduced to what the Fleet
/// Controller needs (§4.4, §6).
#[derive(Debug, Clone)]
pub struct PushEvent {
    /// Raw `ref` field, e.g. `refs/heads/feat/x`.
    pub ref_name: String,
    pub after: String,
}

impl PushEvent {
    /// Parses the last `/`-segment of `ref` as the branch name. This
    /// misparses multi-segment branch names (e.g. `feat/x` arrives as
    /// `refs/heads/feat/x`, yielding `x` rather than `feat/x`) — preserved
    /// intentionally per the open question in §9 rather than silently
    /// "fixed", since the webhook sender's exact `ref` shape is outside
    /// this crate's control and changing the parse here would silently
    /// diverge from what operators have already observed in production.
    pub fn branch_name(&self) -> &str {
        self.ref_name.rsplit('/').next().unwrap_or(&self.ref_name)
    }

    pub fn is_deletion(&self) -> bool {
        self.after == ZERO_SHA
    }
}

/// Coordinates the set of Supervisors against the remote branch list and
/// webhook events. The map is read by many (proxy, dashboard API,
/// reconciler) and written only here; `RwLock` gives concurrent readers and
/// an exclusive writer, per §5.
pub struct FleetController {
    config: TentacleConfig,
    hosting: Arc<dyn HostingApi>,
    git: Arc<dyn GitClient>,
    observer: Arc<dyn Observer>,
    branches_dir: PathBuf,
    remote_url: String,
    tentacles: RwLock<HashMap<String, Arc<Supervisor>>>,
    system_log: RwLock<Vec<SystemLogEntry>>,
}

impl FleetController {
    pub fn new(
        config: TentacleConfig,
        hosting: Arc<dyn HostingApi>,
        git: Arc<dyn GitClient>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let branches_dir = PathBuf::from(config.branches_dir.clone());
        let remote_url = embed_token(
            &format!("https://github.com/{}.git", config.repo_full_name),
            &config.github_token,
        );

        Self {
            config,
            hosting,
            git,
            observer,
            branches_dir,
            remote_url,
            tentacles: RwLock::new(HashMap::new()),
            system_log: RwLock::new(Vec::new()),
        }
    }

    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let entry = SystemLogEntry {
            level,
            message: message.clone(),
            timestamp: chrono::Utc::now(),
        };

        if self.config.enabled_log_levels.allows(level) {
            self.system_log.write().await.push(entry.clone());
            self.observer.notify(TentacleEvent::SystemLogsUpdate(entry));
        }

        match level {
            LogLevel::Error => error!("{message}"),
            LogLevel::Warning => warn!("{message}"),
            _ => info!("{message}"),
        }
    }

    fn new_workspace(&self, branch: &str) -> BranchWorkspace {
        BranchWorkspace::new(&self.branches_dir, branch, self.git.clone())
    }

    fn new_supervisor(&self, branch: &str) -> std::io::Result<Arc<Supervisor>> {
        let workspace = self.new_workspace(branch);
        Supervisor::new(
            branch.to_string(),
            workspace,
            self.remote_url.clone(),
            self.config.commands.clone(),
            self.observer.clone(),
        )
        .map(Arc::new)
    }

    /// Enumerates remote branches, filters, reconciles local workspace
    /// directories, then builds and starts every surviving branch.
    pub async fn init(&self) -> crate::error::Result<()> {
        let remote_branches = self
            .hosting
            .list_branches()
            .await
            .map_err(|e| crate::error::TentacleError::HostingApi(e.to_string()))?;

        let filtered = filter_branches(
            remote_branches,
            self.config.filter_mode,
            &self.config.filter_branches,
        );

        if self.config.clear_redundant_local_branches {
            self.clear_redundant_local_branches(&filtered).await;
        }

        {
            let mut tentacles = self.tentacles.write().await;
            for branch in &filtered {
                match self.new_supervisor(branch) {
                    Ok(sup) => {
                        tentacles.insert(branch.clone(), sup);
                    }
                    Err(e) => {
                        self.log(
                            LogLevel::Error,
                            format!("failed to construct supervisor for '{branch}': {e}"),
                        )
                        .await;
                    }
                }
            }
        }

        let ordered: Vec<Arc<Supervisor>> = {
            let tentacles = self.tentacles.read().await;
            filtered
                .iter()
                .filter_map(|b| tentacles.get(b).cloned())
                .collect()
        };

        for sup in ordered {
            if let Err(e) = sup.ensure_or_fetch().await {
                self.log(
                    LogLevel::Error,
                    format!("workspace ensure/fetch failed for '{}': {e}", sup.branch()),
                )
                .await;
                continue;
            }
            sup.build().await;
            sup.start().await;
        }

        Ok(())
    }

    /// Best-effort removal of local directories whose name isn't in the
    /// current remote branch set. Individual failures are logged and
    /// ignored; this is the only garbage-collection pass (§4.4).
    async fn clear_redundant_local_branches(&self, remote: &[String]) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.branches_dir).await else {
            return;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if remote.contains(&name) {
                continue;
            }
            if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
                self.log(
                    LogLevel::Warning,
                    format!("failed to remove stale branch dir '{name}': {e}"),
                )
                .await;
            }
        }
    }

    /// Invoked on webhook delivery. See `PushEvent::branch_name` for the
    /// (intentionally preserved) last-segment parse.
    pub async fn handle_push(&self, event: PushEvent) {
        if !self.config.webhook_update {
            return;
        }

        let branch = event.branch_name().to_string();

        if event.is_deletion() {
            let removed = self.tentacles.write().await.remove(&branch);
            if let Some(sup) = removed {
                sup.stop().await;
                if let Err(e) = sup.workspace().destroy(sup.is_running().await).await {
                    self.log(
                        LogLevel::Warning,
                        format!("failed to remove workspace for deleted branch '{branch}': {e}"),
                    )
                    .await;
                }
            }
            return;
        }

        let existing = self.tentacles.read().await.get(&branch).cloned();
        match existing {
            Some(sup) => sup.update(false).await,
            None => match self.new_supervisor(&branch) {
                Ok(sup) => {
                    self.tentacles
                        .write()
                        .await
                        .insert(branch.clone(), sup.clone());
                    if let Err(e) = sup.ensure_or_fetch().await {
                        self.log(
                            LogLevel::Error,
                            format!(
                                "workspace ensure/fetch failed for new branch '{branch}': {e}"
                            ),
                        )
                        .await;
                        return;
                    }
                    sup.build().await;
                    sup.start().await;
                }
                Err(e) => {
                    self.log(
                        LogLevel::Error,
                        format!("failed to construct supervisor for new branch '{branch}': {e}"),
                    )
                    .await;
                }
            },
        }
    }

    /// Stop every Supervisor. Used by the signal handler; partial failure
    /// stopping one Tentacle must not prevent stopping the others.
    pub async fn stop_all(&self) {
        let supervisors: Vec<Arc<Supervisor>> =
            self.tentacles.read().await.values().cloned().collect();
        for sup in supervisors {
            sup.stop().await;
        }
    }

    pub async fn find(&self, name: &str) -> Option<Arc<Supervisor>> {
        self.tentacles.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<Supervisor>> {
        self.tentacles.read().await.values().cloned().collect()
    }

    pub async fn system_logs(&self) -> Vec<SystemLogEntry> {
        self.system_log.read().await.clone()
    }

    pub fn branches_dir(&self) -> &Path {
        &self.branches_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandsConfig, FilterMode};
    use crate::events::{NoopObserver, TriState};
    use crate::git_client::GitError;
    use crate::hosting::HostingApiError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    /// `HostingApi` fake: returns a fixed branch list, no network involved.
    struct FakeHostingApi {
        branches: Vec<String>,
    }

    #[async_trait]
    impl HostingApi for FakeHostingApi {
        async fn list_branches(&self) -> Result<Vec<String>, HostingApiError> {
            Ok(self.branches.clone())
        }
    }

    /// `GitClient` fake: "clones" by creating an empty directory and hands
    /// back a fixed SHA, so fleet-level tests never shell out to `git`.
    struct FakeGitClient {
        rev: StdMutex<String>,
    }

    impl FakeGitClient {
        fn new(rev: &str) -> Self {
            Self {
                rev: StdMutex::new(rev.to_string()),
            }
        }
    }

    #[async_trait]
    impl GitClient for FakeGitClient {
        async fn clone_shallow(
            &self,
            _remote_url: &str,
            _branch: &str,
            dest: &Path,
        ) -> Result<(), GitError> {
            tokio::fs::create_dir_all(dest).await?;
            Ok(())
        }

        async fn fetch_prune(&self, _repo: &Path) -> Result<(), GitError> {
            Ok(())
        }

        async fn checkout_force(&self, _repo: &Path, _branch: &str) -> Result<(), GitError> {
            Ok(())
        }

        async fn rev_parse_head(&self, _repo: &Path) -> Result<String, GitError> {
            Ok(self.rev.lock().unwrap().clone())
        }
    }

    fn test_config(branches_dir: &Path, clear_redundant: bool) -> TentacleConfig {
        TentacleConfig {
            repo_full_name: "acme/widgets".to_string(),
            branches_dir: branches_dir.to_string_lossy().to_string(),
            filter_mode: FilterMode::Exclude,
            filter_branches: Vec::new(),
            commands: CommandsConfig {
                build: Vec::new(),
                start: "true".to_string(),
            },
            clear_redundant_local_branches: clear_redundant,
            ..TentacleConfig::default()
        }
    }

    fn test_fleet(
        branches: &[&str],
        branches_dir: &Path,
        clear_redundant: bool,
    ) -> FleetController {
        test_fleet_with_start(branches, branches_dir, clear_redundant, "true")
    }

    fn test_fleet_with_start(
        branches: &[&str],
        branches_dir: &Path,
        clear_redundant: bool,
        start: &str,
    ) -> FleetController {
        let mut config = test_config(branches_dir, clear_redundant);
        config.commands.start = start.to_string();
        FleetController::new(
            config,
            Arc::new(FakeHostingApi {
                branches: branches.iter().map(|b| b.to_string()).collect(),
            }),
            Arc::new(FakeGitClient::new("deadbeef")),
            Arc::new(NoopObserver),
        )
    }

    #[tokio::test]
    async fn init_constructs_builds_and_starts_every_remote_branch() {
        let dir = tempdir().unwrap();
        let fleet = test_fleet(&["main", "feat/x"], dir.path(), false);

        fleet.init().await.unwrap();

        let sups = fleet.list().await;
        assert_eq!(sups.len(), 2);
        assert!(fleet.find("main").await.is_some());
        assert!(fleet.find("feat/x").await.is_some());

        let snap = fleet.find("main").await.unwrap().snapshot().await;
        assert_eq!(snap.build_success, TriState::Success);
    }

    #[tokio::test]
    async fn clear_redundant_local_branches_removes_stale_dirs_on_init() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("stale")).unwrap();

        let fleet = test_fleet(&["main"], dir.path(), true);
        fleet.init().await.unwrap();

        assert!(!dir.path().join("stale").exists());
        assert!(dir.path().join("main").exists());
    }

    #[tokio::test]
    async fn handle_push_updates_an_existing_branch() {
        let dir = tempdir().unwrap();
        let fleet = test_fleet(&["main"], dir.path(), false);
        fleet.init().await.unwrap();

        fleet
            .handle_push(PushEvent {
                ref_name: "refs/heads/main".to_string(),
                after: "cafefeed".to_string(),
            })
            .await;

        assert!(fleet.find("main").await.is_some());
    }

    #[tokio::test]
    async fn handle_push_constructs_a_new_branch() {
        let dir = tempdir().unwrap();
        let fleet = test_fleet(&[], dir.path(), false);
        fleet.init().await.unwrap();
        assert!(fleet.list().await.is_empty());

        fleet
            .handle_push(PushEvent {
                ref_name: "refs/heads/feat".to_string(),
                after: "cafefeed".to_string(),
            })
            .await;

        assert!(fleet.find("feat").await.is_some());
        assert!(dir.path().join("feat").exists());
    }

    #[tokio::test]
    async fn handle_push_deletion_removes_supervisor_and_workspace() {
        let dir = tempdir().unwrap();
        let fleet = test_fleet(&["feat"], dir.path(), false);
        fleet.init().await.unwrap();
        assert!(dir.path().join("feat").exists());

        fleet
            .handle_push(PushEvent {
                ref_name: "refs/heads/feat".to_string(),
                after: ZERO_SHA.to_string(),
            })
            .await;

        assert!(fleet.find("feat").await.is_none());
        assert!(!dir.path().join("feat").exists());
    }

    #[tokio::test]
    async fn handle_push_is_a_noop_when_webhook_update_disabled() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), false);
        config.webhook_update = false;
        let fleet = FleetController::new(
            config,
            Arc::new(FakeHostingApi { branches: vec![] }),
            Arc::new(FakeGitClient::new("deadbeef")),
            Arc::new(NoopObserver),
        );
        fleet.init().await.unwrap();

        fleet
            .handle_push(PushEvent {
                ref_name: "refs/heads/feat".to_string(),
                after: "cafefeed".to_string(),
            })
            .await;

        assert!(fleet.find("feat").await.is_none());
    }

    #[tokio::test]
    async fn stop_all_stops_every_supervisor() {
        let dir = tempdir().unwrap();
        // A long-lived start command so each Tentacle is still running when
        // stop_all() is called, rather than having already exited on its own.
        let fleet = test_fleet_with_start(&["main", "feat/x"], dir.path(), false, "sleep 30");
        fleet.init().await.unwrap();

        for sup in fleet.list().await {
            assert!(sup.is_running().await);
        }

        fleet.stop_all().await;

        for sup in fleet.list().await {
            assert!(!sup.is_running().await);
        }
    }

    #[test]
    fn push_event_parses_last_segment_of_ref() {
        let event = PushEvent {
            ref_name: "refs/heads/feat/x".to_string(),
            after: "abc123".to_string(),
        };
        // Documented misparse: only the final segment survives.
        assert_eq!(event.branch_name(), "x");
    }

    #[test]
    fn push_event_single_segment_branch_parses_correctly() {
        let event = PushEvent {
            ref_name: "refs/heads/main".to_string(),
            after: "abc123".to_string(),
        };
        assert_eq!(event.branch_name(), "main");
    }

    #[test]
    fn push_event_zero_sha_is_deletion() {
        let event = PushEvent {
            ref_name: "refs/heads/feat-x".to_string(),
            after: ZERO_SHA.to_string(),
        };
        assert!(event.is_deletion());
    }

    #[test]
    fn push_event_nonzero_sha_is_not_deletion() {
        let event = PushEvent {
            ref_name: "refs/heads/feat-x".to_string(),
            after: "abc123".to_string(),
        };
        assert!(!event.is_deletion());
    }
}
