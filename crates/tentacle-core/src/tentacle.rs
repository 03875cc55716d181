//! Tentacle Supervisor (§4.3): the per-branch state machine combining the
//! Branch Workspace and Process Runner — build pipeline, start/stop, port
//! assignment, log retention, status broadcast.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::CommandsConfig;
use crate::events::{LogKind, Observer, StatusSnapshot, TentacleEvent, TriState};
use crate::process::{self, ProcessHandle, OutputLine};
use crate::template::{self, CommandContext};
use crate::workspace::BranchWorkspace;

/// One completed build-step record (§3: `build_log`).
#[derive(Debug, Clone)]
pub struct BuildLogRecord {
    pub command: String,
    pub output: String,
    pub exit_code: i32,
}

/// The mutable fields of a Tentacle (§3), guarded independently from the
/// live process handle so log/status reads never block on a build/start in
/// flight for longer than it takes to clone a snapshot.
#[derive(Debug, Clone, Default)]
pub struct TentacleState {
    pub remote_sha: Option<String>,
    pub local_sha: Option<String>,
    pub build_success: TriState,
    pub start_success: TriState,
    pub build_log: Vec<BuildLogRecord>,
    pub start_log: Vec<String>,
}

/// Owns one Tentacle: its identity, workspace, command templates, and the
/// mutable runtime state. `stop → build → start` are serialized by holding
/// `op_lock` for the duration of each, per §5's ordering guarantee.
pub struct Supervisor {
    branch: String,
    host: String,
    port: u16,
    commands: CommandsConfig,
    workspace: BranchWorkspace,
    remote_url: String,
    observer: Arc<dyn Observer>,
    state: Arc<RwLock<TentacleState>>,
    process: Mutex<Option<ProcessHandle>>,
    op_lock: Mutex<()>,
}

impl Supervisor {
    /// Construct a Supervisor for `branch`. Binds a throwaway socket to pick
    /// a free port (§4.3): there is a TOCTOU window before the service
    /// itself binds, accepted without retry per the design.
    pub fn new(
        branch: String,
        workspace: BranchWorkspace,
        remote_url: String,
        commands: CommandsConfig,
        observer: Arc<dyn Observer>,
    ) -> std::io::Result<Self> {
        let port = pick_free_port()?;
        Ok(Self {
            branch,
            host: "127.0.0.1".to_string(),
            port,
            commands,
            workspace,
            remote_url,
            observer,
            state: Arc::new(RwLock::new(TentacleState::default())),
            process: Mutex::new(None),
            op_lock: Mutex::new(()),
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn workspace(&self) -> &BranchWorkspace {
        &self.workspace
    }

    pub async fn snapshot(&self) -> TentacleState {
        self.state.read().await.clone()
    }

    pub async fn get_logs(&self, kind: LogKind) -> Vec<String> {
        let state = self.state.read().await;
        match kind {
            LogKind::Build => state
                .build_log
                .iter()
                .map(|r| format!("$ {}\n{}", r.command, r.output))
                .collect(),
            LogKind::Start => state.start_log.clone(),
        }
    }

    fn context(&self) -> CommandContext {
        CommandContext {
            host: self.host.clone(),
            port: self.port,
            path: format!("tentacle/{}/", self.branch),
            branch: self.branch.clone(),
        }
    }

    async fn broadcast_status(&self) {
        let state = self.state.read().await;
        self.observer.notify(TentacleEvent::StatusUpdate(StatusSnapshot {
            branch: self.branch.clone(),
            build_status: state.build_success,
            start_status: state.start_success,
        }));
    }

    /// Ensure the workspace exists (clone) or fetch it, then re-checkout.
    pub async fn ensure_or_fetch(&self) -> crate::error::Result<()> {
        if self.workspace.exists() {
            self.workspace.fetch().await
        } else {
            self.workspace.ensure(&self.remote_url).await
        }?;
        let local = self.workspace.local_sha().await;
        self.state.write().await.local_sha = local;
        Ok(())
    }

    /// Renders each build template and runs it synchronously in order.
    /// Stops at the first non-zero exit; `build_success=true` only if every
    /// rendered step exited zero (§8: build transactionality).
    pub async fn build(&self) {
        let _op = self.op_lock.lock().await;
        self.build_locked().await;
    }

    /// Body of `build()`, assuming `op_lock` is already held by the caller.
    /// Used directly by `update()` so the whole stop/build/start sequence is
    /// one critical section (§5: these "never overlap for the same Tentacle").
    async fn build_locked(&self) {
        let ctx = self.context();
        let rendered = match template::render_all(&self.commands.build, &ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                let mut state = self.state.write().await;
                state.build_success = TriState::Failure;
                state.build_log = vec![BuildLogRecord {
                    command: "<render>".to_string(),
                    output: e.to_string(),
                    exit_code: -1,
                }];
                drop(state);
                self.broadcast_status().await;
                return;
            }
        };

        let mut records = Vec::new();
        let mut failed = false;

        for command in &rendered {
            match process::run_sync(command, self.workspace.path()).await {
                Ok(out) if out.exit_code == 0 => {
                    records.push(BuildLogRecord {
                        command: command.clone(),
                        output: out.stdout,
                        exit_code: 0,
                    });
                }
                Ok(out) => {
                    records.push(BuildLogRecord {
                        command: command.clone(),
                        output: out.stderr,
                        exit_code: out.exit_code,
                    });
                    failed = true;
                    break;
                }
                Err(e) => {
                    records.push(BuildLogRecord {
                        command: command.clone(),
                        output: e.to_string(),
                        exit_code: -1,
                    });
                    failed = true;
                    break;
                }
            }
        }

        {
            let mut state = self.state.write().await;
            state.build_log = records;
            state.build_success = if failed {
                TriState::Failure
            } else {
                TriState::Success
            };
        }
        self.broadcast_status().await;
    }

    /// Idempotent w.r.t. an already-running process (§4.3).
    pub async fn start(&self) {
        let _op = self.op_lock.lock().await;
        self.start_locked().await;
    }

    /// Body of `start()`, assuming `op_lock` is already held by the caller.
    async fn start_locked(&self) {
        if self.process.lock().await.is_some() {
            warn!(branch = %self.branch, "start() called while already running");
            return;
        }

        {
            let mut state = self.state.write().await;
            state.start_log.clear();
            state.start_success = TriState::Unknown;
        }
        self.broadcast_status().await;

        let ctx = self.context();
        let rendered = match template::render(&self.commands.start, &ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                let mut state = self.state.write().await;
                state.start_success = TriState::Failure;
                state.start_log.push(e.to_string());
                drop(state);
                self.broadcast_status().await;
                return;
            }
        };

        match process::spawn(&rendered, self.workspace.path()).await {
            Ok(mut handle) => {
                let mut rx = process::stream(&mut handle);
                *self.process.lock().await = Some(handle);

                {
                    let mut state = self.state.write().await;
                    state.start_success = TriState::Success;
                }
                self.broadcast_status().await;

                let branch = self.branch.clone();
                // Readers outlive this method call, running for the
                // lifetime of the child; they get their own Arc clone of
                // the state lock rather than borrowing `self`.
                let state_handle = self.state.clone();
                let observer = self.observer.clone();

                tokio::spawn(async move {
                    while let Some(line) = rx.recv().await {
                        let (kind, text) = match line {
                            OutputLine::Stdout(l) => (LogKind::Start, l),
                            OutputLine::Stderr(l) => (LogKind::Start, l),
                        };
                        state_handle.write().await.start_log.push(text.clone());
                        observer.notify(TentacleEvent::LogsUpdate {
                            branch: branch.clone(),
                            kind,
                            line: text,
                        });
                    }
                });
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.start_success = TriState::Failure;
                state.start_log.push(e.to_string());
                drop(state);
                self.broadcast_status().await;
            }
        }
    }

    /// Terminate the live process (if any) and reset tri-state fields.
    /// Safe to call repeatedly (§8: stop idempotence).
    pub async fn stop(&self) {
        let _op = self.op_lock.lock().await;
        self.stop_locked().await;
    }

    /// Body of `stop()`, assuming `op_lock` is already held by the caller.
    async fn stop_locked(&self) {
        let mut guard = self.process.lock().await;
        if let Some(mut handle) = guard.take() {
            process::terminate(&mut handle, Duration::from_secs(5))
                .await
                .ok();
        } else {
            info!(branch = %self.branch, "stop() called on an already-stopped tentacle");
        }
        drop(guard);

        {
            let mut state = self.state.write().await;
            state.start_success = TriState::Unknown;
            state.build_success = TriState::Unknown;
        }
        self.broadcast_status().await;
    }

    /// `stop(); if clean { workspace.destroy(false) }; ensure_or_fetch(); build(); start()`.
    ///
    /// Holds `op_lock` for the entire sequence so a concurrent `update()`
    /// (e.g. two webhook deliveries, or a webhook racing a dashboard-driven
    /// restart) cannot interleave its own stop/build/start in the middle of
    /// this one (§5: stop/build/start never overlap for the same Tentacle).
    pub async fn update(&self, clean: bool) {
        let _op = self.op_lock.lock().await;

        self.stop_locked().await;
        if clean {
            // stop_locked() just tore the process down under this same
            // lock, so is_running() here can't race with a concurrent stop.
            let live = self.is_running().await;
            if let Err(e) = self.workspace.destroy(live).await {
                warn!(branch = %self.branch, error = %e, "failed to destroy workspace during clean update");
            }
        }
        if let Err(e) = self.ensure_or_fetch().await {
            warn!(branch = %self.branch, error = %e, "workspace ensure/fetch failed during update");
            let mut state = self.state.write().await;
            state.build_success = TriState::Failure;
            return;
        }
        self.build_locked().await;
        self.start_locked().await;
    }

    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }
}

fn pick_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
