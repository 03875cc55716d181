//! Process Runner (§4.2): shell-command execution in a dedicated process
//! group, line-oriented output streaming, and whole-group termination.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Default grace period before a forced kill (§5: "fixed 5-second grace").
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command exited {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of `run_sync`: a completed synchronous command execution.
#[derive(Debug, Clone)]
pub struct SyncOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Build a `Command` detached into its own process group, so termination can
/// be fanned out to grandchildren rather than just the direct child.
fn new_grouped_command(cmd: &str, cwd: &Path) -> Command {
    let mut command = shell_command(cmd);
    command.current_dir(cwd);
    command.stdin(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // pgid 0 => new process group whose id equals the child's pid.
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    command
}

#[cfg(unix)]
fn shell_command(cmd: &str) -> Command {
    let mut c = Command::new("sh");
    c.arg("-c").arg(cmd);
    c
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> Command {
    let mut c = Command::new("cmd");
    c.arg("/C").arg(cmd);
    c
}

/// Run `cmd` to completion, capturing stdout/stderr fully. Used for build
/// steps, which must complete before the next one runs.
pub async fn run_sync(cmd: &str, cwd: &Path) -> Result<SyncOutput, ProcessError> {
    let output = new_grouped_command(cmd, cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProcessError::Spawn(e.to_string()))?;

    Ok(SyncOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// A handle to a running service process, placed in its own process group.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Spawn `cmd` as a long-lived service process. The child is placed in its
/// own process group so `terminate` can reach grandchildren.
pub async fn spawn(cmd: &str, cwd: &Path) -> Result<ProcessHandle, ProcessError> {
    let mut command = new_grouped_command(cmd, cwd);
    let child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessError::Spawn(e.to_string()))?;

    let pid = child.id().ok_or_else(|| {
        ProcessError::Spawn("child exited before its pid could be read".to_string())
    })?;

    Ok(ProcessHandle { child, pid })
}

/// One line from a running process's stdout or stderr.
#[derive(Debug, Clone)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Take ownership of a handle's output pipes and stream lines from both
/// until each reaches EOF. Reader failures are swallowed — the channel
/// simply stops producing for that stream (§4.2: "Reader failures are
/// swallowed silently").
pub fn stream(handle: &mut ProcessHandle) -> mpsc::UnboundedReceiver<OutputLine> {
    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = handle.child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(OutputLine::Stdout(line)).is_err() {
                    break;
                }
            }
        });
    }

    if let Some(stderr) = handle.child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(OutputLine::Stderr(line)).is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Wait for the child to exit, returning its exit code. Intended to be
/// raced against nothing else — callers decide cancellation policy.
pub async fn wait(handle: &mut ProcessHandle) -> Result<i32, ProcessError> {
    let status = handle.child.wait().await?;
    Ok(status.code().unwrap_or(-1))
}

/// Terminate the handle's whole process group: SIGTERM (POSIX) or
/// CTRL_BREAK-equivalent (Windows), waiting up to `grace` before a forced
/// kill.
pub async fn terminate(handle: &mut ProcessHandle, grace: Duration) -> Result<(), ProcessError> {
    #[cfg(unix)]
    {
        terminate_unix(handle, grace).await
    }
    #[cfg(windows)]
    {
        terminate_windows(handle, grace).await
    }
}

#[cfg(unix)]
async fn terminate_unix(handle: &mut ProcessHandle, grace: Duration) -> Result<(), ProcessError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Negative pid addresses the whole process group (setsid'd to pid == pgid).
    let pgid = Pid::from_raw(-(handle.pid as i32));
    let _ = kill(pgid, Signal::SIGTERM);

    if tokio::time::timeout(grace, handle.child.wait())
        .await
        .is_err()
    {
        let _ = kill(pgid, Signal::SIGKILL);
        let _ = handle.child.wait().await;
    }

    Ok(())
}

#[cfg(windows)]
async fn terminate_windows(
    handle: &mut ProcessHandle,
    grace: Duration,
) -> Result<(), ProcessError> {
    let pid = handle.pid;
    let _ = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .status()
        .await;

    if tokio::time::timeout(grace, handle.child.wait())
        .await
        .is_err()
    {
        let _ = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status()
            .await;
        let _ = handle.child.wait().await;
    }

    Ok(())
}
