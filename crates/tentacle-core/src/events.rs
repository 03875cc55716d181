//! Tri-state status, the Observer seam, and the event payloads broadcast by
//! the Event Bus (§4.5, §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LogLevel;

/// `{Unknown, Success, Failure}` summary of a build or start outcome.
/// Deliberately not `Option<bool>` (§9 design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Unknown,
    Success,
    Failure,
}

impl TriState {
    pub fn is_success(self) -> bool {
        matches!(self, TriState::Success)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TriState::Failure)
    }
}

impl Default for TriState {
    fn default() -> Self {
        TriState::Unknown
    }
}

/// Which log buffer a `/logs/<kind>` request or `logs_update` event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Build,
    Start,
}

/// One structured entry in the Fleet's system log (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A snapshot of one Tentacle's build/start status, for `status_update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub branch: String,
    pub build_status: TriState,
    pub start_status: TriState,
}

/// The three event types the Event Bus broadcasts (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TentacleEvent {
    StatusUpdate(StatusSnapshot),
    LogsUpdate {
        branch: String,
        kind: LogKind,
        line: String,
    },
    SystemLogsUpdate(SystemLogEntry),
}

/// Narrow interface a Supervisor/Fleet Controller holds by reference to
/// publish events, so the leaf never references the HTTP layer directly
/// (§9). Broadcast failures must be swallowed by implementations — this
/// trait has no `Result` return for that reason.
pub trait Observer: Send + Sync {
    fn notify(&self, event: TentacleEvent);
}

/// Default observer used when nothing is subscribed; drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn notify(&self, _event: TentacleEvent) {}
}
