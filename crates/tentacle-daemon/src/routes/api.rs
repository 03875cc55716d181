//! Dashboard API (§6): JSON read endpoints plus the restart trigger.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use tentacle_core::events::LogKind;

use crate::state::AppState;

#[derive(Serialize)]
struct TentacleSummary {
    name: String,
    url: String,
    is_build_success: bool,
    is_start_success: bool,
    last_commit: Option<String>,
}

#[derive(Serialize)]
struct TentaclesResponse {
    tentacles: Vec<TentacleSummary>,
    total: usize,
}

pub async fn list_tentacles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let supervisors = state.fleet.list().await;
    let mut tentacles = Vec::with_capacity(supervisors.len());

    for sup in &supervisors {
        let snap = sup.snapshot().await;
        tentacles.push(TentacleSummary {
            name: sup.branch().to_string(),
            url: format!("/tentacle/{}/", sup.branch()),
            is_build_success: snap.build_success.is_success(),
            is_start_success: snap.start_success.is_success(),
            last_commit: snap.local_sha,
        });
    }

    let total = tentacles.len();
    Json(TentaclesResponse { tentacles, total })
}

#[derive(Serialize)]
struct LogsResponse {
    logs: Vec<String>,
}

pub async fn tentacle_logs(
    State(state): State<Arc<AppState>>,
    Path((name, kind)): Path<(String, String)>,
) -> impl IntoResponse {
    let kind = match kind.as_str() {
        "build" => LogKind::Build,
        "start" => LogKind::Start,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("unknown log kind '{kind}'")})),
            )
                .into_response()
        }
    };

    match state.fleet.find(&name).await {
        Some(sup) => Json(LogsResponse {
            logs: sup.get_logs(kind).await,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("tentacle '{name}' not found")})),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct RestartResponse {
    is_clean: bool,
}

async fn restart(state: Arc<AppState>, name: String, clean: bool) -> axum::response::Response {
    match state.fleet.find(&name).await {
        Some(sup) => {
            tokio::spawn(async move { sup.update(clean).await });
            Json(RestartResponse { is_clean: clean }).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("tentacle '{name}' not found")})),
        )
            .into_response(),
    }
}

pub async fn restart_default(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    restart(state, name, false).await
}

pub async fn restart_with_clean(
    State(state): State<Arc<AppState>>,
    Path((name, clean)): Path<(String, bool)>,
) -> impl IntoResponse {
    restart(state, name, clean).await
}

#[derive(Serialize)]
struct SystemLogsResponse {
    logs: Vec<tentacle_core::events::SystemLogEntry>,
}

pub async fn system_logs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SystemLogsResponse {
        logs: state.fleet.system_logs().await,
    })
}
