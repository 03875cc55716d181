//! Webhook intake (§6): a `POST /webhook` that returns immediately while
//! `handle_push` runs in the background.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::Value;
use tentacle_core::fleet::PushEvent;

use crate::state::AppState;

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if body.get("zen").is_some() {
        return Json(serde_json::json!({"status": "ping"})).into_response();
    }

    let ref_name = body.get("ref").and_then(Value::as_str).map(str::to_string);
    let after = body
        .get("after")
        .and_then(Value::as_str)
        .map(str::to_string);

    let (ref_name, after) = match (ref_name, after) {
        (Some(r), Some(a)) => (r, a),
        _ => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": "payload missing 'ref' or 'after'",
                })),
            )
                .into_response()
        }
    };

    let event = PushEvent { ref_name, after };
    tokio::spawn(async move {
        state.fleet.handle_push(event).await;
    });

    Json(serde_json::json!({"status": "update_started"})).into_response()
}
