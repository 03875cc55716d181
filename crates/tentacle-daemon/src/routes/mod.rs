mod api;
mod proxy;
mod webhook;
mod ws;

use std::sync::Arc;

use axum::routing::{any, get, get_service, post};
use axum::Router;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/",
            get_service(ServeFile::new(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/static/index.html"
            ))),
        )
        .route("/api/tentacles", get(api::list_tentacles))
        .route("/api/tentacles/system-logs", get(api::system_logs))
        .route("/api/tentacles/:name/logs/:kind", get(api::tentacle_logs))
        .route("/api/tentacles/:name/restart", get(api::restart_default))
        .route(
            "/api/tentacles/:name/restart/:clean",
            get(api::restart_with_clean),
        )
        .route("/webhook", post(webhook::webhook))
        .route("/ws", get(ws::ws_handler))
        .route("/tentacle/*rest", any(proxy::tentacle_proxy))
        .fallback(proxy::fallback_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
