//! Reverse Proxy (§4.5): routes `/tentacle/<branch>/<path>` into the
//! supervised process bound to that branch's port, rewriting HTML bodies so
//! the mounted service behaves as if served from the origin.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tentacle_core::html_rewrite::rewrite_html;

use crate::state::AppState;

const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "content-security-policy",
    "x-frame-options",
    "cross-origin-resource-policy",
    "cross-origin-opener-policy",
    "cross-origin-embedder-policy",
];

/// Splits `rest` (the full path after `/tentacle/`) into a known branch name
/// and the remaining upstream path, by longest-prefix match against the
/// currently live branches. Falls back to treating the first segment as the
/// branch name when nothing matches, so the 404 message still names
/// something sensible.
async fn longest_matching_branch(state: &AppState, rest: &str) -> Option<String> {
    let branches = state.fleet.list().await;

    let mut best: Option<&str> = None;
    for sup in &branches {
        let branch = sup.branch();
        let matches = rest == branch || rest.starts_with(&format!("{branch}/"));
        if matches && best.map(|b| branch.len() > b.len()).unwrap_or(true) {
            best = Some(branch);
        }
    }
    best.map(str::to_string)
}

async fn split_branch_and_path(state: &AppState, rest: &str) -> (String, String) {
    match longest_matching_branch(state, rest).await {
        Some(branch) => {
            let path = rest
                .strip_prefix(&branch)
                .unwrap_or("")
                .trim_start_matches('/');
            (branch, path.to_string())
        }
        None => {
            let branch = rest.split('/').next().unwrap_or(rest).to_string();
            let path = rest.splitn(2, '/').nth(1).unwrap_or("").to_string();
            (branch, path)
        }
    }
}

async fn forward(
    state: &AppState,
    branch: &str,
    upstream_path: &str,
    query: Option<&str>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(sup) = state.fleet.find(branch).await else {
        return (
            StatusCode::NOT_FOUND,
            format!("Tentacle for branch '{branch}' not found"),
        )
            .into_response();
    };

    let mut target = format!("http://{}:{}/{upstream_path}", sup.host(), sup.port());
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(q);
    }

    let mut req = state
        .http
        .request(method, &target)
        .body(body.to_vec());

    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        req = req.header(name, value);
    }

    let upstream = match req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                format!("Error proxying: {e}"),
            )
                .into_response()
        }
    };

    let status = upstream.status();
    let is_html = upstream
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers().iter() {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        response_headers.insert(name.clone(), value.clone());
    }

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        builder = builder.header(name, value);
    }

    // HTML must be buffered to apply the base-href/URL rewrite; anything
    // else is streamed straight through rather than held in memory.
    if is_html {
        let bytes = match upstream.bytes().await {
            Ok(b) => b,
            Err(e) => return (StatusCode::BAD_GATEWAY, format!("Error proxying: {e}")).into_response(),
        };
        let html = String::from_utf8_lossy(&bytes);
        let base = format!("/tentacle/{branch}/");
        let rewritten = rewrite_html(&html, &base).into_bytes();
        builder.body(axum::body::Body::from(rewritten)).unwrap()
    } else {
        builder
            .body(axum::body::Body::from_stream(upstream.bytes_stream()))
            .unwrap()
    }
}

pub async fn tentacle_proxy(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
    method: Method,
    headers: HeaderMap,
    uri: OriginalUri,
    body: Bytes,
) -> Response {
    let (branch, path) = split_branch_and_path(&state, &rest).await;
    forward(&state, &branch, &path, uri.query(), method, headers, body).await
}

static REFERER_TENTACLE_PATH: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"/tentacle/([^?#]+)").unwrap());

/// Recovers a branch from the `Referer` header by matching the same
/// `/tentacle/<...>` shape the primary route dispatches on, then resolving
/// it against known branches with the same longest-prefix rule.
async fn branch_from_referer(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let referer = headers
        .get(axum::http::header::REFERER)
        .and_then(|v| v.to_str().ok())?;
    let rest = REFERER_TENTACLE_PATH.captures(referer).map(|c| c[1].to_string())?;
    longest_matching_branch(state, &rest).await
}

pub async fn fallback_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    uri: OriginalUri,
    body: Bytes,
) -> Response {
    let path = uri.path().trim_start_matches('/').to_string();

    match branch_from_referer(&state, &headers).await {
        Some(branch) => forward(&state, &branch, &path, uri.query(), method, headers, body).await,
        None => (StatusCode::NOT_FOUND, format!("Unknown path: /{path}")).into_response(),
    }
}
