//! Hosting API seam (§1, §4.4, §10.5): branch enumeration against the
//! upstream repository host. Out of scope for the core per §1 — the Fleet
//! Controller depends on the `HostingApi` trait, never on a concrete HTTP
//! client directly.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::FilterMode;

#[derive(Debug, Error)]
pub enum HostingApiError {
    #[error("hosting api request failed: {0}")]
    Request(String),

    #[error("hosting api returned status {status}: {body}")]
    BadStatus { status: u16, body: String },
}

/// Narrow interface to the upstream hosting service's branch listing.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// All branch names currently known to the host for the watched repo.
    async fn list_branches(&self) -> Result<Vec<String>, HostingApiError>;
}

/// Apply `filter_mode`/`filter_branches` (§6) to a raw branch list.
pub fn filter_branches(
    branches: Vec<String>,
    mode: FilterMode,
    filter: &[String],
) -> Vec<String> {
    branches
        .into_iter()
        .filter(|b| {
            let listed = filter.iter().any(|f| f == b);
            match mode {
                FilterMode::Include => listed,
                FilterMode::Exclude => !listed,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: String,
}

/// `HostingApi` backed by the GitHub REST API.
pub struct GithubHostingApi {
    client: reqwest::Client,
    repo_full_name: String,
    token: String,
}

impl GithubHostingApi {
    pub fn new(repo_full_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            repo_full_name: repo_full_name.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl HostingApi for GithubHostingApi {
    async fn list_branches(&self) -> Result<Vec<String>, HostingApiError> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "https://api.github.com/repos/{}/branches?per_page=100&page={page}",
                self.repo_full_name
            );

            let response = self
                .client
                .get(&url)
                .header("User-Agent", "tentacle-supervisor")
                .header("Accept", "application/vnd.github+json")
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| HostingApiError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(HostingApiError::BadStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let branches: Vec<BranchResponse> = response
                .json()
                .await
                .map_err(|e| HostingApiError::Request(e.to_string()))?;

            if branches.is_empty() {
                break;
            }

            let got = branches.len();
            all.extend(branches.into_iter().map(|b| b.name));
            if got < 100 {
                break;
            }
            page += 1;
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_mode_keeps_only_listed() {
        let branches = vec!["main".to_string(), "dev".to_string(), "feat/x".to_string()];
        let kept = filter_branches(
            branches,
            FilterMode::Include,
            &["main".to_string(), "feat/x".to_string()],
        );
        assert_eq!(kept, vec!["main".to_string(), "feat/x".to_string()]);
    }

    #[test]
    fn exclude_mode_drops_listed() {
        let branches = vec!["main".to_string(), "dev".to_string(), "feat/x".to_string()];
        let kept = filter_branches(branches, FilterMode::Exclude, &["dev".to_string()]);
        assert_eq!(kept, vec!["main".to_string(), "feat/x".to_string()]);
    }

    #[test]
    fn exclude_mode_with_empty_filter_keeps_everything() {
        let branches = vec!["main".to_string(), "dev".to_string()];
        let kept = filter_branches(branches.clone(), FilterMode::Exclude, &[]);
        assert_eq!(kept, branches);
    }

    #[test]
    fn include_mode_with_empty_filter_keeps_nothing() {
        let branches = vec!["main".to_string(), "dev".to_string()];
        let kept = filter_branches(branches, FilterMode::Include, &[]);
        assert!(kept.is_empty());
    }
}
