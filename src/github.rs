//! GitHub REST implementation of the [`IssueStore`] capability.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::StoreError;
use crate::model::{Comment, CommitState, Issue, Repository};
use crate::store::IssueStore;

/// Comments and issue listings are paginated; 100 is the API maximum.
const PER_PAGE: usize = 100;

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    api_url: String,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest {
    labels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CommentRequest {
    body: String,
}

#[derive(Debug, Serialize)]
struct CommitStatusRequest {
    state: CommitState,
    description: String,
    context: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    head: PullRequestRefResponse,
}

#[derive(Debug, Deserialize)]
struct PullRequestRefResponse {
    sha: String,
}

/// Classify an API error response into the store error taxonomy.
///
/// GitHub reports primary rate limiting as 403 with a rate-limit message and
/// secondary rate limiting as 429.
fn classify_error(status: StatusCode, message: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
        StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => {
            StoreError::RateLimited
        }
        StatusCode::FORBIDDEN => StoreError::Forbidden,
        _ => StoreError::Api {
            status: status.as_u16(),
            message: message.to_string(),
        },
    }
}

impl GitHubClient {
    pub fn new(token: String, api_url: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("depbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            token,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn repo_url(&self, repo: &Repository, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_url, repo.owner, repo.repo, path
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn check(&self, response: Response, what: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        error!("GitHub API error {what}: {status} - {message}");
        Err(classify_error(status, &message))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, StoreError> {
        let response = self.authorized(self.client.get(url)).send().await?;
        Ok(self.check(response, what).await?.json().await?)
    }

    /// Fetch every page of a list endpoint. `url` must not already carry
    /// query parameters for pagination.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<Vec<T>, StoreError> {
        let separator = if url.contains('?') { '&' } else { '?' };
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let page_url = format!("{url}{separator}page={page}&per_page={PER_PAGE}");
            let items: Vec<T> = self.get_json(&page_url, what).await?;
            let count = items.len();
            all.extend(items);

            // Fewer items than a full page means this was the last one.
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all)
    }
}

#[async_trait]
impl IssueStore for GitHubClient {
    async fn fetch_issue(&self, repo: &Repository, number: u64) -> Result<Issue, StoreError> {
        info!("Fetching issue {repo}#{number}");
        let url = self.repo_url(repo, &format!("/issues/{number}"));
        self.get_json(&url, "fetching issue").await
    }

    async fn list_open_issues(
        &self,
        repo: &Repository,
        include_issues: bool,
    ) -> Result<Vec<Issue>, StoreError> {
        if include_issues {
            // The issues listing includes pull requests.
            let url = self.repo_url(repo, "/issues?state=open");
            let issues = self.get_paginated(&url, "listing issues").await?;
            info!("Found {} open issues in {repo}", issues.len());
            Ok(issues)
        } else {
            let url = self.repo_url(repo, "/pulls?state=open");
            let mut pulls: Vec<Issue> = self.get_paginated(&url, "listing pull requests").await?;
            // The pulls listing has no `pull_request` marker field; everything
            // it returns is a pull request by construction.
            for pull in &mut pulls {
                pull.is_pull_request = true;
            }
            info!("Found {} open pull requests in {repo}", pulls.len());
            Ok(pulls)
        }
    }

    async fn list_comments(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<Vec<Comment>, StoreError> {
        let url = self.repo_url(repo, &format!("/issues/{number}/comments"));
        let comments = self.get_paginated(&url, "listing comments").await?;
        info!("Found {} comments on {repo}#{number}", comments.len());
        Ok(comments)
    }

    async fn add_label(
        &self,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), StoreError> {
        info!("Adding label {label:?} to {repo}#{number}");
        let url = self.repo_url(repo, &format!("/issues/{number}/labels"));
        let body = AddLabelsRequest {
            labels: vec![label.to_string()],
        };
        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        self.check(response, "adding label").await?;
        Ok(())
    }

    async fn remove_label(
        &self,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), StoreError> {
        info!("Removing label {label:?} from {repo}#{number}");
        let url = self.repo_url(repo, &format!("/issues/{number}/labels/{label}"));
        let response = self.authorized(self.client.delete(&url)).send().await?;
        self.check(response, "removing label").await?;
        Ok(())
    }

    async fn create_comment(
        &self,
        repo: &Repository,
        number: u64,
        body: &str,
    ) -> Result<(), StoreError> {
        info!("Creating comment on {repo}#{number}");
        let url = self.repo_url(repo, &format!("/issues/{number}/comments"));
        let request = CommentRequest {
            body: body.to_string(),
        };
        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await?;
        self.check(response, "creating comment").await?;
        Ok(())
    }

    async fn update_comment(
        &self,
        repo: &Repository,
        comment_id: u64,
        body: &str,
    ) -> Result<(), StoreError> {
        info!("Updating comment {comment_id} in {repo}");
        let url = self.repo_url(repo, &format!("/issues/comments/{comment_id}"));
        let request = CommentRequest {
            body: body.to_string(),
        };
        let response = self
            .authorized(self.client.patch(&url))
            .json(&request)
            .send()
            .await?;
        self.check(response, "updating comment").await?;
        Ok(())
    }

    async fn delete_comment(&self, repo: &Repository, comment_id: u64) -> Result<(), StoreError> {
        info!("Deleting comment {comment_id} in {repo}");
        let url = self.repo_url(repo, &format!("/issues/comments/{comment_id}"));
        let response = self.authorized(self.client.delete(&url)).send().await?;
        self.check(response, "deleting comment").await?;
        Ok(())
    }

    async fn pull_request_head_sha(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<String, StoreError> {
        let url = self.repo_url(repo, &format!("/pulls/{number}"));
        let pull: PullRequestResponse = self.get_json(&url, "fetching pull request").await?;
        Ok(pull.head.sha)
    }

    async fn set_commit_status(
        &self,
        repo: &Repository,
        sha: &str,
        state: CommitState,
        description: &str,
        context: &str,
    ) -> Result<(), StoreError> {
        info!("Setting commit status {state} on {repo}@{sha}");
        let url = self.repo_url(repo, &format!("/statuses/{sha}"));
        let request = CommitStatusRequest {
            state,
            description: description.to_string(),
            context: context.to_string(),
        };
        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await?;
        self.check(response, "setting commit status").await?;
        Ok(())
    }
}
