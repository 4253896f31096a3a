//! The issue-store capability consumed by the core.
//!
//! `IssueStore` is the seam between the bot's logic and the hosting API.
//! The real implementation is [`GitHubClient`](crate::github::GitHubClient);
//! [`InMemoryStore`] backs the tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{Comment, CommitState, Issue, IssueState, Repository};

#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn fetch_issue(&self, repo: &Repository, number: u64) -> Result<Issue, StoreError>;

    /// List the open issues/PRs of a repository. With `include_issues` the
    /// listing covers all open issues (PRs included); without it, only open
    /// pull requests.
    async fn list_open_issues(
        &self,
        repo: &Repository,
        include_issues: bool,
    ) -> Result<Vec<Issue>, StoreError>;

    /// List every comment on an issue. Pagination is internal.
    async fn list_comments(&self, repo: &Repository, number: u64)
        -> Result<Vec<Comment>, StoreError>;

    async fn add_label(&self, repo: &Repository, number: u64, label: &str)
        -> Result<(), StoreError>;

    async fn remove_label(
        &self,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), StoreError>;

    async fn create_comment(
        &self,
        repo: &Repository,
        number: u64,
        body: &str,
    ) -> Result<(), StoreError>;

    async fn update_comment(
        &self,
        repo: &Repository,
        comment_id: u64,
        body: &str,
    ) -> Result<(), StoreError>;

    async fn delete_comment(&self, repo: &Repository, comment_id: u64) -> Result<(), StoreError>;

    async fn pull_request_head_sha(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<String, StoreError>;

    async fn set_commit_status(
        &self,
        repo: &Repository,
        sha: &str,
        state: CommitState,
        description: &str,
        context: &str,
    ) -> Result<(), StoreError>;
}

/// Counts of store calls, for asserting idempotence in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub issue_fetches: usize,
    pub comments_created: usize,
    pub comments_updated: usize,
    pub comments_deleted: usize,
    pub labels_added: usize,
    pub labels_removed: usize,
    pub statuses_set: usize,
}

/// A commit status as recorded by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatus {
    pub repo: String,
    pub sha: String,
    pub state: CommitState,
    pub description: String,
    pub context: String,
}

#[derive(Debug, Clone)]
struct StoredComment {
    repo: String,
    issue_number: u64,
    comment: Comment,
}

/// In-memory issue store.
///
/// Issues are keyed by `(full repo name, number)`; comments get sequential
/// ids. Every mutating call is counted so tests can assert that idempotent
/// paths perform no I/O.
#[derive(Default)]
pub struct InMemoryStore {
    issues: RwLock<HashMap<(String, u64), Issue>>,
    comments: RwLock<Vec<StoredComment>>,
    head_shas: RwLock<HashMap<(String, u64), String>>,
    statuses: RwLock<Vec<RecordedStatus>>,
    counts: RwLock<StoreCounts>,
    next_comment_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_comment_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub async fn seed_issue(&self, repo: &Repository, issue: Issue) {
        let mut issues = self.issues.write().await;
        issues.insert((repo.full_name(), issue.number), issue);
    }

    pub async fn seed_comment(&self, repo: &Repository, issue_number: u64, body: &str) -> u64 {
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let mut comments = self.comments.write().await;
        comments.push(StoredComment {
            repo: repo.full_name(),
            issue_number,
            comment: Comment {
                id,
                body: body.to_string(),
            },
        });
        id
    }

    pub async fn set_head_sha(&self, repo: &Repository, number: u64, sha: &str) {
        let mut shas = self.head_shas.write().await;
        shas.insert((repo.full_name(), number), sha.to_string());
    }

    pub async fn labels(&self, repo: &Repository, number: u64) -> Vec<String> {
        let issues = self.issues.read().await;
        issues
            .get(&(repo.full_name(), number))
            .map(|issue| issue.labels.clone())
            .unwrap_or_default()
    }

    pub async fn comments(&self, repo: &Repository, number: u64) -> Vec<Comment> {
        let comments = self.comments.read().await;
        comments
            .iter()
            .filter(|stored| stored.repo == repo.full_name() && stored.issue_number == number)
            .map(|stored| stored.comment.clone())
            .collect()
    }

    pub async fn statuses(&self) -> Vec<RecordedStatus> {
        self.statuses.read().await.clone()
    }

    pub async fn counts(&self) -> StoreCounts {
        *self.counts.read().await
    }
}

#[async_trait]
impl IssueStore for InMemoryStore {
    async fn fetch_issue(&self, repo: &Repository, number: u64) -> Result<Issue, StoreError> {
        self.counts.write().await.issue_fetches += 1;
        let issues = self.issues.read().await;
        issues
            .get(&(repo.full_name(), number))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_open_issues(
        &self,
        repo: &Repository,
        include_issues: bool,
    ) -> Result<Vec<Issue>, StoreError> {
        let issues = self.issues.read().await;
        let mut open: Vec<Issue> = issues
            .iter()
            .filter(|((full_name, _), issue)| {
                *full_name == repo.full_name()
                    && issue.state == IssueState::Open
                    && (include_issues || issue.is_pull_request)
            })
            .map(|(_, issue)| issue.clone())
            .collect();
        open.sort_by_key(|issue| issue.number);
        Ok(open)
    }

    async fn list_comments(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<Vec<Comment>, StoreError> {
        Ok(self.comments(repo, number).await)
    }

    async fn add_label(
        &self,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), StoreError> {
        self.counts.write().await.labels_added += 1;
        let mut issues = self.issues.write().await;
        let issue = issues
            .get_mut(&(repo.full_name(), number))
            .ok_or(StoreError::NotFound)?;
        if !issue.labels.iter().any(|existing| existing == label) {
            issue.labels.push(label.to_string());
        }
        Ok(())
    }

    async fn remove_label(
        &self,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), StoreError> {
        self.counts.write().await.labels_removed += 1;
        let mut issues = self.issues.write().await;
        let issue = issues
            .get_mut(&(repo.full_name(), number))
            .ok_or(StoreError::NotFound)?;
        issue.labels.retain(|existing| existing != label);
        Ok(())
    }

    async fn create_comment(
        &self,
        repo: &Repository,
        number: u64,
        body: &str,
    ) -> Result<(), StoreError> {
        self.counts.write().await.comments_created += 1;
        self.seed_comment(repo, number, body).await;
        Ok(())
    }

    async fn update_comment(
        &self,
        repo: &Repository,
        comment_id: u64,
        body: &str,
    ) -> Result<(), StoreError> {
        self.counts.write().await.comments_updated += 1;
        let mut comments = self.comments.write().await;
        let stored = comments
            .iter_mut()
            .find(|stored| stored.repo == repo.full_name() && stored.comment.id == comment_id)
            .ok_or(StoreError::NotFound)?;
        stored.comment.body = body.to_string();
        Ok(())
    }

    async fn delete_comment(&self, repo: &Repository, comment_id: u64) -> Result<(), StoreError> {
        self.counts.write().await.comments_deleted += 1;
        let mut comments = self.comments.write().await;
        let before = comments.len();
        comments
            .retain(|stored| !(stored.repo == repo.full_name() && stored.comment.id == comment_id));
        if comments.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn pull_request_head_sha(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<String, StoreError> {
        let shas = self.head_shas.read().await;
        shas.get(&(repo.full_name(), number))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn set_commit_status(
        &self,
        repo: &Repository,
        sha: &str,
        state: CommitState,
        description: &str,
        context: &str,
    ) -> Result<(), StoreError> {
        self.counts.write().await.statuses_set += 1;
        let mut statuses = self.statuses.write().await;
        statuses.push(RecordedStatus {
            repo: repo.full_name(),
            sha: sha.to_string(),
            state,
            description: description.to_string(),
            context: context.to_string(),
        });
        Ok(())
    }
}
