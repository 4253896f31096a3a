//! Reconciliation of derived dependency state into side effects.
//!
//! Every operation here is idempotent against the live state: labels are
//! only toggled when they differ from the desired state, the bot-owned
//! comment is updated in place (and left untouched when its content is
//! already current), and commit statuses are recomputed from scratch on
//! every run. Re-running the bot against an already-reconciled issue
//! performs no mutating calls at all.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use tracing::info;

use crate::config::Config;
use crate::error::StoreError;
use crate::model::{format_dependency, CommitState, Dependency, Issue, Repository};
use crate::store::IssueStore;

/// Placeholder token in the comment template, matched case-insensitively
/// with flexible interior whitespace.
const PLACEHOLDER_PATTERN: &str = r"(?i)\{\{\s*dependencies\s*\}\}";

/// Whether a comment template contains the dependency-list placeholder.
pub fn has_dependency_placeholder(template: &str) -> bool {
    placeholder_regex().is_match(template)
}

fn placeholder_regex() -> Regex {
    Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern must compile")
}

/// The slice of run configuration the manager needs.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub label: String,
    pub comment_template: String,
    pub comment_signature: String,
    pub status_context: String,
    pub blocked_state: CommitState,
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            label: config.label.clone(),
            comment_template: config.comment_template.clone(),
            comment_signature: config.comment_signature.clone(),
            status_context: config.status_context.clone(),
            blocked_state: config.blocked_state,
        }
    }
}

pub struct IssueManager {
    store: Arc<dyn IssueStore>,
    repo: Repository,
    config: ManagerConfig,
    placeholder: Regex,
}

impl IssueManager {
    pub fn new(store: Arc<dyn IssueStore>, repo: Repository, config: ManagerConfig) -> Self {
        Self {
            store,
            repo,
            config,
            placeholder: placeholder_regex(),
        }
    }

    pub fn has_label(&self, issue: &Issue) -> bool {
        issue.labels.iter().any(|label| *label == self.config.label)
    }

    /// Add the configured label, skipping the store call when it is already
    /// present.
    pub async fn add_label(&self, issue: &Issue) -> Result<(), StoreError> {
        if self.has_label(issue) {
            return Ok(());
        }
        info!("Adding label {:?} to #{}", self.config.label, issue.number);
        self.store
            .add_label(&self.repo, issue.number, &self.config.label)
            .await
    }

    /// Remove the configured label, skipping the store call when it is
    /// already absent.
    pub async fn remove_label(&self, issue: &Issue) -> Result<(), StoreError> {
        if !self.has_label(issue) {
            return Ok(());
        }
        info!(
            "Removing label {:?} from #{}",
            self.config.label, issue.number
        );
        self.store
            .remove_label(&self.repo, issue.number, &self.config.label)
            .await
    }

    /// Render the dependency list into the configured comment template.
    ///
    /// Each dependency becomes one bullet, short-form inside the home
    /// repository; dependencies that no longer block are struck through.
    pub fn generate_comment(&self, dependencies: &[Dependency], blockers: &[Dependency]) -> String {
        let blocker_keys: HashSet<String> = blockers.iter().map(Dependency::key).collect();

        let list = dependencies
            .iter()
            .map(|dep| {
                let formatted = format_dependency(dep, Some(&self.repo));
                if blocker_keys.contains(&dep.key()) {
                    format!("* {formatted}")
                } else {
                    format!("* ~~{formatted}~~")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.placeholder
            .replace(&self.config.comment_template, regex::NoExpand(&list))
            .into_owned()
    }

    /// Create or update the bot's signed comment on an issue.
    ///
    /// The trimmed text gets the signature marker appended; the first
    /// existing comment whose trimmed body ends with the marker is the
    /// comment to synchronize. When its unsigned content already equals the
    /// new text this is a no-op (no write, no notification). With
    /// `force_recreate` an existing comment is deleted and re-created so it
    /// moves to the bottom of the thread.
    pub async fn write_comment(
        &self,
        issue: &Issue,
        text: &str,
        force_recreate: bool,
    ) -> Result<(), StoreError> {
        let trimmed = text.trim();
        let signed = format!("{}\n{}", trimmed, self.config.comment_signature);

        let comments = self.store.list_comments(&self.repo, issue.number).await?;
        let existing = comments
            .iter()
            .find(|comment| comment.body.trim().ends_with(&self.config.comment_signature));

        if let Some(comment) = existing {
            let unsigned = comment
                .body
                .trim()
                .strip_suffix(&self.config.comment_signature)
                .unwrap_or_default()
                .trim_end();
            if unsigned == trimmed {
                info!("Comment on #{} is already up to date", issue.number);
                return Ok(());
            }
        }

        match existing {
            Some(comment) if force_recreate => {
                info!("Recreating comment {} on #{}", comment.id, issue.number);
                self.store.delete_comment(&self.repo, comment.id).await?;
                self.store
                    .create_comment(&self.repo, issue.number, &signed)
                    .await
            }
            Some(comment) => {
                info!("Updating comment {} on #{}", comment.id, issue.number);
                self.store
                    .update_comment(&self.repo, comment.id, &signed)
                    .await
            }
            None => {
                info!("Creating comment on #{}", issue.number);
                self.store
                    .create_comment(&self.repo, issue.number, &signed)
                    .await
            }
        }
    }

    /// Delete every comment carrying the signature marker. Used when an
    /// issue no longer has any extracted dependencies.
    pub async fn remove_action_comments(&self, issue: &Issue) -> Result<(), StoreError> {
        let comments = self.store.list_comments(&self.repo, issue.number).await?;
        for comment in comments {
            if comment.body.contains(&self.config.comment_signature) {
                info!("Deleting stale comment {} on #{}", comment.id, issue.number);
                self.store.delete_comment(&self.repo, comment.id).await?;
            }
        }
        Ok(())
    }

    /// Post a commit status reflecting the dependency state onto the PR's
    /// head commit. Plain issues are skipped without any store call.
    pub async fn update_commit_status(
        &self,
        issue: &Issue,
        dependencies: &[Dependency],
    ) -> Result<(), StoreError> {
        if !issue.is_pull_request {
            return Ok(());
        }

        let sha = self
            .store
            .pull_request_head_sha(&self.repo, issue.number)
            .await?;

        let blockers: Vec<&Dependency> = dependencies.iter().filter(|dep| dep.blocker).collect();

        let (state, description) = if dependencies.is_empty() {
            (CommitState::Success, "No dependencies".to_string())
        } else if blockers.is_empty() {
            (
                CommitState::Success,
                "All dependencies are resolved".to_string(),
            )
        } else {
            let first = format_dependency(blockers[0], Some(&self.repo));
            let rest = blockers.len() - 1;
            let description = if rest == 0 {
                format!("Blocked by {first}")
            } else {
                format!("Blocked by {first} and {rest} more issues")
            };
            (self.config.blocked_state, description)
        };

        info!(
            "Setting commit status {state} on #{} ({description})",
            issue.number
        );
        self.store
            .set_commit_status(&self.repo, &sha, state, &description, &self.config.status_context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueState;
    use crate::store::InMemoryStore;

    const SIGNATURE: &str = "<action-signature>";

    fn manager(store: Arc<InMemoryStore>) -> IssueManager {
        IssueManager::new(
            store,
            Repository::new("Microsoft", "vscode"),
            ManagerConfig {
                label: "my-label".to_string(),
                comment_template: "Depends on:\n\n{{ dependencies }}".to_string(),
                comment_signature: SIGNATURE.to_string(),
                status_context: "my-action".to_string(),
                blocked_state: CommitState::Failure,
            },
        )
    }

    fn issue(number: u64, labels: &[&str]) -> Issue {
        Issue {
            number,
            state: IssueState::Open,
            title: None,
            body: None,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            is_pull_request: false,
            user: None,
        }
    }

    fn pull_request(number: u64) -> Issue {
        Issue {
            is_pull_request: true,
            ..issue(number, &[])
        }
    }

    fn blocker(owner: &str, repo: &str, number: u64) -> Dependency {
        Dependency {
            blocker: true,
            ..Dependency::new(owner, repo, number)
        }
    }

    #[test]
    fn test_has_dependency_placeholder() {
        assert!(has_dependency_placeholder("x {{ dependencies }} y"));
        assert!(has_dependency_placeholder("{{dependencies}}"));
        assert!(has_dependency_placeholder("{{  DEPENDENCIES  }}"));
        assert!(!has_dependency_placeholder("{{ dependency }}"));
        assert!(!has_dependency_placeholder("no token at all"));
    }

    #[tokio::test]
    async fn test_add_label_skips_when_present() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        manager
            .add_label(&issue(1, &["my-label"]))
            .await
            .unwrap();
        assert_eq!(store.counts().await.labels_added, 0);
    }

    #[tokio::test]
    async fn test_add_label_when_missing() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.seed_issue(&repo, issue(1, &["bug"])).await;
        let manager = manager(store.clone());

        manager.add_label(&issue(1, &["bug"])).await.unwrap();
        assert_eq!(store.counts().await.labels_added, 1);
        assert_eq!(store.labels(&repo, 1).await, vec!["bug", "my-label"]);
    }

    #[tokio::test]
    async fn test_remove_label_skips_when_absent() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        manager.remove_label(&issue(1, &["bug"])).await.unwrap();
        assert_eq!(store.counts().await.labels_removed, 0);
    }

    #[test]
    fn test_generate_comment_strikes_resolved_dependencies() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store);

        // #2 lives in the home repo; other/project#3 is resolved (closed).
        let deps = vec![
            blocker("Microsoft", "vscode", 2),
            Dependency::new("other", "project", 3),
        ];
        let blockers = vec![blocker("Microsoft", "vscode", 2)];

        assert_eq!(
            manager.generate_comment(&deps, &blockers),
            "Depends on:\n\n* #2\n* ~~other/project#3~~"
        );
    }

    #[tokio::test]
    async fn test_write_comment_updates_existing() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.seed_comment(&repo, 141, "Random text").await;
        let existing = store
            .seed_comment(&repo, 141, &format!("  Existing text\t\n{SIGNATURE}\n\n "))
            .await;
        store.seed_comment(&repo, 141, "Random text").await;
        let manager = manager(store.clone());

        manager
            .write_comment(&issue(141, &[]), " This is the updated text\n", false)
            .await
            .unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.comments_updated, 1);
        assert_eq!(counts.comments_created, 0);
        assert_eq!(counts.comments_deleted, 0);

        let comments = store.comments(&repo, 141).await;
        let updated = comments.iter().find(|c| c.id == existing).unwrap();
        assert_eq!(
            updated.body,
            format!("This is the updated text\n{SIGNATURE}")
        );
    }

    #[tokio::test]
    async fn test_write_comment_force_recreates() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store
            .seed_comment(&repo, 141, &format!("Existing text\n{SIGNATURE}"))
            .await;
        let manager = manager(store.clone());

        manager
            .write_comment(&issue(141, &[]), "This is the updated text", true)
            .await
            .unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.comments_deleted, 1);
        assert_eq!(counts.comments_created, 1);
        assert_eq!(counts.comments_updated, 0);
    }

    #[tokio::test]
    async fn test_write_comment_creates_when_none_exists() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        let manager = manager(store.clone());

        manager
            .write_comment(&issue(141, &[]), "Fresh text", false)
            .await
            .unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.comments_created, 1);
        assert_eq!(
            store.comments(&repo, 141).await[0].body,
            format!("Fresh text\n{SIGNATURE}")
        );
    }

    #[tokio::test]
    async fn test_write_comment_is_idempotent_on_same_text() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store
            .seed_comment(&repo, 141, &format!("  Existing text\t\n{SIGNATURE}\n\n "))
            .await;
        let manager = manager(store.clone());

        manager
            .write_comment(&issue(141, &[]), "Existing text", false)
            .await
            .unwrap();
        manager
            .write_comment(&issue(141, &[]), "Existing text", true)
            .await
            .unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.comments_created, 0);
        assert_eq!(counts.comments_updated, 0);
        assert_eq!(counts.comments_deleted, 0);
    }

    #[tokio::test]
    async fn test_remove_action_comments_deletes_all_signed() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.seed_comment(&repo, 5, "Unrelated").await;
        store
            .seed_comment(&repo, 5, &format!("Old list\n{SIGNATURE}"))
            .await;
        store
            .seed_comment(&repo, 5, &format!("Older list\n{SIGNATURE}\n"))
            .await;
        let manager = manager(store.clone());

        manager.remove_action_comments(&issue(5, &[])).await.unwrap();

        let remaining = store.comments(&repo, 5).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].body, "Unrelated");
    }

    #[tokio::test]
    async fn test_commit_status_ignores_non_prs() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        manager
            .update_commit_status(&issue(141, &[]), &[blocker("a", "b", 1)])
            .await
            .unwrap();

        assert_eq!(store.counts().await.statuses_set, 0);
    }

    #[tokio::test]
    async fn test_commit_status_no_dependencies() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.set_head_sha(&repo, 141, "<commit-sha>").await;
        let manager = manager(store.clone());

        manager
            .update_commit_status(&pull_request(141), &[])
            .await
            .unwrap();

        let statuses = store.statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].sha, "<commit-sha>");
        assert_eq!(statuses[0].state, CommitState::Success);
        assert_eq!(statuses[0].description, "No dependencies");
        assert_eq!(statuses[0].context, "my-action");
    }

    #[tokio::test]
    async fn test_commit_status_all_resolved() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.set_head_sha(&repo, 141, "<commit-sha>").await;
        let manager = manager(store.clone());

        manager
            .update_commit_status(&pull_request(141), &[Dependency::new("a", "b", 1)])
            .await
            .unwrap();

        let statuses = store.statuses().await;
        assert_eq!(statuses[0].state, CommitState::Success);
        assert_eq!(statuses[0].description, "All dependencies are resolved");
    }

    #[tokio::test]
    async fn test_commit_status_blocked_by_several() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.set_head_sha(&repo, 141, "<commit-sha>").await;
        let manager = manager(store.clone());

        manager
            .update_commit_status(
                &pull_request(141),
                &[
                    blocker("owner", "repo", 999),
                    blocker("x", "y", 1),
                    blocker("x", "y", 2),
                ],
            )
            .await
            .unwrap();

        let statuses = store.statuses().await;
        assert_eq!(statuses[0].state, CommitState::Failure);
        assert_eq!(
            statuses[0].description,
            "Blocked by owner/repo#999 and 2 more issues"
        );
    }

    #[tokio::test]
    async fn test_commit_status_single_blocker_has_no_suffix() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.set_head_sha(&repo, 141, "<commit-sha>").await;
        let manager = manager(store.clone());

        manager
            .update_commit_status(
                &pull_request(141),
                &[blocker("Microsoft", "vscode", 7), Dependency::new("a", "b", 2)],
            )
            .await
            .unwrap();

        let statuses = store.statuses().await;
        assert_eq!(statuses[0].description, "Blocked by #7");
    }

    #[tokio::test]
    async fn test_commit_status_blocked_state_is_configurable() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new("Microsoft", "vscode");
        store.set_head_sha(&repo, 141, "<commit-sha>").await;
        let manager = IssueManager::new(
            store.clone(),
            repo,
            ManagerConfig {
                label: "my-label".to_string(),
                comment_template: "{{ dependencies }}".to_string(),
                comment_signature: SIGNATURE.to_string(),
                status_context: "my-action".to_string(),
                blocked_state: CommitState::Pending,
            },
        );

        manager
            .update_commit_status(&pull_request(141), &[blocker("a", "b", 1)])
            .await
            .unwrap();

        assert_eq!(store.statuses().await[0].state, CommitState::Pending);
    }
}
