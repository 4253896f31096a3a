//! Dependency resolution with a per-run cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Dependency, Issue, Repository};
use crate::store::IssueStore;

/// Resolves dependency references to live issue state.
///
/// The cache lives for one resolver instance, i.e. one run. It is pre-seeded
/// from the issues already loaded for the run (addressable under the home
/// repository), and grows lazily for cross-repository or not-yet-loaded
/// references. Entries are never overwritten: concurrent resolves of the
/// same key may duplicate a fetch, but the first write wins.
pub struct DependencyResolver {
    store: Arc<dyn IssueStore>,
    cache: RwLock<HashMap<String, Issue>>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn IssueStore>, known_issues: &[Issue], home: &Repository) -> Self {
        let mut cache = HashMap::new();
        for issue in known_issues {
            let key = format!("{}/{}#{}", home.owner, home.repo, issue.number);
            cache.insert(key, issue.clone());
        }

        Self {
            store,
            cache: RwLock::new(cache),
        }
    }

    /// Resolve a dependency to its current issue state, fetching at most once
    /// per identity key per run.
    ///
    /// A fetch failure propagates without writing a cache entry, so a later
    /// retry of the same key is a fresh fetch.
    pub async fn resolve(&self, dependency: &Dependency) -> Result<Issue, StoreError> {
        let key = dependency.key();

        {
            let cache = self.cache.read().await;
            if let Some(issue) = cache.get(&key) {
                debug!("Cache hit for {key}");
                return Ok(issue.clone());
            }
        }

        let repo = Repository::new(&dependency.owner, &dependency.repo);
        let issue = self.store.fetch_issue(&repo, dependency.number).await?;

        let mut cache = self.cache.write().await;
        Ok(cache.entry(key).or_insert(issue).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueState;
    use crate::store::InMemoryStore;

    fn open_issue(number: u64, title: &str) -> Issue {
        Issue {
            number,
            state: IssueState::Open,
            title: Some(title.to_string()),
            body: None,
            labels: Vec::new(),
            is_pull_request: false,
            user: None,
        }
    }

    fn context_issues() -> Vec<Issue> {
        (1..=3).map(|n| open_issue(n, &format!("Issue {n}"))).collect()
    }

    #[tokio::test]
    async fn test_resolves_context_issues_without_fetching() {
        let store = Arc::new(InMemoryStore::new());
        let home = Repository::new("facebook", "react");
        let resolver = DependencyResolver::new(store.clone(), &context_issues(), &home);

        let issue = resolver
            .resolve(&Dependency::new("facebook", "react", 1))
            .await
            .unwrap();

        assert_eq!(issue.title.as_deref(), Some("Issue 1"));
        assert_eq!(store.counts().await.issue_fetches, 0);
    }

    #[tokio::test]
    async fn test_fetches_unknown_issues() {
        let store = Arc::new(InMemoryStore::new());
        let home = Repository::new("facebook", "react");
        store.seed_issue(&home, open_issue(4, "Issue 4")).await;

        let resolver = DependencyResolver::new(store.clone(), &context_issues(), &home);
        let issue = resolver
            .resolve(&Dependency::new("facebook", "react", 4))
            .await
            .unwrap();

        assert_eq!(issue.number, 4);
        assert_eq!(store.counts().await.issue_fetches, 1);
    }

    #[tokio::test]
    async fn test_caches_fetched_issues() {
        let store = Arc::new(InMemoryStore::new());
        let home = Repository::new("facebook", "react");
        store.seed_issue(&home, open_issue(4, "Issue 4")).await;

        let resolver = DependencyResolver::new(store.clone(), &context_issues(), &home);
        let dependency = Dependency::new("facebook", "react", 4);

        resolver.resolve(&dependency).await.unwrap();
        resolver.resolve(&dependency).await.unwrap();
        let issue = resolver.resolve(&dependency).await.unwrap();

        assert_eq!(issue.title.as_deref(), Some("Issue 4"));
        assert_eq!(store.counts().await.issue_fetches, 1);
    }

    #[tokio::test]
    async fn test_cross_repository_fetch() {
        let store = Arc::new(InMemoryStore::new());
        let home = Repository::new("facebook", "react");
        let other = Repository::new("other", "project");
        store.seed_issue(&other, open_issue(1, "Elsewhere")).await;

        let resolver = DependencyResolver::new(store.clone(), &context_issues(), &home);

        // Same number as a context issue, but a different repository.
        let issue = resolver
            .resolve(&Dependency::new("other", "project", 1))
            .await
            .unwrap();

        assert_eq!(issue.title.as_deref(), Some("Elsewhere"));
        assert_eq!(store.counts().await.issue_fetches, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_no_cache_entry() {
        let store = Arc::new(InMemoryStore::new());
        let home = Repository::new("facebook", "react");
        let resolver = DependencyResolver::new(store.clone(), &[], &home);
        let dependency = Dependency::new("facebook", "react", 99);

        let missing = resolver.resolve(&dependency).await;
        assert!(matches!(missing, Err(StoreError::NotFound)));

        // Once the issue appears, the same key resolves: the failure wrote
        // nothing to the cache.
        store.seed_issue(&home, open_issue(99, "Late arrival")).await;
        let found = resolver.resolve(&dependency).await.unwrap();
        assert_eq!(found.number, 99);
        assert_eq!(store.counts().await.issue_fetches, 2);
    }
}
