//! Per-run orchestration: one reconciliation pass over the loaded issues.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::extractor::DependencyExtractor;
use crate::manager::{IssueManager, ManagerConfig};
use crate::model::{Dependency, Issue, IssueState};
use crate::resolver::DependencyResolver;
use crate::store::IssueStore;

/// PRs opened by Dependabot run their workflows with a read-only token, so
/// the bot cannot write to them.
const DEPENDABOT_LOGIN: &str = "dependabot[bot]";

/// Everything one run needs: the compiled extractor, the per-run resolver
/// cache, and the manager that applies side effects.
pub struct CheckContext {
    extractor: DependencyExtractor,
    resolver: DependencyResolver,
    manager: IssueManager,
    ignore_dependabot: bool,
}

impl CheckContext {
    /// `issues` are the open issues loaded for this run; they pre-seed the
    /// resolver cache so home-repository dependencies resolve without a
    /// fetch.
    pub fn new(store: Arc<dyn IssueStore>, config: &Config, issues: &[Issue]) -> Self {
        let extractor = DependencyExtractor::new(config.repository.clone(), &config.keywords);
        let resolver = DependencyResolver::new(store.clone(), issues, &config.repository);
        let manager = IssueManager::new(
            store,
            config.repository.clone(),
            ManagerConfig::from(config),
        );

        Self {
            extractor,
            resolver,
            manager,
            ignore_dependabot: config.ignore_dependabot,
        }
    }
}

/// Reconcile every loaded issue. Failures are isolated per issue: a broken
/// dependency or a failed write logs, skips the rest of that issue, and the
/// run moves on. Returns the number of issues that failed.
pub async fn run_check(ctx: &CheckContext, issues: &[Issue]) -> usize {
    let mut failed = 0;
    for issue in issues {
        if let Err(error) = process_issue(ctx, issue).await {
            warn!("Skipping #{}: {error}", issue.number);
            failed += 1;
        }
    }
    failed
}

async fn process_issue(ctx: &CheckContext, issue: &Issue) -> Result<(), StoreError> {
    if ctx.ignore_dependabot
        && issue.is_pull_request
        && issue
            .user
            .as_ref()
            .is_some_and(|user| user.login == DEPENDABOT_LOGIN)
    {
        info!("Skipping Dependabot PR #{}", issue.number);
        return Ok(());
    }

    let extracted = ctx.extractor.extract(issue);
    if extracted.is_empty() {
        // Clear any leftovers from when the issue still had dependencies.
        ctx.manager.remove_action_comments(issue).await?;
        ctx.manager.remove_label(issue).await?;
        return ctx.manager.update_commit_status(issue, &[]).await;
    }

    info!(
        "Found {} dependencies in #{}",
        extracted.len(),
        issue.number
    );

    let resolved = join_all(extracted.iter().map(|dep| ctx.resolver.resolve(dep))).await;

    let mut dependencies = Vec::with_capacity(extracted.len());
    for (dep, outcome) in extracted.into_iter().zip(resolved) {
        let state = outcome?.state;
        dependencies.push(Dependency {
            blocker: state == IssueState::Open,
            ..dep
        });
    }

    let blockers: Vec<Dependency> = dependencies
        .iter()
        .filter(|dep| dep.blocker)
        .cloned()
        .collect();

    // Recreate the comment at the bottom of the thread when the issue newly
    // becomes blocked, so subscribers get notified.
    let comment = ctx.manager.generate_comment(&dependencies, &blockers);
    let recreate = !blockers.is_empty() && !ctx.manager.has_label(issue);
    ctx.manager.write_comment(issue, &comment, recreate).await?;

    if blockers.is_empty() {
        ctx.manager.remove_label(issue).await?;
    } else {
        ctx.manager.add_label(issue).await?;
    }

    ctx.manager.update_commit_status(issue, &dependencies).await
}
