use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, Level};

use depbot::{run_check, CheckContext, Config, GitHubClient, IssueStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = Config::from_env()?;
    info!("Checking {}", config.repository);

    let store: Arc<dyn IssueStore> = Arc::new(GitHubClient::new(
        config.github_token.clone(),
        config.api_url.clone(),
    ));

    let issues = store
        .list_open_issues(&config.repository, config.check_issues)
        .await
        .context("Failed to list open issues")?;

    let ctx = CheckContext::new(store, &config, &issues);
    let failed = run_check(&ctx, &issues).await;

    if failed > 0 {
        bail!("{failed} of {} issues could not be checked", issues.len());
    }

    info!("Checked {} issues", issues.len());
    Ok(())
}
