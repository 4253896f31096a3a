use anyhow::{bail, Context, Result};
use std::env;

use crate::manager::has_dependency_placeholder;
use crate::model::{CommitState, Repository};

/// Marker appended to the bot's own comment so it can be found and kept in
/// sync on later runs.
pub const COMMENT_SIGNATURE: &str = "<!-- By depbot - DO NOT REMOVE -->";

const DEFAULT_LABEL: &str = "dependent";
const DEFAULT_KEYWORDS: &str = "depends on, blocked by";
const DEFAULT_COMMENT_TEMPLATE: &str = "This PR/issue depends on:\n\n{{ dependencies }}";
const DEFAULT_STATUS_CONTEXT: &str = "Dependent Issues";
const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub repository: Repository,
    pub label: String,
    pub keywords: Vec<String>,
    pub comment_template: String,
    pub comment_signature: String,
    pub status_context: String,
    /// Commit status posted while dependencies block: `failure` or `pending`.
    pub blocked_state: CommitState,
    /// Scan all open issues (PRs included) instead of open PRs only.
    pub check_issues: bool,
    /// Skip PRs opened by Dependabot, whose workflows run with read-only
    /// permissions.
    pub ignore_dependabot: bool,
    pub api_url: String,
}

impl Config {
    /// Load and validate configuration. Every validation failure here is
    /// fatal to the whole run, before any API call is made.
    pub fn from_env() -> Result<Self> {
        let github_token =
            env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable is required")?;

        let repository = env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?
            .parse::<Repository>()
            .context("GITHUB_REPOSITORY must be in 'owner/repo' form")?;

        let label = env::var("DEPBOT_LABEL").unwrap_or_else(|_| DEFAULT_LABEL.to_string());

        let keywords = parse_keywords(
            &env::var("DEPBOT_KEYWORDS").unwrap_or_else(|_| DEFAULT_KEYWORDS.to_string()),
        )?;

        let comment_template = env::var("DEPBOT_COMMENT_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_COMMENT_TEMPLATE.to_string());
        if !has_dependency_placeholder(&comment_template) {
            bail!("DEPBOT_COMMENT_TEMPLATE must contain a {{{{ dependencies }}}} placeholder");
        }

        let status_context =
            env::var("DEPBOT_STATUS_CONTEXT").unwrap_or_else(|_| DEFAULT_STATUS_CONTEXT.to_string());

        let blocked_state = parse_blocked_state(
            &env::var("DEPBOT_BLOCKED_STATE").unwrap_or_else(|_| "failure".to_string()),
        )?;

        let check_issues =
            parse_toggle(&env::var("DEPBOT_CHECK_ISSUES").unwrap_or_default())
                .context("DEPBOT_CHECK_ISSUES must be 'on' or 'off'")?;

        let ignore_dependabot =
            parse_toggle(&env::var("DEPBOT_IGNORE_DEPENDABOT").unwrap_or_default())
                .context("DEPBOT_IGNORE_DEPENDABOT must be 'on' or 'off'")?;

        let api_url = env::var("DEPBOT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Config {
            github_token,
            repository,
            label,
            keywords,
            comment_template,
            comment_signature: COMMENT_SIGNATURE.to_string(),
            status_context,
            blocked_state,
            check_issues,
            ignore_dependabot,
            api_url,
        })
    }
}

/// Parse the comma-separated keyword list. Entries are trimmed and empties
/// dropped; an empty result is a configuration error.
pub fn parse_keywords(value: &str) -> Result<Vec<String>> {
    let keywords: Vec<String> = value
        .split(',')
        .map(|keyword| keyword.trim().to_string())
        .filter(|keyword| !keyword.is_empty())
        .collect();

    if keywords.is_empty() {
        bail!("keyword list must not be empty");
    }
    Ok(keywords)
}

/// Parse an on/off toggle. The unset (empty) value is off.
pub fn parse_toggle(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "" | "off" | "false" | "0" => Ok(false),
        other => bail!("invalid toggle value {other:?}"),
    }
}

/// Parse the blocked-state commit status value.
pub fn parse_blocked_state(value: &str) -> Result<CommitState> {
    match value.trim().to_lowercase().as_str() {
        "failure" => Ok(CommitState::Failure),
        "pending" => Ok(CommitState::Pending),
        other => bail!("DEPBOT_BLOCKED_STATE must be 'failure' or 'pending', got {other:?}"),
    }
}
