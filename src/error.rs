use thiserror::Error;

/// Failures surfaced by an [`IssueStore`](crate::store::IssueStore).
///
/// Fetch failures are scoped to a single call: the resolver propagates them
/// without writing anything to its cache, and the orchestrator decides
/// whether to skip the owning issue or abort the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited")]
    RateLimited,

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}
