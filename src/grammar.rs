//! The reference grammar: a single compiled pattern matching a configured
//! keyword phrase followed by an issue reference.
//!
//! An issue reference is one of:
//! - bare `#N`,
//! - `owner/repo#N`,
//! - a full issue/PR URL (`http(s)://host/owner/repo/issues/N` or `.../pull/N`).
//!
//! Issue numbers never start with zero and end at a word boundary, so `#0`
//! and `#123hashtag` never match. Owner and repository slugs start and end
//! with an alphanumeric and may contain `-`, `.` and `_` internally, which
//! rules out `-repo` and multi-segment paths.

use regex::Regex;

/// Owner/repository slug. Must start and end with an alphanumeric character.
const SLUG: &str = r"[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?";

/// Issue number: positive, no leading zero, terminated at a word boundary.
const NUMBER: &str = r"[1-9][0-9]*";

/// Capture group names used by the extractor. The three reference forms use
/// distinct names because group names must be unique within one pattern.
pub const URL_OWNER: &str = "url_owner";
pub const URL_REPO: &str = "url_repo";
pub const URL_NUMBER: &str = "url_number";
pub const OWNER: &str = "owner";
pub const REPO: &str = "repo";
pub const NUMBER_GROUP: &str = "number";

fn issue_reference() -> String {
    format!(
        r"(?:https?://[^/\s]+/(?P<{URL_OWNER}>{SLUG})/(?P<{URL_REPO}>{SLUG})/(?:issues|pull)/(?P<{URL_NUMBER}>{NUMBER})\b|(?:(?P<{OWNER}>{SLUG})/(?P<{REPO}>{SLUG}))?\#(?P<{NUMBER_GROUP}>{NUMBER})\b)"
    )
}

/// Build the case-insensitive dependency pattern from a list of keyword
/// phrases: `(?:kw1|kw2|...)\s+(issue-reference)`.
///
/// Keywords are trimmed and regex-escaped; internal whitespace runs are
/// relaxed to `\s+` so `"blocked   by"` matches `"blocked by"`. The caller
/// (configuration validation) guarantees a non-empty keyword list.
pub fn build_dependency_pattern(keywords: &[String]) -> Regex {
    assert!(
        !keywords.is_empty(),
        "keyword list is validated as non-empty before grammar construction"
    );

    let alternation = keywords
        .iter()
        .map(|keyword| {
            keyword
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");

    let pattern = format!(r"(?i)(?:{})\s+{}", alternation, issue_reference());
    Regex::new(&pattern).expect("escaped keyword pattern must compile")
}
