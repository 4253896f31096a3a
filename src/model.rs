//! Domain types shared across the bot.
//!
//! The GitHub API is normalized at this boundary: label payloads (which the
//! API serves either as bare strings or as objects with a `name` field)
//! collapse to plain names, and the `pull_request` marker object collapses to
//! an explicit boolean discriminant.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Deserializer, Serialize};

/// A hosting repository, compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    pub owner: String,
    pub repo: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl FromStr for Repository {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Repository::new(owner, repo))
            }
            _ => Err(anyhow!("repository must be in 'owner/repo' form, got {s:?}")),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A reference to another issue/PR extracted from free text, annotated after
/// resolution with whether it currently blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub blocker: bool,
}

impl Dependency {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
            blocker: false,
        }
    }

    /// Identity key: `owner/repo#number`. Two dependencies with the same key
    /// refer to the same issue regardless of the `blocker` annotation.
    pub fn key(&self) -> String {
        format!("{}/{}#{}", self.owner, self.repo, self.number)
    }

    pub fn is_in(&self, repo: &Repository) -> bool {
        self.owner == repo.owner && self.repo == repo.repo
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Format a dependency reference for display: short `#N` form inside the home
/// repository, full `owner/repo#N` form elsewhere.
pub fn format_dependency(dep: &Dependency, home: Option<&Repository>) -> String {
    match home {
        Some(repo) if dep.is_in(repo) => format!("#{}", dep.number),
        _ => dep.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl Default for IssueState {
    fn default() -> Self {
        IssueState::Open
    }
}

/// Commit status state as posted to the status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Success,
    Pending,
    Failure,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitState::Success => write!(f, "success"),
            CommitState::Pending => write!(f, "pending"),
            CommitState::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

/// An issue or pull request as the bot sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub state: IssueState,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: Vec<String>,
    #[serde(default, rename = "pull_request", deserialize_with = "deserialize_pr_marker")]
    pub is_pull_request: bool,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
}

/// The issues API serves labels either as bare strings or as objects with a
/// `name` field, depending on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelShape {
    Name(String),
    Object { name: String },
}

fn deserialize_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let shapes = Vec::<LabelShape>::deserialize(deserializer)?;
    Ok(shapes
        .into_iter()
        .map(|shape| match shape {
            LabelShape::Name(name) | LabelShape::Object { name } => name,
        })
        .collect())
}

fn deserialize_pr_marker<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let marker = Option::<serde::de::IgnoredAny>::deserialize(deserializer)?;
    Ok(marker.is_some())
}
