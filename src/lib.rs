pub mod check;
pub mod config;
pub mod error;
pub mod extractor;
pub mod github;
pub mod grammar;
pub mod manager;
pub mod model;
pub mod resolver;
pub mod store;

pub use check::{run_check, CheckContext};
pub use config::Config;
pub use error::StoreError;
pub use extractor::DependencyExtractor;
pub use github::GitHubClient;
pub use manager::IssueManager;
pub use model::{Comment, CommitState, Dependency, Issue, IssueState, Repository};
pub use resolver::DependencyResolver;
pub use store::{InMemoryStore, IssueStore};
