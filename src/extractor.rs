//! Extraction of structured dependency references from issue bodies.

use std::collections::HashSet;

use regex::Regex;

use crate::grammar::{self, build_dependency_pattern};
use crate::model::{Dependency, Issue, Repository};

/// Applies the dependency grammar to issue bodies.
///
/// The pattern is compiled once at construction and reused; extraction is a
/// pure function of the body and issue number, so one extractor is safe to
/// share across issues.
pub struct DependencyExtractor {
    home: Repository,
    pattern: Regex,
}

impl DependencyExtractor {
    pub fn new(home: Repository, keywords: &[String]) -> Self {
        Self {
            home,
            pattern: build_dependency_pattern(keywords),
        }
    }

    /// Extract the dependency references from an issue body.
    ///
    /// Bare `#N` references resolve against the home repository. URL
    /// references normalize to their `owner/repo#N` form. Self-references
    /// (same repository and the scanned issue's own number) are dropped, and
    /// the result is deduplicated by identity key in first-seen order.
    pub fn extract(&self, issue: &Issue) -> Vec<Dependency> {
        let body = issue.body.as_deref().unwrap_or("");

        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();

        for caps in self.pattern.captures_iter(body) {
            // The grammar guarantees digits; absurdly long numbers are dropped.
            let dependency = if let Some(number) = caps.name(grammar::URL_NUMBER) {
                let Ok(number) = number.as_str().parse::<u64>() else {
                    continue;
                };
                Dependency::new(&caps[grammar::URL_OWNER], &caps[grammar::URL_REPO], number)
            } else {
                let Ok(number) = caps[grammar::NUMBER_GROUP].parse::<u64>() else {
                    continue;
                };
                match (caps.name(grammar::OWNER), caps.name(grammar::REPO)) {
                    (Some(owner), Some(repo)) => {
                        Dependency::new(owner.as_str(), repo.as_str(), number)
                    }
                    _ => Dependency::new(self.home.owner.clone(), self.home.repo.clone(), number),
                }
            };

            // Self-reference guard: the scanned issue itself, whether written
            // as `#N` or as a fully qualified reference to the home repo.
            if dependency.number == issue.number && dependency.is_in(&self.home) {
                continue;
            }

            if seen.insert(dependency.key()) {
                dependencies.push(dependency);
            }
        }

        dependencies
    }
}
