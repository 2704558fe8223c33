//! Search overlay: the set of paths a query forces visible
//!
//! Built fresh for every query from the live tree. Matching is done against
//! base names only; roots themselves are never match candidates.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::ChildEntry;
use crate::tree::TreeSource;

/// How a query is matched against entry names.
#[derive(Debug, Clone)]
pub enum QueryMatcher {
    /// Case-insensitive substring; holds the lowercased needle.
    Substring(String),
    /// Case-insensitive glob, used when the query carries `*`, `?` or `[`.
    Glob(GlobMatcher),
}

impl QueryMatcher {
    /// Compile a query. Blank queries yield `None`.
    pub fn parse(query: &str) -> Result<Option<Self>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.contains(['*', '?', '[']) {
            let glob = GlobBuilder::new(trimmed)
                .case_insensitive(true)
                .literal_separator(false)
                .build()
                .map_err(|e| Error::InvalidQuery {
                    query: query.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(Some(QueryMatcher::Glob(glob.compile_matcher())));
        }
        Ok(Some(QueryMatcher::Substring(trimmed.to_lowercase())))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            QueryMatcher::Substring(needle) => name.to_lowercase().contains(needle.as_str()),
            QueryMatcher::Glob(glob) => glob.is_match(name),
        }
    }
}

/// Paths forced visible by an active query.
#[derive(Debug, Clone, Default)]
pub struct InclusionOverlay {
    query: String,
    matches: BTreeSet<PathBuf>,
    /// Every ancestor of a match up to and including its root.
    ancestors: BTreeSet<PathBuf>,
    /// Matched directories whose whole visible subtree is included.
    directory_matches: HashSet<PathBuf>,
}

impl InclusionOverlay {
    /// The inactive overlay: everything is visible.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walk every root and collect matches, their ancestors and directory-match sentinels.
    pub fn build(query: &str, roots: &[PathBuf], tree: &dyn TreeSource) -> Result<Self> {
        let Some(matcher) = QueryMatcher::parse(query)? else {
            return Ok(Self::empty());
        };

        let mut overlay = InclusionOverlay {
            query: query.to_string(),
            ..Self::default()
        };

        for root in roots {
            let mut stack = vec![root.clone()];
            while let Some(dir) = stack.pop() {
                for child in tree.list_children(&dir) {
                    if matcher.matches(&child.name) {
                        overlay.record_match(&child, root);
                        // The whole subtree is already included.
                        continue;
                    }
                    if child.is_dir() {
                        stack.push(child.path);
                    }
                }
            }
        }

        debug!(
            "Search {:?}: {} matches, {} ancestors",
            query,
            overlay.matches.len(),
            overlay.ancestors.len()
        );
        Ok(overlay)
    }

    fn record_match(&mut self, entry: &ChildEntry, root: &Path) {
        if entry.is_dir() {
            self.directory_matches.insert(entry.path.clone());
        }
        let mut current = entry.path.parent();
        while let Some(dir) = current {
            if !dir.starts_with(root) || !self.ancestors.insert(dir.to_path_buf()) {
                break;
            }
            current = dir.parent();
        }
        self.matches.insert(entry.path.clone());
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn should_include(&self, path: &Path) -> bool {
        if !self.is_active() {
            return true;
        }
        if self.matches.contains(path) || self.ancestors.contains(path) {
            return true;
        }
        path.ancestors()
            .skip(1)
            .any(|a| self.directory_matches.contains(a))
    }

    /// Keep only the entries the overlay includes.
    pub fn filter(&self, children: Vec<ChildEntry>) -> Vec<ChildEntry> {
        if !self.is_active() {
            return children;
        }
        children
            .into_iter()
            .filter(|c| self.should_include(&c.path))
            .collect()
    }

    pub fn matches(&self) -> impl Iterator<Item = &Path> {
        self.matches.iter().map(PathBuf::as_path)
    }

    pub fn is_directory_match(&self, path: &Path) -> bool {
        self.directory_matches.contains(path)
    }

    /// Directories to present expanded: every ancestor on the path to a match.
    pub fn expanded_directories(&self) -> impl Iterator<Item = &Path> {
        self.ancestors.iter().map(PathBuf::as_path)
    }

    /// Every path the overlay includes directly (matches plus ancestors).
    pub fn included(&self) -> BTreeSet<PathBuf> {
        self.matches.union(&self.ancestors).cloned().collect()
    }
}
