//! On-demand directory listing with ignore filtering and effective-emptiness pruning

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tessera_core::{ChildEntry, NodeKind, TreeSource, sort_entries};
use tracing::{debug, warn};

use crate::rules::RuleSet;

/// A raw directory entry before filtering.
#[derive(Debug, Clone)]
struct RawEntry {
    path: PathBuf,
    kind: NodeKind,
    /// Symlinked directories are listed but never descended into for emptiness.
    symlink: bool,
}

/// Lists one directory at a time.
///
/// Listings and emptiness verdicts are memoized until the next refresh or
/// until a change notification evicts the affected directory.
#[derive(Debug, Default)]
pub struct TreeWalker {
    rules: RuleSet,
    listings: DashMap<PathBuf, Arc<Vec<ChildEntry>>>,
    emptiness: DashMap<PathBuf, bool>,
}

impl TreeWalker {
    pub fn new(rules: RuleSet) -> Self {
        TreeWalker {
            rules,
            listings: DashMap::new(),
            emptiness: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Mutable access to the rules. Every memo is dropped since any verdict may change.
    pub fn rules_mut(&mut self) -> &mut RuleSet {
        self.begin_refresh();
        &mut self.rules
    }

    /// Start a new refresh cycle: forget every memoized listing and emptiness verdict.
    pub fn begin_refresh(&self) {
        self.listings.clear();
        self.emptiness.clear();
    }

    /// Forget what is known about `path`, everything below it and every
    /// ancestor, whose visibility may depend on it. Rule files memoized at or
    /// below `path` are re-read on next use.
    pub fn evict(&self, path: &Path) {
        self.rules.evict(path);
        for ancestor in path.ancestors() {
            self.listings.remove(ancestor);
            self.emptiness.remove(ancestor);
        }
        self.listings.retain(|p, _| !p.starts_with(path));
        self.emptiness.retain(|p, _| !p.starts_with(path));
    }

    /// Visible children of `dir`: ignored entries dropped, effectively empty
    /// directories dropped, directories first, then lexicographic by name.
    pub fn list_children(&self, dir: &Path) -> Vec<ChildEntry> {
        if let Some(cached) = self.listings.get(dir) {
            return cached.as_ref().clone();
        }

        let kept: Vec<RawEntry> = self
            .read_entries(dir)
            .into_iter()
            .filter(|e| !self.rules.is_ignored_entry(&e.path, e.kind.is_dir()))
            .collect();

        // Sibling directories are probed concurrently.
        let mut children: Vec<ChildEntry> = kept
            .par_iter()
            .filter(|e| e.kind == NodeKind::File || e.symlink || !self.is_effectively_empty(&e.path))
            .map(|e| ChildEntry::new(e.path.clone(), e.kind))
            .collect();
        sort_entries(&mut children);

        debug!("Listed {}: {} visible entries", dir.display(), children.len());
        self.listings.insert(dir.to_path_buf(), Arc::new(children.clone()));
        children
    }

    /// True when `dir` holds no visible file anywhere below it.
    ///
    /// Files are checked before any subdirectory is entered, and the first
    /// non-empty subdirectory ends the search.
    pub fn is_effectively_empty(&self, dir: &Path) -> bool {
        if let Some(known) = self.emptiness.get(dir) {
            return *known;
        }

        let mut subdirs = Vec::new();
        let mut has_file = false;
        for entry in self.read_entries(dir) {
            if self.rules.is_ignored_entry(&entry.path, entry.kind.is_dir()) {
                continue;
            }
            match entry.kind {
                NodeKind::File => {
                    has_file = true;
                    break;
                }
                NodeKind::Directory => subdirs.push(entry),
            }
        }

        let empty = !has_file
            && subdirs
                .iter()
                .all(|d| !d.symlink && self.is_effectively_empty(&d.path));
        self.emptiness.insert(dir.to_path_buf(), empty);
        empty
    }

    /// Raw entries of `dir`. Unreadable directories and entries are skipped.
    fn read_entries(&self, dir: &Path) -> Vec<RawEntry> {
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) => {
                warn!("Cannot read directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for entry in read {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    debug!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };

            let (kind, symlink) = if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) => (NodeKind::from_is_dir(meta.is_dir()), meta.is_dir()),
                    Err(_) => {
                        debug!("Skipping dangling symlink {}", path.display());
                        continue;
                    }
                }
            } else {
                (NodeKind::from_is_dir(file_type.is_dir()), false)
            };
            entries.push(RawEntry { path, kind, symlink });
        }
        entries
    }
}

impl TreeSource for TreeWalker {
    fn list_children(&self, dir: &Path) -> Vec<ChildEntry> {
        TreeWalker::list_children(self, dir)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.rules.should_ignore(path)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}
