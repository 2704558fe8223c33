//! Test utilities for tessera-core

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::model::{ChildEntry, NodeKind, sort_entries};
use crate::selection::SelectionStore;
use crate::tree::TreeSource;

/// In-memory tree with the same visibility rules as the filesystem walker:
/// ignored entries and directories without a visible file below them are hidden.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    root: PathBuf,
    nodes: BTreeMap<PathBuf, NodeKind>,
    ignored: HashSet<PathBuf>,
}

impl MemoryTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(root.clone(), NodeKind::Directory);
        MemoryTree {
            root,
            nodes,
            ignored: HashSet::new(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(mut self, rel: &str) -> Self {
        let path = self.path(rel);
        self.add_parents(&path);
        self.nodes.insert(path, NodeKind::File);
        self
    }

    pub fn dir(mut self, rel: &str) -> Self {
        let path = self.path(rel);
        self.add_parents(&path);
        self.nodes.insert(path, NodeKind::Directory);
        self
    }

    pub fn ignore(mut self, rel: &str) -> Self {
        self.ignore_now(rel);
        self
    }

    pub fn ignore_now(&mut self, rel: &str) {
        let path = self.path(rel);
        self.ignored.insert(path);
    }

    /// Delete `rel` and everything below it.
    pub fn remove(&mut self, rel: &str) {
        let path = self.path(rel);
        self.nodes.retain(|p, _| !p.starts_with(&path));
    }

    fn add_parents(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if !dir.starts_with(&self.root) {
                break;
            }
            self.nodes.insert(dir.to_path_buf(), NodeKind::Directory);
            current = dir.parent();
        }
    }

    fn raw_children<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a PathBuf, NodeKind)> + 'a {
        self.nodes
            .iter()
            .filter(move |(p, _)| p.parent() == Some(dir))
            .map(|(p, k)| (p, *k))
    }

    fn has_visible_file(&self, dir: &Path) -> bool {
        self.raw_children(dir).any(|(p, kind)| {
            !self.is_ignored(p)
                && match kind {
                    NodeKind::File => true,
                    NodeKind::Directory => self.has_visible_file(p),
                }
        })
    }
}

impl TreeSource for MemoryTree {
    fn list_children(&self, dir: &Path) -> Vec<ChildEntry> {
        let mut children: Vec<ChildEntry> = self
            .raw_children(dir)
            .filter(|(p, _)| !self.is_ignored(p))
            .filter(|(p, kind)| *kind == NodeKind::File || self.has_visible_file(p))
            .map(|(p, kind)| ChildEntry::new(p.clone(), kind))
            .collect();
        sort_entries(&mut children);
        children
    }

    fn is_ignored(&self, path: &Path) -> bool {
        path.ancestors().any(|a| self.ignored.contains(a))
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }
}

/// Assert the directory invariant for every visible directory under `dir`:
/// checked iff at least one visible child is checked.
pub fn assert_selection_consistent(store: &SelectionStore, tree: &dyn TreeSource, dir: &Path) {
    let children = tree.list_children(dir);
    if children.is_empty() {
        assert!(!store.is_checked(dir), "childless directory {} is checked", dir.display());
        return;
    }
    let any_checked = children.iter().any(|c| store.is_checked(&c.path));
    assert_eq!(
        store.is_checked(dir),
        any_checked,
        "directory {} disagrees with its children",
        dir.display()
    );
    for child in children.iter().filter(|c| c.is_dir()) {
        assert_selection_consistent(store, tree, &child.path);
    }
}
