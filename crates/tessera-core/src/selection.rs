//! Tri-state selection over a lazily walked, multi-root tree
//!
//! File marks are authoritative. Directory marks are a cache of the derived
//! state: a directory is checked iff at least one of its visible children is
//! checked. Every mutation re-derives the affected ancestor chain before
//! returning, so the store is consistent between operations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::{CheckState, ChildEntry, NodeKind};
use crate::sweep::{SweepControl, SweepOutcome};
use crate::tree::TreeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mark {
    checked: bool,
    kind: NodeKind,
}

/// Path → checked map for every attached root.
///
/// Keys are kept in a `BTreeMap` so that a path and all of its descendants
/// form one contiguous key range.
#[derive(Debug, Default)]
pub struct SelectionStore {
    roots: Vec<PathBuf>,
    marks: BTreeMap<PathBuf, Mark>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, root: &Path) {
        if !self.roots.iter().any(|r| r == root) {
            self.roots.push(root.to_path_buf());
        }
    }

    /// Detach a root and drop every entry under it. Returns the number of entries dropped.
    pub fn remove_root(&mut self, root: &Path) -> usize {
        self.roots.retain(|r| r != root);
        self.drop_subtree(root)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The innermost attached root containing `path`.
    pub fn root_of(&self, path: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .filter(|r| path.starts_with(r))
            .max_by_key(|r| r.components().count())
            .map(|r| r.as_path())
    }

    pub fn state(&self, path: &Path) -> CheckState {
        CheckState::from(self.is_checked(path))
    }

    pub fn is_checked(&self, path: &Path) -> bool {
        self.marks.get(path).is_some_and(|m| m.checked)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Checked files in path order. Directories never appear.
    pub fn selected_files(&self) -> Vec<PathBuf> {
        self.marks
            .iter()
            .filter(|(_, m)| m.checked && m.kind == NodeKind::File)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Set `path` to `state`, cascading into every visible descendant when it
    /// is a directory, then re-derive the ancestors up to its root.
    ///
    /// A path that vanished from disk is dropped instead, and its ancestors
    /// are still re-derived.
    pub fn toggle(
        &mut self,
        tree: &dyn TreeSource,
        path: &Path,
        kind: NodeKind,
        state: CheckState,
        control: &mut SweepControl,
    ) -> Result<SweepOutcome> {
        let root = self
            .root_of(path)
            .ok_or_else(|| Error::UnknownRoot(path.to_path_buf()))?
            .to_path_buf();

        if !tree.exists(path) || tree.is_ignored(path) {
            let dropped = self.drop_subtree(path);
            debug!("Toggled missing or ignored path {}, dropped {} entries", path.display(), dropped);
            self.rederive_ancestors(tree, path, &root)?;
            return Ok(SweepOutcome::complete());
        }

        let checked = state.is_checked();
        match kind {
            NodeKind::File => self.set_file(path, checked),
            NodeKind::Directory => self.cascade(tree, path, checked, control),
        }
        self.rederive_ancestors(tree, path, &root)?;
        Ok(control.outcome())
    }

    /// Check every root.
    pub fn select_all(
        &mut self,
        tree: &dyn TreeSource,
        control: &mut SweepControl,
    ) -> SweepOutcome {
        self.sweep_roots(tree, true, control)
    }

    /// Uncheck every root.
    pub fn deselect_all(
        &mut self,
        tree: &dyn TreeSource,
        control: &mut SweepControl,
    ) -> SweepOutcome {
        self.sweep_roots(tree, false, control)
    }

    fn sweep_roots(
        &mut self,
        tree: &dyn TreeSource,
        checked: bool,
        control: &mut SweepControl,
    ) -> SweepOutcome {
        for root in self.roots.clone() {
            if control.is_stopped() {
                break;
            }
            self.cascade(tree, &root, checked, control);
        }
        control.outcome()
    }

    /// Drop `path` and everything below it, then re-derive its parent chain.
    pub fn remove_path(&mut self, tree: &dyn TreeSource, path: &Path) -> Result<usize> {
        let dropped = self.drop_subtree(path);
        if let Some(root) = self.root_of(path).map(Path::to_path_buf) {
            self.rederive_ancestors(tree, path, &root)?;
        }
        Ok(dropped)
    }

    /// Remove every entry that the current rules now ignore, restricted to
    /// `root` when given. Returns the top-most removed paths.
    pub fn prune_ignored(
        &mut self,
        tree: &dyn TreeSource,
        root: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let mut pruned: Vec<PathBuf> = Vec::new();
        for path in self.marks.keys() {
            if root.is_some_and(|r| !path.starts_with(r)) {
                continue;
            }
            if pruned.iter().any(|p| path.starts_with(p)) {
                continue;
            }
            if tree.is_ignored(path) {
                pruned.push(path.clone());
            }
        }

        for path in &pruned {
            self.drop_subtree(path);
        }
        for path in &pruned {
            if let Some(owner) = self.root_of(path).map(Path::to_path_buf) {
                self.rederive_ancestors(tree, path, &owner)?;
            }
        }
        if !pruned.is_empty() {
            debug!("Pruned {} newly ignored selection subtrees", pruned.len());
        }
        Ok(pruned)
    }

    fn set_file(&mut self, path: &Path, checked: bool) {
        self.marks.insert(
            path.to_path_buf(),
            Mark {
                checked,
                kind: NodeKind::File,
            },
        );
    }

    /// Store a derived directory state. Unchecked directories without an entry stay absent.
    fn set_directory(&mut self, path: &Path, checked: bool) {
        match self.marks.get_mut(path) {
            Some(mark) => mark.checked = checked,
            None if checked => {
                self.marks.insert(
                    path.to_path_buf(),
                    Mark {
                        checked,
                        kind: NodeKind::Directory,
                    },
                );
            }
            None => {}
        }
    }

    /// Depth-first cascade. Each directory entered is re-derived from its
    /// children after they are processed, so a sweep stopped midway leaves
    /// consistent state behind.
    fn cascade(
        &mut self,
        tree: &dyn TreeSource,
        dir: &Path,
        checked: bool,
        control: &mut SweepControl,
    ) {
        if !control.enter_directory() {
            return;
        }

        let children = tree.list_children(dir);
        if children.is_empty() {
            self.set_directory(dir, false);
            return;
        }

        for child in &children {
            if control.is_stopped() {
                break;
            }
            match child.kind {
                NodeKind::File => self.set_file(&child.path, checked),
                NodeKind::Directory => self.cascade(tree, &child.path, checked, control),
            }
        }

        let derived = self.derive_from(&children);
        self.set_directory(dir, derived);
    }

    fn derive_from(&self, children: &[ChildEntry]) -> bool {
        children.iter().any(|c| self.is_checked(&c.path))
    }

    /// Walk from `path`'s parent up to `root`, re-deriving each directory and
    /// stopping at the first one whose state does not change.
    fn rederive_ancestors(&mut self, tree: &dyn TreeSource, path: &Path, root: &Path) -> Result<()> {
        if path == root {
            return Ok(());
        }

        let mut current = path.parent();
        while let Some(dir) = current {
            if !dir.starts_with(root) {
                error!(
                    "Ancestor walk from {} escaped root {}",
                    path.display(),
                    root.display()
                );
                return Err(Error::Invariant {
                    path: dir.to_path_buf(),
                    detail: format!("ancestor walk left root {}", root.display()),
                });
            }

            let derived = self.derive_from(&tree.list_children(dir));
            let previous = self.is_checked(dir);
            self.set_directory(dir, derived);
            if previous == derived || dir == root {
                return Ok(());
            }
            current = dir.parent();
        }

        error!("Ancestor walk from {} never reached its root", path.display());
        Err(Error::Invariant {
            path: path.to_path_buf(),
            detail: format!("parent chain ended before reaching root {}", root.display()),
        })
    }

    /// Remove the entry for `path` and every entry below it.
    fn drop_subtree(&mut self, path: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .marks
            .range(path.to_path_buf()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p.clone())
            .collect();
        for p in &doomed {
            self.marks.remove(p);
        }
        doomed.len()
    }
}
