//! Capability set every tree backend exposes to the selection and search layers

use std::path::Path;

use crate::model::ChildEntry;

/// A lazily traversed tree of files and directories.
///
/// The engine never holds the whole tree in memory; selection cascades and
/// search overlays walk it one directory at a time through this trait.
pub trait TreeSource {
    /// Visible children of `dir`, with ignored entries and effectively empty
    /// directories removed, sorted directories first.
    fn list_children(&self, dir: &Path) -> Vec<ChildEntry>;

    /// Whether `path` is excluded by the rule set governing it.
    fn is_ignored(&self, path: &Path) -> bool;

    fn exists(&self, path: &Path) -> bool;
}
