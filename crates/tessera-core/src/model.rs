//! Core data structures for the selection engine

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A top-level directory treated as an independent ignore-rule scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Root {
    pub name: String,
    pub path: PathBuf,
}

impl Root {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Root { name, path }
    }

    /// Whether `path` lives at or below this root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// Discriminates files from directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Directory,
    File,
}

impl NodeKind {
    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir { NodeKind::Directory } else { NodeKind::File }
    }

    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

/// One visible entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: NodeKind,
}

impl ChildEntry {
    pub fn new(path: impl Into<PathBuf>, kind: NodeKind) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ChildEntry { name, path, kind }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Checkbox state of a node. Directory state is always derived from its visible children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckState {
    Checked,
    #[default]
    Unchecked,
}

impl CheckState {
    pub fn is_checked(self) -> bool {
        self == CheckState::Checked
    }
}

impl From<bool> for CheckState {
    fn from(checked: bool) -> Self {
        if checked { CheckState::Checked } else { CheckState::Unchecked }
    }
}

/// Sort a listing: directories before files, lexicographic by name within each group.
pub fn sort_entries(entries: &mut [ChildEntry]) {
    entries.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name.cmp(&b.name))
    });
}
