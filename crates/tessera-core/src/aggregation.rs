//! Weight aggregation for the current selection

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::WeightCache;

/// Per-file, per-directory and grand-total weights of a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeightSummary {
    /// Selected files with their weights, in input order.
    pub files: Vec<(PathBuf, u64)>,
    /// Sum of selected file weights grouped by immediate parent directory.
    pub per_directory: BTreeMap<PathBuf, u64>,
    pub total: u64,
}

impl WeightSummary {
    pub fn weight_of(&self, path: &Path) -> Option<u64> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, w)| *w)
    }

    /// Total weight of selected files anywhere below `dir`.
    pub fn subtree_weight(&self, dir: &Path) -> u64 {
        self.per_directory
            .range(dir.to_path_buf()..)
            .take_while(|(d, _)| d.starts_with(dir))
            .map(|(_, w)| *w)
            .sum()
    }
}

/// Fold selected paths into a summary. Directories carry no weight of their
/// own and are skipped; the cache is consulted for every file.
pub async fn summarize(selected: &[PathBuf], cache: &WeightCache) -> WeightSummary {
    let mut summary = WeightSummary::default();

    for path in selected {
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_dir {
            continue;
        }

        let weight = cache.get_weight(path).await;
        if let Some(parent) = path.parent() {
            *summary.per_directory.entry(parent.to_path_buf()).or_insert(0) += weight;
        }
        summary.files.push((path.clone(), weight));
    }

    summary.total = summary.per_directory.values().sum();
    tracing::debug!(
        "Summarized {} files across {} directories: {} total",
        summary.files.len(),
        summary.per_directory.len(),
        summary.total
    );
    summary
}
