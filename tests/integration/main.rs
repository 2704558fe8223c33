//! Integration tests for Tessera
//!
//! These tests drive a real engine over temporary directory trees.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tessera_core::{CacheOptions, CheckState, EngineConfig, NodeKind, WeightCache, Weigher};
use tessera_engine::{EngineBuilder, EngineHandle};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn word_count(content: &[u8]) -> u64 {
    String::from_utf8_lossy(content).split_whitespace().count() as u64
}

fn engine_for(root: &Path) -> EngineHandle {
    EngineBuilder::new(EngineConfig::default())
        .root(root)
        .weigher(Arc::new(word_count))
        .spawn()
        .unwrap()
}

async fn names(engine: &EngineHandle, dir: &Path) -> Vec<String> {
    engine
        .list_children(dir)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect()
}

/// Ignored siblings never enter the selection and never carry weight.
#[tokio::test]
async fn test_ignored_sibling_stays_out_of_selection() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a/x.txt", "w1 w2 w3 w4 w5 w6 w7 w8 w9 w10");
    write(root, "a/y.bin", "w1 w2 w3");

    let engine = engine_for(root);
    assert_eq!(names(&engine, root).await, vec!["a"]);
    assert_eq!(names(&engine, &root.join("a")).await, vec!["x.txt"]);

    engine
        .toggle(root.join("a"), NodeKind::Directory, CheckState::Checked)
        .await
        .unwrap();
    assert_eq!(engine.selected_files().await.unwrap(), vec![root.join("a/x.txt")]);
    assert_eq!(engine.state(root.join("a/y.bin")).await.unwrap(), CheckState::Unchecked);
    assert_eq!(engine.summarize().await.unwrap().total, 10);
}

/// An override file hides a selected directory and drops its selection.
#[tokio::test]
async fn test_override_file_hides_selected_directory() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a/x.txt", "x");
    write(root, "a/deep/z.txt", "z");

    let engine = engine_for(root);
    engine
        .toggle(root.join("a"), NodeKind::Directory, CheckState::Checked)
        .await
        .unwrap();
    assert_eq!(engine.selected_files().await.unwrap().len(), 2);

    write(root, ".ignore", "a/\n");
    engine.notify_change(root.join(".ignore")).await.unwrap();

    assert_eq!(names(&engine, root).await, vec![".ignore"]);
    assert!(engine.selected_files().await.unwrap().is_empty());
    assert_eq!(engine.state(root.join("a/deep")).await.unwrap(), CheckState::Unchecked);
    assert_eq!(engine.state(root).await.unwrap(), CheckState::Unchecked);
}

/// A query keeps matches and their ancestors only; clearing it restores everything.
#[tokio::test]
async fn test_query_narrows_tree() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a/x.txt", "x");
    write(root, "b/y.txt", "y");

    let engine = engine_for(root);
    let view = engine.set_query("x").await.unwrap();
    let mut included = view.expanded.clone();
    included.extend(view.matches.clone());
    included.sort();
    assert_eq!(
        included,
        vec![root.to_path_buf(), root.join("a"), root.join("a/x.txt")]
    );
    assert_eq!(names(&engine, root).await, vec!["a"]);
    assert!(names(&engine, &root.join("b")).await.is_empty());

    engine.clear_query().await.unwrap();
    assert_eq!(names(&engine, root).await, vec!["a", "b"]);
    assert_eq!(names(&engine, &root.join("b")).await, vec!["y.txt"]);
}

/// Counts `x` bytes so a same-size rewrite changes the weight.
fn count_x(content: &[u8]) -> u64 {
    content.iter().filter(|b| **b == b'x').count() as u64
}

/// A changed mtime alone forces a recompute.
#[tokio::test]
async fn test_mtime_change_with_same_size_recomputes() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("f.txt");
    fs::write(&file, "xxoo").unwrap();

    let weigher: Arc<dyn Weigher> = Arc::new(count_x);
    let cache = WeightCache::open(
        CacheOptions::new(temp.path().join("weights.json")),
        weigher,
    );
    assert_eq!(cache.get_weight(&file).await, 2);
    assert_eq!(cache.get_weight(&file).await, 2);
    assert_eq!(cache.stats().recomputes, 1);

    fs::write(&file, "xxxo").unwrap();
    let handle = fs::OpenOptions::new().write(true).open(&file).unwrap();
    handle
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    drop(handle);

    assert_eq!(cache.get_weight(&file).await, 3);
    assert_eq!(cache.stats().recomputes, 2);
}

/// A document written by another tool version is discarded in full and rewritten.
#[tokio::test]
async fn test_tool_upgrade_discards_cache() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("f.txt");
    let document = temp.path().join("weights.json");
    fs::write(&file, "a b c").unwrap();

    let old = WeightCache::open(
        CacheOptions::new(&document).tool_version("1.0.0"),
        Arc::new(word_count),
    );
    assert_eq!(old.get_weight(&file).await, 3);
    old.flush().await.unwrap();
    assert!(document.exists());

    let new = WeightCache::open(
        CacheOptions::new(&document).tool_version("1.1.0"),
        Arc::new(word_count),
    );
    assert!(new.is_empty());

    assert_eq!(new.get_weight(&file).await, 3);
    assert_eq!(new.stats().recomputes, 1);
    new.flush().await.unwrap();

    let text = fs::read_to_string(&document).unwrap();
    assert!(text.contains("\"tool_version\": \"1.1.0\""));
    let reopened = WeightCache::open(
        CacheOptions::new(&document).tool_version("1.1.0"),
        Arc::new(word_count),
    );
    assert_eq!(reopened.len(), 1);
}

/// Weights survive an engine restart through the cache document.
#[tokio::test]
async fn test_weights_persist_across_engines() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "src/lib.rs", "pub fn a() {}");

    let first = engine_for(root);
    first
        .toggle(root.join("src"), NodeKind::Directory, CheckState::Checked)
        .await
        .unwrap();
    let total = first.summarize().await.unwrap().total;
    first.flush_cache().await.unwrap();
    drop(first);

    let second = engine_for(root);
    assert_eq!(second.cache().len(), 1);
    assert_eq!(second.weight_of(root.join("src/lib.rs")).await, total);
    assert_eq!(second.cache().stats().recomputes, 0);
}

/// Selection invariants hold across several roots and a root removal.
#[tokio::test]
async fn test_multiple_roots() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), "one/a.txt", "a");
    write(second.path(), "two/b.txt", "b c");

    let engine = EngineBuilder::new(EngineConfig::default())
        .roots([first.path(), second.path()])
        .weigher(Arc::new(word_count))
        .spawn()
        .unwrap();

    engine.select_all().await.unwrap();
    let summary = engine.summarize().await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.subtree_weight(second.path()), 2);

    engine.remove_root(second.path()).await.unwrap();
    assert_eq!(engine.summarize().await.unwrap().total, 1);
    assert_eq!(engine.state(first.path()).await.unwrap(), CheckState::Checked);
}
