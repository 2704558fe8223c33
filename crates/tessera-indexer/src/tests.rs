//! Unit tests for tessera-indexer module

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tessera_core::{EngineConfig, NodeKind, Root, TreeSource};

use crate::rules::{BaseSource, RuleSet};
use crate::walker::TreeWalker;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn walker_with(root: &Path, config: &EngineConfig) -> TreeWalker {
    let mut rules = RuleSet::new();
    rules.attach(&Root::new(root), config);
    TreeWalker::new(rules)
}

fn walker_for(root: &Path) -> TreeWalker {
    walker_with(root, &EngineConfig::default())
}

fn names(walker: &TreeWalker, dir: &Path) -> Vec<String> {
    walker.list_children(dir).into_iter().map(|c| c.name).collect()
}

#[test]
fn test_listing_hides_default_ignored_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a/x.txt", "one two three");
    write(root, "a/y.bin", "\0\0\0");

    let walker = walker_for(root);
    assert_eq!(names(&walker, root), vec!["a"]);
    assert_eq!(names(&walker, &root.join("a")), vec!["x.txt"]);
    assert!(walker.is_ignored(&root.join("a/y.bin")));
    assert!(!walker.is_ignored(&root.join("a/x.txt")));
}

#[test]
fn test_effectively_empty_directories_are_hidden() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("empty/deeper/deepest")).unwrap();
    write(root, "only_ignored/pic.png", "");
    write(root, "nested/inner/keep.rs", "fn main() {}");
    write(root, "top.md", "# top");

    let walker = walker_for(root);
    assert!(walker.is_effectively_empty(&root.join("empty")));
    assert!(walker.is_effectively_empty(&root.join("only_ignored")));
    assert!(!walker.is_effectively_empty(&root.join("nested")));
    assert_eq!(names(&walker, root), vec!["nested", "top.md"]);
}

#[test]
fn test_sort_directories_first_then_name() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "b.txt", "b");
    write(root, "A.txt", "a");
    write(root, "zdir/f.txt", "f");
    write(root, "adir/f.txt", "f");

    let walker = walker_for(root);
    let children = walker.list_children(root);
    let kinds: Vec<NodeKind> = children.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![NodeKind::Directory, NodeKind::Directory, NodeKind::File, NodeKind::File]
    );
    assert_eq!(names(&walker, root), vec!["adir", "zdir", "A.txt", "b.txt"]);
}

#[test]
fn test_override_file_replaces_defaults() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, ".ignore", "a/\n");
    write(root, "a/x.txt", "x");
    write(root, "b/pic.png", "png");

    let walker = walker_for(root);
    let rules = walker.rules().rules_for(root).unwrap();
    assert_eq!(rules.base_source(), &BaseSource::OverrideFile(root.join(".ignore")));

    let listed = names(&walker, root);
    assert!(!listed.contains(&"a".to_string()));
    // Defaults no longer apply once an override exists.
    assert!(listed.contains(&"b".to_string()));
    assert!(walker.is_ignored(&root.join("a/x.txt")));
}

#[test]
fn test_configured_patterns_used_without_override_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "app.log", "log");
    write(root, "pic.png", "png");

    let config = EngineConfig {
        override_patterns: Some("*.log".to_string()),
        ..EngineConfig::default()
    };
    let walker = walker_with(root, &config);
    assert_eq!(
        walker.rules().rules_for(root).unwrap().base_source(),
        &BaseSource::Configured
    );
    assert_eq!(names(&walker, root), vec!["pic.png"]);
}

#[test]
fn test_nearest_rule_file_wins_without_chaining() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, ".gitignore", "*.tmp\n");
    write(root, "sub/.gitignore", "*.log\n");
    write(root, "top.tmp", "t");
    write(root, "sub/a.tmp", "t");
    write(root, "sub/a.log", "l");
    write(root, "sub/deep/b.log", "l");
    write(root, "sub/deep/b.tmp", "t");

    let walker = walker_for(root);
    assert!(walker.is_ignored(&root.join("top.tmp")));
    // The parent rule file is not consulted once a nearer one exists.
    assert!(!walker.is_ignored(&root.join("sub/a.tmp")));
    assert!(walker.is_ignored(&root.join("sub/a.log")));
    assert!(walker.is_ignored(&root.join("sub/deep/b.log")));
    assert!(!walker.is_ignored(&root.join("sub/deep/b.tmp")));
}

#[test]
fn test_negation_and_directory_only_patterns() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, ".gitignore", "*.txt\n!keep.txt\ncache/\n");
    write(root, "drop.txt", "d");
    write(root, "keep.txt", "k");
    write(root, "cache/data.rs", "c");
    write(root, "notes/cache", "a file named cache");

    let walker = walker_for(root);
    assert!(walker.is_ignored(&root.join("drop.txt")));
    assert!(!walker.is_ignored(&root.join("keep.txt")));
    assert!(walker.is_ignored(&root.join("cache")));
    assert!(walker.is_ignored(&root.join("cache/data.rs")));
    assert!(!walker.is_ignored(&root.join("notes/cache")));
}

#[test]
fn test_rule_files_disabled_uses_minimal_excludes() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, ".gitignore", "*.txt\n");
    write(root, ".ignore", "src/\n");
    write(root, "a.txt", "a");
    write(root, "pic.png", "p");
    write(root, "src/lib.rs", "l");
    write(root, ".git/HEAD", "ref");

    let config = EngineConfig {
        honor_rule_files: false,
        ..EngineConfig::default()
    };
    let walker = walker_with(root, &config);
    assert_eq!(
        walker.rules().rules_for(root).unwrap().base_source(),
        &BaseSource::Minimal
    );
    assert!(!walker.is_ignored(&root.join("a.txt")));
    assert!(!walker.is_ignored(&root.join("pic.png")));
    assert!(!walker.is_ignored(&root.join("src/lib.rs")));
    assert!(walker.is_ignored(&root.join(".git/HEAD")));
}

#[test]
fn test_unreadable_rule_file_counts_as_absent() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    // A directory where the rule file should be cannot be read as text.
    fs::create_dir_all(root.join("sub/.gitignore")).unwrap();
    write(root, "sub/.gitignore/inner.txt", "*");
    write(root, "sub/file.txt", "f");

    let walker = walker_for(root);
    assert!(!walker.is_ignored(&root.join("sub/file.txt")));
    assert!(names(&walker, &root.join("sub")).contains(&"file.txt".to_string()));
}

#[test]
fn test_reload_picks_up_new_rules() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a/x.txt", "x");
    write(root, "b/y.txt", "y");

    let config = EngineConfig::default();
    let mut walker = walker_for(root);
    assert_eq!(names(&walker, root), vec!["a", "b"]);

    write(root, ".ignore", "a/\n");
    // Memoized until rules are reloaded.
    assert_eq!(names(&walker, root), vec!["a", "b"]);

    assert!(walker.rules_mut().reload(root, &config));
    assert_eq!(names(&walker, root), vec!["b", ".ignore"]);
    assert!(!walker.rules_mut().reload(&PathBuf::from("/not/attached"), &config));
}

#[test]
fn test_evict_refreshes_changed_directory() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a/x.txt", "x");

    let walker = walker_for(root);
    assert_eq!(names(&walker, root), vec!["a"]);

    write(root, "b/new.txt", "n");
    walker.evict(&root.join("b"));
    assert_eq!(names(&walker, root), vec!["a", "b"]);

    fs::remove_file(root.join("a/x.txt")).unwrap();
    walker.evict(&root.join("a"));
    assert_eq!(names(&walker, root), vec!["b"]);
}

#[test]
fn test_evict_rereads_rule_file_of_replaced_directory() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "sub/keep.txt", "k");
    write(root, "sub/drop.txt", "d");

    let walker = walker_for(root);
    assert_eq!(names(&walker, &root.join("sub")), vec!["drop.txt", "keep.txt"]);

    // A directory moved into place arrives with its own rule file.
    write(root, "staging/.gitignore", "drop.txt\n");
    write(root, "staging/keep.txt", "k");
    write(root, "staging/drop.txt", "d");
    fs::remove_dir_all(root.join("sub")).unwrap();
    fs::rename(root.join("staging"), root.join("sub")).unwrap();

    walker.evict(&root.join("sub"));
    assert_eq!(names(&walker, &root.join("sub")), vec![".gitignore", "keep.txt"]);
    assert!(walker.is_ignored(&root.join("sub/drop.txt")));
}

#[test]
fn test_cache_dir_hidden_whatever_the_base_source() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, ".tessera/weights.json", "{}");
    write(root, "a/x.txt", "x");

    let configured = EngineConfig {
        override_patterns: Some("*.log".to_string()),
        ..EngineConfig::default()
    };
    let minimal = EngineConfig {
        honor_rule_files: false,
        ..EngineConfig::default()
    };
    for config in [EngineConfig::default(), configured, minimal] {
        let walker = walker_with(root, &config);
        assert_eq!(names(&walker, root), vec!["a"]);
    }

    // An override file cannot bring the cache directory back, even by negation.
    write(root, ".ignore", "*.log\n!.tessera/\n");
    let walker = walker_for(root);
    assert_eq!(names(&walker, root), vec!["a", ".ignore"]);
    assert!(walker.is_ignored(&root.join(".tessera/weights.json")));
}

#[test]
fn test_rules_resolve_to_innermost_root() {
    let outer = TempDir::new().unwrap();
    let inner = outer.path().join("nested");
    write(outer.path(), ".ignore", "*.md\n");
    write(&inner, "doc.md", "d");

    let config = EngineConfig::default();
    let mut rules = RuleSet::new();
    rules.attach(&Root::new(outer.path()), &config);
    rules.attach(&Root::new(&inner), &config);

    assert!(rules.is_ignored(&outer.path().join("readme.md"), false));
    // The inner root is its own scope and keeps the default set.
    assert!(!rules.is_ignored(&inner.join("doc.md"), false));

    rules.detach(&inner);
    assert!(rules.is_ignored(&inner.join("doc.md"), false));
    assert_eq!(rules.roots().count(), 1);
}

#[test]
fn test_exists_reports_disk_state() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "f.txt", "f");
    let walker = walker_for(temp.path());
    assert!(walker.exists(&temp.path().join("f.txt")));
    assert!(!walker.exists(&temp.path().join("gone.txt")));
}
