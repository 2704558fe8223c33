//! Ignore-rule resolution per root
//!
//! Each root owns a base pattern set (override file, configured patterns or
//! the built-in deny-list) and a lazily populated map of directory-scoped
//! rule files. For a path, the base set is consulted first; if it has no
//! opinion, the nearest ancestor directory carrying a rule file decides alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tessera_core::{CACHE_DIR, EngineConfig, Root};
use tracing::{debug, info, warn};

/// Binary, media and build-artifact patterns hidden when a root has no override.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // ── Version control / dependencies ──────────────────────
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "bower_components/",
    ".venv/",
    "venv/",
    "__pycache__/",
    // ── Build output ────────────────────────────────────────
    "target/",
    "dist/",
    "build/",
    "out/",
    ".next/",
    "coverage/",
    // ── Compiled artifacts ──────────────────────────────────
    "*.o",
    "*.a",
    "*.so",
    "*.dylib",
    "*.dll",
    "*.exe",
    "*.bin",
    "*.class",
    "*.jar",
    "*.pyc",
    "*.wasm",
    // ── Media ───────────────────────────────────────────────
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.bmp",
    "*.ico",
    "*.webp",
    "*.mp3",
    "*.mp4",
    "*.mov",
    "*.wav",
    "*.ttf",
    "*.woff",
    "*.woff2",
    // ── Archives / documents ────────────────────────────────
    "*.zip",
    "*.tar",
    "*.gz",
    "*.7z",
    "*.pdf",
    // ── Tool state ──────────────────────────────────────────
    ".DS_Store",
];

/// Excludes applied when rule-file scanning is disabled.
pub const MINIMAL_EXCLUDES: &[&str] = &[".git/", ".hg/", ".svn/", "node_modules/"];

/// Where a root's base pattern set came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseSource {
    OverrideFile(PathBuf),
    Configured,
    Defaults,
    Minimal,
}

/// Compiled rules for one root. Replaced wholesale on reload.
#[derive(Debug)]
pub struct RootRules {
    root: PathBuf,
    base: Gitignore,
    base_source: BaseSource,
    honor_rule_files: bool,
    rule_file_name: String,
    /// Directory → its compiled rule file, `None` recording absence.
    dir_rules: DashMap<PathBuf, Option<Arc<Gitignore>>>,
}

impl RootRules {
    pub fn load(root: &Path, config: &EngineConfig) -> Self {
        let (base, base_source) = build_base(root, config);
        info!("Loaded ignore rules for {} ({:?})", root.display(), base_source);
        RootRules {
            root: root.to_path_buf(),
            base,
            base_source,
            honor_rule_files: config.honor_rule_files,
            rule_file_name: config.rule_file_name.clone(),
            dir_rules: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_source(&self) -> &BaseSource {
        &self.base_source
    }

    /// Verdict for one entry whose parent directory is already known visible.
    pub fn is_ignored_entry(&self, path: &Path, is_dir: bool) -> bool {
        if path == self.root || !path.starts_with(&self.root) {
            return false;
        }

        match self.base.matched(path, is_dir) {
            Match::Ignore(glob) => {
                debug!("{} ignored by base pattern {:?}", path.display(), glob.original());
                return true;
            }
            Match::Whitelist(_) => return false,
            Match::None => {}
        }

        if !self.honor_rule_files {
            return false;
        }
        match self.nearest_rule_file(path) {
            Some(rules) => rules.matched(path, is_dir).is_ignore(),
            None => false,
        }
    }

    /// Full verdict: `path` is ignored if it or any directory between it and
    /// the root is ignored.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let mut current = self.root.clone();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            current.push(component);
            let last = components.peek().is_none();
            if self.is_ignored_entry(&current, if last { is_dir } else { true }) {
                return true;
            }
        }
        false
    }

    /// The closest rule file from `path`'s parent up to the root.
    fn nearest_rule_file(&self, path: &Path) -> Option<Arc<Gitignore>> {
        let mut current = path.parent();
        while let Some(dir) = current {
            if !dir.starts_with(&self.root) {
                break;
            }
            if let Some(rules) = self.rule_file_in(dir) {
                return Some(rules);
            }
            current = dir.parent();
        }
        None
    }

    /// Forget the rule files memoized for `path` and every directory below it.
    pub fn evict(&self, path: &Path) {
        self.dir_rules.retain(|dir, _| !dir.starts_with(path));
    }

    fn rule_file_in(&self, dir: &Path) -> Option<Arc<Gitignore>> {
        if let Some(cached) = self.dir_rules.get(dir) {
            return cached.clone();
        }
        let loaded = load_rule_file(dir, &self.rule_file_name).map(Arc::new);
        self.dir_rules.insert(dir.to_path_buf(), loaded.clone());
        loaded
    }
}

/// The base matcher for `root`. Whichever source wins, the engine's own cache
/// directory is appended last so no override can bring it back into view.
fn build_base(root: &Path, config: &EngineConfig) -> (Gitignore, BaseSource) {
    let cache_exclude = format!("{CACHE_DIR}/");
    let tail = std::iter::once(cache_exclude.as_str());

    if !config.honor_rule_files {
        let mut lines: Vec<&str> = MINIMAL_EXCLUDES.to_vec();
        if let Some(extra) = config.override_patterns.as_deref() {
            lines.extend(extra.lines());
        }
        return (compile(root, None, lines.into_iter().chain(tail)), BaseSource::Minimal);
    }

    let override_path = root.join(&config.override_file_name);
    if let Some(text) = read_rule_text(&override_path) {
        return (
            compile(root, Some(&override_path), text.lines().chain(tail)),
            BaseSource::OverrideFile(override_path),
        );
    }
    if let Some(text) = config.override_patterns.as_deref() {
        return (compile(root, None, text.lines().chain(tail)), BaseSource::Configured);
    }
    (
        compile(root, None, DEFAULT_IGNORE_PATTERNS.iter().copied().chain(tail)),
        BaseSource::Defaults,
    )
}

fn load_rule_file(dir: &Path, name: &str) -> Option<Gitignore> {
    let path = dir.join(name);
    let text = read_rule_text(&path)?;
    debug!("Loaded rule file {}", path.display());
    Some(compile(dir, Some(&path), text.lines()))
}

/// Read a rule file. Any failure counts as absence, never as "ignore everything".
fn read_rule_text(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Cannot read rule file {}: {}", path.display(), e);
            None
        }
    }
}

/// Compile ignore-file lines anchored at `base`. Bad lines are skipped.
fn compile<'a>(
    base: &Path,
    source: Option<&Path>,
    lines: impl IntoIterator<Item = &'a str>,
) -> Gitignore {
    let mut builder = GitignoreBuilder::new(base);
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(e) = builder.add_line(source.map(Path::to_path_buf), line) {
            warn!("Skipping ignore pattern {:?}: {}", line, e);
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!("Failed to build ignore rules under {}: {}", base.display(), e);
        Gitignore::empty()
    })
}

/// Rules for every attached root.
#[derive(Debug, Default)]
pub struct RuleSet {
    roots: Vec<Arc<RootRules>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, root: &Root, config: &EngineConfig) {
        self.detach(&root.path);
        self.roots.push(Arc::new(RootRules::load(&root.path, config)));
    }

    pub fn detach(&mut self, root: &Path) {
        self.roots.retain(|r| r.root() != root);
    }

    /// Rebuild every matcher for `root` from disk, replacing the old set in one step.
    pub fn reload(&mut self, root: &Path, config: &EngineConfig) -> bool {
        let Some(slot) = self.roots.iter_mut().find(|r| r.root() == root) else {
            return false;
        };
        *slot = Arc::new(RootRules::load(root, config));
        true
    }

    pub fn reload_all(&mut self, config: &EngineConfig) {
        for slot in &mut self.roots {
            let root = slot.root().to_path_buf();
            *slot = Arc::new(RootRules::load(&root, config));
        }
    }

    /// Drop memoized rule files at and below `path` in every root.
    pub fn evict(&self, path: &Path) {
        for rules in &self.roots {
            rules.evict(path);
        }
    }

    /// Rules of the innermost root containing `path`.
    pub fn rules_for(&self, path: &Path) -> Option<&RootRules> {
        self.roots
            .iter()
            .filter(|r| path.starts_with(r.root()))
            .max_by_key(|r| r.root().components().count())
            .map(|r| r.as_ref())
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|r| r.root())
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.rules_for(path)
            .is_some_and(|rules| rules.is_ignored(path, is_dir))
    }

    /// Verdict for a single entry, ignoring its ancestors.
    pub fn is_ignored_entry(&self, path: &Path, is_dir: bool) -> bool {
        self.rules_for(path)
            .is_some_and(|rules| rules.is_ignored_entry(path, is_dir))
    }

    /// Whether `path` is ignored, reading its kind from disk. Paths that
    /// cannot be stat'ed are judged as files.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let is_dir = std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false);
        self.is_ignored(path, is_dir)
    }
}
