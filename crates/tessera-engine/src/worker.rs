//! The engine worker: one thread owning all mutable tree state
//!
//! Every mutation of the selection, the rule set and the search overlay runs
//! on this thread, one command at a time. Rule reloads requested through the
//! shared pending set jump the queue: they are applied before the next
//! command is looked at.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tessera_core::{
    CancellationToken, CheckState, ChildEntry, EngineConfig, Error, InclusionOverlay, NodeKind,
    Result, Root, SelectionStore, SweepControl, SweepOutcome, TreeSource,
};
use tessera_indexer::{RuleSet, TreeWalker};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// What a non-rule change notification did to the engine state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeEffect {
    pub rules_reloaded: bool,
    /// Selection entries dropped because the path vanished, or subtrees
    /// dropped because a directory moved in with rules that ignore them.
    pub selection_dropped: usize,
    pub cache_invalidated: bool,
}

/// Result of installing a search query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchView {
    pub query: String,
    pub matches: Vec<PathBuf>,
    /// Ancestors of every match, to be presented expanded.
    pub expanded: Vec<PathBuf>,
}

pub(crate) enum Command {
    AddRoot { path: PathBuf, reply: Reply<Root> },
    RemoveRoot { path: PathBuf, reply: Reply<usize> },
    Roots { reply: Reply<Vec<Root>> },
    ListChildren { dir: PathBuf, reply: Reply<Vec<ChildEntry>> },
    Toggle {
        path: PathBuf,
        kind: NodeKind,
        state: CheckState,
        cancel: CancellationToken,
        reply: Reply<SweepOutcome>,
    },
    Sweep {
        checked: bool,
        cancel: CancellationToken,
        reply: Reply<SweepOutcome>,
    },
    State { path: PathBuf, reply: Reply<CheckState> },
    SelectedFiles { reply: Reply<Vec<PathBuf>> },
    RemovePath { path: PathBuf, reply: Reply<usize> },
    SetQuery { query: String, reply: Reply<SearchView> },
    SetConfig { config: EngineConfig, reply: Reply<()> },
    PathChanged { path: PathBuf, reply: Reply<ChangeEffect> },
    /// No-op used to flush pending reloads and wait for the queue to drain.
    Barrier { reply: Reply<()> },
}

pub(crate) struct EngineState {
    config: EngineConfig,
    roots: Vec<Root>,
    walker: TreeWalker,
    selection: SelectionStore,
    overlay: InclusionOverlay,
    pending_reloads: Arc<DashSet<PathBuf>>,
}

impl EngineState {
    pub(crate) fn new(
        config: EngineConfig,
        roots: Vec<Root>,
        pending_reloads: Arc<DashSet<PathBuf>>,
    ) -> Self {
        let mut rules = RuleSet::new();
        let mut selection = SelectionStore::new();
        for root in &roots {
            rules.attach(root, &config);
            selection.add_root(&root.path);
        }
        EngineState {
            config,
            roots,
            walker: TreeWalker::new(rules),
            selection,
            overlay: InclusionOverlay::empty(),
            pending_reloads,
        }
    }

    /// Drain the command queue until every handle is gone.
    pub(crate) fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Engine worker started with {} roots", self.roots.len());
        while let Some(command) = commands.blocking_recv() {
            self.apply_pending_reloads();
            self.handle(command);
        }
        info!("Engine worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::AddRoot { path, reply } => respond(reply, self.add_root(path)),
            Command::RemoveRoot { path, reply } => respond(reply, self.remove_root(&path)),
            Command::Roots { reply } => respond(reply, Ok(self.roots.clone())),
            Command::ListChildren { dir, reply } => respond(reply, self.list_children(&dir)),
            Command::Toggle {
                path,
                kind,
                state,
                cancel,
                reply,
            } => {
                let mut control = self.sweep_control(cancel);
                let result =
                    self.selection
                        .toggle(&self.walker, &path, kind, state, &mut control);
                respond(reply, result);
            }
            Command::Sweep {
                checked,
                cancel,
                reply,
            } => {
                let mut control = self.sweep_control(cancel);
                let outcome = if checked {
                    self.selection.select_all(&self.walker, &mut control)
                } else {
                    self.selection.deselect_all(&self.walker, &mut control)
                };
                if !outcome.completed {
                    info!(
                        "Sweep stopped after {} directories",
                        outcome.directories_visited
                    );
                }
                respond(reply, Ok(outcome));
            }
            Command::State { path, reply } => respond(reply, Ok(self.selection.state(&path))),
            Command::SelectedFiles { reply } => {
                respond(reply, Ok(self.selection.selected_files()))
            }
            Command::RemovePath { path, reply } => {
                respond(reply, self.selection.remove_path(&self.walker, &path))
            }
            Command::SetQuery { query, reply } => respond(reply, self.set_query(&query)),
            Command::SetConfig { config, reply } => respond(reply, self.set_config(config)),
            Command::PathChanged { path, reply } => respond(reply, self.path_changed(&path)),
            Command::Barrier { reply } => respond(reply, Ok(())),
        }
    }

    fn sweep_control(&self, cancel: CancellationToken) -> SweepControl {
        SweepControl::with_limit(self.config.sweep_directory_limit).with_cancel(cancel)
    }

    fn add_root(&mut self, path: PathBuf) -> Result<Root> {
        if let Some(existing) = self.roots.iter().find(|r| r.path == path) {
            return Ok(existing.clone());
        }
        let root = Root::new(path);
        self.walker.rules_mut().attach(&root, &self.config);
        self.selection.add_root(&root.path);
        self.roots.push(root.clone());
        self.refresh_overlay();
        info!("Attached root {}", root.path.display());
        Ok(root)
    }

    fn remove_root(&mut self, path: &Path) -> Result<usize> {
        let Some(index) = self.roots.iter().position(|r| r.path == path) else {
            return Err(Error::UnknownRoot(path.to_path_buf()));
        };
        self.roots.remove(index);
        self.walker.rules_mut().detach(path);
        let dropped = self.selection.remove_root(path);
        self.refresh_overlay();
        info!(
            "Detached root {} ({} selection entries dropped)",
            path.display(),
            dropped
        );
        Ok(dropped)
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<ChildEntry>> {
        let root = self
            .selection
            .root_of(dir)
            .ok_or_else(|| Error::UnknownRoot(dir.to_path_buf()))?;
        if dir != root && self.walker.is_ignored(dir) {
            return Ok(Vec::new());
        }
        Ok(self.overlay.filter(self.walker.list_children(dir)))
    }

    fn set_query(&mut self, query: &str) -> Result<SearchView> {
        self.overlay = InclusionOverlay::build(query, self.selection.roots(), &self.walker)?;
        Ok(self.search_view())
    }

    fn search_view(&self) -> SearchView {
        SearchView {
            query: self.overlay.query().to_string(),
            matches: self.overlay.matches().map(Path::to_path_buf).collect(),
            expanded: self
                .overlay
                .expanded_directories()
                .map(Path::to_path_buf)
                .collect(),
        }
    }

    /// Rebuild an active overlay against the current tree.
    fn refresh_overlay(&mut self) {
        if !self.overlay.is_active() {
            return;
        }
        let query = self.overlay.query().to_string();
        match InclusionOverlay::build(&query, self.selection.roots(), &self.walker) {
            Ok(overlay) => self.overlay = overlay,
            Err(e) => debug!("Dropping search overlay: {}", e),
        }
    }

    fn set_config(&mut self, config: EngineConfig) -> Result<()> {
        self.config = config;
        self.walker.rules_mut().reload_all(&self.config);
        self.prune(None)?;
        self.refresh_overlay();
        info!("Engine configuration updated");
        Ok(())
    }

    fn apply_pending_reloads(&mut self) {
        if self.pending_reloads.is_empty() {
            return;
        }
        let pending: Vec<PathBuf> = self.pending_reloads.iter().map(|p| p.clone()).collect();
        for path in &pending {
            self.pending_reloads.remove(path);
        }

        let mut reloaded: Vec<PathBuf> = Vec::new();
        for path in pending {
            let Some(root) = self.selection.root_of(&path).map(Path::to_path_buf) else {
                debug!("Reload requested outside any root: {}", path.display());
                continue;
            };
            if reloaded.contains(&root) {
                continue;
            }
            if self.walker.rules_mut().reload(&root, &self.config) {
                info!("Reloaded ignore rules for {}", root.display());
            }
            reloaded.push(root);
        }

        for root in &reloaded {
            if let Err(e) = self.prune(Some(root)) {
                error!("Cleanup after rule reload failed: {}", e);
            }
        }
        self.refresh_overlay();
    }

    /// Drop selection entries the current rules ignore.
    fn prune(&mut self, root: Option<&Path>) -> Result<()> {
        let pruned = self.selection.prune_ignored(&self.walker, root)?;
        for path in &pruned {
            debug!("Dropped newly ignored selection under {}", path.display());
        }
        Ok(())
    }

    fn path_changed(&mut self, path: &Path) -> Result<ChangeEffect> {
        self.walker.evict(path);
        let mut effect = ChangeEffect::default();
        let Some(root) = self.selection.root_of(path).map(Path::to_path_buf) else {
            return Ok(effect);
        };
        if !self.walker.exists(path) {
            effect.selection_dropped = self.selection.remove_path(&self.walker, path)?;
        } else if path.is_dir() {
            // A directory moved into place may bring rule files of its own.
            let pruned = self.selection.prune_ignored(&self.walker, Some(&root))?;
            effect.selection_dropped = pruned.len();
        }
        Ok(effect)
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if let Err(e) = &result {
        if e.is_invariant() {
            error!("{}", e);
        }
    }
    // The caller may have stopped waiting; the state change still stands.
    let _ = reply.send(result);
}
