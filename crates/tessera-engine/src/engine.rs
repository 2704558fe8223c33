//! Engine construction and the async handle callers talk to

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashSet;
use tessera_core::{
    CacheOptions, CancellationToken, CheckState, ChildEntry, EngineConfig, NodeKind, Root,
    SweepOutcome, TokenEstimator, WeightCache, WeightSummary, Weigher, summarize,
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::worker::{ChangeEffect, Command, EngineState, Reply, SearchView};

/// Configures and starts an engine instance.
pub struct EngineBuilder {
    config: EngineConfig,
    roots: Vec<PathBuf>,
    weigher: Arc<dyn Weigher>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder {
            config,
            roots: Vec::new(),
            weigher: Arc::new(TokenEstimator),
        }
    }

    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    pub fn roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn weigher(mut self, weigher: Arc<dyn Weigher>) -> Self {
        self.weigher = weigher;
        self
    }

    /// Validate the roots, open the weight cache and start the worker thread.
    pub fn spawn(self) -> Result<EngineHandle> {
        let mut roots: Vec<Root> = Vec::new();
        for path in &self.roots {
            let path = resolve_root(path)?;
            if !roots.iter().any(|r| r.path == path) {
                roots.push(Root::new(path));
            }
        }

        let cache_path = self.config.cache_path_for(&roots);
        let cache = WeightCache::open(
            CacheOptions::new(&cache_path).flush_quiet(self.config.flush_quiet()),
            self.weigher,
        );
        debug!("Weight cache at {} ({} entries)", cache_path.display(), cache.len());

        let pending_reloads = Arc::new(DashSet::new());
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = EngineState::new(self.config.clone(), roots, pending_reloads.clone());

        std::thread::Builder::new()
            .name("tessera-engine".to_string())
            .spawn(move || state.run(receiver))
            .map_err(EngineError::Spawn)?;

        Ok(EngineHandle {
            commands: sender,
            pending_reloads,
            config: Arc::new(RwLock::new(self.config)),
            cache,
        })
    }
}

/// Absolute form of `path`, which must be an existing directory.
fn resolve_root(path: &Path) -> Result<PathBuf> {
    let absolute =
        std::path::absolute(path).map_err(|_| EngineError::InvalidRoot(path.to_path_buf()))?;
    if !absolute.is_dir() {
        return Err(EngineError::InvalidRoot(absolute));
    }
    Ok(absolute)
}

/// Cloneable async front of one engine instance.
///
/// Every call is queued behind the ones before it; the worker stops once the
/// last handle is dropped.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    pending_reloads: Arc<DashSet<PathBuf>>,
    config: Arc<RwLock<EngineConfig>>,
    cache: WeightCache,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("cache", &self.cache)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| EngineError::Closed)?;
        let result = response.await.map_err(|_| EngineError::Closed)?;
        Ok(result?)
    }

    pub fn cache(&self) -> &WeightCache {
        &self.cache
    }

    pub fn config(&self) -> EngineConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub async fn add_root(&self, path: impl AsRef<Path>) -> Result<Root> {
        let path = resolve_root(path.as_ref())?;
        self.request(|reply| Command::AddRoot { path, reply }).await
    }

    /// Detach a root. Returns the number of selection entries dropped with it.
    pub async fn remove_root(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref().to_path_buf();
        self.request(|reply| Command::RemoveRoot { path, reply }).await
    }

    pub async fn roots(&self) -> Result<Vec<Root>> {
        self.request(|reply| Command::Roots { reply }).await
    }

    /// Visible children of `dir`, narrowed by the active search query.
    pub async fn list_children(&self, dir: impl AsRef<Path>) -> Result<Vec<ChildEntry>> {
        let dir = dir.as_ref().to_path_buf();
        self.request(|reply| Command::ListChildren { dir, reply }).await
    }

    pub async fn toggle(
        &self,
        path: impl AsRef<Path>,
        kind: NodeKind,
        state: CheckState,
    ) -> Result<SweepOutcome> {
        self.toggle_with(path, kind, state, CancellationToken::new())
            .await
    }

    /// Toggle with a token the caller may cancel while the cascade runs.
    pub async fn toggle_with(
        &self,
        path: impl AsRef<Path>,
        kind: NodeKind,
        state: CheckState,
        cancel: CancellationToken,
    ) -> Result<SweepOutcome> {
        let path = path.as_ref().to_path_buf();
        self.request(|reply| Command::Toggle {
            path,
            kind,
            state,
            cancel,
            reply,
        })
        .await
    }

    pub async fn select_all(&self) -> Result<SweepOutcome> {
        self.sweep(true, CancellationToken::new()).await
    }

    pub async fn deselect_all(&self) -> Result<SweepOutcome> {
        self.sweep(false, CancellationToken::new()).await
    }

    /// Select or deselect every root, stoppable through `cancel`.
    pub async fn sweep(&self, checked: bool, cancel: CancellationToken) -> Result<SweepOutcome> {
        self.request(|reply| Command::Sweep {
            checked,
            cancel,
            reply,
        })
        .await
    }

    pub async fn state(&self, path: impl AsRef<Path>) -> Result<CheckState> {
        let path = path.as_ref().to_path_buf();
        self.request(|reply| Command::State { path, reply }).await
    }

    /// Checked files in path order.
    pub async fn selected_files(&self) -> Result<Vec<PathBuf>> {
        self.request(|reply| Command::SelectedFiles { reply }).await
    }

    pub async fn remove_path(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref().to_path_buf();
        self.request(|reply| Command::RemovePath { path, reply })
            .await
    }

    /// Install a search query. A blank query restores full visibility.
    pub async fn set_query(&self, query: impl Into<String>) -> Result<SearchView> {
        let query = query.into();
        self.request(|reply| Command::SetQuery { query, reply })
            .await
    }

    pub async fn clear_query(&self) -> Result<SearchView> {
        self.set_query("").await
    }

    /// Replace the configuration, rebuilding every root's rules.
    ///
    /// The weight cache keeps the location and flush window it was opened with.
    pub async fn set_config(&self, config: EngineConfig) -> Result<()> {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config.clone();
        self.request(|reply| Command::SetConfig { config, reply })
            .await
    }

    /// Ask for the rules governing `path` to be rebuilt ahead of every queued command.
    pub fn request_reload(&self, path: impl Into<PathBuf>) {
        self.pending_reloads.insert(path.into());
    }

    /// Route a filesystem change notification.
    ///
    /// Rule files trigger a priority reload of their root. Anything else
    /// evicts the cached listing, drops the selection of a vanished path and
    /// invalidates its cached weight.
    pub async fn notify_change(&self, path: impl AsRef<Path>) -> Result<ChangeEffect> {
        let path = path.as_ref().to_path_buf();
        if self.is_rule_file(&path) {
            debug!("Rule file changed: {}", path.display());
            self.request_reload(path);
            self.request(|reply| Command::Barrier { reply }).await?;
            return Ok(ChangeEffect {
                rules_reloaded: true,
                ..ChangeEffect::default()
            });
        }

        let mut effect = self
            .request(|reply| Command::PathChanged {
                path: path.clone(),
                reply,
            })
            .await?;
        effect.cache_invalidated = self.cache.invalidate(&path).await;
        Ok(effect)
    }

    fn is_rule_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_rule_file_name(name)
    }

    /// Wait until every command queued so far has been served.
    pub async fn sync(&self) -> Result<()> {
        self.request(|reply| Command::Barrier { reply }).await
    }

    /// Weight of one file through the cache.
    pub async fn weight_of(&self, path: impl AsRef<Path>) -> u64 {
        self.cache.get_weight(path.as_ref()).await
    }

    /// Per-file, per-directory and total weights of the current selection.
    pub async fn summarize(&self) -> Result<WeightSummary> {
        let files = self.selected_files().await?;
        Ok(summarize(&files, &self.cache).await)
    }

    pub async fn flush_cache(&self) -> Result<()> {
        self.cache.flush().await?;
        Ok(())
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear().await?;
        Ok(())
    }
}
