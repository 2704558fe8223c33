//! Filesystem watcher feeding change notifications to the engine

use anyhow::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::CACHE_DIR;
use tessera_engine::{EngineError, EngineHandle};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File or directory created
    Created(PathBuf),
    /// File or directory modified, including either side of a rename
    Modified(PathBuf),
    /// File or directory removed
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Removed(p) => p,
        }
    }
}

/// Recursive watcher over any number of roots
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    watched_paths: HashSet<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    debug!("File system event: {:?}", event);
                    for watch_event in convert_event(event) {
                        if event_tx.send(watch_event).is_err() {
                            warn!("Watch event dropped: receiver closed");
                        }
                    }
                }
                Err(e) => {
                    error!("File system watch error: {}", e);
                }
            }
        })?;

        Ok(Self {
            watcher,
            event_rx,
            watched_paths: HashSet::new(),
        })
    }

    /// Watch a directory recursively
    pub fn watch_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Watching directory: {:?}", path);

        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Stopping watch for: {:?}", path);

        self.watcher.unwatch(path)?;
        self.watched_paths.remove(path);
        Ok(())
    }

    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }

    pub fn watched_paths(&self) -> &HashSet<PathBuf> {
        &self.watched_paths
    }
}

/// Map a notify event onto watch events, dropping noise.
fn convert_event(event: notify::Event) -> Vec<WatchEvent> {
    let wrap: fn(PathBuf) -> WatchEvent = match event.kind {
        EventKind::Create(_) => WatchEvent::Created,
        EventKind::Modify(_) => WatchEvent::Modified,
        EventKind::Remove(_) => WatchEvent::Removed,
        _ => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .filter(|p| !should_ignore_path(p))
        .map(wrap)
        .collect()
}

/// Paths whose changes never affect listings or weights: VCS internals and
/// the engine's own cache directory.
fn should_ignore_path(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str();
        name == ".git" || name == CACHE_DIR
    })
}

/// Routes watch events from every engine root into the engine.
pub struct WatcherService {
    watcher: Arc<Mutex<FileWatcher>>,
    engine: EngineHandle,
}

impl WatcherService {
    pub fn new(engine: EngineHandle) -> Result<Self> {
        Ok(Self {
            watcher: Arc::new(Mutex::new(FileWatcher::new()?)),
            engine,
        })
    }

    /// Watch every root currently attached to the engine.
    pub async fn start_watching(&self) -> Result<()> {
        let roots = self.engine.roots().await?;
        let mut watcher = self.watcher.lock().await;
        for root in &roots {
            if !watcher.is_watching(&root.path) {
                watcher.watch_directory(&root.path)?;
            }
        }
        info!("Started watching {} roots", roots.len());
        Ok(())
    }

    /// Forward events until the watcher closes or the engine stops.
    pub async fn process_events(&self) -> Result<()> {
        let mut watcher = self.watcher.lock().await;
        let event_rx = watcher.event_receiver();

        while let Some(event) = event_rx.recv().await {
            debug!("Processing watch event: {:?}", event);
            self.handle_event(&event).await?;
        }

        Ok(())
    }

    /// Apply one event. Only a stopped engine is fatal.
    pub async fn handle_event(&self, event: &WatchEvent) -> Result<()> {
        match self.engine.notify_change(event.path()).await {
            Ok(effect) => {
                if effect.rules_reloaded {
                    info!("Ignore rules reloaded after change to {:?}", event.path());
                } else if effect.selection_dropped > 0 {
                    info!(
                        "{} selection entries dropped for {:?}",
                        effect.selection_dropped,
                        event.path()
                    );
                }
                Ok(())
            }
            Err(EngineError::Closed) => Err(EngineError::Closed.into()),
            Err(e) => {
                warn!("Failed to apply change to {:?}: {}", event.path(), e);
                Ok(())
            }
        }
    }

    /// Watch every root and process events until the engine stops.
    pub async fn run(&self) -> Result<()> {
        self.start_watching().await?;
        self.process_events().await
    }
}
