//! Persistent weight cache
//!
//! Maps an absolute file path to its computed weight, keyed for validity on
//! the file's size and modification time. The whole map is persisted as one
//! JSON document tagged with the producing tool version; a version mismatch
//! discards the document outright.

use std::collections::{BTreeMap, HashMap};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::weigh::Weigher;

/// Layout version of the cache document itself.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Version tag written by this build. Weight semantics may change between releases.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub weight: u64,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
    pub computed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, size: u64, mtime: i64) -> bool {
        self.size == size && self.mtime == mtime
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    format_version: u32,
    tool_version: String,
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub document_path: PathBuf,
    pub tool_version: String,
    pub flush_quiet: Duration,
}

impl CacheOptions {
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        CacheOptions {
            document_path: document_path.into(),
            tool_version: TOOL_VERSION.to_string(),
            flush_quiet: Duration::from_secs(5),
        }
    }

    pub fn tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    pub fn flush_quiet(mut self, quiet: Duration) -> Self {
        self.flush_quiet = quiet;
        self
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub recomputes: u64,
}

struct Inner {
    options: CacheOptions,
    weigher: Arc<dyn Weigher>,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    /// Bumped by every scheduled flush; only the latest schedule may write.
    generation: AtomicU64,
    /// Single committed writer for the on-disk document.
    writer: tokio::sync::Mutex<()>,
    hits: AtomicU64,
    recomputes: AtomicU64,
}

/// Cloneable handle to a shared weight cache.
#[derive(Clone)]
pub struct WeightCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WeightCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightCache")
            .field("document_path", &self.inner.options.document_path)
            .field("tool_version", &self.inner.options.tool_version)
            .field("entries", &self.len())
            .finish()
    }
}

impl WeightCache {
    /// Open the cache, loading whatever valid entries the document holds.
    pub fn open(options: CacheOptions, weigher: Arc<dyn Weigher>) -> Self {
        let entries = load_document(&options);
        WeightCache {
            inner: Arc::new(Inner {
                options,
                weigher,
                entries: Mutex::new(entries),
                generation: AtomicU64::new(0),
                writer: tokio::sync::Mutex::new(()),
                hits: AtomicU64::new(0),
                recomputes: AtomicU64::new(0),
            }),
        }
    }

    pub fn document_path(&self) -> &Path {
        &self.inner.options.document_path
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, path: &Path) -> Option<CacheEntry> {
        self.entries().get(path).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            recomputes: self.inner.recomputes.load(Ordering::Relaxed),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        // A poisoned map is still a valid map; the panicking writer held no partial entry.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Weight of the file at `path`, recomputed when its size or mtime changed.
    ///
    /// Unreadable files weigh zero so one bad file cannot block reporting.
    pub async fn get_weight(&self, path: &Path) -> u64 {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return 0,
            Err(e) => {
                debug!("Cannot stat {}: {}", path.display(), e);
                self.forget(path);
                return 0;
            }
        };
        let (size, mtime) = stat_key(&meta);

        if let Some(entry) = self.entries().get(path) {
            if entry.is_fresh(size, mtime) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return entry.weight;
            }
        }

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {} for weighing: {}", path.display(), e);
                return 0;
            }
        };
        let weight = self.inner.weigher.weigh(&content);
        self.inner.recomputes.fetch_add(1, Ordering::Relaxed);

        self.entries().insert(
            path.to_path_buf(),
            CacheEntry {
                weight,
                size,
                mtime,
                computed_at: Utc::now(),
            },
        );
        self.schedule_flush();
        weight
    }

    /// Drop the entry for `path` if the file vanished or no longer matches its key.
    /// Returns whether an entry was dropped.
    pub async fn invalidate(&self, path: &Path) -> bool {
        let live = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Some(stat_key(&meta)),
            _ => None,
        };
        let dropped = {
            let mut entries = self.entries();
            let stale = match (entries.get(path), live) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(entry), Some((size, mtime))) => !entry.is_fresh(size, mtime),
            };
            if stale {
                entries.remove(path);
            }
            stale
        };
        if dropped {
            debug!("Invalidated cached weight for {}", path.display());
            self.schedule_flush();
        }
        dropped
    }

    fn forget(&self, path: &Path) {
        if self.entries().remove(path).is_some() {
            self.schedule_flush();
        }
    }

    /// Schedule a write after the quiet window. Each call supersedes the
    /// previous schedule, coalescing bursts of updates into one write.
    fn schedule_flush(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cache = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cache.inner.options.flush_quiet).await;
            if let Err(e) = cache.flush_generation(Some(generation)).await {
                warn!("Weight cache flush failed: {}", e);
            }
        });
    }

    /// Write the document now, superseding any pending scheduled write.
    pub async fn flush(&self) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.flush_generation(None).await
    }

    async fn flush_generation(&self, generation: Option<u64>) -> Result<()> {
        let _writer = self.inner.writer.lock().await;
        if let Some(generation) = generation {
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return Ok(());
            }
        }

        let document = self.snapshot();
        let path = self.inner.options.document_path.clone();
        let json = serde_json::to_string_pretty(&document).map_err(|e| Error::CacheFormat {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| Error::io(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| Error::io(&path, e))?;

        debug!(
            "Weight cache saved: {} ({} entries)",
            path.display(),
            document.entries.len()
        );
        Ok(())
    }

    fn snapshot(&self) -> CacheDocument {
        let entries = self
            .entries()
            .iter()
            .filter_map(|(path, entry)| {
                // The document is keyed by UTF-8 strings; other paths stay memory-only.
                path.to_str().map(|p| (p.to_string(), entry.clone()))
            })
            .collect();
        CacheDocument {
            format_version: CACHE_FORMAT_VERSION,
            tool_version: self.inner.options.tool_version.clone(),
            entries,
        }
    }

    /// Empty the cache and delete its document. Pending writes are cancelled.
    pub async fn clear(&self) -> Result<()> {
        let _writer = self.inner.writer.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.entries().clear();

        let path = &self.inner.options.document_path;
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(path, e)),
        }
        info!("Weight cache cleared: {}", path.display());
        Ok(())
    }
}

fn stat_key(meta: &Metadata) -> (u64, i64) {
    let mtime = meta
        .modified()
        .map(|t| match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i64,
            Err(e) => -(e.duration().as_nanos() as i64),
        })
        .unwrap_or(0);
    (meta.len(), mtime)
}

/// Read the document, discarding it wholesale on any version mismatch and
/// dropping entries whose files no longer exist.
fn load_document(options: &CacheOptions) -> HashMap<PathBuf, CacheEntry> {
    let path = &options.document_path;
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!("Cannot read weight cache {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    let document: CacheDocument = match serde_json::from_str(&text) {
        Ok(document) => document,
        Err(e) => {
            warn!("Discarding malformed weight cache {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    if document.format_version != CACHE_FORMAT_VERSION
        || document.tool_version != options.tool_version
    {
        info!(
            "Discarding weight cache {} (format {}, tool {}; running format {}, tool {})",
            path.display(),
            document.format_version,
            document.tool_version,
            CACHE_FORMAT_VERSION,
            options.tool_version
        );
        if let Err(e) = std::fs::remove_file(path) {
            debug!("Could not remove stale weight cache {}: {}", path.display(), e);
        }
        return HashMap::new();
    }

    let total = document.entries.len();
    let entries: HashMap<PathBuf, CacheEntry> = document
        .entries
        .into_iter()
        .map(|(p, entry)| (PathBuf::from(p), entry))
        .filter(|(p, _)| p.exists())
        .collect();
    debug!(
        "Weight cache loaded from {}: {} entries ({} dropped)",
        path.display(),
        entries.len(),
        total - entries.len()
    );
    entries
}
