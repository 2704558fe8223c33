//! Filesystem watching for live rule reloads and cache invalidation

pub mod watcher;

pub use watcher::{FileWatcher, WatchEvent, WatcherService};
