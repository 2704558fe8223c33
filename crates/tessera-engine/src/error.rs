//! Errors surfaced by the engine handle

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] tessera_core::Error),

    /// The worker thread has stopped; no further commands can be served.
    #[error("engine worker is no longer running")]
    Closed,

    #[error("failed to start engine worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("root {0} is not an existing directory")]
    InvalidRoot(PathBuf),
}

impl EngineError {
    /// Whether the underlying failure is corrupted selection state.
    pub fn is_invariant(&self) -> bool {
        matches!(self, EngineError::Core(e) if e.is_invariant())
    }
}
